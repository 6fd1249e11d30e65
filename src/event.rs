//! The ISR → task-context event mailboxes (spec.md §9 redesign note:
//! upcalls as an explicit event mailbox rather than raw function pointers).
//!
//! Both the PHY driver and the AES oracle complete their requests
//! asynchronously, typically from an interrupt handler. Rather than calling
//! back into pipeline code directly from that context, the upcall just
//! pushes a small event into a fixed-capacity queue; [`crate::Nwk::task_handler`]
//! drains it from cooperative task context. Push is the only operation meant
//! to run from an ISR, and it is bounded and non-blocking: a full mailbox
//! drops the event rather than blocking or growing.

use heapless::Deque;

/// A raw PHY data indication, captured at the ISR boundary. Owns its bytes
/// (copied out of the PHY driver's private buffer) since a mailbox slot
/// must outlive the interrupt that filled it.
#[derive(Debug, Clone, Copy)]
pub struct DataIndRaw {
    pub data: [u8; crate::frame::MAX_FRAME_SIZE],
    pub len: usize,
    pub lqi: u8,
    pub rssi: i8,
}

/// Events raised by the PHY driver.
#[derive(Debug, Clone, Copy)]
pub enum PhyEvent {
    DataInd(DataIndRaw),
    DataConf(crate::phy::PhyStatus),
}

/// Events raised by the AES oracle. Only one variant exists because only
/// one request is ever outstanding at a time (spec.md §4.8); there is no
/// per-request identifier to carry.
#[derive(Debug, Clone, Copy)]
pub enum AesEvent {
    EncryptConf,
}

/// Fixed-capacity FIFO of `N` pending PHY events.
pub struct PhyMailbox<const N: usize> {
    queue: Deque<PhyEvent, N>,
}

impl<const N: usize> Default for PhyMailbox<N> {
    fn default() -> Self {
        Self {
            queue: Deque::new(),
        }
    }
}

impl<const N: usize> PhyMailbox<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push from interrupt context. Returns `false` (event dropped) if the
    /// mailbox is full — this should never happen in practice since the
    /// frame pool backpressures allocation long before `N` events could
    /// queue up, but it's a drop, not a panic or a block.
    pub fn push(&mut self, event: PhyEvent) -> bool {
        self.queue.push_back(event).is_ok()
    }

    pub fn pop(&mut self) -> Option<PhyEvent> {
        self.queue.pop_front()
    }
}

/// Fixed-capacity FIFO for AES completion events. Capacity 2 is generous:
/// exactly one request is ever outstanding, so at most one event is ever
/// pending between drains.
pub struct AesMailbox {
    queue: Deque<AesEvent, 2>,
}

impl Default for AesMailbox {
    fn default() -> Self {
        Self {
            queue: Deque::new(),
        }
    }
}

impl AesMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AesEvent) -> bool {
        self.queue.push_back(event).is_ok()
    }

    pub fn pop(&mut self) -> Option<AesEvent> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let mut mbox: AesMailbox = AesMailbox::new();
        assert!(mbox.push(AesEvent::EncryptConf));
        assert!(mbox.push(AesEvent::EncryptConf));
        assert!(matches!(mbox.pop(), Some(AesEvent::EncryptConf)));
        assert!(matches!(mbox.pop(), Some(AesEvent::EncryptConf)));
        assert!(mbox.pop().is_none());
    }

    #[test]
    fn full_mailbox_drops_instead_of_panicking() {
        let mut mbox: AesMailbox = AesMailbox::new();
        assert!(mbox.push(AesEvent::EncryptConf));
        assert!(mbox.push(AesEvent::EncryptConf));
        assert!(!mbox.push(AesEvent::EncryptConf));
    }

    #[test]
    fn phy_mailbox_respects_capacity() {
        let mut mbox: PhyMailbox<1> = PhyMailbox::new();
        assert!(mbox.push(PhyEvent::DataConf(crate::phy::PhyStatus::Success)));
        assert!(!mbox.push(PhyEvent::DataConf(crate::phy::PhyStatus::Success)));
        assert!(mbox.pop().is_some());
        assert!(mbox.pop().is_none());
    }
}
