//! The application-facing DataReq queue (spec.md §4.4), grounded on
//! `nwkDataReq.c`.
//!
//! The original threads pending requests through a singly-linked LIFO list
//! with three states (`INITIAL`, `WAIT_CONF`, `CONFIRM`) serviced by its own
//! task handler. Here the flat, arena-scanned shape already used by
//! [`crate::pool::FramePool`] replaces the pointer list (spec.md §9's
//! redesign note), and the `WAIT_CONF`/`CONFIRM` half collapses entirely:
//! [`crate::tx::Tx::task_handler`]'s `on_confirm` hook already tells the
//! caller exactly when a data-req-owned frame finishes, so this queue's own
//! job shrinks to "hold a slot until that one callback fires" — no separate
//! polling state machine needed.

use crate::error::NwkStatus;
use crate::frame::{FrameHeader, NwkFcf, TX_CONTROL_BROADCAST_PAN_ID};
use crate::ib::Ib;
use crate::pool::FramePool;
use crate::tx::Tx;

pub const OPT_ACK_REQUEST: u8 = 0x01;
pub const OPT_ENABLE_SECURITY: u8 = 0x02;
pub const OPT_LINK_LOCAL: u8 = 0x04;
pub const OPT_BROADCAST_PAN_ID: u8 = 0x08;

/// Delivered to a request's `confirm` callback once its frame leaves TX.
#[derive(Debug, Clone, Copy)]
pub struct DataReqResult {
    pub dst_addr: u16,
    pub dst_endpoint: u8,
    pub src_endpoint: u8,
    pub status: NwkStatus,
}

#[derive(Clone, Copy)]
struct DataReqSlot {
    in_use: bool,
    frame_idx: usize,
    dst_addr: u16,
    dst_endpoint: u8,
    src_endpoint: u8,
    confirm: fn(&DataReqResult),
}

impl Default for DataReqSlot {
    fn default() -> Self {
        Self {
            in_use: false,
            frame_idx: 0,
            dst_addr: 0,
            dst_endpoint: 0,
            src_endpoint: 0,
            confirm: |_| {},
        }
    }
}

/// Fixed-capacity set of `N` outstanding application data requests.
pub struct DataReqQueue<const N: usize> {
    slots: [DataReqSlot; N],
}

impl<const N: usize> Default for DataReqQueue<N> {
    fn default() -> Self {
        Self {
            slots: [DataReqSlot::default(); N],
        }
    }
}

impl<const N: usize> DataReqQueue<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy(&self) -> bool {
        self.slots.iter().any(|s| s.in_use)
    }

    /// `NWK_DataReq`: fills the NWK header, copies the payload into a freshly
    /// allocated frame, and hands it to [`crate::tx::Tx::submit`]. Both
    /// queue exhaustion and frame-pool exhaustion confirm synchronously with
    /// `NwkStatus::OutOfMemory` rather than retrying on a later tick (spec.md
    /// §8's "N+1 data requests exhaust the pool" case expects to observe
    /// that confirm immediately, not after some unbounded wait).
    #[allow(clippy::too_many_arguments)]
    pub fn submit<const FP: usize>(
        &mut self,
        pool: &mut FramePool<FP>,
        ib: &mut Ib,
        tx: &mut Tx,
        dst_addr: u16,
        dst_endpoint: u8,
        src_endpoint: u8,
        options: u8,
        data: &[u8],
        confirm: fn(&DataReqResult),
        next_hop: impl FnOnce(u16) -> u16,
    ) {
        let fail = |status| {
            confirm(&DataReqResult {
                dst_addr,
                dst_endpoint,
                src_endpoint,
                status,
            });
        };

        let Some(slot_idx) = self.slots.iter().position(|s| !s.in_use) else {
            fail(NwkStatus::OutOfMemory);
            return;
        };
        let Some(frame_idx) = pool.alloc(data.len()) else {
            fail(NwkStatus::OutOfMemory);
            return;
        };

        ib.nwk_seq_num = ib.nwk_seq_num.wrapping_add(1);
        let header = FrameHeader {
            nwk_fcf: NwkFcf::new()
                .with_ack_request(options & OPT_ACK_REQUEST != 0)
                .with_security_enabled(options & OPT_ENABLE_SECURITY != 0)
                .with_link_local(options & OPT_LINK_LOCAL != 0),
            nwk_seq: ib.nwk_seq_num,
            nwk_src_addr: ib.addr,
            nwk_dst_addr: dst_addr,
            nwk_src_endpoint: src_endpoint,
            nwk_dst_endpoint: dst_endpoint,
            ..Default::default()
        };

        let frame = pool.get_mut(frame_idx);
        frame.set_header(&header);
        frame.payload_mut()[..data.len()].copy_from_slice(data);
        frame.tx.data_req_owned = true;
        frame.tx.tx_control = if options & OPT_BROADCAST_PAN_ID != 0 {
            TX_CONTROL_BROADCAST_PAN_ID
        } else {
            0
        };

        self.slots[slot_idx] = DataReqSlot {
            in_use: true,
            frame_idx,
            dst_addr,
            dst_endpoint,
            src_endpoint,
            confirm,
        };

        tx.submit(pool, ib, next_hop, frame_idx);
    }

    /// `nwkDataReqConfirm`, called from [`crate::Nwk::task_handler`]'s wiring
    /// of `Tx::task_handler`'s `on_confirm` hook whenever a data-req-owned
    /// frame completes.
    pub fn on_tx_confirm(&mut self, frame_idx: usize, status: NwkStatus) {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.in_use && s.frame_idx == frame_idx)
        else {
            return;
        };
        let result = DataReqResult {
            dst_addr: slot.dst_addr,
            dst_endpoint: slot.dst_endpoint,
            src_endpoint: slot.src_endpoint,
            status,
        };
        let confirm = slot.confirm;
        slot.in_use = false;
        confirm(&result);
    }
}
