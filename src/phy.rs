//! The PHY contract this crate consumes (spec.md §6).
//!
//! The transceiver driver, SPI plumbing and radio state machine are out of
//! scope (spec.md §1) — this module only names the narrow interface the NWK
//! core calls into and the two upcalls it expects back, delivered through
//! [`crate::event`] rather than raw function pointers (spec.md §9 redesign:
//! upcalls become explicit events).

/// Transceiver-reported outcome of a `data_req`, before NWK-level mapping
/// (`convertPhyStatus` in the original; see [`crate::error::NwkStatus`] for
/// the mapped form).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyStatus {
    Success,
    SuccessDataPending,
    SuccessWaitForAck,
    ChannelAccessFailure,
    NoAck,
    Error,
}

impl PhyStatus {
    /// `convertPhyStatus` from `nwkTx.c`.
    pub fn to_nwk_status(self) -> crate::error::NwkStatus {
        use crate::error::NwkStatus;
        match self {
            PhyStatus::Success | PhyStatus::SuccessDataPending | PhyStatus::SuccessWaitForAck => {
                NwkStatus::Success
            }
            PhyStatus::ChannelAccessFailure => NwkStatus::PhyChannelAccessFailure,
            PhyStatus::NoAck => NwkStatus::PhyNoAck,
            PhyStatus::Error => NwkStatus::Error,
        }
    }
}

/// A frame as delivered by the PHY driver (`PHY_DataInd_t`), before NWK
/// parses it into a pool-owned [`crate::frame::FrameBuffer`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct PhyDataInd<'a> {
    pub data: &'a [u8],
    pub lqi: u8,
    pub rssi: i8,
}

/// The PHY driver interface consumed by this crate (`PHY_*` in spec.md §6).
///
/// Implemented by the board/transceiver-specific driver, which is out of
/// scope for this crate. `data_req`/`busy` are called only from task
/// context; `set_rx_state`/`sleep`/`wakeup`/the `set_*` family are called
/// from `Nwk::init` and explicit sleep/wake requests.
pub trait Phy {
    fn init(&mut self);
    fn set_channel(&mut self, channel: u8);
    fn set_pan_id(&mut self, pan_id: u16);
    fn set_short_addr(&mut self, addr: u16);
    fn set_rx_state(&mut self, enabled: bool);
    fn sleep(&mut self);
    fn wakeup(&mut self);

    /// Submit `data` for transmission. Returns `false` if the PHY was busy
    /// and could not accept the frame (the caller should not have called
    /// this without checking [`Phy::busy`] first; `task_handler` always
    /// does).
    fn data_req(&mut self, data: &[u8]) -> bool;

    /// Whether the PHY currently has a frame in flight.
    fn busy(&self) -> bool;
}
