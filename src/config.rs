//! Compile-time defaults and the runtime configuration assembled before
//! [`crate::Nwk::new`].
//!
//! Mirrors `sys/inc/sysConfig.h` in the original implementation: a handful
//! of `#define`d capacities and timing constants. Capacities become const
//! generics on [`crate::Nwk`]; timing constants stay as `pub const`s here
//! since nothing needs to vary them per instance.

/// `NWK_SECURITY_MIC_SIZE`
pub const SECURITY_MIC_SIZE: usize = 4;

/// `NWK_SECURITY_BLOCK_SIZE`
pub const SECURITY_BLOCK_SIZE: usize = 16;

/// `NWK_ACK_WAIT_TIME`, in milliseconds.
pub const ACK_WAIT_TIME_MS: u32 = 1000;

/// `NWK_TX_ACK_WAIT_TIMER_INTERVAL`, in milliseconds.
pub const ACK_WAIT_TIMER_INTERVAL_MS: u32 = 50;

/// `NWK_DUPLICATE_REJECTION_TTL`, in milliseconds.
pub const DUPLICATE_REJECTION_TTL_MS: u32 = 1000;

/// `NWK_RX_DUPLICATE_REJECTION_TIMER_INTERVAL`, in milliseconds.
pub const DUPLICATE_REJECTION_TIMER_INTERVAL_MS: u32 = 20;

/// `NWK_ROUTE_DEFAULT_SCORE`
pub const ROUTE_DEFAULT_SCORE: u8 = 3;

/// A route is purged once its score saturates to this value.
pub const ROUTE_WORST_SCORE: u8 = 0;

/// `NWK_BROADCAST_ADDR`
pub const BROADCAST_ADDR: u16 = 0xFFFF;

/// `NWK_BROADCAST_PANID`
pub const BROADCAST_PANID: u16 = 0xFFFF;

/// `NWK_SERVICE_ENDPOINT_ID`
pub const SERVICE_ENDPOINT_ID: u8 = 0;

/// Size of [`crate::frame::FrameHeader`] on the wire, in bytes.
pub const FRAME_HEADER_SIZE: usize = 2 + 1 + 2 + 2 + 2 + 1 + 1 + 2 + 2 + 1 + 1;

/// Ceiling division, used for TTL/timeout-to-tick-count conversions throughout.
pub const fn ceil_div(num: u32, den: u32) -> u32 {
    (num + den - 1) / den
}

/// Number of 50 ms ticks an ack wait holds out for, plus one (matches the
/// original's `NWK_ACK_WAIT_TIME / NWK_TX_ACK_WAIT_TIMER_INTERVAL + 1`).
pub const fn ack_wait_ticks() -> u16 {
    (ceil_div(ACK_WAIT_TIME_MS, ACK_WAIT_TIMER_INTERVAL_MS) + 1) as u16
}

/// Number of 20 ms ticks a duplicate-rejection slot stays alive for, plus one.
pub const fn duplicate_rejection_ttl_ticks() -> u16 {
    (ceil_div(
        DUPLICATE_REJECTION_TTL_MS,
        DUPLICATE_REJECTION_TIMER_INTERVAL_MS,
    ) + 1) as u16
}

/// Per-build security mode. `Off` mirrors building without `NWK_ENABLE_SECURITY`;
/// a frame with `security_enabled` set is then dropped on receipt and refused
/// on send.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    Off,
    On,
}

/// Runtime configuration, assembled by the application before constructing
/// [`crate::Nwk`]. Once handed to `Nwk::new` it becomes the read-mostly
/// information base (`nwkIb` in the original); nothing below this struct
/// mutates it except `nwk_seq_num`/`mac_seq_num`, which live on `Nwk` itself.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub addr: u16,
    pub pan_id: u16,
    pub tx_power: u8,
    pub security_mode: SecurityMode,
    pub key: [u8; 16],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: 0,
            pan_id: 0,
            tx_power: 0,
            security_mode: SecurityMode::default(),
            key: [0; 16],
        }
    }
}

impl Config {
    pub fn set_addr(&mut self, addr: u16) -> &mut Self {
        self.addr = addr;
        self
    }

    pub fn set_pan_id(&mut self, pan_id: u16) -> &mut Self {
        self.pan_id = pan_id;
        self
    }

    pub fn set_tx_power(&mut self, tx_power: u8) -> &mut Self {
        self.tx_power = tx_power;
        self
    }

    pub fn set_key(&mut self, key: [u8; 16]) -> &mut Self {
        self.key = key;
        self
    }

    pub fn set_security_mode(&mut self, mode: SecurityMode) -> &mut Self {
        self.security_mode = mode;
        self
    }
}
