//! The information base (spec.md §3, §9's "global information base" note):
//! `nwkIb` in the original, made an explicit value owned by [`crate::Nwk`]
//! and threaded into the pipelines that need it, rather than a module-scope
//! global — this is what lets more than one `Nwk` instance exist in the
//! same process (handy for the in-process integration tests under `tests/`).

use crate::config::{Config, SecurityMode};

/// Read-mostly identity plus the two sequence counters, which are the only
/// fields any pipeline mutates after `Nwk::new`.
#[derive(Debug, Clone, Copy)]
pub struct Ib {
    pub addr: u16,
    pub pan_id: u16,
    pub key: [u8; 16],
    pub security_mode: SecurityMode,
    pub nwk_seq_num: u8,
    pub mac_seq_num: u8,
}

impl Ib {
    pub fn new(addr: u16, pan_id: u16, key: [u8; 16], security_mode: SecurityMode) -> Self {
        Self {
            addr,
            pan_id,
            key,
            security_mode,
            nwk_seq_num: 0,
            mac_seq_num: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.addr, config.pan_id, config.key, config.security_mode)
    }
}
