//! The frame buffer and wire format (spec.md §3).
//!
//! `state` in the original is a single `uint8_t` partitioned into disjoint
//! numeric ranges per owning pipeline (`0x10..0x15` TX, `0x20..0x24` RX,
//! `0x30..0x34` security). spec.md §9's first redesign note asks for a sum
//! type instead, so illegal cross-pipeline transitions become
//! unrepresentable: [`FrameState`] is that sum type, with each arm carrying
//! the sub-state enum for its pipeline. The original numeric values are
//! preserved as the sub-enums' `#[repr(u8)]` discriminants and exposed
//! through [`FrameState::raw`] for logging/tests that want to compare
//! against the source document.

use crate::config::FRAME_HEADER_SIZE;
use modular_bitfield::prelude::*;

/// A PHY PDU is at most 127 bytes; minus the MAC/NWK header and MIC that
/// still leaves room for the largest payload this stack ever carries.
/// spec.md §1 non-goals: no fragmentation, so this is also the hard payload
/// ceiling.
pub const MAX_FRAME_SIZE: usize = 127;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxState {
    Encrypt = 0x10,
    Send = 0x11,
    WaitConf = 0x12,
    Sent = 0x13,
    WaitAck = 0x14,
    Confirm = 0x15,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RxState {
    Received = 0x20,
    Decrypt = 0x21,
    Indicate = 0x22,
    Route = 0x23,
    Finish = 0x24,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecurityState {
    EncryptPending = 0x30,
    DecryptPending = 0x31,
    Process = 0x32,
    Wait = 0x33,
    Confirm = 0x34,
}

/// Which pipeline currently owns a [`FrameBuffer`], and that pipeline's
/// sub-state. `Free` means the slot is available to [`crate::pool::FramePool::alloc`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Free,
    Tx(TxState),
    Rx(RxState),
    Security(SecurityState),
}

impl FrameState {
    /// The numeric tag the original implementation would have stored here.
    /// Not used for any dispatch in this crate — only for logging/tests.
    pub fn raw(self) -> Option<u8> {
        match self {
            FrameState::Free => None,
            FrameState::Tx(s) => Some(s as u8),
            FrameState::Rx(s) => Some(s as u8),
            FrameState::Security(s) => Some(s as u8),
        }
    }

    pub fn is_free(self) -> bool {
        matches!(self, FrameState::Free)
    }
}

/// `NwkFcf_t`: the 1-byte Network Frame Control Field bitfield.
#[bitfield]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NwkFcf {
    pub ack_request: bool,
    pub security_enabled: bool,
    pub link_local: bool,
    pub reserved: B5,
}

/// `macFcf` value stamped on unicast data frames: data frame, intra-PAN,
/// short addressing, ack-request bit set (spec.md §4.5).
pub const MAC_FCF_UNICAST: u16 = 0x8861;
/// `macFcf` value stamped on broadcast-destination data frames.
pub const MAC_FCF_BROADCAST: u16 = 0x8841;

/// Bit-exact on-wire frame header (spec.md §3), little-endian.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub mac_fcf: u16,
    pub mac_seq: u8,
    pub mac_dst_pan_id: u16,
    pub mac_dst_addr: u16,
    pub mac_src_addr: u16,
    pub nwk_fcf: NwkFcf,
    pub nwk_seq: u8,
    pub nwk_src_addr: u16,
    pub nwk_dst_addr: u16,
    pub nwk_src_endpoint: u8,
    pub nwk_dst_endpoint: u8,
}

impl Default for NwkFcf {
    fn default() -> Self {
        NwkFcf::new()
    }
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_HEADER_SIZE;

    pub fn encode(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= Self::SIZE);
        out[0..2].copy_from_slice(&self.mac_fcf.to_le_bytes());
        out[2] = self.mac_seq;
        out[3..5].copy_from_slice(&self.mac_dst_pan_id.to_le_bytes());
        out[5..7].copy_from_slice(&self.mac_dst_addr.to_le_bytes());
        out[7..9].copy_from_slice(&self.mac_src_addr.to_le_bytes());
        out[9] = self.nwk_fcf.bytes[0];
        out[10] = self.nwk_seq;
        out[11..13].copy_from_slice(&self.nwk_src_addr.to_le_bytes());
        out[13..15].copy_from_slice(&self.nwk_dst_addr.to_le_bytes());
        out[15] = self.nwk_src_endpoint;
        out[16] = self.nwk_dst_endpoint;
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            mac_fcf: u16::from_le_bytes(bytes[0..2].try_into().unwrap()),
            mac_seq: bytes[2],
            mac_dst_pan_id: u16::from_le_bytes(bytes[3..5].try_into().unwrap()),
            mac_dst_addr: u16::from_le_bytes(bytes[5..7].try_into().unwrap()),
            mac_src_addr: u16::from_le_bytes(bytes[7..9].try_into().unwrap()),
            nwk_fcf: NwkFcf::from_bytes([bytes[9]]),
            nwk_seq: bytes[10],
            nwk_src_addr: u16::from_le_bytes(bytes[11..13].try_into().unwrap()),
            nwk_dst_addr: u16::from_le_bytes(bytes[13..15].try_into().unwrap()),
            nwk_src_endpoint: bytes[15],
            nwk_dst_endpoint: bytes[16],
        })
    }
}

/// Metadata owned by the TX pipeline while it holds a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxMeta {
    pub status: crate::error::NwkStatus,
    pub control: u8,
    pub timeout: u16,
    /// `true` for frames re-threaded through the application DataReq queue;
    /// broadcast relays and internal acks free themselves instead.
    pub data_req_owned: bool,
    /// `NWK_TX_CONTROL_*` bits (routing/broadcast-pan-id), set by whoever
    /// calls [`crate::Nwk::tx_frame`].
    pub tx_control: u8,
}

/// Metadata stamped by the PHY driver on receipt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RxMeta {
    pub lqi: u8,
    pub rssi: i8,
}

pub const TX_CONTROL_ROUTING: u8 = 0x01;
pub const TX_CONTROL_BROADCAST_PAN_ID: u8 = 0x02;

/// A pool-owned frame buffer (spec.md §3's central entity).
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffer {
    pub state: FrameState,
    pub size: usize,
    pub data: [u8; MAX_FRAME_SIZE],
    pub tx: TxMeta,
    pub rx: RxMeta,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self {
            state: FrameState::Free,
            size: 0,
            data: [0; MAX_FRAME_SIZE],
            tx: TxMeta::default(),
            rx: RxMeta::default(),
        }
    }
}

impl FrameBuffer {
    pub fn header(&self) -> FrameHeader {
        FrameHeader::decode(&self.data[..self.size]).expect("frame smaller than header")
    }

    pub fn set_header(&mut self, header: &FrameHeader) {
        header.encode(&mut self.data[..self.size]);
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[FrameHeader::SIZE..self.size]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[FrameHeader::SIZE..self.size]
    }

    /// Payload length excluding the trailing MIC, if security is enabled on
    /// this frame.
    pub fn payload_len_without_mic(&self) -> usize {
        let total = self.size - FrameHeader::SIZE;
        if self.header().nwk_fcf.security_enabled() {
            total - crate::config::SECURITY_MIC_SIZE
        } else {
            total
        }
    }

    pub fn mic(&self) -> &[u8] {
        &self.data[self.size - crate::config::SECURITY_MIC_SIZE..self.size]
    }

    pub fn mic_mut(&mut self) -> &mut [u8] {
        let end = self.size;
        &mut self.data[end - crate::config::SECURITY_MIC_SIZE..end]
    }
}
