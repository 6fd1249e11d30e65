//! The TX pipeline (spec.md §4.5), grounded on `nwkTx.c`.

use crate::config::ack_wait_ticks;
use crate::error::NwkStatus;
use crate::frame::{
    FrameHeader, FrameState, TxState, MAC_FCF_BROADCAST, MAC_FCF_UNICAST, TX_CONTROL_BROADCAST_PAN_ID,
    TX_CONTROL_ROUTING,
};
use crate::ib::Ib;
use crate::phy::PhyStatus;
use crate::pool::FramePool;
use crate::security::Security;
use crate::timer::{TimerId, TimerService};

/// Owns the single PHY-active-frame slot and the count of frames currently
/// in flight through this pipeline. Holds no frame storage of its own — all
/// state lives on the [`crate::frame::FrameBuffer`] itself.
#[derive(Default)]
pub struct Tx {
    phy_active: Option<usize>,
    active_frames: usize,
}

impl Tx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy(&self) -> bool {
        self.active_frames > 0
    }

    /// `nwkTxFrame`: called once a frame's NWK header is filled in (by
    /// [`crate::datareq::DataReqQueue`] or the RX pipeline's router handoff).
    /// Fills the MAC header and decides the starting state.
    pub fn submit<const N: usize>(
        &mut self,
        pool: &mut FramePool<N>,
        ib: &mut Ib,
        next_hop: impl FnOnce(u16) -> u16,
        idx: usize,
    ) {
        let frame = pool.get_mut(idx);
        let mut header = frame.header();

        frame.state = if frame.tx.tx_control & TX_CONTROL_ROUTING != 0 {
            FrameState::Tx(TxState::Send)
        } else if header.nwk_fcf.security_enabled() {
            FrameState::Tx(TxState::Encrypt)
        } else {
            FrameState::Tx(TxState::Send)
        };
        frame.tx.status = NwkStatus::Success;

        header.mac_dst_pan_id = if frame.tx.tx_control & TX_CONTROL_BROADCAST_PAN_ID != 0 {
            crate::config::BROADCAST_PANID
        } else {
            ib.pan_id
        };
        header.mac_dst_addr = next_hop(header.nwk_dst_addr);
        header.mac_src_addr = ib.addr;
        ib.mac_seq_num = ib.mac_seq_num.wrapping_add(1);
        header.mac_seq = ib.mac_seq_num;
        header.mac_fcf = if header.mac_dst_addr == crate::config::BROADCAST_ADDR {
            MAC_FCF_BROADCAST
        } else {
            MAC_FCF_UNICAST
        };

        frame.set_header(&header);
        self.active_frames += 1;
    }

    /// `nwkTxBroadcastFrame`: clone `orig` into a freshly allocated buffer
    /// rewritten for broadcast, entering the pipeline directly at `Send`
    /// with no DataReq owner (it frees itself on confirm).
    pub fn relay_broadcast<const N: usize>(&mut self, pool: &mut FramePool<N>, ib: &mut Ib, orig_idx: usize) {
        let orig = *pool.get(orig_idx);
        let Some(new_idx) = pool.alloc(orig.size - FrameHeader::SIZE) else {
            return;
        };

        let frame = pool.get_mut(new_idx);
        frame.data[..orig.size].copy_from_slice(&orig.data[..orig.size]);
        frame.state = FrameState::Tx(TxState::Send);
        frame.tx.status = NwkStatus::Success;
        frame.tx.data_req_owned = false;

        let mut header = frame.header();
        header.mac_fcf = MAC_FCF_BROADCAST;
        header.mac_dst_addr = crate::config::BROADCAST_ADDR;
        header.mac_src_addr = ib.addr;
        ib.mac_seq_num = ib.mac_seq_num.wrapping_add(1);
        header.mac_seq = ib.mac_seq_num;
        frame.set_header(&header);

        self.active_frames += 1;
    }

    /// `nwkTxAckReceived`: an inbound NWK ACK command matched against frames
    /// waiting for one. Returns whether a match was found (silently ignored
    /// otherwise, spec.md §8).
    pub fn ack_received<const N: usize>(&mut self, pool: &mut FramePool<N>, seq: u8, control: u8) -> bool {
        if self.active_frames == 0 {
            return false;
        }
        for idx in pool.iter_indices() {
            let frame = pool.get_mut(idx);
            if frame.state == FrameState::Tx(TxState::WaitAck) && frame.header().nwk_seq == seq {
                frame.state = FrameState::Tx(TxState::Confirm);
                frame.tx.control = control;
                return true;
            }
        }
        false
    }

    /// `nwkTxAckWaitTimerHandler`'s per-tick body: run by
    /// [`crate::Nwk::task_handler`] when the ack-wait timer expires.
    pub fn ack_wait_tick<const N: usize>(&mut self, pool: &mut FramePool<N>) {
        if self.active_frames == 0 {
            return;
        }
        for idx in pool.iter_indices() {
            let frame = pool.get_mut(idx);
            if frame.state == FrameState::Tx(TxState::WaitAck) {
                frame.tx.timeout -= 1;
                if frame.tx.timeout == 0 {
                    frame.state = FrameState::Tx(TxState::Confirm);
                    frame.tx.status = NwkStatus::NoAck;
                }
            }
        }
    }

    /// `PHY_DataConf`, drained from the PHY event mailbox.
    pub fn on_phy_data_conf<const N: usize>(&mut self, pool: &mut FramePool<N>, status: PhyStatus) {
        if let Some(idx) = self.phy_active.take() {
            let frame = pool.get_mut(idx);
            frame.tx.status = status.to_nwk_status();
            frame.state = FrameState::Tx(TxState::Sent);
        }
    }

    /// `nwkTxTaskHandler`. `on_confirm` is notified (frame still populated,
    /// not yet freed) for every frame reaching `Confirm`, then the frame is
    /// freed and the active count decremented.
    #[allow(clippy::too_many_arguments)]
    pub fn task_handler<const N: usize, const M: usize>(
        &mut self,
        pool: &mut FramePool<N>,
        ib: &mut Ib,
        phy: &mut impl crate::phy::Phy,
        ack_timer: &mut TimerService<M>,
        ack_timer_id: TimerId,
        mut on_confirm: impl FnMut(usize, FrameHeader, bool, NwkStatus, u8),
    ) {
        if self.active_frames == 0 {
            return;
        }

        for idx in pool.iter_indices() {
            let state = pool.get(idx).state;
            match state {
                FrameState::Tx(TxState::Encrypt) => {
                    Security::process(pool.get_mut(idx), true);
                }
                FrameState::Tx(TxState::Send) => {
                    if !phy.busy() {
                        self.phy_active = Some(idx);
                        let frame = pool.get_mut(idx);
                        frame.state = FrameState::Tx(TxState::WaitConf);
                        let size = frame.size;
                        phy.data_req(&frame.data[..size]);
                    }
                }
                FrameState::Tx(TxState::WaitConf) => {}
                FrameState::Tx(TxState::Sent) => {
                    let frame = pool.get_mut(idx);
                    let header = frame.header();
                    if frame.tx.status == NwkStatus::Success
                        && header.nwk_src_addr == ib.addr
                        && header.nwk_fcf.ack_request()
                    {
                        frame.state = FrameState::Tx(TxState::WaitAck);
                        frame.tx.timeout = ack_wait_ticks();
                        ack_timer.start(ack_timer_id);
                    } else {
                        frame.state = FrameState::Tx(TxState::Confirm);
                    }
                }
                FrameState::Tx(TxState::WaitAck) => {}
                FrameState::Tx(TxState::Confirm) => {
                    let frame = pool.get(idx);
                    let header = frame.header();
                    let status = frame.tx.status;
                    let control = frame.tx.control;
                    let data_req_owned = frame.tx.data_req_owned;
                    on_confirm(idx, header, data_req_owned, status, control);
                    pool.free(idx);
                    self.active_frames -= 1;
                }
                _ => {}
            }
        }
    }
}
