//! The optional routing table (spec.md §4.9). No original-source file
//! backs this module (documented in `SPEC_FULL.md`); it's authored from the
//! spec text and the call shapes visible at `nwkRx.c`/`nwkTx.c`'s routing
//! call sites, in the same fixed-array, scan-on-demand idiom as
//! [`crate::dup::DupRejectionTable`].

use crate::config::{BROADCAST_ADDR, ROUTE_DEFAULT_SCORE, ROUTE_WORST_SCORE, SERVICE_ENDPOINT_ID};
use crate::error::NwkStatus;
use crate::frame::FrameHeader;
use crate::ib::Ib;
use crate::pool::FramePool;
use crate::rx::{RoutingPort, CMD_ROUTE_ERROR};
use crate::tx::Tx;

/// Neither spec.md nor the original source gives an explicit score
/// ceiling — only the default (3) and the purge floor (0). 7 keeps scores
/// in a nibble and gives four successful ingresses of headroom above the
/// default before saturating.
const ROUTE_MAX_SCORE: u8 = 7;

#[derive(Clone, Copy)]
struct RouteRecord {
    in_use: bool,
    nwk_addr: u16,
    mac_addr: u16,
    lqi: u8,
    score: u8,
}

impl Default for RouteRecord {
    fn default() -> Self {
        Self {
            in_use: false,
            nwk_addr: 0,
            mac_addr: 0,
            lqi: 0,
            score: 0,
        }
    }
}

/// A pending `ROUTE_ERROR` to send, produced by [`Routing::on_frame_sent`].
#[derive(Debug, Clone, Copy)]
pub struct RouteError {
    pub mac_next_hop: u16,
    pub dst_addr: u16,
    pub unreachable: u16,
}

/// Fixed-capacity next-hop table of `R` entries.
pub struct Routing<const R: usize> {
    records: [RouteRecord; R],
}

impl<const R: usize> Default for Routing<R> {
    fn default() -> Self {
        Self {
            records: [RouteRecord::default(); R],
        }
    }
}

impl<const R: usize> Routing<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `nwkRouteNextHop`.
    pub fn next_hop(&self, dst: u16) -> u16 {
        if dst == BROADCAST_ADDR {
            return BROADCAST_ADDR;
        }
        self.records
            .iter()
            .find(|r| r.in_use && r.nwk_addr == dst && r.score > ROUTE_WORST_SCORE)
            .map(|r| r.mac_addr)
            .unwrap_or(BROADCAST_ADDR)
    }

    /// Passive-learning ingress: a frame addressed to us at the MAC layer
    /// records or improves the sender's route.
    pub fn on_ingress(&mut self, nwk_src_addr: u16, mac_src_addr: u16, lqi: u8) {
        if let Some(rec) = self.records.iter_mut().find(|r| r.in_use && r.nwk_addr == nwk_src_addr) {
            rec.mac_addr = mac_src_addr;
            rec.lqi = lqi;
            rec.score = rec.score.saturating_add(1).min(ROUTE_MAX_SCORE);
            return;
        }
        if let Some(slot) = self.records.iter_mut().find(|r| !r.in_use) {
            *slot = RouteRecord {
                in_use: true,
                nwk_addr: nwk_src_addr,
                mac_addr: mac_src_addr,
                lqi,
                score: ROUTE_DEFAULT_SCORE,
            };
        }
    }

    fn remove(&mut self, nwk_addr: u16) {
        if let Some(rec) = self.records.iter_mut().find(|r| r.in_use && r.nwk_addr == nwk_addr) {
            rec.in_use = false;
        }
    }

    /// `nwkRouteErrorReceived`.
    pub fn on_route_error_received(&mut self, dst_addr: u16) {
        self.remove(dst_addr);
    }

    /// Repeated duplicate rejection of a frame we're relaying is treated as
    /// a sign the downstream route is stale.
    pub fn on_duplicate_reject(&mut self, dst_addr: u16) {
        self.remove(dst_addr);
    }

    /// `nwkRouteFrameSent`: adjusts `dst_addr`'s score on confirm. Once it
    /// bottoms out the route is purged and the caller is told to emit a
    /// `ROUTE_ERROR` back toward `origin` (unless we are the origin
    /// ourselves). Returns the event rather than sending it directly: this
    /// is called from inside [`crate::tx::Tx::task_handler`]'s `on_confirm`
    /// hook, which already holds the only `&mut Tx` — [`Nwk::task_handler`]
    /// sends the pending errors once that call returns.
    ///
    /// [`Nwk::task_handler`]: crate::Nwk::task_handler
    pub fn on_frame_sent(&mut self, own_addr: u16, origin: u16, dst_addr: u16, status: NwkStatus) -> Option<RouteError> {
        let mut emit_error = false;
        if let Some(rec) = self.records.iter_mut().find(|r| r.in_use && r.nwk_addr == dst_addr) {
            match status {
                NwkStatus::Success => rec.score = rec.score.saturating_add(1).min(ROUTE_MAX_SCORE),
                NwkStatus::NoAck | NwkStatus::PhyChannelAccessFailure => {
                    rec.score = rec.score.saturating_sub(1);
                    if rec.score == ROUTE_WORST_SCORE {
                        rec.in_use = false;
                        emit_error = true;
                    }
                }
                _ => {}
            }
        }
        if emit_error && origin != own_addr {
            Some(RouteError {
                mac_next_hop: self.next_hop(origin),
                dst_addr: origin,
                unreachable: dst_addr,
            })
        } else {
            None
        }
    }

    /// `nwkRxSendRouteError`, run by [`Nwk::task_handler`] for every
    /// [`RouteError`] produced by [`Routing::on_frame_sent`] during the
    /// preceding TX pass.
    ///
    /// [`Nwk::task_handler`]: crate::Nwk::task_handler
    pub(crate) fn send_route_error<const N: usize>(
        pool: &mut FramePool<N>,
        ib: &mut Ib,
        tx: &mut Tx,
        mac_next_hop: u16,
        dst_addr: u16,
        unreachable: u16,
    ) {
        let Some(idx) = pool.alloc(3) else {
            return;
        };
        ib.nwk_seq_num = ib.nwk_seq_num.wrapping_add(1);
        let header = FrameHeader {
            nwk_dst_addr: dst_addr,
            nwk_src_addr: ib.addr,
            nwk_seq: ib.nwk_seq_num,
            nwk_src_endpoint: SERVICE_ENDPOINT_ID,
            nwk_dst_endpoint: SERVICE_ENDPOINT_ID,
            ..Default::default()
        };
        let frame = pool.get_mut(idx);
        frame.tx.data_req_owned = false;
        frame.set_header(&header);
        frame.payload_mut()[0] = CMD_ROUTE_ERROR;
        frame.payload_mut()[1..3].copy_from_slice(&unreachable.to_le_bytes());
        tx.submit(pool, ib, move |_| mac_next_hop, idx);
    }
}

impl<const R: usize> RoutingPort for Routing<R> {
    fn next_hop(&self, dst_addr: u16) -> u16 {
        Routing::next_hop(self, dst_addr)
    }

    fn on_ingress(&mut self, nwk_src_addr: u16, mac_src_addr: u16, lqi: u8) {
        Routing::on_ingress(self, nwk_src_addr, mac_src_addr, lqi)
    }

    fn on_duplicate_reject(&mut self, dst_addr: u16) {
        Routing::on_duplicate_reject(self, dst_addr)
    }

    fn on_route_error_received(&mut self, dst_addr: u16) {
        Routing::on_route_error_received(self, dst_addr)
    }
}
