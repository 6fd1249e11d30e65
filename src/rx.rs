//! The RX pipeline (spec.md §4.6), grounded on `nwkRx.c`.
//!
//! Routing touches this pipeline in four places (passive-learning ingress,
//! duplicate-reject route pruning, the `ROUTE` state handoff, and the
//! `ROUTE_ERROR` command dispatched from `indicate`). Rather than threading
//! a `routing` cargo-feature-conditional type through every signature here,
//! those touchpoints are expressed as a small [`RoutingPort`] trait object —
//! `Some` when the `routing` feature is compiled in and the caller wires up
//! [`crate::routing::Routing`], `None` otherwise. The `ROUTE` handoff only
//! needs `RoutingPort::next_hop` (a shared borrow), so it's handled inline
//! here rather than through a second, separately-borrowed closure.

use crate::config::{BROADCAST_ADDR, BROADCAST_PANID, SECURITY_MIC_SIZE, SERVICE_ENDPOINT_ID};
use crate::endpoint::{AckDecision, DataInd, EndpointTable, IND_OPT_ACK_REQUESTED, IND_OPT_BROADCAST, IND_OPT_BROADCAST_PAN_ID, IND_OPT_LINK_LOCAL, IND_OPT_LOCAL, IND_OPT_SECURED};
use crate::frame::{FrameHeader, FrameState, RxState};
use crate::ib::Ib;
use crate::pool::FramePool;
use crate::security::Security;
use crate::tx::Tx;
use crate::dup::{DupOutcome, DupRejectionTable};

pub const CMD_ACK: u8 = 0x00;
pub const CMD_ROUTE_ERROR: u8 = 0x01;
pub const CMD_ROUTE_REQ: u8 = 0x02;
pub const CMD_ROUTE_REPLY: u8 = 0x03;

/// Routing's three RX-side touchpoints (spec.md §4.9), injected so this
/// module has no direct dependency on the `routing` feature.
pub trait RoutingPort {
    fn next_hop(&self, dst_addr: u16) -> u16;
    fn on_ingress(&mut self, nwk_src_addr: u16, mac_src_addr: u16, lqi: u8);
    fn on_duplicate_reject(&mut self, dst_addr: u16);
    fn on_route_error_received(&mut self, dst_addr: u16);
}

#[derive(Default)]
pub struct Rx {
    active_frames: usize,
}

impl Rx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy(&self) -> bool {
        self.active_frames > 0
    }

    /// `PHY_DataInd`, called when [`crate::Nwk::task_handler`] drains a
    /// `PhyEvent::DataInd` out of the event mailbox (spec.md §9's
    /// mailbox redesign, applied here as well as to AES).
    pub fn on_phy_data_ind<const N: usize>(&mut self, pool: &mut FramePool<N>, raw: &crate::event::DataIndRaw) {
        let bytes = &raw.data[..raw.len];
        if bytes.len() < FrameHeader::SIZE || bytes[1] != 0x88 || (bytes[0] != 0x61 && bytes[0] != 0x41) {
            return;
        }
        let Some(idx) = pool.alloc(bytes.len() - FrameHeader::SIZE) else {
            return;
        };
        let frame = pool.get_mut(idx);
        frame.data[..bytes.len()].copy_from_slice(bytes);
        frame.state = FrameState::Rx(RxState::Received);
        frame.rx.lqi = raw.lqi;
        frame.rx.rssi = raw.rssi;
        self.active_frames += 1;
    }

    /// `nwkRxHandleReceivedFrame`.
    #[allow(clippy::too_many_arguments)]
    fn handle_received_frame<const N: usize, const D: usize>(
        pool: &mut FramePool<N>,
        ib: &mut Ib,
        dup: &mut DupRejectionTable<D>,
        tx: &mut Tx,
        routing: &mut Option<&mut dyn RoutingPort>,
        routing_enabled: bool,
        idx: usize,
    ) {
        let header = pool.get(idx).header();
        pool.get_mut(idx).state = FrameState::Rx(RxState::Finish);

        if (header.nwk_dst_addr == BROADCAST_ADDR && header.nwk_fcf.ack_request())
            || ib.addr == header.nwk_src_addr
        {
            return;
        }

        if header.nwk_fcf.security_enabled() && ib.security_mode == crate::config::SecurityMode::Off {
            return;
        }

        if let Some(routing) = routing.as_deref_mut() {
            routing.on_ingress(header.nwk_src_addr, header.mac_src_addr, pool.get(idx).rx.lqi);
        }

        if dup.accept(header.nwk_src_addr, header.nwk_seq) == DupOutcome::Reject {
            if ib.addr == header.mac_dst_addr {
                if let Some(routing) = routing.as_deref_mut() {
                    routing.on_duplicate_reject(header.nwk_dst_addr);
                }
            }
            return;
        }

        if header.mac_dst_addr == BROADCAST_ADDR
            && ib.addr != header.nwk_dst_addr
            && header.mac_dst_pan_id != BROADCAST_PANID
            && !header.nwk_fcf.link_local()
        {
            tx.relay_broadcast(pool, ib, idx);
        }

        if ib.addr == header.nwk_dst_addr || header.nwk_dst_addr == BROADCAST_ADDR {
            pool.get_mut(idx).state = if header.nwk_fcf.security_enabled() {
                FrameState::Rx(RxState::Decrypt)
            } else {
                FrameState::Rx(RxState::Indicate)
            };
        } else if routing_enabled && ib.addr == header.mac_dst_addr && header.mac_dst_pan_id != BROADCAST_PANID {
            pool.get_mut(idx).state = FrameState::Rx(RxState::Route);
        }
    }

    /// `nwkRxSendAck`.
    fn send_ack<const N: usize>(
        pool: &mut FramePool<N>,
        ib: &mut Ib,
        tx: &mut Tx,
        routing: &Option<&mut dyn RoutingPort>,
        dst_addr: u16,
        seq: u8,
        control: u8,
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
        frame.payload_mut()[0] = CMD_ACK;
        frame.payload_mut()[1] = control;
        frame.payload_mut()[2] = seq;

        let next_hop = |dst: u16| routing.as_deref().map(|r| r.next_hop(dst)).unwrap_or(dst);
        tx.submit(pool, ib, next_hop, idx);
    }

    /// `nwkRxIndicateFrame` + `nwkRxSeriveDataInd` + the ack-decision logic
    /// from `nwkRxTaskHandler`'s `INDICATE` case.
    #[allow(clippy::too_many_arguments)]
    fn indicate<const N: usize, const NEP: usize>(
        pool: &mut FramePool<N>,
        ib: &mut Ib,
        endpoints: &mut EndpointTable<NEP>,
        tx: &mut Tx,
        routing: &mut Option<&mut dyn RoutingPort>,
        idx: usize,
    ) {
        let header = pool.get(idx).header();
        let mic_len = if header.nwk_fcf.security_enabled() { SECURITY_MIC_SIZE } else { 0 };
        let payload_end = pool.get(idx).size - mic_len;

        let (ack, ack_control) = if header.nwk_dst_endpoint == SERVICE_ENDPOINT_ID {
            let payload_len = payload_end.saturating_sub(FrameHeader::SIZE);
            let mut cmd = [0u8; 3];
            if payload_len > 0 {
                let data = &pool.get(idx).data[FrameHeader::SIZE..payload_end];
                let n = data.len().min(3);
                cmd[..n].copy_from_slice(&data[..n]);
            }
            let consumed = if payload_len >= 3 {
                match cmd[0] {
                    CMD_ACK => {
                        tx.ack_received(pool, cmd[2], cmd[1]);
                        true
                    }
                    CMD_ROUTE_ERROR => {
                        let dst = u16::from_le_bytes([cmd[1], cmd[2]]);
                        if let Some(routing) = routing.as_deref_mut() {
                            routing.on_route_error_received(dst);
                        }
                        true
                    }
                    _ => false,
                }
            } else {
                false
            };
            (consumed, 0u8)
        } else if let Some(handler) = endpoints.get_mut(header.nwk_dst_endpoint) {
            let options = (if header.nwk_fcf.ack_request() { IND_OPT_ACK_REQUESTED } else { 0 })
                | (if header.nwk_fcf.security_enabled() { IND_OPT_SECURED } else { 0 })
                | (if header.nwk_fcf.link_local() { IND_OPT_LINK_LOCAL } else { 0 })
                | (if header.nwk_dst_addr == BROADCAST_ADDR { IND_OPT_BROADCAST } else { 0 })
                | (if header.nwk_src_addr == header.mac_src_addr { IND_OPT_LOCAL } else { 0 })
                | (if header.mac_dst_pan_id == BROADCAST_PANID { IND_OPT_BROADCAST_PAN_ID } else { 0 });
            let ind = DataInd {
                src_addr: header.nwk_src_addr,
                src_endpoint: header.nwk_src_endpoint,
                dst_endpoint: header.nwk_dst_endpoint,
                data: &pool.get(idx).data[FrameHeader::SIZE..payload_end],
                lqi: pool.get(idx).rx.lqi,
                rssi: pool.get(idx).rx.rssi,
                options,
            };
            let AckDecision { consumed, ack_control } = handler.handle(&ind);
            (consumed, ack_control)
        } else {
            (false, 0)
        };

        let force_ack = header.mac_dst_addr == BROADCAST_ADDR && ib.addr == header.nwk_dst_addr;
        if (header.nwk_fcf.ack_request() && ack) || force_ack {
            Self::send_ack(pool, ib, tx, routing, header.nwk_src_addr, header.nwk_seq, ack_control);
        }

        pool.get_mut(idx).state = FrameState::Rx(RxState::Finish);
    }

    /// `nwkRouteFrame`: a frame that reached `ROUTE` is MAC-rewritten for the
    /// next hop and handed back to TX. It keeps whatever NWK-level
    /// encryption it already carries — only the MAC addressing changes, so
    /// `TX_CONTROL_ROUTING` skips `Tx::submit`'s `ENCRYPT` decision.
    fn forward<const N: usize>(pool: &mut FramePool<N>, ib: &mut Ib, tx: &mut Tx, routing: &Option<&mut dyn RoutingPort>, idx: usize) {
        let dst_addr = pool.get(idx).header().nwk_dst_addr;
        let next_hop = routing.as_deref().map(|r| r.next_hop(dst_addr)).unwrap_or(BROADCAST_ADDR);
        {
            let frame = pool.get_mut(idx);
            frame.tx.data_req_owned = false;
            frame.tx.tx_control = crate::frame::TX_CONTROL_ROUTING;
        }
        tx.submit(pool, ib, |_| next_hop, idx);
    }

    /// `nwkRxTaskHandler`.
    #[allow(clippy::too_many_arguments)]
    pub fn task_handler<const N: usize, const D: usize, const NEP: usize>(
        &mut self,
        pool: &mut FramePool<N>,
        ib: &mut Ib,
        dup: &mut DupRejectionTable<D>,
        endpoints: &mut EndpointTable<NEP>,
        tx: &mut Tx,
        mut routing: Option<&mut dyn RoutingPort>,
        routing_enabled: bool,
    ) {
        if self.active_frames == 0 {
            return;
        }

        for idx in pool.iter_indices() {
            let state = pool.get(idx).state;
            match state {
                FrameState::Rx(RxState::Received) => {
                    Self::handle_received_frame(pool, ib, dup, tx, &mut routing, routing_enabled, idx);
                }
                FrameState::Rx(RxState::Decrypt) => {
                    Security::process(pool.get_mut(idx), false);
                }
                FrameState::Rx(RxState::Indicate) => {
                    Self::indicate(pool, ib, endpoints, tx, &mut routing, idx);
                }
                FrameState::Rx(RxState::Route) => {
                    Self::forward(pool, ib, tx, &routing, idx);
                    self.active_frames -= 1;
                }
                FrameState::Rx(RxState::Finish) => {
                    pool.free(idx);
                    self.active_frames -= 1;
                }
                _ => {}
            }
        }
    }
}
