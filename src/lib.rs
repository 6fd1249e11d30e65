//! A network (NWK) layer for a 16-bit-addressed IEEE 802.15.4 mesh stack,
//! running on constrained microcontrollers on top of a board-specific PHY
//! driver and (optionally) an AES oracle.
//!
//! Copyright Cody Schafer. Licensed under the Open Software License version 3.0
//!
//! Supports `no_std`.
#![no_std]

pub mod aes_oracle;
pub mod config;
pub mod datareq;
pub mod dup;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod frame;
pub mod ib;
pub mod phy;
pub mod pool;
pub mod rx;
#[cfg(feature = "routing")]
pub mod routing;
pub mod security;
pub mod timer;
pub mod tx;

pub use aes_oracle::EncryptOracle;
pub use config::{Config, SecurityMode};
pub use datareq::{DataReqQueue, DataReqResult};
pub use endpoint::{AckDecision, DataInd, EndpointHandler, EndpointTable, OpenEndpointError};
pub use error::NwkStatus;
pub use event::{AesEvent, AesMailbox, DataIndRaw, PhyEvent, PhyMailbox};
pub use phy::{Phy, PhyDataInd, PhyStatus};
#[cfg(feature = "routing")]
pub use routing::Routing;

use dup::DupRejectionTable;
use ib::Ib;
use pool::FramePool;
use rx::Rx;
use security::Security;
use timer::{TimerId, TimerMode, TimerService};
use tx::Tx;

/// Number of cooperative timers [`Nwk`] itself registers: ack-wait and
/// duplicate-rejection ageing. Routing doesn't need a third of its own —
/// its score decay rides the frame-sent/duplicate-reject hooks, not a clock.
const OWN_TIMER_COUNT: usize = 2;

/// Fixed routing-table size. Not a const generic on [`Nwk`] — one more
/// generic parameter for a feature that's frequently compiled out isn't
/// worth the signature noise; a deployment that needs a bigger table can
/// drive [`Routing`] directly instead of through [`Nwk`].
#[cfg(feature = "routing")]
const ROUTE_TABLE_SIZE: usize = 8;

/// The assembled network layer (`nwkIb` plus every pipeline it drives,
/// spec.md §3/§9). One instance per radio; nothing here is a true global, so
/// more than one can coexist in the same process — handy for the
/// in-process integration tests under `tests/`.
///
/// Const generics size every fixed-capacity table up front:
/// - `N_BUF`: frame pool slots.
/// - `N_EP`: endpoint table slots (including the reserved service slot 0).
/// - `N_DUP`: duplicate-rejection table slots.
/// - `N_REQ`: outstanding application `DataReq` slots.
pub struct Nwk<'ep, const N_BUF: usize, const N_EP: usize, const N_DUP: usize, const N_REQ: usize> {
    ib: Ib,
    pool: FramePool<N_BUF>,
    timers: TimerService<OWN_TIMER_COUNT>,
    ack_wait_timer: TimerId,
    dup_timer: TimerId,
    dup: DupRejectionTable<N_DUP>,
    security: Security,
    tx: Tx,
    rx: Rx,
    data_req: DataReqQueue<N_REQ>,
    endpoints: EndpointTable<'ep, N_EP>,
    #[cfg(feature = "routing")]
    routing: Routing<ROUTE_TABLE_SIZE>,
    phy_mailbox: PhyMailbox<N_BUF>,
    aes_mailbox: AesMailbox,
}

impl<'ep, const N_BUF: usize, const N_EP: usize, const N_DUP: usize, const N_REQ: usize>
    Nwk<'ep, N_BUF, N_EP, N_DUP, N_REQ>
{
    /// `NWK_Init`.
    pub fn new(config: Config, phy: &mut impl Phy) -> Self {
        let mut timers: TimerService<OWN_TIMER_COUNT> = TimerService::new();
        let ack_wait_timer = timers.register(config::ACK_WAIT_TIMER_INTERVAL_MS, TimerMode::Interval);
        let dup_timer = timers.register(config::DUPLICATE_REJECTION_TIMER_INTERVAL_MS, TimerMode::Interval);

        phy.init();
        phy.set_pan_id(config.pan_id);
        phy.set_short_addr(config.addr);
        phy.set_rx_state(true);

        Self {
            ib: Ib::from_config(&config),
            pool: FramePool::new(),
            timers,
            ack_wait_timer,
            dup_timer,
            dup: DupRejectionTable::new(),
            security: Security::new(),
            tx: Tx::new(),
            rx: Rx::new(),
            data_req: DataReqQueue::new(),
            endpoints: EndpointTable::new(),
            #[cfg(feature = "routing")]
            routing: Routing::new(),
            phy_mailbox: PhyMailbox::new(),
            aes_mailbox: AesMailbox::new(),
        }
    }

    /// `NWK_Busy`: the disjunction of every pipeline's busy flag (spec.md §4.1).
    pub fn busy(&self) -> bool {
        self.tx.busy() || self.rx.busy() || self.data_req.busy()
    }

    /// `NWK_SleepReq`.
    pub fn sleep_req(&mut self, phy: &mut impl Phy) {
        phy.sleep();
    }

    /// `NWK_WakeupReq`.
    pub fn wakeup_req(&mut self, phy: &mut impl Phy) {
        phy.wakeup();
    }

    /// `NWK_OpenEndpoint`.
    pub fn open_endpoint(&mut self, id: u8, handler: &'ep mut dyn EndpointHandler) -> Result<(), OpenEndpointError> {
        self.endpoints.open(id, handler)
    }

    /// `NWK_DataReq`.
    #[allow(clippy::too_many_arguments)]
    pub fn data_req(
        &mut self,
        dst_addr: u16,
        dst_endpoint: u8,
        src_endpoint: u8,
        options: u8,
        data: &[u8],
        confirm: fn(&DataReqResult),
    ) {
        #[cfg(feature = "routing")]
        let next_hop = |dst: u16| self.routing.next_hop(dst);
        #[cfg(not(feature = "routing"))]
        let next_hop = |dst: u16| dst;

        self.data_req.submit(
            &mut self.pool,
            &mut self.ib,
            &mut self.tx,
            dst_addr,
            dst_endpoint,
            src_endpoint,
            options,
            data,
            confirm,
            next_hop,
        );
    }

    /// ISR-context entry point: a frame has arrived. Copies the bytes out of
    /// the PHY driver's buffer and pushes a `PhyEvent::DataInd` into the
    /// mailbox (spec.md §9's ISR-to-mailbox redesign) — the frame is not
    /// allocated in the pool until [`Nwk::task_handler`] drains it.
    pub fn on_phy_data_ind(&mut self, ind: PhyDataInd) {
        let mut raw = DataIndRaw {
            data: [0u8; frame::MAX_FRAME_SIZE],
            len: ind.data.len().min(frame::MAX_FRAME_SIZE),
            lqi: ind.lqi,
            rssi: ind.rssi,
        };
        raw.data[..raw.len].copy_from_slice(&ind.data[..raw.len]);
        self.phy_mailbox.push(PhyEvent::DataInd(raw));
    }

    /// ISR-context entry point: the in-flight transmission completed.
    pub fn on_phy_data_conf(&mut self, status: PhyStatus) {
        self.phy_mailbox.push(PhyEvent::DataConf(status));
    }

    /// ISR-context entry point: the AES oracle finished the outstanding request.
    pub fn on_encrypt_conf(&mut self) {
        self.aes_mailbox.push(AesEvent::EncryptConf);
    }

    /// Drives completion for oracles with no interrupt of their own (e.g.
    /// [`crate::aes_oracle::SyncAesOracle`]): the request finishes inline
    /// inside [`Nwk::task_handler`], so nothing ever calls
    /// [`Nwk::on_encrypt_conf`] from ISR context. Call this once after each
    /// `task_handler` pass when using such an oracle; a no-op otherwise.
    pub fn poll_aes(&mut self) {
        if self.security.is_waiting(&self.pool) {
            self.on_encrypt_conf();
        }
    }

    /// The millisecond timer tick. Only flags timer expiry — handlers still
    /// run from [`Nwk::task_handler`], never from this call (spec.md §4.2, §5).
    pub fn on_tick(&mut self, elapsed_ms: u32) {
        self.timers.on_tick(elapsed_ms);
    }

    /// `NWK_TaskHandler`: drains both event mailboxes, runs any due timers,
    /// then runs every pipeline once in the fixed order security → tx → rx
    /// (spec.md §4.1). `dataReq` and `routing` have no task of their own
    /// left to run in this pass: both of their per-frame touchpoints
    /// (`DataReqQueue::on_tx_confirm`, `Routing::on_frame_sent`, routing's RX
    /// ingress/dup-reject/route-error hooks) are reached as side effects of
    /// the `tx` and `rx` steps, so the fixed order is preserved without a
    /// separate call for either.
    pub fn task_handler(&mut self, phy: &mut impl Phy, oracle: &mut impl EncryptOracle) {
        while let Some(event) = self.phy_mailbox.pop() {
            match event {
                PhyEvent::DataInd(raw) => self.rx.on_phy_data_ind(&mut self.pool, &raw),
                PhyEvent::DataConf(status) => self.tx.on_phy_data_conf(&mut self.pool, status),
            }
        }
        while let Some(AesEvent::EncryptConf) = self.aes_mailbox.pop() {
            self.security.on_encrypt_conf(&mut self.pool);
        }

        let mut ack_wait_due = false;
        let mut dup_age_due = false;
        self.timers.run_expired(|id| {
            if id == self.ack_wait_timer {
                ack_wait_due = true;
            } else if id == self.dup_timer {
                dup_age_due = true;
            }
        });
        if ack_wait_due {
            self.tx.ack_wait_tick(&mut self.pool);
        }
        if dup_age_due {
            self.dup.age();
        }

        if let Some(confirm) = self.security.task_handler(&mut self.pool, oracle, &self.ib.key) {
            match confirm {
                security::SecurityConfirm::Encrypted(idx) => {
                    self.pool.get_mut(idx).state = frame::FrameState::Tx(frame::TxState::Send);
                }
                security::SecurityConfirm::Decrypted(idx, mic_ok) => {
                    self.pool.get_mut(idx).state = frame::FrameState::Rx(if mic_ok {
                        frame::RxState::Indicate
                    } else {
                        frame::RxState::Finish
                    });
                }
            }
        }

        let own_addr = self.ib.addr;
        #[cfg(feature = "routing")]
        let mut route_errors: heapless::Vec<routing::RouteError, N_BUF> = heapless::Vec::new();

        {
            let pool = &mut self.pool;
            let ib = &mut self.ib;
            let data_req = &mut self.data_req;
            #[cfg(feature = "routing")]
            let routing = &mut self.routing;
            #[cfg(feature = "routing")]
            let route_errors = &mut route_errors;

            self.tx.task_handler(
                pool,
                ib,
                phy,
                &mut self.timers,
                self.ack_wait_timer,
                |idx, header, data_req_owned, status, _control| {
                    if data_req_owned {
                        data_req.on_tx_confirm(idx, status);
                    }
                    #[cfg(feature = "routing")]
                    if let Some(event) = routing.on_frame_sent(own_addr, header.nwk_src_addr, header.nwk_dst_addr, status) {
                        let _ = route_errors.push(event);
                    }
                },
            );
        }

        #[cfg(feature = "routing")]
        for event in route_errors.iter() {
            routing::Routing::<ROUTE_TABLE_SIZE>::send_route_error(
                &mut self.pool,
                &mut self.ib,
                &mut self.tx,
                event.mac_next_hop,
                event.dst_addr,
                event.unreachable,
            );
        }

        #[cfg(feature = "routing")]
        let mut routing_port: Option<&mut dyn rx::RoutingPort> = Some(&mut self.routing);
        #[cfg(not(feature = "routing"))]
        let mut routing_port: Option<&mut dyn rx::RoutingPort> = None;

        self.rx.task_handler(
            &mut self.pool,
            &mut self.ib,
            &mut self.dup,
            &mut self.endpoints,
            &mut self.tx,
            routing_port.take(),
            cfg!(feature = "routing"),
        );
    }
}
