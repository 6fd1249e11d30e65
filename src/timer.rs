//! The cooperative timer service (spec.md §4.2): a millisecond-tick-driven
//! list of interval and one-shot timers, sized by const generic `N` (the
//! original statically allocates exactly the two it needs — ack-wait and
//! duplicate-rejection ageing — this crate allows routing to register a
//! third).
//!
//! The tick path (`on_tick`) only flags expiry; handlers run from
//! `run_expired`, called by [`crate::Nwk::task_handler`], never from
//! interrupt context (spec.md §4.2, §5).

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Restarts itself once its handler runs from task context.
    Interval,
    /// Fires once and then goes idle until explicitly started again.
    OneShot,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    in_use: bool,
    interval_ms: u32,
    mode: TimerMode,
    remaining_ms: u32,
    expired: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            in_use: false,
            interval_ms: 0,
            mode: TimerMode::OneShot,
            remaining_ms: 0,
            expired: false,
        }
    }
}

/// A handle into a [`TimerService`]'s fixed-capacity slot array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(usize);

/// Fixed-capacity cooperative timer list, `N` slots.
pub struct TimerService<const N: usize> {
    slots: [Slot; N],
}

impl<const N: usize> Default for TimerService<N> {
    fn default() -> Self {
        Self {
            slots: [Slot::default(); N],
        }
    }
}

impl<const N: usize> TimerService<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a timer, inactive until [`TimerService::start`] is called.
    pub fn register(&mut self, interval_ms: u32, mode: TimerMode) -> TimerId {
        let idx = self
            .slots
            .iter()
            .position(|s| !s.in_use)
            .expect("timer service exhausted");
        self.slots[idx] = Slot {
            in_use: true,
            interval_ms,
            mode,
            remaining_ms: interval_ms,
            expired: false,
        };
        TimerId(idx)
    }

    /// (Re)starts a timer counting down from its configured interval.
    pub fn start(&mut self, id: TimerId) {
        let slot = &mut self.slots[id.0];
        slot.remaining_ms = slot.interval_ms;
        slot.expired = false;
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.slots[id.0].remaining_ms > 0 && !self.slots[id.0].expired
    }

    /// Advance all running timers by `elapsed_ms`. Called from the
    /// millisecond-tick interrupt context; only flags expiry, never invokes
    /// a handler (spec.md §4.2: "never from the tick ISR").
    pub fn on_tick(&mut self, elapsed_ms: u32) {
        for slot in self.slots.iter_mut() {
            if !slot.in_use || slot.expired || slot.remaining_ms == 0 {
                continue;
            }
            if elapsed_ms >= slot.remaining_ms {
                slot.remaining_ms = 0;
                slot.expired = true;
            } else {
                slot.remaining_ms -= elapsed_ms;
            }
        }
    }

    /// Runs `f` for every timer that expired since the last call, in
    /// insertion (slot) order (spec.md §4.2's ordering guarantee), restarting
    /// `Interval` timers automatically.
    pub fn run_expired(&mut self, mut f: impl FnMut(TimerId)) {
        for idx in 0..N {
            if self.slots[idx].in_use && self.slots[idx].expired {
                self.slots[idx].expired = false;
                if self.slots[idx].mode == TimerMode::Interval {
                    let interval = self.slots[idx].interval_ms;
                    self.slots[idx].remaining_ms = interval;
                }
                f(TimerId(idx));
            }
        }
    }
}
