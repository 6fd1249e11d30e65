//! Duplicate rejection (spec.md §4.7): a bounded source/seq table with TTL
//! ageing on a 20 ms tick, grounded directly on `nwkRx.c`'s
//! `nwkRxRejectDuplicate`/`nwkRxDuplicateRejectionTimerHandler`.

use crate::config::duplicate_rejection_ttl_ticks;

#[derive(Debug, Clone, Copy)]
struct Record {
    src: u16,
    seq: u8,
    /// Ticks remaining before this slot may be reused; `0` means free.
    ttl: u16,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            src: 0,
            seq: 0,
            ttl: 0,
        }
    }
}

/// Outcome of [`DupRejectionTable::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupOutcome {
    /// Newly seen, or a strictly-newer sequence number from a known source.
    Accept,
    /// Same-or-older sequence number from a known source, or the table was
    /// full with no matching source (spec.md §9 Open Question 1: preserved
    /// as fail-closed).
    Reject,
}

/// Fixed-size table of `D` duplicate-rejection slots.
pub struct DupRejectionTable<const D: usize> {
    records: [Record; D],
}

impl<const D: usize> Default for DupRejectionTable<D> {
    fn default() -> Self {
        Self {
            records: [Record::default(); D],
        }
    }
}

impl<const D: usize> DupRejectionTable<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `nwkRxRejectDuplicate`. Returns `Accept` and records/refreshes the
    /// slot, or `Reject`.
    ///
    /// Open Question 1 (spec.md §9): when the table is full and `src`
    /// doesn't already have a slot, behaviour is to reject the new sender
    /// outright rather than evict an existing record. This is pessimistic
    /// for a legitimate newcomer, but it's what the original does, and is
    /// preserved here unchanged.
    pub fn accept(&mut self, src: u16, seq: u8) -> DupOutcome {
        let mut free: Option<usize> = None;

        for (i, rec) in self.records.iter_mut().enumerate() {
            if rec.ttl > 0 {
                if rec.src == src {
                    let diff = (seq as i8).wrapping_sub(rec.seq as i8);
                    return if diff > 0 {
                        rec.seq = seq;
                        rec.ttl = duplicate_rejection_ttl_ticks();
                        DupOutcome::Accept
                    } else {
                        DupOutcome::Reject
                    };
                }
            } else if free.is_none() {
                free = Some(i);
            }
        }

        match free {
            None => DupOutcome::Reject,
            Some(i) => {
                self.records[i] = Record {
                    src,
                    seq,
                    ttl: duplicate_rejection_ttl_ticks(),
                };
                DupOutcome::Accept
            }
        }
    }

    /// Whether any slot is currently populated (used to decide whether the
    /// 20 ms ageing timer needs to keep running).
    pub fn has_populated_slot(&self) -> bool {
        self.records.iter().any(|r| r.ttl > 0)
    }

    /// `nwkRxDuplicateRejectionTimerHandler`'s per-tick body. Returns
    /// whether any slot is still populated (the caller restarts the timer
    /// only while this is `true`, matching the original's self-reschedule).
    pub fn age(&mut self) -> bool {
        let mut any_populated = false;
        for rec in self.records.iter_mut() {
            if rec.ttl > 0 {
                rec.ttl -= 1;
                if rec.ttl > 0 {
                    any_populated = true;
                }
            }
        }
        any_populated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing_sequence_is_accepted() {
        let mut table: DupRejectionTable<4> = DupRejectionTable::new();
        assert_eq!(table.accept(1, 10), DupOutcome::Accept);
        assert_eq!(table.accept(1, 11), DupOutcome::Accept);
        assert_eq!(table.accept(1, 11), DupOutcome::Reject);
        assert_eq!(table.accept(1, 5), DupOutcome::Reject);
    }

    #[test]
    fn distinct_sources_get_distinct_slots() {
        let mut table: DupRejectionTable<4> = DupRejectionTable::new();
        assert_eq!(table.accept(1, 1), DupOutcome::Accept);
        assert_eq!(table.accept(2, 1), DupOutcome::Accept);
        assert_eq!(table.accept(1, 1), DupOutcome::Reject);
        assert_eq!(table.accept(2, 1), DupOutcome::Reject);
    }

    #[test]
    fn full_table_rejects_new_source() {
        let mut table: DupRejectionTable<2> = DupRejectionTable::new();
        assert_eq!(table.accept(1, 1), DupOutcome::Accept);
        assert_eq!(table.accept(2, 1), DupOutcome::Accept);
        assert_eq!(table.accept(3, 1), DupOutcome::Reject);
    }

    #[test]
    fn ttl_expiry_frees_the_slot_for_reuse() {
        let mut table: DupRejectionTable<1> = DupRejectionTable::new();
        assert_eq!(table.accept(1, 1), DupOutcome::Accept);
        let ttl = duplicate_rejection_ttl_ticks();
        for _ in 0..ttl - 1 {
            assert!(table.age());
        }
        assert!(!table.age());
        assert!(!table.has_populated_slot());
        assert_eq!(table.accept(2, 1), DupOutcome::Accept);
    }
}
