/// Rescan scheduler — debounces refresh requests into one pending timer.
///
/// A single change and a burst of hundreds of watcher notifications both
/// need a rescan, but the burst must not cause hundreds of enumerations.
/// The scheduler keeps at most one deadline and only ever moves it earlier:
/// a request whose deadline is at or after the pending one is a no-op.
///
/// Time is passed in explicitly so the owner decides when "now" is; the
/// timer fires when the owner polls [`take_due`](RescanScheduler::take_due)
/// at or after the deadline.
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRescan {
    pub deadline: Instant,
    /// Ask the backend to bypass its metadata cache.
    pub refresh: bool,
    /// Sequence number at scheduling time.
    pub sequence: u64,
}

#[derive(Debug, Default)]
pub struct RescanScheduler {
    pending: Option<ScheduledRescan>,
}

impl RescanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a rescan `delay` after `now`.
    ///
    /// Returns `true` if a timer was started or replaced, `false` if the
    /// pending deadline is already at least as tight or `delay` cannot be
    /// represented as an `Instant`.
    pub fn schedule(&mut self, now: Instant, delay: Duration, refresh: bool, sequence: u64) -> bool {
        let Some(deadline) = now.checked_add(delay) else {
            warn!("Rescan delay {:?} out of range, ignored", delay);
            return false;
        };
        if let Some(pending) = &self.pending {
            if pending.deadline <= deadline {
                return false;
            }
            debug!(
                "Rescan deadline advanced by {:?}",
                pending.deadline - deadline
            );
        }
        self.pending = Some(ScheduledRescan {
            deadline,
            refresh,
            sequence,
        });
        true
    }

    /// Fire the timer if its deadline has passed.
    ///
    /// A fired timer whose sequence no longer matches `current_sequence` is
    /// dropped silently and `None` is returned.
    pub fn take_due(&mut self, now: Instant, current_sequence: u64) -> Option<ScheduledRescan> {
        let pending = self.pending?;
        if pending.deadline > now {
            return None;
        }
        self.pending = None;
        if pending.sequence != current_sequence {
            debug!(
                "Dropping rescan scheduled under sequence {} (now {})",
                pending.sequence, current_sequence
            );
            return None;
        }
        Some(pending)
    }

    /// Invalidate the pending timer. Returns `true` if one was pending.
    pub fn clear(&mut self) -> bool {
        self.pending.take().is_some()
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
