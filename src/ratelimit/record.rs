//! Per-key sliding window record.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::clock::Clock;

/// The events one key has produced inside the trailing window.
///
/// Timestamps are kept oldest-first. They are only ever pushed at the back
/// with a non-decreasing clock, so expiry can stop at the first timestamp
/// that is still inside the window.
#[derive(Debug, Default)]
pub struct Record {
    timestamps: RwLock<VecDeque<Instant>>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject one event.
    ///
    /// Returns `true` if the key is over `limit` and the event was not
    /// recorded, `false` if it was admitted. The decision is taken on the
    /// current count before anything is expired, then expired events are
    /// dropped whatever the verdict. A key whose oldest event has just left
    /// the window is therefore denied on that call and admitted on the next.
    ///
    /// The clock is read while the lock is held so timestamps land in the
    /// queue in order.
    pub fn check(&self, limit: u64, window: Duration, clock: &dyn Clock) -> bool {
        let mut timestamps = self.timestamps.write();
        let now = clock.now();

        let denied = timestamps.len() as u64 >= limit;
        if !denied {
            timestamps.push_back(now);
        }
        Self::expire(&mut timestamps, window, now);
        denied
    }

    /// Drop every timestamp at least `window` older than `now`.
    ///
    /// Returns how many were dropped.
    pub fn prune(&self, window: Duration, now: Instant) -> usize {
        let mut timestamps = self.timestamps.write();
        Self::expire(&mut timestamps, window, now)
    }

    /// Number of events currently held.
    pub fn size(&self) -> usize {
        self.timestamps.read().len()
    }

    /// Whether the record holds no events.
    pub fn is_empty(&self) -> bool {
        self.timestamps.read().is_empty()
    }

    fn expire(timestamps: &mut VecDeque<Instant>, window: Duration, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            timestamps.pop_front();
            removed += 1;
        }
        removed
    }
}
