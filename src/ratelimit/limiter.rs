//! Core rate limiter implementation.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::record::Record;
use super::sweeper::Sweeper;

/// Limit and window applied to every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Maximum events allowed inside the window
    pub limit: u64,
    /// Trailing duration that counts as recent
    pub window: Duration,
}

impl Policy {
    /// Create a new policy.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// The key map and the policy, guarded together so the live key count and
/// the policy pair are never observed half-updated.
struct Registry {
    records: HashMap<String, Record>,
    policy: Policy,
}

/// State reachable from both callers and the sweeper task.
struct Shared {
    registry: RwLock<Registry>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn check(&self, key: &str) -> bool {
        {
            let registry = self.registry.read();
            if let Some(record) = registry.records.get(key) {
                return self.admit(key, record, registry.policy);
            }
        }

        // Another caller may have created the record since the read above
        let mut registry = self.registry.write();
        let policy = registry.policy;
        let record = registry.records.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "Creating new rate limit record");
            Record::new()
        });
        self.admit(key, record, policy)
    }

    fn admit(&self, key: &str, record: &Record, policy: Policy) -> bool {
        trace!(key = %key, limit = policy.limit, "Checking rate limit");

        let blocked = record.check(policy.limit, policy.window, self.clock.as_ref());
        if blocked {
            debug!(
                key = %key,
                limit = policy.limit,
                window = ?policy.window,
                "Rate limit exceeded"
            );
        }
        blocked
    }

    fn sweep(&self) -> usize {
        let idle: Vec<String> = {
            let registry = self.registry.read();
            let window = registry.policy.window;
            let now = self.clock.now();

            registry
                .records
                .iter()
                .filter_map(|(key, record)| {
                    record.prune(window, now);
                    record.is_empty().then(|| key.clone())
                })
                .collect()
        };

        if idle.is_empty() {
            return 0;
        }

        let mut registry = self.registry.write();
        let mut removed = 0;
        for key in &idle {
            // A check may have landed on the key since the scan
            let still_idle = registry
                .records
                .get(key)
                .is_some_and(|record| record.is_empty());
            if still_idle {
                registry.records.remove(key);
                removed += 1;
            }
        }

        debug!(
            removed = removed,
            remaining = registry.records.len(),
            "Swept idle rate limit records"
        );
        removed
    }
}

/// Per-key sliding window rate limiter.
///
/// This struct is thread-safe and can be shared across threads and tasks.
/// Each key keeps the exact instants of its recent events; a background
/// sweeper started with [`RateLimiter::start`] reclaims keys that went idle.
pub struct RateLimiter {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl RateLimiter {
    /// Create a new rate limiter using the system clock.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(SystemClock::new()))
    }

    /// Create a new rate limiter reading time from `clock`.
    pub fn with_clock(limit: u64, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(Registry {
                    records: HashMap::new(),
                    policy: Policy::new(limit, window),
                }),
                clock,
            }),
            sweeper: Mutex::new(None),
        }
    }

    /// Check whether `key` may proceed, recording the event if it may.
    ///
    /// Returns `true` if the key is over its limit (deny), `false` if the
    /// event was admitted.
    pub fn check(&self, key: &str) -> bool {
        self.shared.check(key)
    }

    /// Replace the limit and window for all subsequent checks.
    ///
    /// Already recorded events are kept as they are.
    pub fn set_policy(&self, limit: u64, window: Duration) {
        let mut registry = self.shared.registry.write();
        registry.policy = Policy::new(limit, window);
        info!(limit = limit, window = ?window, "Rate limit policy updated");
    }

    /// Get the current policy.
    pub fn policy(&self) -> Policy {
        self.shared.registry.read().policy
    }

    /// Forget everything recorded for `key`.
    ///
    /// Returns `true` if the key was known.
    pub fn remove(&self, key: &str) -> bool {
        let mut registry = self.shared.registry.write();
        registry.records.remove(key).is_some()
    }

    /// Get the number of live keys.
    pub fn size(&self) -> usize {
        self.shared.registry.read().records.len()
    }

    /// Get the number of in-window events recorded for `key`.
    ///
    /// Returns `None` if no record exists for the key.
    pub fn get_count(&self, key: &str) -> Option<usize> {
        let registry = self.shared.registry.read();
        registry.records.get(key).map(Record::size)
    }

    /// Clear all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.shared.registry.write().records.clear();
    }

    /// Expire old events on every key and drop keys left with none.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Start sweeping in the background once per `period`.
    ///
    /// Replaces a sweeper that is already running. Requires a tokio runtime;
    /// without one, or with a zero period, nothing is started.
    pub fn start(&self, period: Duration) {
        if period.is_zero() {
            warn!("Refusing to start sweeper with a zero period");
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime available, background sweeping disabled");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let sweeper = Sweeper::spawn(period, move || shared.sweep());

        // Dropping the previous handle tells its loop to exit
        let previous = self.sweeper.lock().replace(sweeper);
        if previous.is_some() {
            debug!("Replaced running sweeper");
        }
        info!(period = ?period, "Background sweeping started");
    }

    /// Stop background sweeping and wait for the sweeper to exit.
    ///
    /// Does nothing if no sweeper is running.
    pub async fn stop(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
            info!("Background sweeping stopped");
        }
    }

    /// Whether a background sweeper is installed.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy())
            .field("size", &self.size())
            .field("sweeper", &*self.sweeper.lock())
            .finish()
    }
}
