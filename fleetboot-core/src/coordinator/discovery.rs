//! Master discovery for followers
//!
//! Election and discovery start concurrently across the fleet, so a loser
//! may read before the winner's write lands. Reads are retried on a bounded,
//! increasing backoff schedule.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::metrics::standard;
use crate::store::ElectionStore;

/// Ordered delays slept before each discovery attempt
///
/// The delay at index k is slept before attempt k+1, so the schedule's
/// length is the attempt count. The default schedule starts at zero, which
/// makes the first read immediate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// `attempts` delays growing by `step`: 0, step, 2*step, ...
    pub fn linear(step: Duration, attempts: u32) -> Self {
        Self {
            delays: (0..attempts).map(|k| step * k).collect(),
        }
    }

    /// Explicit delays
    pub fn from_delays(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Number of attempts this schedule allows
    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    /// Sum of all delays; the worst-case wait before giving up
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Delays in attempt order
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::linear(
            Duration::from_secs(crate::DEFAULT_DISCOVERY_STEP_SECS),
            crate::DEFAULT_DISCOVERY_ATTEMPTS,
        )
    }
}

/// Configuration for the discovery client
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Delays before each read attempt
    pub schedule: BackoffSchedule,
}

/// Outcome of a discovery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// A record was found
    Resolved { master_address: String, attempts: usize },
    /// Every attempt found no record or failed to read
    Exhausted { attempts: usize },
}

impl Discovery {
    /// Master address, if resolved
    pub fn master_address(&self) -> Option<&str> {
        match self {
            Discovery::Resolved { master_address, .. } => Some(master_address),
            Discovery::Exhausted { .. } => None,
        }
    }

    /// Attempts performed
    pub fn attempts(&self) -> usize {
        match self {
            Discovery::Resolved { attempts, .. } | Discovery::Exhausted { attempts } => *attempts,
        }
    }
}

/// Locates the elected master's address
pub struct DiscoveryClient {
    store: Arc<dyn ElectionStore>,
    config: DiscoveryConfig,
}

impl DiscoveryClient {
    /// Create a discovery client over the given store
    pub fn new(store: Arc<dyn ElectionStore>, config: DiscoveryConfig) -> Self {
        Self { store, config }
    }

    /// Read the master address for `environment_key`, retrying per schedule
    ///
    /// Read errors count as failed attempts. Bumping the record's read count
    /// is best-effort and never changes the result.
    pub async fn discover_master(&self, environment_key: &str) -> Discovery {
        let total = self.config.schedule.attempts();

        for (index, delay) in self.config.schedule.delays().iter().enumerate() {
            let attempt = index + 1;
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }

            standard::DISCOVERY_ATTEMPTS.inc();
            debug!(key = %environment_key, "read attempt {}/{}", attempt, total);

            match self.store.get(environment_key).await {
                Ok(Some(record)) => {
                    if let Err(e) = self.store.increment_read_count(environment_key).await {
                        standard::READ_COUNT_FAILURES.inc();
                        warn!(key = %environment_key, "failed to bump read count: {}", e);
                    }

                    standard::DISCOVERIES_RESOLVED.inc();
                    info!(
                        key = %environment_key,
                        master = %record.master_address,
                        generation = %record.deployment_generation,
                        attempt,
                        "discovered master"
                    );
                    return Discovery::Resolved {
                        master_address: record.master_address,
                        attempts: attempt,
                    };
                }
                Ok(None) => {
                    debug!(key = %environment_key, "no master record yet");
                }
                Err(e) => {
                    warn!(key = %environment_key, "read attempt {}/{} failed: {}", attempt, total, e);
                }
            }
        }

        standard::DISCOVERIES_EXHAUSTED.inc();
        warn!(key = %environment_key, attempts = total, "master not found");
        Discovery::Exhausted { attempts: total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ElectionRecord, Generation, MemoryStore};

    #[test]
    fn test_default_schedule() {
        let schedule = BackoffSchedule::default();
        let secs: Vec<u64> = schedule.delays().iter().map(Duration::as_secs).collect();

        assert_eq!(secs, vec![0, 3, 6, 9, 12]);
        assert_eq!(schedule.total_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_empty_schedule_has_no_attempts() {
        let schedule = BackoffSchedule::linear(Duration::from_secs(1), 0);
        assert_eq!(schedule.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_record_resolves_immediately() {
        let store = MemoryStore::new();
        let record = ElectionRecord::claim("env", "10.0.0.9", Generation::from(3), "i-9");
        store.put_if_superseded(&record).await.unwrap();

        let client = DiscoveryClient::new(Arc::new(store.clone()), DiscoveryConfig::default());
        let started = tokio::time::Instant::now();
        let discovery = client.discover_master("env").await;

        assert_eq!(discovery.master_address(), Some("10.0.0.9"));
        assert_eq!(discovery.attempts(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(store.record("env").unwrap().read_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_schedule_is_exhausted() {
        let client = DiscoveryClient::new(
            Arc::new(MemoryStore::new()),
            DiscoveryConfig {
                schedule: BackoffSchedule::from_delays(Vec::new()),
            },
        );

        assert_eq!(client.discover_master("env").await, Discovery::Exhausted { attempts: 0 });
    }
}
