//! Prometheus metrics for the bootstrap run
//!
//! Counters and a latency histogram rendered in the text exposition format,
//! suitable for a node-exporter textfile collector.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing counter
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Counter {
    /// Create a new counter
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n",
            name = self.name,
            help = self.help,
            value = self.get()
        )
    }
}

/// Latency histogram with fixed upper bounds in seconds
pub struct Histogram {
    bounds: &'static [f64],
    buckets: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
    name: &'static str,
    help: &'static str,
}

/// Store round-trip buckets, 5 ms to 10 s
pub const STORE_LATENCY_BOUNDS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

impl Histogram {
    /// Create with the given bucket bounds
    pub fn new(name: &'static str, help: &'static str, bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            buckets: bounds.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Record one observation in seconds
    pub fn observe(&self, seconds: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);

        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Observations recorded
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {name} {help}\n# TYPE {name} histogram\n",
            name = self.name,
            help = self.help
        );

        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                bucket.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", self.name, self.count()));

        let sum_secs = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum_secs));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));
        output
    }
}

/// Process-wide bootstrap metrics
pub mod standard {
    use super::*;
    use std::sync::LazyLock;

    pub static CLAIMS_WON: Counter =
        Counter::new("fleetboot_claims_won_total", "Master claims that landed");

    pub static CLAIMS_LOST: Counter =
        Counter::new("fleetboot_claims_lost_total", "Master claims rejected by the store condition");

    pub static DISCOVERY_ATTEMPTS: Counter =
        Counter::new("fleetboot_discovery_attempts_total", "Master record reads attempted");

    pub static DISCOVERIES_RESOLVED: Counter =
        Counter::new("fleetboot_discoveries_resolved_total", "Discoveries that found a master");

    pub static DISCOVERIES_EXHAUSTED: Counter =
        Counter::new("fleetboot_discoveries_exhausted_total", "Discoveries that gave up");

    pub static READ_COUNT_FAILURES: Counter = Counter::new(
        "fleetboot_read_count_failures_total",
        "Read count increments that failed after a successful discovery",
    );

    pub static ELECTION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new(
            "fleetboot_election_duration_seconds",
            "Conditional claim round-trip latency",
            STORE_LATENCY_BOUNDS,
        )
    });
}

/// Render every standard metric
pub fn gather_bootstrap_metrics() -> String {
    let counters = [
        &standard::CLAIMS_WON,
        &standard::CLAIMS_LOST,
        &standard::DISCOVERY_ATTEMPTS,
        &standard::DISCOVERIES_RESOLVED,
        &standard::DISCOVERIES_EXHAUSTED,
        &standard::READ_COUNT_FAILURES,
    ];

    let mut output: String = counters.iter().map(|c| c.to_prometheus()).collect();
    output.push_str(&standard::ELECTION_DURATION.to_prometheus());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "Test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
        assert!(counter.to_prometheus().ends_with("test_counter 2\n"));
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let histogram = Histogram::new("test_histogram", "Test histogram", &[0.01, 0.1, 1.0]);

        histogram.observe(0.005);
        histogram.observe(0.05);
        histogram.observe(5.0);

        let text = histogram.to_prometheus();
        assert!(text.contains("test_histogram_bucket{le=\"0.01\"} 1\n"));
        assert!(text.contains("test_histogram_bucket{le=\"0.1\"} 2\n"));
        assert!(text.contains("test_histogram_bucket{le=\"1\"} 2\n"));
        assert!(text.contains("test_histogram_bucket{le=\"+Inf\"} 3\n"));
        assert!(text.contains("test_histogram_count 3"));
    }

    #[test]
    fn test_gather_includes_all_metrics() {
        let text = gather_bootstrap_metrics();
        assert!(text.contains("fleetboot_claims_won_total"));
        assert!(text.contains("fleetboot_read_count_failures_total"));
        assert!(text.contains("fleetboot_election_duration_seconds_count"));
    }
}
