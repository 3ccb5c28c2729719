//! Available core count

use tracing::debug;

const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Count of `processor` entries in cpuinfo text
pub fn count_processors(cpuinfo: &str) -> usize {
    cpuinfo
        .lines()
        .filter(|line| {
            line.strip_prefix("processor")
                .map(|rest| rest.trim_start().starts_with(':'))
                .unwrap_or(false)
        })
        .count()
}

/// Cores available to this instance, never less than one
///
/// Reads `/proc/cpuinfo` and falls back to the runtime's view of the CPU
/// count when that file is missing or lists nothing.
pub async fn probe_cores() -> u32 {
    let counted = match tokio::fs::read_to_string(CPUINFO_PATH).await {
        Ok(text) => count_processors(&text),
        Err(e) => {
            debug!("cannot read {}: {}", CPUINFO_PATH, e);
            0
        }
    };

    let cores = if counted > 0 { counted } else { num_cpus::get() };
    u32::try_from(cores).unwrap_or(u32::MAX).max(1)
}
