//! Shared election store
//!
//! The store is the only coordination primitive: a single table keyed by
//! environment, offering a conditional put, a get, and an atomic increment.
//! Implementations carry no election logic of their own.

pub mod dynamo;
pub mod memory;
pub mod sigv4;

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use dynamo::{DynamoConfig, DynamoStore};
pub use memory::MemoryStore;
pub use sigv4::Credentials;

/// Deployment generation identifier
///
/// Numeric identifiers compare numerically and labels compare
/// lexicographically. The two kinds are not comparable with each other, so
/// `partial_cmp` returns `None` across kinds and a claim never supersedes a
/// record of the other kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Generation {
    /// Integer deployment id
    Number(u64),
    /// Free-form deployment label
    Label(String),
}

impl Generation {
    /// Parse a raw identifier, preferring the numeric form
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<u64>() {
            Ok(n) => Generation::Number(n),
            Err(_) => Generation::Label(raw.to_string()),
        }
    }

    /// True if a claim for `self` may overwrite a record holding `stored`
    pub fn supersedes(&self, stored: &Generation) -> bool {
        matches!(self.partial_cmp(stored), Some(Ordering::Greater))
    }
}

impl PartialOrd for Generation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Generation::Number(a), Generation::Number(b)) => Some(a.cmp(b)),
            (Generation::Label(a), Generation::Label(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Number(n) => write!(f, "{}", n),
            Generation::Label(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Generation {
    fn from(n: u64) -> Self {
        Generation::Number(n)
    }
}

impl From<&str> for Generation {
    fn from(raw: &str) -> Self {
        Generation::parse(raw)
    }
}

/// The single election record kept per environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionRecord {
    /// Cluster identifier (primary key)
    pub environment_key: String,
    /// Address followers should route to
    pub master_address: String,
    /// Generation that produced this record
    pub deployment_generation: Generation,
    /// Time of the last successful claim; `None` when the stored value is
    /// missing or unreadable
    pub last_changed_at: Option<DateTime<Utc>>,
    /// Successful follower discoveries; telemetry only
    pub read_count: u64,
    /// Instance that won the claim; empty when the store has none
    pub claimant_instance_id: String,
}

impl ElectionRecord {
    /// Build the record a claim attempt will try to write
    pub fn claim(
        environment_key: impl Into<String>,
        master_address: impl Into<String>,
        deployment_generation: Generation,
        claimant_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            environment_key: environment_key.into(),
            master_address: master_address.into(),
            deployment_generation,
            last_changed_at: Some(Utc::now()),
            read_count: 0,
            claimant_instance_id: claimant_instance_id.into(),
        }
    }
}

/// Result of a conditional put that reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Predicate held and the record was written
    Claimed,
    /// Predicate failed; a same-or-newer generation already holds the record
    Conflict,
}

/// Store primitives needed by the election protocol
///
/// Every failure other than a predicate rejection is reported as
/// `FleetError::StoreUnavailable`.
#[async_trait]
pub trait ElectionStore: Send + Sync {
    /// Write `record` iff no record exists for its key or the stored
    /// generation is strictly older
    async fn put_if_superseded(&self, record: &ElectionRecord) -> Result<ClaimOutcome>;

    /// Read the current record for `environment_key`
    async fn get(&self, environment_key: &str) -> Result<Option<ElectionRecord>>;

    /// Atomically add one to the record's read count
    async fn increment_read_count(&self, environment_key: &str) -> Result<()>;
}
