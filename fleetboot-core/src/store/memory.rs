//! In-process election store
//!
//! Linearizable by construction: each primitive runs under one mutex
//! acquisition. Clones share the same table, so several bootstrappers in one
//! process see a single store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{ClaimOutcome, ElectionRecord, ElectionStore};
use crate::error::{FleetError, Result};

/// Shared in-memory election table
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, ElectionRecord>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for `environment_key`
    pub fn record(&self, environment_key: &str) -> Option<ElectionRecord> {
        self.records.lock().get(environment_key).cloned()
    }

    /// Number of environments with a record
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True if no environment has a record
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ElectionStore for MemoryStore {
    async fn put_if_superseded(&self, record: &ElectionRecord) -> Result<ClaimOutcome> {
        let mut records = self.records.lock();

        if let Some(stored) = records.get(&record.environment_key) {
            if !record.deployment_generation.supersedes(&stored.deployment_generation) {
                debug!(
                    key = %record.environment_key,
                    stored = %stored.deployment_generation,
                    attempted = %record.deployment_generation,
                    "conditional put rejected"
                );
                return Ok(ClaimOutcome::Conflict);
            }
        }

        records.insert(record.environment_key.clone(), record.clone());
        Ok(ClaimOutcome::Claimed)
    }

    async fn get(&self, environment_key: &str) -> Result<Option<ElectionRecord>> {
        Ok(self.record(environment_key))
    }

    async fn increment_read_count(&self, environment_key: &str) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(environment_key)
            .ok_or_else(|| FleetError::store("increment", format!("no record for {}", environment_key)))?;
        record.read_count += 1;
        Ok(())
    }
}
