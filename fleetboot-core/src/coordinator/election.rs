//! Master election
//!
//! One conditional write per instance per generation. The store's
//! linearizable conditional put guarantees a single winner; this module only
//! translates its outcome.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::metrics::standard;
use crate::store::{ClaimOutcome, ElectionRecord, ElectionStore, Generation};

/// Claims the master role for a deployment generation
pub struct ElectionCoordinator {
    store: Arc<dyn ElectionStore>,
}

impl ElectionCoordinator {
    /// Create a coordinator over the given store
    pub fn new(store: Arc<dyn ElectionStore>) -> Self {
        Self { store }
    }

    /// Attempt to become master of `generation`
    ///
    /// Returns `Ok(true)` if this instance's claim landed and `Ok(false)` if a
    /// claim for the same or a newer generation already holds the record.
    /// Any other store failure is returned as an error; the caller cannot
    /// assume a role in that case.
    pub async fn try_claim_master(
        &self,
        environment_key: &str,
        self_address: &str,
        generation: &Generation,
        instance_id: &str,
    ) -> Result<bool> {
        let record = ElectionRecord::claim(environment_key, self_address, generation.clone(), instance_id);

        debug!(
            key = %environment_key,
            generation = %generation,
            instance = %instance_id,
            "attempting master claim"
        );

        let started = Instant::now();
        let outcome = self.store.put_if_superseded(&record).await;
        standard::ELECTION_DURATION.observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(ClaimOutcome::Claimed) => {
                standard::CLAIMS_WON.inc();
                info!(
                    key = %environment_key,
                    generation = %generation,
                    address = %self_address,
                    "claimed master"
                );
                Ok(true)
            }
            Ok(ClaimOutcome::Conflict) => {
                standard::CLAIMS_LOST.inc();
                info!(key = %environment_key, generation = %generation, "master already claimed");
                Ok(false)
            }
            Err(e) => {
                error!(key = %environment_key, generation = %generation, "master claim failed: {}", e);
                Err(e)
            }
        }
    }
}
