//! Deployment manifest
//!
//! The platform drops a JSON manifest describing the running deployment;
//! its `DeploymentId` is the generation this instance bootstraps for.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::store::Generation;

const DEPLOYMENT_ID_FIELD: &str = "DeploymentId";

/// Read the deployment generation from the manifest at `path`
pub async fn load_generation(path: impl AsRef<Path>) -> Result<Generation> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FleetError::Manifest {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;

    let generation = parse_generation(&raw)?;
    debug!(path = %path.display(), %generation, "deployment manifest loaded");
    Ok(generation)
}

/// Extract the generation from manifest JSON
pub fn parse_generation(raw: &str) -> Result<Generation> {
    let manifest: Value = serde_json::from_str(raw).map_err(|e| FleetError::Manifest {
        reason: format!("not JSON: {}", e),
    })?;

    match manifest.get(DEPLOYMENT_ID_FIELD) {
        Some(Value::Number(n)) => n.as_u64().map(Generation::Number).ok_or_else(|| FleetError::Manifest {
            reason: format!("{} {} is not a non-negative integer", DEPLOYMENT_ID_FIELD, n),
        }),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Generation::parse(s)),
        Some(other) => Err(FleetError::Manifest {
            reason: format!("{} has unsupported value {}", DEPLOYMENT_ID_FIELD, other),
        }),
        None => Err(FleetError::Manifest {
            reason: format!("missing {}", DEPLOYMENT_ID_FIELD),
        }),
    }
}
