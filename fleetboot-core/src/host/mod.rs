//! Local instance collaborators
//!
//! Instance identity, deployment generation and core count. None of these
//! coordinate with other instances.

pub mod cores;
pub mod manifest;
pub mod metadata;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use cores::probe_cores;
pub use manifest::load_generation;
pub use metadata::{ImdsClient, ImdsConfig, StaticMetadata};

/// Who this instance is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceIdentity {
    /// Routable address other instances use to reach this one
    pub address: String,
    /// Opaque instance identifier
    pub instance_id: String,
    /// Cloud region, when known
    pub region: Option<String>,
}

/// Source of this instance's identity
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    /// Look up address, instance id and region
    async fn identity(&self) -> Result<InstanceIdentity>;
}
