//! fleetboot core - master election and discovery for worker fleets
//!
//! Every instance of a deployment starts identical. This crate provides:
//! - A one-shot, generation-guarded master election over a shared store
//! - Follower discovery of the elected master with bounded backoff
//! - Local process topology planning from the outcome
//! - The instance and output collaborators the bootstrap binary wires up

pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod metrics;
pub mod render;
pub mod store;

pub use config::BootstrapConfig;
pub use coordinator::{BootstrapReport, Bootstrapper};
pub use error::{FleetError, Result};
pub use store::{ElectionStore, Generation};

/// Default number of discovery read attempts
pub const DEFAULT_DISCOVERY_ATTEMPTS: u32 = 5;

/// Default backoff growth between discovery attempts, in seconds
pub const DEFAULT_DISCOVERY_STEP_SECS: u64 = 3;
