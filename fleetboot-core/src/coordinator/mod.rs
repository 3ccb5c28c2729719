//! Election and discovery protocol
//!
//! Claims the master role for a generation, discovers the master on loss,
//! and plans local process counts from the outcome.

pub mod bootstrap;
pub mod discovery;
pub mod election;
pub mod topology;

pub use bootstrap::{BootstrapPhase, BootstrapReport, Bootstrapper, MasterResolution, Role};
pub use discovery::{BackoffSchedule, Discovery, DiscoveryClient, DiscoveryConfig};
pub use election::ElectionCoordinator;
pub use topology::{plan, TopologyPlan};
