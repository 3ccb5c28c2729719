//! Bootstrap sequence
//!
//! Drives one instance through election, discovery on loss, and topology
//! planning for a single deployment generation.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::discovery::{Discovery, DiscoveryClient, DiscoveryConfig};
use super::election::ElectionCoordinator;
use super::topology::{self, TopologyPlan};
use crate::error::Result;
use crate::host::InstanceIdentity;
use crate::store::{ElectionStore, Generation};

/// Address the master's own followers use to reach it
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Role decided by the election
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Follower,
}

/// Where this instance's followers find the master
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "address", rename_all = "lowercase")]
pub enum MasterResolution {
    /// This instance is the master
    Local,
    /// Another instance is the master
    Remote(String),
    /// Discovery gave up without finding a record
    Unresolved,
}

impl MasterResolution {
    /// Address followers should connect to, if known
    pub fn follower_target(&self) -> Option<&str> {
        match self {
            MasterResolution::Local => Some(LOOPBACK_ADDRESS),
            MasterResolution::Remote(address) => Some(address),
            MasterResolution::Unresolved => None,
        }
    }
}

/// Bootstrap state per instance per generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BootstrapPhase {
    Start,
    Electing,
    Master,
    FollowerDiscovering,
    MasterPlanned,
    FollowerPlanned,
    /// Planned as follower without a master address
    FollowerUnresolved,
}

impl BootstrapPhase {
    /// True once a plan has been produced
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BootstrapPhase::MasterPlanned
                | BootstrapPhase::FollowerPlanned
                | BootstrapPhase::FollowerUnresolved
        )
    }
}

/// Everything the output collaborators need
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub environment_key: String,
    pub generation: Generation,
    pub role: Role,
    pub master: MasterResolution,
    pub plan: TopologyPlan,
    pub phase: BootstrapPhase,
}

/// Runs the bootstrap sequence for one instance
pub struct Bootstrapper {
    environment_key: String,
    election: ElectionCoordinator,
    discovery: DiscoveryClient,
    phase: RwLock<BootstrapPhase>,
}

impl Bootstrapper {
    /// Create a bootstrapper for `environment_key` over the given store
    pub fn new(
        store: Arc<dyn ElectionStore>,
        environment_key: impl Into<String>,
        discovery: DiscoveryConfig,
    ) -> Self {
        Self {
            environment_key: environment_key.into(),
            election: ElectionCoordinator::new(store.clone()),
            discovery: DiscoveryClient::new(store, discovery),
            phase: RwLock::new(BootstrapPhase::Start),
        }
    }

    /// Current phase
    pub async fn phase(&self) -> BootstrapPhase {
        *self.phase.read().await
    }

    async fn enter(&self, phase: BootstrapPhase) {
        *self.phase.write().await = phase;
    }

    /// Elect, discover if needed, and plan
    ///
    /// A store failure during the election is returned as-is and leaves the
    /// phase at `Electing`. Failing to discover the master is not an error:
    /// the report carries `MasterResolution::Unresolved`.
    pub async fn run(
        &self,
        identity: &InstanceIdentity,
        generation: &Generation,
        available_cores: u32,
    ) -> Result<BootstrapReport> {
        info!(
            key = %self.environment_key,
            generation = %generation,
            instance = %identity.instance_id,
            cores = available_cores,
            "bootstrap starting"
        );
        self.enter(BootstrapPhase::Electing).await;

        let is_master = self
            .election
            .try_claim_master(
                &self.environment_key,
                &identity.address,
                generation,
                &identity.instance_id,
            )
            .await?;

        let (role, master) = if is_master {
            self.enter(BootstrapPhase::Master).await;
            (Role::Master, MasterResolution::Local)
        } else {
            self.enter(BootstrapPhase::FollowerDiscovering).await;
            match self.discovery.discover_master(&self.environment_key).await {
                Discovery::Resolved { master_address, .. } => {
                    (Role::Follower, MasterResolution::Remote(master_address))
                }
                Discovery::Exhausted { attempts } => {
                    warn!(
                        key = %self.environment_key,
                        attempts,
                        "continuing as follower without a master address"
                    );
                    (Role::Follower, MasterResolution::Unresolved)
                }
            }
        };

        let plan = topology::plan(is_master, available_cores);
        let phase = match (&role, &master) {
            (Role::Master, _) => BootstrapPhase::MasterPlanned,
            (Role::Follower, MasterResolution::Unresolved) => BootstrapPhase::FollowerUnresolved,
            (Role::Follower, _) => BootstrapPhase::FollowerPlanned,
        };
        self.enter(phase).await;

        info!(
            key = %self.environment_key,
            role = ?role,
            masters = plan.master_processes,
            followers = plan.follower_processes,
            "bootstrap planned"
        );

        Ok(BootstrapReport {
            environment_key: self.environment_key.clone(),
            generation: generation.clone(),
            role,
            master,
            plan,
            phase,
        })
    }
}
