//! Process topology planning
//!
//! Decides how many master-role and follower-role processes this instance
//! runs. The master instance also runs followers on its spare cores.

use serde::Serialize;

/// Default process name for the master role
pub const DEFAULT_MASTER_PROCESS: &str = "locust-master";

/// Default process name for the follower role
pub const DEFAULT_FOLLOWER_PROCESS: &str = "locust-follower";

/// Local process counts for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopologyPlan {
    pub master_processes: u32,
    pub follower_processes: u32,
}

impl TopologyPlan {
    /// Total processes on this instance
    pub fn total(&self) -> u32 {
        self.master_processes + self.follower_processes
    }

    /// Process-manager concurrency declaration
    pub fn concurrency_line(&self, master_name: &str, follower_name: &str) -> String {
        format!(
            "concurrency: {}={},{}={}",
            master_name, self.master_processes, follower_name, self.follower_processes
        )
    }
}

/// Plan process counts from the election outcome and core count
pub fn plan(is_master: bool, available_cores: u32) -> TopologyPlan {
    if is_master {
        TopologyPlan {
            master_processes: 1,
            follower_processes: available_cores.saturating_sub(1),
        }
    } else {
        TopologyPlan {
            master_processes: 0,
            follower_processes: available_cores,
        }
    }
}
