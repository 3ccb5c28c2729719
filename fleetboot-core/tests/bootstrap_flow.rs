//! End-to-end bootstrap: election, discovery, planning and rendered outputs

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::FlakyStore;
use fleetboot_core::coordinator::{
    BootstrapPhase, Bootstrapper, DiscoveryConfig, MasterResolution, Role, TopologyPlan,
};
use fleetboot_core::error::FleetError;
use fleetboot_core::host::{InstanceIdentity, InstanceMetadata, StaticMetadata};
use fleetboot_core::render::{self, RenderConfig};
use fleetboot_core::store::{ElectionRecord, ElectionStore, Generation, MemoryStore};

async fn identity(address: &str, id: &str) -> InstanceIdentity {
    StaticMetadata::new(address, Some(id.to_string()), None)
        .identity()
        .await
        .unwrap()
}

#[tokio::test]
async fn claim_failure_aborts_in_electing() {
    let store = Arc::new(FlakyStore::default());
    store.fail_claims.store(true, Ordering::SeqCst);
    let bootstrapper = Bootstrapper::new(store.clone(), "env", DiscoveryConfig::default());

    let err = bootstrapper
        .run(&identity("10.0.0.1", "i-1").await, &Generation::from(1), 4)
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::StoreUnavailable { .. }));
    assert_eq!(bootstrapper.phase().await, BootstrapPhase::Electing);
    assert!(!bootstrapper.phase().await.is_terminal());
    assert_eq!(store.reads(), 0);
}

/// Reads keep failing, so the loser never learns the master
#[tokio::test(start_paused = true)]
async fn loser_without_record_plans_unresolved() {
    let memory = MemoryStore::new();
    // a newer generation already holds the record
    let newer = ElectionRecord::claim("env", "10.0.0.9", Generation::from(9), "i-9");
    memory.put_if_superseded(&newer).await.unwrap();

    let store = Arc::new(FlakyStore::new(memory));
    store.failing_reads.store(usize::MAX, Ordering::SeqCst);
    let bootstrapper = Bootstrapper::new(store.clone(), "env", DiscoveryConfig::default());

    let report = bootstrapper
        .run(&identity("10.0.0.2", "i-2").await, &Generation::from(3), 6)
        .await
        .unwrap();

    assert_eq!(report.role, Role::Follower);
    assert_eq!(report.master, MasterResolution::Unresolved);
    assert_eq!(report.phase, BootstrapPhase::FollowerUnresolved);
    assert_eq!(report.plan, TopologyPlan { master_processes: 0, follower_processes: 6 });
    assert_eq!(store.reads(), 5);
}

#[tokio::test]
async fn single_core_master_runs_no_followers() {
    let store = Arc::new(MemoryStore::new());
    let report = Bootstrapper::new(store, "env", DiscoveryConfig::default())
        .run(&identity("10.0.0.1", "i-1").await, &Generation::from(1), 1)
        .await
        .unwrap();

    assert_eq!(report.plan, TopologyPlan { master_processes: 1, follower_processes: 0 });
    assert_eq!(report.plan.total(), 1);
}

#[tokio::test]
async fn new_generation_moves_the_master() {
    let store = Arc::new(MemoryStore::new());
    let a = identity("10.0.0.1", "i-a").await;
    let b = identity("10.0.0.2", "i-b").await;

    let first = Bootstrapper::new(store.clone(), "env", DiscoveryConfig::default())
        .run(&a, &Generation::from(1), 2)
        .await
        .unwrap();
    assert_eq!(first.role, Role::Master);

    // b is first to bootstrap the next deployment
    let second = Bootstrapper::new(store.clone(), "env", DiscoveryConfig::default())
        .run(&b, &Generation::from(2), 2)
        .await
        .unwrap();
    let third = Bootstrapper::new(store.clone(), "env", DiscoveryConfig::default())
        .run(&a, &Generation::from(2), 2)
        .await
        .unwrap();

    assert_eq!(second.role, Role::Master);
    assert_eq!(third.role, Role::Follower);
    assert_eq!(third.master, MasterResolution::Remote("10.0.0.2".into()));
}

const PROXY_CONF: &str = "server {
    listen 80;
    location / {
        proxy_pass http://127.0.0.1:8089;
    }
    location /stats {
        proxy_pass http://127.0.0.1:8089/stats;
    }
}
";

#[tokio::test]
async fn follower_outputs_are_rendered() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = dir.path().join("nginx.conf");
    tokio::fs::write(&proxy, PROXY_CONF).await.unwrap();

    let store = Arc::new(MemoryStore::new());
    Bootstrapper::new(store.clone(), "env", DiscoveryConfig::default())
        .run(&identity("10.0.0.1", "i-1").await, &Generation::from(1), 4)
        .await
        .unwrap();
    let report = Bootstrapper::new(store, "env", DiscoveryConfig::default())
        .run(&identity("10.0.0.2", "i-2").await, &Generation::from(1), 4)
        .await
        .unwrap();

    let config = RenderConfig {
        output_dir: dir.path().to_path_buf(),
        proxy_config: Some(proxy.clone()),
        export_command: Some(format!("touch {}", dir.path().join("exported").display())),
        ..Default::default()
    };
    let summary = render::apply(&config, &report).await.unwrap();

    assert_eq!(summary.proxy_upstreams_rewritten, 2);
    assert!(summary.exported);
    assert!(dir.path().join("exported").exists());

    let master_ip = tokio::fs::read_to_string(dir.path().join(".masterIP")).await.unwrap();
    assert_eq!(master_ip, "10.0.0.1");

    let foreman = tokio::fs::read_to_string(dir.path().join(".foreman")).await.unwrap();
    assert_eq!(foreman, "concurrency: locust-master=0,locust-follower=4");

    let conf = tokio::fs::read_to_string(&proxy).await.unwrap();
    assert!(conf.contains("proxy_pass http://10.0.0.1:8089;"));
    assert!(conf.contains("proxy_pass http://10.0.0.1:8089/stats;"));
    assert!(!conf.contains("127.0.0.1"));
}

#[tokio::test]
async fn master_outputs_point_at_loopback() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = dir.path().join("nginx.conf");
    tokio::fs::write(&proxy, PROXY_CONF).await.unwrap();

    let report = Bootstrapper::new(Arc::new(MemoryStore::new()), "env", DiscoveryConfig::default())
        .run(&identity("10.0.0.1", "i-1").await, &Generation::from(1), 4)
        .await
        .unwrap();

    let config = RenderConfig {
        output_dir: dir.path().to_path_buf(),
        proxy_config: Some(proxy.clone()),
        ..Default::default()
    };
    let summary = render::apply(&config, &report).await.unwrap();

    assert_eq!(summary.proxy_upstreams_rewritten, 0);
    assert!(!summary.exported);
    let master_ip = tokio::fs::read_to_string(dir.path().join(".masterIP")).await.unwrap();
    assert_eq!(master_ip, "127.0.0.1");
    let foreman = tokio::fs::read_to_string(dir.path().join(".foreman")).await.unwrap();
    assert_eq!(foreman, "concurrency: locust-master=1,locust-follower=3");
    assert_eq!(tokio::fs::read_to_string(&proxy).await.unwrap(), PROXY_CONF);
}

#[tokio::test(start_paused = true)]
async fn unresolved_follower_writes_only_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyStore::default());

    // someone else holds a newer generation but reads never see it
    store
        .inner
        .put_if_superseded(&ElectionRecord::claim("env", "10.0.0.9", Generation::from(5), "i-9"))
        .await
        .unwrap();
    store.failing_reads.store(usize::MAX, Ordering::SeqCst);

    let report = Bootstrapper::new(store, "env", DiscoveryConfig::default())
        .run(&identity("10.0.0.2", "i-2").await, &Generation::from(4), 2)
        .await
        .unwrap();

    let config = RenderConfig {
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let summary = render::apply(&config, &report).await.unwrap();

    assert!(summary.master_address_file.is_none());
    assert!(!dir.path().join(".masterIP").exists());
    assert!(dir.path().join(".foreman").exists());
}
