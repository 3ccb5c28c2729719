//! Bootstrap binary: elect, discover, plan, render

use std::process::ExitCode;
use std::sync::Arc;

use fleetboot_core::config::{BootstrapConfig, MetadataSource, StoreBackend};
use fleetboot_core::coordinator::{BootstrapReport, Bootstrapper};
use fleetboot_core::host::{self, ImdsClient, InstanceIdentity, InstanceMetadata, StaticMetadata};
use fleetboot_core::store::{DynamoConfig, DynamoStore, ElectionStore, MemoryStore};
use fleetboot_core::{metrics, render, FleetError, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting fleetboot");

    let config = match BootstrapConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    let outcome = bootstrap(&config).await;

    if let Some(path) = &config.metrics_file {
        if let Err(e) = tokio::fs::write(path, metrics::gather_bootstrap_metrics()).await {
            warn!("Failed to write metrics to {}: {}", path.display(), e);
        }
    }

    match outcome {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to encode report: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) if e.is_retryable() => {
            warn!("Bootstrap failed, safe to retry: {}", e);
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            error!("Bootstrap failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn bootstrap(config: &BootstrapConfig) -> Result<BootstrapReport> {
    let imds = ImdsClient::new(config.imds.clone())?;

    let identity = match &config.metadata {
        MetadataSource::Imds => imds.identity().await?,
        MetadataSource::Static { address, instance_id } => {
            StaticMetadata::new(address.clone(), instance_id.clone(), config.region.clone())
                .identity()
                .await?
        }
    };

    let generation = match &config.generation {
        Some(generation) => generation.clone(),
        None => host::load_generation(&config.manifest_path).await?,
    };

    let cores = host::probe_cores().await;
    let store = open_store(config, &identity, &imds).await?;

    let bootstrapper = Bootstrapper::new(store, config.environment_key.clone(), config.discovery.clone());
    let report = bootstrapper.run(&identity, &generation, cores).await?;

    let summary = render::apply(&config.render, &report).await?;
    info!(
        role = ?report.role,
        master = ?report.master.follower_target(),
        proxy_upstreams = summary.proxy_upstreams_rewritten,
        exported = summary.exported,
        "Bootstrap complete"
    );

    Ok(report)
}

async fn open_store(
    config: &BootstrapConfig,
    identity: &InstanceIdentity,
    imds: &ImdsClient,
) -> Result<Arc<dyn ElectionStore>> {
    match config.store {
        StoreBackend::Memory => {
            warn!("Using in-memory store; only this process takes part in the election");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::DynamoDb => {
            let region = config
                .region
                .clone()
                .or_else(|| identity.region.clone())
                .ok_or_else(|| FleetError::InvalidConfig {
                    reason: "AWS_REGION is required when instance metadata has no region".into(),
                })?;

            let credentials = match &config.credentials {
                Some(credentials) => credentials.clone(),
                None => imds.role_credentials().await?,
            };

            info!("Using DynamoDB table {} in {}", config.table, region);
            let store = DynamoStore::new(DynamoConfig {
                table: config.table.clone(),
                region,
                endpoint: config.dynamodb_endpoint.clone(),
                credentials,
                connect_timeout: config.store_connect_timeout,
                request_timeout: config.store_request_timeout,
            })?;
            Ok(Arc::new(store))
        }
    }
}
