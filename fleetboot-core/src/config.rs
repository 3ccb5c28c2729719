//! Bootstrap configuration
//!
//! Loaded from environment variables. Platform-provided names
//! (`EB_ENV_NAME`, `MASTER_IP_TABLE`) are accepted as fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use crate::coordinator::{BackoffSchedule, DiscoveryConfig};
use crate::error::{FleetError, Result};
use crate::host::ImdsConfig;
use crate::render::RenderConfig;
use crate::store::{Credentials, Generation};

/// Which store backs the election
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb,
    /// In-process; only meaningful for a single local instance
    Memory,
}

/// Where the instance identity comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    Imds,
    Static {
        address: String,
        instance_id: Option<String>,
    },
}

/// Top-level configuration for one bootstrap run
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Cluster identifier; the election record key
    pub environment_key: String,
    /// Store backend
    pub store: StoreBackend,
    /// DynamoDB table name
    pub table: String,
    /// AWS region; taken from instance metadata when unset
    pub region: Option<String>,
    /// DynamoDB endpoint override
    pub dynamodb_endpoint: Option<String>,
    /// Static credentials; instance role credentials are used when unset
    pub credentials: Option<Credentials>,
    /// Store connect timeout
    pub store_connect_timeout: Duration,
    /// Store request timeout
    pub store_request_timeout: Duration,
    /// Deployment manifest path
    pub manifest_path: PathBuf,
    /// Generation override; skips the manifest
    pub generation: Option<Generation>,
    /// Identity source
    pub metadata: MetadataSource,
    /// Metadata service settings
    pub imds: ImdsConfig,
    /// Discovery retry settings
    pub discovery: DiscoveryConfig,
    /// Output settings
    pub render: RenderConfig,
    /// Prometheus textfile to write after the run
    pub metrics_file: Option<PathBuf>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            environment_key: String::new(),
            store: StoreBackend::DynamoDb,
            table: String::new(),
            region: None,
            dynamodb_endpoint: None,
            credentials: None,
            store_connect_timeout: Duration::from_secs(5),
            store_request_timeout: Duration::from_secs(10),
            manifest_path: PathBuf::from("/tmp/manifest"),
            generation: None,
            metadata: MetadataSource::Imds,
            imds: ImdsConfig::default(),
            discovery: DiscoveryConfig::default(),
            render: RenderConfig::default(),
            metrics_file: None,
        }
    }
}

impl BootstrapConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.environment_key = var("FLEETBOOT_ENV_KEY")
            .or_else(|| var("EB_ENV_NAME"))
            .ok_or_else(|| invalid("FLEETBOOT_ENV_KEY (or EB_ENV_NAME) is required"))?;

        config.store = match var("FLEETBOOT_STORE").as_deref() {
            None | Some("dynamodb") => StoreBackend::DynamoDb,
            Some("memory") => StoreBackend::Memory,
            Some(other) => return Err(invalid(format!("unknown FLEETBOOT_STORE {}", other))),
        };

        config.table = var("FLEETBOOT_TABLE")
            .or_else(|| var("MASTER_IP_TABLE"))
            .unwrap_or_default();
        if config.store == StoreBackend::DynamoDb && config.table.is_empty() {
            return Err(invalid("FLEETBOOT_TABLE (or MASTER_IP_TABLE) is required for dynamodb"));
        }

        config.region = var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION"));
        config.dynamodb_endpoint = var("DYNAMODB_ENDPOINT");
        config.credentials = match (var("AWS_ACCESS_KEY_ID"), var("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id,
                secret_access_key,
                session_token: var("AWS_SESSION_TOKEN"),
            }),
            _ => None,
        };

        if let Some(secs) = var("FLEETBOOT_STORE_TIMEOUT_SECS") {
            config.store_request_timeout = Duration::from_secs(parse_num("FLEETBOOT_STORE_TIMEOUT_SECS", &secs)?);
        }

        if let Some(path) = var("FLEETBOOT_MANIFEST") {
            config.manifest_path = PathBuf::from(path);
        }
        config.generation = var("FLEETBOOT_GENERATION").map(|g| Generation::parse(&g));

        config.metadata = match var("FLEETBOOT_METADATA").as_deref() {
            None | Some("imds") => MetadataSource::Imds,
            Some("static") => MetadataSource::Static {
                address: var("FLEETBOOT_ADDRESS")
                    .ok_or_else(|| invalid("FLEETBOOT_ADDRESS is required for static metadata"))?,
                instance_id: var("FLEETBOOT_INSTANCE_ID"),
            },
            Some(other) => return Err(invalid(format!("unknown FLEETBOOT_METADATA {}", other))),
        };
        if let Some(endpoint) = var("FLEETBOOT_IMDS_ENDPOINT") {
            config.imds.endpoint = endpoint;
        }

        config.discovery.schedule = match var("FLEETBOOT_DISCOVERY_DELAYS") {
            // an explicit list wins over attempts/step
            Some(list) => BackoffSchedule::from_delays(parse_delays(&list)?),
            None => {
                let attempts = match var("FLEETBOOT_DISCOVERY_ATTEMPTS") {
                    Some(v) => parse_num::<u32>("FLEETBOOT_DISCOVERY_ATTEMPTS", &v)?,
                    None => crate::DEFAULT_DISCOVERY_ATTEMPTS,
                };
                let step = match var("FLEETBOOT_DISCOVERY_STEP_SECS") {
                    Some(v) => parse_num::<u64>("FLEETBOOT_DISCOVERY_STEP_SECS", &v)?,
                    None => crate::DEFAULT_DISCOVERY_STEP_SECS,
                };
                if attempts == 0 {
                    return Err(invalid("FLEETBOOT_DISCOVERY_ATTEMPTS must be at least 1"));
                }
                BackoffSchedule::linear(Duration::from_secs(step), attempts)
            }
        };

        if let Some(dir) = var("FLEETBOOT_OUTPUT_DIR") {
            config.render.output_dir = PathBuf::from(dir);
        }
        config.render.proxy_config = var("FLEETBOOT_PROXY_CONFIG").map(PathBuf::from);
        config.render.export_command = var("FLEETBOOT_EXPORT_COMMAND");
        if let Some(name) = var("FLEETBOOT_MASTER_PROCESS") {
            config.render.master_process = name;
        }
        if let Some(name) = var("FLEETBOOT_FOLLOWER_PROCESS") {
            config.render.follower_process = name;
        }

        config.metrics_file = var("FLEETBOOT_METRICS_FILE").map(PathBuf::from);

        Ok(config)
    }
}

fn invalid(reason: impl Into<String>) -> FleetError {
    FleetError::InvalidConfig { reason: reason.into() }
}

fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| invalid(format!("{} must be a non-negative integer, got {}", name, value)))
}

/// Comma-separated seconds, e.g. `0,3,6,9,12`
fn parse_delays(list: &str) -> Result<Vec<Duration>> {
    let delays = list
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| parse_num::<u64>("FLEETBOOT_DISCOVERY_DELAYS", v).map(Duration::from_secs))
        .collect::<Result<Vec<_>>>()?;

    if delays.is_empty() {
        return Err(invalid("FLEETBOOT_DISCOVERY_DELAYS must list at least one delay"));
    }
    Ok(delays)
}
