//! Instance metadata lookup
//!
//! `ImdsClient` reads the EC2 instance metadata service, preferring an
//! IMDSv2 session token and falling back to plain IMDSv1 requests.
//! `StaticMetadata` serves fixed values for local runs and tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{InstanceIdentity, InstanceMetadata};
use crate::error::{FleetError, Result};
use crate::store::Credentials;

const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";

/// Configuration for the metadata client
#[derive(Debug, Clone)]
pub struct ImdsConfig {
    /// Metadata service base URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Lifetime requested for IMDSv2 session tokens
    pub token_ttl_secs: u32,
}

impl Default for ImdsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://169.254.169.254".into(),
            timeout: Duration::from_secs(2),
            token_ttl_secs: 21_600,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    region: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

/// EC2 instance metadata client
pub struct ImdsClient {
    client: Client,
    config: ImdsConfig,
}

impl ImdsClient {
    /// Create a new metadata client
    pub fn new(config: ImdsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| FleetError::Metadata {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Request an IMDSv2 session token; `None` means use IMDSv1
    async fn session_token(&self) -> Option<String> {
        let resp = self
            .client
            .put(self.url("/latest/api/token"))
            .header(TOKEN_TTL_HEADER, self.config.token_ttl_secs.to_string())
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            debug!("IMDSv2 token request returned {}, using IMDSv1", resp.status());
            return None;
        }
        resp.text().await.ok().map(|t| t.trim().to_string())
    }

    async fn fetch(&self, path: &str, token: Option<&str>) -> Result<String> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let resp = request.send().await.map_err(|e| FleetError::Metadata {
            message: format!("GET {} failed: {}", path, e),
        })?;

        if !resp.status().is_success() {
            return Err(FleetError::Metadata {
                message: format!("GET {} returned {}", path, resp.status()),
            });
        }

        let body = resp.text().await.map_err(|e| FleetError::Metadata {
            message: format!("GET {} body unreadable: {}", path, e),
        })?;
        Ok(body.trim().to_string())
    }

    /// Temporary credentials of the instance profile role
    pub async fn role_credentials(&self) -> Result<Credentials> {
        let token = self.session_token().await;
        let token = token.as_deref();

        let roles = self
            .fetch("/latest/meta-data/iam/security-credentials/", token)
            .await?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| FleetError::Metadata {
                message: "instance has no IAM role".into(),
            })?;

        let body = self
            .fetch(&format!("/latest/meta-data/iam/security-credentials/{}", role), token)
            .await?;
        let creds: RoleCredentials = serde_json::from_str(&body).map_err(|e| FleetError::Metadata {
            message: format!("credentials for role {} unparsable: {}", role, e),
        })?;

        debug!(role, "loaded instance role credentials");
        Ok(Credentials {
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: creds.token,
        })
    }
}

#[async_trait]
impl InstanceMetadata for ImdsClient {
    async fn identity(&self) -> Result<InstanceIdentity> {
        let token = self.session_token().await;
        let token = token.as_deref();

        let address = self.fetch("/latest/meta-data/local-ipv4", token).await?;
        let instance_id = self.fetch("/latest/meta-data/instance-id", token).await?;
        let document = self
            .fetch("/latest/dynamic/instance-identity/document", token)
            .await?;
        let document: IdentityDocument =
            serde_json::from_str(&document).map_err(|e| FleetError::Metadata {
                message: format!("identity document unparsable: {}", e),
            })?;

        info!(%address, %instance_id, region = %document.region, "instance metadata loaded");
        Ok(InstanceIdentity {
            address,
            instance_id,
            region: Some(document.region),
        })
    }
}

/// Fixed identity
#[derive(Debug, Clone)]
pub struct StaticMetadata {
    identity: InstanceIdentity,
}

impl StaticMetadata {
    /// Identity with the given address; a missing instance id becomes a random UUID
    pub fn new(address: impl Into<String>, instance_id: Option<String>, region: Option<String>) -> Self {
        Self {
            identity: InstanceIdentity {
                address: address.into(),
                instance_id: instance_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                region,
            },
        }
    }
}

#[async_trait]
impl InstanceMetadata for StaticMetadata {
    async fn identity(&self) -> Result<InstanceIdentity> {
        Ok(self.identity.clone())
    }
}
