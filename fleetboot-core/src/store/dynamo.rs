//! DynamoDB-backed election store
//!
//! Pure-Rust client for the DynamoDB JSON API using reqwest and SigV4
//! signing. The record lives in one item per environment:
//!
//! | attribute      | type   | field                   |
//! |----------------|--------|-------------------------|
//! | `HashKey`      | S      | `environment_key`       |
//! | `IP`           | S      | `master_address`        |
//! | `DeploymentID` | N or S | `deployment_generation` |
//! | `ChangedAt`    | S      | `last_changed_at`       |
//! | `ReadCount`    | N      | `read_count`            |
//! | `InstanceID`   | S      | `claimant_instance_id`  |

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::sigv4::{Credentials, Signer};
use super::{ClaimOutcome, ElectionRecord, ElectionStore, Generation};
use crate::error::{FleetError, Result};

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "DynamoDB_20120810";

const CLAIM_UPDATE: &str = "SET IP = :ip, ChangedAt = :changed_at, ReadCount = :zero, \
                            DeploymentID = :generation, InstanceID = :instance_id";
const LEGACY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

const CLAIM_CONDITION: &str = "attribute_not_exists(DeploymentID) OR DeploymentID < :generation";

/// Configuration for the DynamoDB store
#[derive(Debug, Clone)]
pub struct DynamoConfig {
    /// Table holding election records
    pub table: String,
    /// AWS region
    pub region: String,
    /// Endpoint override (DynamoDB Local, VPC endpoints)
    pub endpoint: Option<String>,
    /// Signing credentials
    pub credentials: Credentials,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl DynamoConfig {
    /// Resolved endpoint URL
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://dynamodb.{}.amazonaws.com/", self.region))
    }
}

/// Failure reported by a DynamoDB call
#[derive(Debug)]
enum CallError {
    /// ConditionalCheckFailedException
    ConditionFailed,
    /// Anything else, already formatted
    Other(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Election store backed by a DynamoDB table
pub struct DynamoStore {
    client: Client,
    config: DynamoConfig,
    url: Url,
    host: String,
}

impl DynamoStore {
    /// Create a new DynamoDB store
    pub fn new(config: DynamoConfig) -> Result<Self> {
        let url = Url::parse(&config.endpoint_url()).map_err(|e| FleetError::InvalidConfig {
            reason: format!("bad DynamoDB endpoint {}: {}", config.endpoint_url(), e),
        })?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(FleetError::InvalidConfig {
                    reason: format!("DynamoDB endpoint {} has no host", url),
                })
            }
        };

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FleetError::InvalidConfig {
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            url,
            host,
        })
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Issue one signed JSON API call
    async fn call(&self, operation: &str, payload: Value) -> std::result::Result<Value, CallError> {
        let body = Bytes::from(payload.to_string());
        let target = format!("{}.{}", TARGET_PREFIX, operation);

        let signer = Signer {
            credentials: &self.config.credentials,
            region: &self.config.region,
            service: "dynamodb",
        };
        let signed = signer.sign(
            "POST",
            &self.host,
            self.url.path(),
            &[("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())],
            &body,
            Utc::now(),
        )
        .map_err(|e| CallError::Other(format!("{} signing failed: {}", operation, e)))?;

        let mut request = self
            .client
            .post(self.url.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", &target)
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        let resp = request
            .body(body)
            .send()
            .await
            .map_err(|e| CallError::Other(format!("{} request failed: {}", operation, e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CallError::Other(format!("{} response unreadable: {}", operation, e)))?;

        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|e| CallError::Other(format!("{} response not JSON: {}", operation, e)));
        }

        Err(classify_error(operation, status.as_u16(), &text))
    }
}

#[async_trait]
impl ElectionStore for DynamoStore {
    async fn put_if_superseded(&self, record: &ElectionRecord) -> Result<ClaimOutcome> {
        let payload = claim_request(&self.config.table, record);

        match self.call("UpdateItem", payload).await {
            Ok(_) => {
                debug!(key = %record.environment_key, generation = %record.deployment_generation, "claim written");
                Ok(ClaimOutcome::Claimed)
            }
            Err(CallError::ConditionFailed) => Ok(ClaimOutcome::Conflict),
            Err(CallError::Other(message)) => Err(FleetError::store("claim", message)),
        }
    }

    async fn get(&self, environment_key: &str) -> Result<Option<ElectionRecord>> {
        let payload = json!({
            "TableName": self.config.table,
            "Key": { "HashKey": { "S": environment_key } },
            "ConsistentRead": true,
        });

        let response = self.call("GetItem", payload).await.map_err(|e| match e {
            CallError::ConditionFailed => FleetError::store("get", "unexpected condition failure"),
            CallError::Other(message) => FleetError::store("get", message),
        })?;

        match response.get("Item").and_then(Value::as_object) {
            Some(item) => decode_item(environment_key, item).map(Some),
            None => Ok(None),
        }
    }

    async fn increment_read_count(&self, environment_key: &str) -> Result<()> {
        let payload = json!({
            "TableName": self.config.table,
            "Key": { "HashKey": { "S": environment_key } },
            "UpdateExpression": "ADD ReadCount :one",
            "ConditionExpression": "attribute_exists(HashKey)",
            "ExpressionAttributeValues": { ":one": { "N": "1" } },
        });

        self.call("UpdateItem", payload).await.map(|_| ()).map_err(|e| match e {
            CallError::ConditionFailed => {
                warn!(key = %environment_key, "read count increment found no record");
                FleetError::store("increment", format!("no record for {}", environment_key))
            }
            CallError::Other(message) => FleetError::store("increment", message),
        })
    }
}

/// Conditional UpdateItem payload for a claim
fn claim_request(table: &str, record: &ElectionRecord) -> Value {
    json!({
        "TableName": table,
        "Key": { "HashKey": { "S": record.environment_key } },
        "UpdateExpression": CLAIM_UPDATE,
        "ConditionExpression": CLAIM_CONDITION,
        "ExpressionAttributeValues": {
            ":ip": { "S": record.master_address },
            ":changed_at": { "S": record.last_changed_at.unwrap_or_else(Utc::now).to_rfc3339() },
            ":zero": { "N": "0" },
            ":generation": generation_value(&record.deployment_generation),
            ":instance_id": { "S": record.claimant_instance_id },
        },
    })
}

fn generation_value(generation: &Generation) -> Value {
    match generation {
        Generation::Number(n) => json!({ "N": n.to_string() }),
        Generation::Label(s) => json!({ "S": s }),
    }
}

fn classify_error(operation: &str, status: u16, text: &str) -> CallError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) if body.kind.ends_with("ConditionalCheckFailedException") => CallError::ConditionFailed,
        Ok(body) => {
            let kind = body.kind.rsplit('#').next().unwrap_or(&body.kind);
            CallError::Other(format!("{} failed ({}): {} {}", operation, status, kind, body.message))
        }
        Err(_) => CallError::Other(format!("{} failed ({}): {}", operation, status, text)),
    }
}

fn decode_item(environment_key: &str, item: &Map<String, Value>) -> Result<ElectionRecord> {
    let malformed = |reason: String| FleetError::MalformedRecord {
        key: environment_key.to_string(),
        reason,
    };

    let string = |name: &str| -> Result<String> {
        item.get(name)
            .and_then(|v| v.get("S"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed(format!("missing string attribute {}", name)))
    };

    let deployment_generation = match item.get("DeploymentID") {
        Some(v) => match (v.get("N").and_then(Value::as_str), v.get("S").and_then(Value::as_str)) {
            (Some(n), _) => Generation::Number(
                n.parse()
                    .map_err(|_| malformed(format!("DeploymentID {} is not an integer", n)))?,
            ),
            (None, Some(s)) => Generation::Label(s.to_string()),
            (None, None) => return Err(malformed("DeploymentID has unsupported type".into())),
        },
        None => return Err(malformed("missing DeploymentID".into())),
    };

    let optional = |name: &str| item.get(name).and_then(|v| v.get("S")).and_then(Value::as_str);

    let last_changed_at = optional("ChangedAt").and_then(|raw| {
        let parsed = parse_changed_at(raw);
        if parsed.is_none() {
            debug!(key = %environment_key, changed_at = raw, "ignoring unreadable ChangedAt");
        }
        parsed
    });

    let read_count = item
        .get("ReadCount")
        .and_then(|v| v.get("N"))
        .and_then(Value::as_str)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    Ok(ElectionRecord {
        environment_key: environment_key.to_string(),
        master_address: string("IP")?,
        deployment_generation,
        last_changed_at,
        read_count,
        claimant_instance_id: optional("InstanceID").unwrap_or_default().to_string(),
    })
}

/// RFC 3339, or the `2015-08-30 12:36:00 +0000` form older writers used
fn parse_changed_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, LEGACY_TIME_FORMAT))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}
