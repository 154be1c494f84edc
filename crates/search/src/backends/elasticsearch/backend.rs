//! Elasticsearch connection settings and client construction.

use std::fmt;
use std::time::Duration;

use elasticsearch::Elasticsearch;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::Url;
use elasticsearch::http::transport::{
    CloudConnectionPool, SingleNodeConnectionPool, Transport, TransportBuilder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BackendError, StorageError, StorageResult};

pub(super) const BACKEND_NAME: &str = "elasticsearch";

const DEFAULT_URL: &str = "http://localhost:9200";

pub(super) fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::internal(BACKEND_NAME, message))
}

fn connection_failed(message: String) -> StorageError {
    StorageError::Backend(BackendError::ConnectionFailed {
        backend_name: BACKEND_NAME.to_string(),
        message,
    })
}

fn unavailable(message: String) -> StorageError {
    StorageError::Backend(BackendError::Unavailable {
        backend_name: BACKEND_NAME.to_string(),
        message,
    })
}

/// Credentials sent with every request.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElasticsearchAuth {
    /// Username and password.
    Basic { username: String, password: String },
    /// A bearer token.
    Bearer { token: String },
    /// An API key id and secret.
    ApiKey { id: String, key: String },
}

impl fmt::Debug for ElasticsearchAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
            Self::ApiKey { id, .. } => f
                .debug_struct("ApiKey")
                .field("id", id)
                .finish_non_exhaustive(),
        }
    }
}

impl From<&ElasticsearchAuth> for Credentials {
    fn from(auth: &ElasticsearchAuth) -> Self {
        match auth {
            ElasticsearchAuth::Basic { username, password } => {
                Credentials::Basic(username.clone(), password.clone())
            }
            ElasticsearchAuth::Bearer { token } => Credentials::Bearer(token.clone()),
            ElasticsearchAuth::ApiKey { id, key } => Credentials::ApiKey(id.clone(), key.clone()),
        }
    }
}

/// Settings applied to every tenant index when it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Primary shards per index.
    pub shards: u32,
    /// Replicas per primary shard.
    pub replicas: u32,
    /// How often new writes become searchable, e.g. `"1s"`.
    pub refresh_interval: String,
    /// Upper bound of `from + size` for paged searches.
    pub max_result_window: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            shards: 1,
            replicas: 1,
            refresh_interval: "1s".to_string(),
            max_result_window: 10_000,
        }
    }
}

/// Connection settings for the Elasticsearch backend.
///
/// `cloud_id` takes precedence over `url` when both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Single-node cluster URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Elastic Cloud deployment id.
    #[serde(default)]
    pub cloud_id: Option<String>,

    /// Optional credentials.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Skips TLS certificate validation. Local clusters only.
    #[serde(default)]
    pub insecure: bool,

    /// Settings for newly created indices.
    #[serde(default)]
    pub index: IndexSettings,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            cloud_id: None,
            auth: None,
            timeout_ms: default_timeout_ms(),
            insecure: false,
            index: IndexSettings::default(),
        }
    }
}

impl ElasticsearchConfig {
    fn transport(&self) -> StorageResult<Transport> {
        let mut builder = match &self.cloud_id {
            Some(cloud_id) => TransportBuilder::new(
                CloudConnectionPool::new(cloud_id)
                    .map_err(|e| connection_failed(format!("Invalid cloud id: {}", e)))?,
            ),
            None => {
                let url: Url = self
                    .url
                    .parse()
                    .map_err(|e| connection_failed(format!("Invalid URL '{}': {}", self.url, e)))?;
                TransportBuilder::new(SingleNodeConnectionPool::new(url))
            }
        };
        builder = builder.timeout(Duration::from_millis(self.timeout_ms));
        if self.insecure {
            builder = builder.cert_validation(CertificateValidation::None);
        }
        if let Some(auth) = &self.auth {
            builder = builder.auth(auth.into());
        }
        builder
            .build()
            .map_err(|e| connection_failed(format!("Failed to build transport: {}", e)))
    }
}

/// Health of the cluster as reported by `_cluster/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// All shards are allocated.
    Green,
    /// Some replicas are unassigned.
    Yellow,
    /// Some primary shards are unassigned.
    Red,
}

#[derive(Deserialize)]
struct ClusterHealth {
    status: ClusterStatus,
    #[serde(default)]
    cluster_name: String,
}

/// Search index backed by an Elasticsearch cluster.
pub struct ElasticsearchIndex {
    client: Elasticsearch,
    config: ElasticsearchConfig,
}

impl fmt::Debug for ElasticsearchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticsearchIndex")
            .field("url", &self.config.url)
            .field("cloud_id", &self.config.cloud_id)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchIndex {
    /// Builds the client. Nothing is sent until the first request.
    pub fn new(config: ElasticsearchConfig) -> StorageResult<Self> {
        let client = Elasticsearch::new(config.transport()?);
        Ok(Self { client, config })
    }

    pub(super) fn client(&self) -> &Elasticsearch {
        &self.client
    }

    /// Returns the connection settings.
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    /// Fetches the cluster status; a red cluster is reported as unavailable.
    pub async fn health_check(&self) -> StorageResult<ClusterStatus> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| unavailable(format!("Health check failed: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(unavailable(format!("Cluster health returned status {}", status)));
        }
        let health = response
            .json::<ClusterHealth>()
            .await
            .map_err(|e| internal_error(format!("Failed to parse health response: {}", e)))?;

        match health.status {
            ClusterStatus::Red => Err(unavailable(format!(
                "Cluster '{}' is red",
                health.cluster_name
            ))),
            ClusterStatus::Yellow => {
                warn!(cluster = %health.cluster_name, "Elasticsearch cluster is yellow");
                Ok(health.status)
            }
            ClusterStatus::Green => {
                info!(cluster = %health.cluster_name, "Elasticsearch cluster is green");
                Ok(health.status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ElasticsearchConfig = serde_json::from_str(
            r#"{"url": "http://es:9200", "index": {"replicas": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.url, "http://es:9200");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.index.replicas, 0);
        assert_eq!(config.index.shards, 1);
        assert_eq!(config.index.max_result_window, 10_000);
        assert!(config.cloud_id.is_none());
    }

    #[test]
    fn test_auth_is_tagged_and_redacted() {
        let auth: ElasticsearchAuth =
            serde_json::from_str(r#"{"type": "api_key", "id": "k1", "key": "s3cret"}"#).unwrap();
        assert!(matches!(&auth, ElasticsearchAuth::ApiKey { id, .. } if id == "k1"));
        assert!(!format!("{:?}", auth).contains("s3cret"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = ElasticsearchConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ElasticsearchIndex::new(config),
            Err(StorageError::Backend(BackendError::ConnectionFailed { .. }))
        ));
    }

    #[test]
    fn test_cluster_status_parses() {
        let health: ClusterHealth =
            serde_json::from_str(r#"{"status": "yellow", "cluster_name": "dev"}"#).unwrap();
        assert_eq!(health.status, ClusterStatus::Yellow);
    }
}
