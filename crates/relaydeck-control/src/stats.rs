//! Relay statistics fetcher
//!
//! Reads the JSON statistics document a relay serves on its management
//! port. Every failure (connect error, timeout, non-200 status, body that
//! is not a stats document) collapses to "unavailable".

use async_trait::async_trait;
use relaydeck_orchestrator::{workload_name, DEFAULT_NAME_PREFIX, DEFAULT_STATS_PORT};
use relaydeck_proto::RelayStats;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a fetch came back empty. Never leaves this module's callers'
/// fallback path; kept for logging.
#[derive(Debug, Error)]
pub enum StatsFetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid document: {0}")]
    Decode(String),
}

/// Source of relay statistics documents
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Raw document as served by the relay, `None` when unavailable
    async fn fetch_document(&self, relay_name: &str) -> Option<Value>;

    /// Typed document, `None` when unavailable or not a stats document
    async fn fetch(&self, relay_name: &str) -> Option<RelayStats> {
        let doc = self.fetch_document(relay_name).await?;
        match serde_json::from_value(doc) {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!(relay = %relay_name, "Discarding stats document: {}", e);
                None
            }
        }
    }
}

/// Where relay stats endpoints live
#[derive(Debug, Clone)]
pub struct StatsFetcherConfig {
    /// Prefix turning a relay name into its host name
    pub name_prefix: String,
    pub port: u16,
    pub path: String,
    pub timeout: Duration,
}

impl Default for StatsFetcherConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            port: DEFAULT_STATS_PORT,
            path: "/stats".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

impl StatsFetcherConfig {
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stats URL of a relay, derived from its stored name
    pub fn stats_url(&self, relay_name: &str) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!(
            "http://{}:{}{}",
            workload_name(&self.name_prefix, relay_name),
            self.port,
            path
        )
    }
}

/// HTTP stats fetcher
#[derive(Clone)]
pub struct HttpStatsFetcher {
    config: StatsFetcherConfig,
    client: reqwest::Client,
}

impl HttpStatsFetcher {
    /// Fails when the TLS backend cannot be initialized
    pub fn new(config: StatsFetcherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &StatsFetcherConfig {
        &self.config
    }

    async fn try_fetch(&self, relay_name: &str) -> Result<Value, StatsFetchError> {
        let url = self.config.stats_url(relay_name);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                StatsFetchError::Timeout(self.config.timeout)
            } else {
                StatsFetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(StatsFetchError::Status(status.as_u16()));
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| StatsFetchError::Decode(e.to_string()))?;

        if !doc.is_object() {
            return Err(StatsFetchError::Decode("not a JSON object".to_string()));
        }
        Ok(doc)
    }
}

#[async_trait]
impl StatsProvider for HttpStatsFetcher {
    async fn fetch_document(&self, relay_name: &str) -> Option<Value> {
        match self.try_fetch(relay_name).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!(relay = %relay_name, "Stats unavailable: {}", e);
                None
            }
        }
    }
}
