//! Container orchestrator backends for relay workloads
//!
//! The control plane talks to the platform running the relays through the
//! [`OrchestratorBackend`] capability trait. Two implementations exist:
//!
//! - [`DockerBackend`]: a single-host container daemon reached over its unix socket
//!   through `bollard`
//! - [`KubernetesBackend`]: a cluster scheduler reached over its REST API
//!
//! The backend is chosen once at process start ([`OrchestratorKind`]).

pub mod docker;
pub mod kubernetes;

use async_trait::async_trait;
use relaydeck_proto::{OrchestratorSnapshot, WorkloadDetails};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use docker::{DockerBackend, DockerConfig};
pub use kubernetes::{KubernetesBackend, KubernetesConfig};

/// Prefix prepended to relay names to form workload names
pub const DEFAULT_NAME_PREFIX: &str = "wpex-";

/// Port the relay serves its statistics on inside the workload
pub const DEFAULT_STATS_PORT: u16 = 8080;

/// Key passed to a relay that has no assigned keys, so it starts but admits nobody
pub const PLACEHOLDER_KEY: &str = "placeholder";

/// Lines returned by a default log read
pub const DEFAULT_LOG_TAIL: usize = 30;

/// Errors that can occur while talking to an orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Orchestrator unavailable: {0}")]
    Unavailable(String),

    #[error("Workload not found: {0}")]
    NotFound(String),

    #[error("Orchestrator request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Orchestrator API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid orchestrator response: {0}")]
    InvalidResponse(String),

    #[error("Orchestrator configuration error: {0}")]
    Config(String),
}

/// Which backend drives the relay workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorKind {
    Docker,
    Kubernetes,
}

impl FromStr for OrchestratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(OrchestratorKind::Docker),
            "kubernetes" | "k8s" => Ok(OrchestratorKind::Kubernetes),
            other => Err(format!(
                "unknown orchestrator '{}', expected 'docker' or 'kubernetes'",
                other
            )),
        }
    }
}

impl fmt::Display for OrchestratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorKind::Docker => f.write_str("docker"),
            OrchestratorKind::Kubernetes => f.write_str("kubernetes"),
        }
    }
}

/// Everything needed to (re)deploy one relay workload
#[derive(Debug, Clone, PartialEq)]
pub struct RelayDeployment {
    /// Stored relay name (without the workload prefix)
    pub relay_name: String,
    /// UDP data port published on the host / service
    pub udp_port: u16,
    /// Port the relay serves statistics on
    pub stats_port: u16,
    /// Key material the relay admits
    pub allowed_keys: Vec<String>,
}

impl RelayDeployment {
    pub fn new(relay_name: impl Into<String>, udp_port: u16, allowed_keys: Vec<String>) -> Self {
        Self {
            relay_name: relay_name.into(),
            udp_port,
            stats_port: DEFAULT_STATS_PORT,
            allowed_keys,
        }
    }

    pub fn with_stats_port(mut self, port: u16) -> Self {
        self.stats_port = port;
        self
    }

    /// Relay process arguments: the stats listener followed by one
    /// `--allow` per key (or the placeholder when there are none)
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec!["--stats".to_string(), format!(":{}", self.stats_port)];
        if self.allowed_keys.is_empty() {
            args.push("--allow".to_string());
            args.push(PLACEHOLDER_KEY.to_string());
        } else {
            for key in &self.allowed_keys {
                args.push("--allow".to_string());
                args.push(key.clone());
            }
        }
        args
    }
}

/// Workload name for a relay
pub fn workload_name(prefix: &str, relay_name: &str) -> String {
    format!("{}{}", prefix, relay_name)
}

/// Capability interface over the platform running relay workloads.
///
/// All methods take the stored relay name; implementations apply their
/// configured name prefix.
#[async_trait]
pub trait OrchestratorBackend: Send + Sync {
    fn kind(&self) -> OrchestratorKind;

    /// Query run state and restart counter
    async fn inspect(&self, relay_name: &str) -> Result<OrchestratorSnapshot, OrchestratorError>;

    /// Create or replace the workload
    async fn deploy(&self, deployment: &RelayDeployment) -> Result<(), OrchestratorError>;

    /// Remove the workload; a missing workload is not an error
    async fn remove(&self, relay_name: &str) -> Result<(), OrchestratorError>;

    async fn start(&self, relay_name: &str) -> Result<(), OrchestratorError>;

    async fn stop(&self, relay_name: &str) -> Result<(), OrchestratorError>;

    /// Restart a running workload in place
    async fn restart(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        self.stop(relay_name).await?;
        self.start(relay_name).await
    }

    /// Last `tail` log lines, oldest first
    async fn logs(&self, relay_name: &str, tail: usize) -> Result<Vec<String>, OrchestratorError>;

    /// Platform detail of the workload. Backends without richer data
    /// report what [`OrchestratorBackend::inspect`] returns.
    async fn details(&self, relay_name: &str) -> Result<WorkloadDetails, OrchestratorError> {
        let snapshot = self.inspect(relay_name).await?;
        let mut details = WorkloadDetails::new(relay_name, snapshot.status);
        details.restart_count = snapshot.restart_count;
        details.started_at = snapshot.started_at;
        details.image = snapshot.image;
        Ok(details)
    }

    /// Status check that never fails: any backend failure maps to `error`
    /// with a restart count of 0
    async fn status(&self, relay_name: &str) -> OrchestratorSnapshot {
        match self.inspect(relay_name).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(relay = %relay_name, backend = %self.kind(), "Status check failed: {}", e);
                OrchestratorSnapshot::error()
            }
        }
    }
}

/// Extract the `message` field platforms put in their error bodies
pub(crate) fn api_error(status: u16, body: &[u8]) -> OrchestratorError {
    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
    OrchestratorError::Api { status, message }
}
