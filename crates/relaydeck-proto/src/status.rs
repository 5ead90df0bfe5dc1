//! Workload run state as reported by the container orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Run state of a relay workload.
///
/// The cluster backend only ever produces the named variants. The daemon
/// backend passes through whatever the platform reports, so unrecognised
/// states (`exited`, `paused`, `restarting`, ...) are kept verbatim in
/// [`RelayStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelayStatus {
    Running,
    Stopped,
    /// Scheduled but not yet passing readiness (cluster backend only)
    Starting,
    NotCreated,
    /// The orchestrator could not be reached or answered with a failure
    Error,
    Unknown,
    Other(String),
}

impl RelayStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RelayStatus::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            RelayStatus::Running => "running",
            RelayStatus::Stopped => "stopped",
            RelayStatus::Starting => "starting",
            RelayStatus::NotCreated => "not_created",
            RelayStatus::Error => "error",
            RelayStatus::Unknown => "unknown",
            RelayStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for RelayStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "running" => RelayStatus::Running,
            "stopped" => RelayStatus::Stopped,
            "starting" => RelayStatus::Starting,
            "not_created" => RelayStatus::NotCreated,
            "error" => RelayStatus::Error,
            "unknown" => RelayStatus::Unknown,
            _ => RelayStatus::Other(value),
        }
    }
}

impl From<&str> for RelayStatus {
    fn from(value: &str) -> Self {
        RelayStatus::from(value.to_string())
    }
}

impl From<RelayStatus> for String {
    fn from(value: RelayStatus) -> Self {
        match value {
            RelayStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time orchestrator view of one relay workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct OrchestratorSnapshot {
    /// Run state
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "running"))]
    pub status: RelayStatus,
    /// Restart counter owned by the orchestrator (never decreases)
    pub restart_count: u32,
    /// When the workload last started, as reported by the platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Image the workload runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl OrchestratorSnapshot {
    pub fn new(status: RelayStatus, restart_count: u32) -> Self {
        Self {
            status,
            restart_count,
            started_at: None,
            image: None,
        }
    }

    /// Fallback used whenever the backend cannot be reached
    pub fn error() -> Self {
        Self::new(RelayStatus::Error, 0)
    }

    /// Fallback used for relays that were never inspected (deadline exceeded)
    pub fn unknown() -> Self {
        Self::new(RelayStatus::Unknown, 0)
    }

    pub fn not_created() -> Self {
        Self::new(RelayStatus::NotCreated, 0)
    }
}

/// Platform detail of one relay workload, for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WorkloadDetails {
    /// Platform name of the workload (container or deployment)
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "running"))]
    pub status: RelayStatus,
    pub restart_count: u32,
    pub image: Option<String>,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    /// `always`, `unless-stopped`, ... on the daemon backend
    pub restart_policy: Option<String>,
    /// Published ports: `host:container` on the daemon, `port/proto` on clusters
    pub ports: Vec<String>,
    /// Daemon network or cluster namespace
    pub network: Option<String>,
    /// Health check state when the platform tracks one
    pub health: Option<String>,
}

impl WorkloadDetails {
    pub fn new(name: impl Into<String>, status: RelayStatus) -> Self {
        Self {
            name: name.into(),
            status,
            restart_count: 0,
            image: None,
            created_at: None,
            started_at: None,
            finished_at: None,
            restart_policy: None,
            ports: Vec::new(),
            network: None,
            health: None,
        }
    }
}
