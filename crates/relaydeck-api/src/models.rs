use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub use relaydeck_proto::{
    AccessKeyInfo, Alert, AlertKind, AlertReport, ComponentKind, EdgeStatus, FleetSummary,
    HealthComponent, KeyAlias, NodeData, NodeKind, OrchestratorSnapshot, RelayHealthReport,
    RelayListing, RelaySummary, Severity, SyncReport, SyncStatus, TenantCreated, TenantRecord,
    TenantUsage, TopologyEdge, TopologyGraph, TopologyNode, WorkloadDetails,
};

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version information
    pub version: String,
    /// Orchestrator backend in use (docker, kubernetes)
    pub orchestrator: String,
    /// Whether the Zabbix poller is running
    pub monitoring_enabled: bool,
    pub timestamp: DateTime<Utc>,
}

/// Relays visible to the caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayList {
    pub relays: Vec<RelayListing>,
    pub total: usize,
}

/// Request to provision a relay
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRelayRequest {
    /// Display name; stored lowercased with spaces replaced by dashes
    #[schema(example = "Milan Edge 1")]
    pub name: String,
    /// UDP data port published for the relay
    #[schema(example = 51820)]
    pub udp_port: i32,
    /// Access keys to admit, in assignment order
    #[serde(default)]
    pub key_ids: Vec<i32>,
    /// Owning tenant (ignored for tenant-scoped callers)
    #[serde(default)]
    pub tenant_id: Option<i32>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub description: String,
}

/// Outcome of a relay write
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayWriteResponse {
    pub id: i32,
    pub name: String,
    pub web_port: i32,
    /// Set when the record was saved but the workload could not be deployed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Replace the keys assigned to a relay
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateRelayKeysRequest {
    pub key_ids: Vec<i32>,
}

/// Result of a start/stop/delete action
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayActionResponse {
    pub id: i32,
    pub message: String,
}

/// Log query
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, IntoParams)]
pub struct LogsQuery {
    /// Number of trailing lines (default 30, max 500)
    pub tail: Option<usize>,
}

/// Trailing log lines of a relay workload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayLogs {
    pub relay_id: i32,
    pub lines: Vec<String>,
}

/// Access keys visible to the caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyList {
    pub keys: Vec<AccessKeyInfo>,
    pub total: usize,
}

/// Request to store an access key
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateKeyRequest {
    #[schema(example = "milan-hq")]
    pub alias: String,
    /// Key material; sealed before it is stored and never returned
    pub key_value: String,
    /// Owning tenant (ignored for tenant-scoped callers)
    #[serde(default)]
    pub tenant_id: Option<i32>,
}

/// Result of deleting a key or tenant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub id: i32,
    pub message: String,
}

/// Tenants visible to the caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantList {
    pub tenants: Vec<TenantRecord>,
    pub total: usize,
}

fn default_max_relays() -> i32 {
    10
}

fn default_max_bandwidth() -> i32 {
    100
}

fn default_sla_target() -> f64 {
    99.9
}

/// Request to create a tenant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTenantRequest {
    #[schema(example = "Acme Corp")]
    pub name: String,
    /// Stored lowercased with spaces replaced by dashes
    #[schema(example = "acme-corp")]
    pub slug: String,
    #[serde(default = "default_max_relays")]
    pub max_relays: i32,
    #[serde(default = "default_max_bandwidth")]
    pub max_bandwidth_mbps: i32,
    #[serde(default = "default_sla_target")]
    pub sla_target: f64,
    #[serde(default)]
    pub allowed_regions: Vec<String>,
    #[serde(default)]
    pub preferred_relay_ids: Vec<i32>,
}

/// Partial tenant update; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub max_relays: Option<i32>,
    pub max_bandwidth_mbps: Option<i32>,
    pub sla_target: Option<f64>,
    pub allowed_regions: Option<Vec<String>>,
    pub preferred_relay_ids: Option<Vec<i32>>,
    pub is_active: Option<bool>,
}
