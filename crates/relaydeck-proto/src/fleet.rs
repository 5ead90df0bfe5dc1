//! Fleet-wide KPI document

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::status::RelayStatus;

/// Per-relay line of the fleet summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RelaySummary {
    pub id: i32,
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "running"))]
    pub status: RelayStatus,
    /// Health score, one decimal
    pub health: f64,
    pub bytes_transferred: u64,
    pub peers_count: usize,
}

/// Aggregate KPIs over the caller's slice of the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct FleetSummary {
    pub relays_active: usize,
    pub relays_total: usize,
    pub tenants_active: u64,
    /// Sum of bytes transferred in MiB, two decimals
    pub bandwidth_aggregated_mb: f64,
    pub total_peers: usize,
    /// Mean relay health, one decimal
    pub global_health_score: f64,
    /// Relays in name order
    pub relays: Vec<RelaySummary>,
}
