//! Relaydeck shared types
//!
//! Value types exchanged between the relay fleet control plane crates:
//! the relay statistics document, orchestrator status, caller scope,
//! relay/key/tenant records and the derived health, alert, fleet and
//! topology documents returned to the presentation layer.
//! Also carries the monitoring sync report.

pub mod alert;
pub mod fleet;
pub mod health;
pub mod monitoring;
pub mod records;
pub mod scope;
pub mod stats;
pub mod status;
pub mod topology;

pub use alert::{Alert, AlertKind, AlertReport, Severity};
pub use fleet::{FleetSummary, RelaySummary};
pub use health::{ComponentKind, HealthComponent, HealthScore, RelayHealthReport};
pub use monitoring::{SyncReport, SyncStatus};
pub use records::{
    AccessKeyInfo, KeyAlias, KeyAssignment, KeyRecord, RelayListing, RelayRecord, TenantQuota,
    TenantCreated, TenantRecord, TenantUsage, SOFT_QUOTA_THRESHOLD,
};
pub use scope::{
    CallerScope, FleetScope, ScopeError, ADMIN_ROLE, READ_ONLY_ROLES, TENANT_SCOPED_ROLES,
};
pub use stats::{PeerEntry, PeerStats, PeerTable, RelayStats};
pub use status::{OrchestratorSnapshot, RelayStatus, WorkloadDetails};
pub use topology::{EdgeStatus, NodeData, NodeKind, TopologyEdge, TopologyGraph, TopologyNode};

/// Round to one decimal place, as used for every health figure.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places, as used for bandwidth and rate figures.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
