//! Read-only records the core pulls from the relational store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::RelayStatus;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A provisioned relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RelayRecord {
    pub id: i32,
    pub name: String,
    /// UDP data port
    pub udp_port: i32,
    /// Management / stats port
    pub web_port: i32,
    /// Owning tenant, `None` for global relays
    pub tenant_id: Option<i32>,
    pub region: String,
}

/// Key reference shown next to a relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct KeyAlias {
    pub id: i32,
    pub alias: String,
}

/// A relay as listed to operators: record, assigned keys and live status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RelayListing {
    pub id: i32,
    pub name: String,
    pub udp_port: i32,
    pub web_port: i32,
    pub tenant_id: Option<i32>,
    pub region: String,
    pub description: String,
    /// Assigned keys in assignment order
    pub keys: Vec<KeyAlias>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "running"))]
    pub status: RelayStatus,
}

/// An access key as seen by the topology builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct KeyRecord {
    pub id: i32,
    pub alias: String,
    pub tenant_id: Option<i32>,
    pub tenant_name: Option<String>,
}

/// An access key as listed to operators. Key material is never returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AccessKeyInfo {
    pub id: i32,
    pub alias: String,
    pub tenant_id: Option<i32>,
    /// Relays the key is assigned to
    pub relay_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A tenant with its quota attributes and current relay usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TenantRecord {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub max_relays: i32,
    pub max_bandwidth_mbps: i32,
    pub sla_target: f64,
    pub allowed_regions: Vec<String>,
    pub preferred_relay_ids: Vec<i32>,
    pub is_active: bool,
    pub used_relays: i64,
    /// Used share of the relay quota in percent, one decimal
    pub usage_pct: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A freshly created tenant. The API key is only ever returned here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TenantCreated {
    pub tenant: TenantRecord,
    pub api_key: String,
}

/// One key→relay assignment link. `position` is the order the key was
/// assigned in; edges are matched against live peers in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct KeyAssignment {
    pub key_id: i32,
    pub relay_id: i32,
    pub relay_name: String,
    pub position: i32,
    pub tenant_id: Option<i32>,
    pub tenant_name: Option<String>,
}

/// Capacity quota of a tenant and how much of it is in use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TenantQuota {
    pub tenant_id: i32,
    pub name: String,
    /// Maximum number of relays the tenant may run
    pub max_relays: i32,
    /// Relays currently provisioned for the tenant
    pub used_relays: i64,
    pub max_bandwidth_mbps: i32,
}

impl TenantQuota {
    /// Used fraction of the quota, `None` when the tenant has no limit
    pub fn usage_ratio(&self) -> Option<f64> {
        if self.max_relays <= 0 {
            None
        } else {
            Some(self.used_relays as f64 / self.max_relays as f64)
        }
    }

    /// Used capacity has reached the soft warning threshold
    pub fn is_near_limit(&self) -> bool {
        self.usage_ratio()
            .is_some_and(|ratio| ratio >= SOFT_QUOTA_THRESHOLD)
    }
}

/// Fraction of a quota at which a warning is raised
pub const SOFT_QUOTA_THRESHOLD: f64 = 0.8;

/// Capacity usage of one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TenantUsage {
    pub tenant_id: i32,
    pub name: String,
    pub max_relays: i32,
    pub used_relays: i64,
    /// Used share of the relay quota in percent, one decimal
    pub usage_pct: f64,
    pub max_bandwidth_mbps: i32,
    pub soft_quota_warning: bool,
}

impl From<&TenantQuota> for TenantUsage {
    fn from(quota: &TenantQuota) -> Self {
        Self {
            tenant_id: quota.tenant_id,
            name: quota.name.clone(),
            max_relays: quota.max_relays,
            used_relays: quota.used_relays,
            usage_pct: quota
                .usage_ratio()
                .map(|ratio| crate::round1(ratio * 100.0))
                .unwrap_or(0.0),
            max_bandwidth_mbps: quota.max_bandwidth_mbps,
            soft_quota_warning: quota.is_near_limit(),
        }
    }
}
