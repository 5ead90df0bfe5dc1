//! Caller scope supplied by the authentication layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Roles that only ever see their own tenant's relays, keys and alerts
pub const TENANT_SCOPED_ROLES: &[&str] = &["engineer", "viewer"];

/// Roles that may not change relays
pub const READ_ONLY_ROLES: &[&str] = &["viewer", "executive"];

/// Only role allowed to manage tenants
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScopeError {
    #[error("Role '{0}' is tenant-scoped but no tenant is bound to the caller")]
    MissingTenant(String),

    #[error("Resource belongs to another tenant")]
    ForeignTenant,

    #[error("Role '{0}' is not allowed to modify relays")]
    ReadOnly(String),

    #[error("Role '{0}' is not allowed to manage tenants")]
    AdminOnly(String),
}

/// Identity of the caller as asserted by the auth layer. Trusted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CallerScope {
    pub role: String,
    #[serde(default)]
    pub tenant_id: Option<i32>,
}

impl CallerScope {
    pub fn new(role: impl Into<String>, tenant_id: Option<i32>) -> Self {
        Self {
            role: role.into(),
            tenant_id,
        }
    }

    pub fn is_tenant_scoped(&self) -> bool {
        TENANT_SCOPED_ROLES.contains(&self.role.as_str())
    }

    pub fn is_read_only(&self) -> bool {
        READ_ONLY_ROLES.contains(&self.role.as_str())
    }

    /// Resolve the fleet this caller may observe.
    ///
    /// A tenant-scoped role without a tenant is rejected before any data is
    /// read, so it can never fall through to the global fleet.
    pub fn fleet_scope(&self) -> Result<FleetScope, ScopeError> {
        if !self.is_tenant_scoped() {
            return Ok(FleetScope::Global);
        }
        self.tenant_id
            .map(FleetScope::Tenant)
            .ok_or_else(|| ScopeError::MissingTenant(self.role.clone()))
    }

    /// Check that a single resource owned by `owner` is visible to the caller
    pub fn authorize_tenant(&self, owner: Option<i32>) -> Result<(), ScopeError> {
        if self.fleet_scope()?.admits(owner) {
            Ok(())
        } else {
            Err(ScopeError::ForeignTenant)
        }
    }

    pub fn require_write(&self) -> Result<(), ScopeError> {
        if self.is_read_only() {
            Err(ScopeError::ReadOnly(self.role.clone()))
        } else {
            Ok(())
        }
    }

    pub fn require_admin(&self) -> Result<(), ScopeError> {
        if self.role == ADMIN_ROLE {
            Ok(())
        } else {
            Err(ScopeError::AdminOnly(self.role.clone()))
        }
    }
}

/// The slice of the fleet a query runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetScope {
    Global,
    Tenant(i32),
}

impl FleetScope {
    pub fn tenant_id(&self) -> Option<i32> {
        match self {
            FleetScope::Global => None,
            FleetScope::Tenant(id) => Some(*id),
        }
    }

    /// Whether a resource owned by `owner` belongs to this scope
    pub fn admits(&self, owner: Option<i32>) -> bool {
        match self {
            FleetScope::Global => true,
            FleetScope::Tenant(id) => owner == Some(*id),
        }
    }
}
