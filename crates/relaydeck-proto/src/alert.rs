//! Threshold alerts derived from fleet state

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    RelayDown,
    HighRestarts,
    LowHandshakeRate,
    QuotaWarning,
}

/// A single alert. `subject` is a relay name or, for quota alerts, a tenant name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Alert {
    pub severity: Severity,
    pub subject: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
}

/// Alert list with counts by severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertReport {
    pub alerts: Vec<Alert>,
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
}

impl AlertReport {
    pub fn new(alerts: Vec<Alert>) -> Self {
        let critical = alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();
        let warning = alerts
            .iter()
            .filter(|a| a.severity == Severity::Warning)
            .count();
        Self {
            total: alerts.len(),
            critical,
            warning,
            alerts,
        }
    }
}
