//! Outcome of the periodic push to the external monitoring system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No run has completed yet
    Never,
    Ok,
    /// Some relays failed to push
    Partial,
    /// The run could not start (relay list unavailable)
    Error,
}

/// Result of the most recent sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SyncReport {
    pub time: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub hosts_pushed: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn never() -> Self {
        Self {
            time: None,
            status: SyncStatus::Never,
            hosts_pushed: 0,
            errors: Vec::new(),
        }
    }

    /// Completed run: `ok` without errors, `partial` otherwise
    pub fn completed(hosts_pushed: usize, errors: Vec<String>) -> Self {
        Self {
            time: Some(Utc::now()),
            status: if errors.is_empty() {
                SyncStatus::Ok
            } else {
                SyncStatus::Partial
            },
            hosts_pushed,
            errors,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            time: Some(Utc::now()),
            status: SyncStatus::Error,
            hosts_pushed: 0,
            errors: vec![error.into()],
        }
    }
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::never()
    }
}
