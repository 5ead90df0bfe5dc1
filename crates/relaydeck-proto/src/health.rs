//! Composite relay health score

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::status::OrchestratorSnapshot;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Named inputs of the health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Container,
    Restarts,
    HandshakeRate,
    Connectivity,
}

/// One scored input with a human-readable explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HealthComponent {
    /// 0-100
    pub score: f64,
    pub detail: String,
}

impl HealthComponent {
    /// `score` is clamped to [0, 100]
    pub fn new(score: f64, detail: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, 100.0),
            detail: detail.into(),
        }
    }
}

/// Health score in [0, 100] and the components it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HealthScore {
    pub score: f64,
    pub components: BTreeMap<ComponentKind, HealthComponent>,
}

impl HealthScore {
    pub fn component(&self, kind: ComponentKind) -> Option<&HealthComponent> {
        self.components.get(&kind)
    }
}

/// Health detail of one relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RelayHealthReport {
    pub relay_id: i32,
    pub relay_name: String,
    pub health_score: f64,
    pub components: BTreeMap<ComponentKind, HealthComponent>,
    pub orchestrator: OrchestratorSnapshot,
    pub stats_available: bool,
}
