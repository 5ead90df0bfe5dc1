//! Scope-aware entry points used by the API
//!
//! Every operation resolves the caller's scope before reading anything;
//! a tenant-scoped caller without a tenant is rejected up front.

use crate::aggregate::summarize;
use crate::alerts::derive_alerts;
use crate::evaluator::{Evaluator, RelayEvaluation};
use crate::source::{FleetSource, FleetSourceError};
use crate::topology::{build_topology, live_peer_slots};
use relaydeck_proto::{
    AlertReport, CallerScope, FleetScope, FleetSummary, RelayHealthReport, RelayRecord, ScopeError,
    TenantUsage, TopologyGraph,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Source(#[from] FleetSourceError),

    #[error("Relay {0} not found")]
    RelayNotFound(i32),

    #[error("Tenant {0} not found")]
    TenantNotFound(i32),
}

#[derive(Clone)]
pub struct FleetMonitor {
    source: Arc<dyn FleetSource>,
    evaluator: Evaluator,
}

impl FleetMonitor {
    pub fn new(source: Arc<dyn FleetSource>, evaluator: Evaluator) -> Self {
        Self { source, evaluator }
    }

    pub fn source(&self) -> &Arc<dyn FleetSource> {
        &self.source
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    async fn evaluate_scope(
        &self,
        caller: &CallerScope,
    ) -> Result<(FleetScope, Vec<RelayEvaluation>), MonitorError> {
        let scope = caller.fleet_scope()?;
        let relays = self.source.list_relays(scope).await?;
        debug!(?scope, relays = relays.len(), "Evaluating fleet");
        Ok((scope, self.evaluator.evaluate_all(relays).await))
    }

    /// Fleet KPIs for the caller's slice of the fleet
    pub async fn summary(&self, caller: &CallerScope) -> Result<FleetSummary, MonitorError> {
        let (scope, evaluations) = self.evaluate_scope(caller).await?;
        let tenants_active = self.source.count_active_tenants(scope).await?;
        Ok(summarize(&evaluations, tenants_active))
    }

    pub async fn alerts(&self, caller: &CallerScope) -> Result<AlertReport, MonitorError> {
        let (scope, evaluations) = self.evaluate_scope(caller).await?;
        let quotas = self.source.tenant_quotas(scope).await?;
        Ok(derive_alerts(&evaluations, &quotas))
    }

    pub async fn topology(&self, caller: &CallerScope) -> Result<TopologyGraph, MonitorError> {
        let scope = caller.fleet_scope()?;
        let relays = self.source.list_relays(scope).await?;
        let keys = self.source.list_keys(scope).await?;
        let assignments = self.source.list_assignments(scope).await?;

        let stats = self.evaluator.fetch_stats_all(&relays).await;
        let live_slots: HashMap<i32, usize> = relays
            .iter()
            .zip(stats.iter())
            .filter_map(|(relay, stats)| {
                stats.as_ref().map(|s| (relay.id, live_peer_slots(s)))
            })
            .collect();

        Ok(build_topology(&relays, &keys, &assignments, &live_slots))
    }

    /// Load a relay the caller may see
    pub async fn authorized_relay(
        &self,
        caller: &CallerScope,
        relay_id: i32,
    ) -> Result<RelayRecord, MonitorError> {
        caller.fleet_scope()?;
        let relay = self
            .source
            .get_relay(relay_id)
            .await?
            .ok_or(MonitorError::RelayNotFound(relay_id))?;
        caller.authorize_tenant(relay.tenant_id)?;
        Ok(relay)
    }

    pub async fn relay_health(
        &self,
        caller: &CallerScope,
        relay_id: i32,
    ) -> Result<RelayHealthReport, MonitorError> {
        let relay = self.authorized_relay(caller, relay_id).await?;
        let evaluation = self.evaluator.evaluate(relay).await;

        Ok(RelayHealthReport {
            relay_id: evaluation.relay.id,
            relay_name: evaluation.relay.name,
            health_score: evaluation.health.score,
            components: evaluation.health.components,
            orchestrator: evaluation.snapshot,
            stats_available: evaluation.stats.is_some(),
        })
    }

    /// Raw stats document of one relay, `None` when unavailable
    pub async fn relay_stats(
        &self,
        caller: &CallerScope,
        relay_id: i32,
    ) -> Result<(RelayRecord, Option<Value>), MonitorError> {
        let relay = self.authorized_relay(caller, relay_id).await?;
        let doc = self
            .evaluator
            .stats_provider()
            .fetch_document(&relay.name)
            .await;
        Ok((relay, doc))
    }

    pub async fn tenant_usage(
        &self,
        caller: &CallerScope,
        tenant_id: i32,
    ) -> Result<TenantUsage, MonitorError> {
        caller.authorize_tenant(Some(tenant_id))?;
        let quota = self
            .source
            .tenant_quota(tenant_id)
            .await?
            .ok_or(MonitorError::TenantNotFound(tenant_id))?;
        Ok(TenantUsage::from(&quota))
    }
}
