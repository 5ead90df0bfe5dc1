//! Threshold alerts
//!
//! Alerts are recomputed from scratch on every call; nothing is persisted
//! or deduplicated.

use crate::evaluator::RelayEvaluation;
use relaydeck_proto::{round1, Alert, AlertKind, AlertReport, RelayStatus, Severity, TenantQuota};

/// Restart count above which a relay is flagged
pub const RESTART_ALERT_THRESHOLD: u32 = 3;

/// Handshake attempts needed before the success ratio is judged
pub const HANDSHAKE_ALERT_MIN_ATTEMPTS: u64 = 10;

/// Success ratio below which a relay is flagged
pub const HANDSHAKE_ALERT_RATIO: f64 = 0.7;

pub fn derive_alerts(evaluations: &[RelayEvaluation], quotas: &[TenantQuota]) -> AlertReport {
    let mut alerts = Vec::new();

    for evaluation in evaluations {
        let name = &evaluation.relay.name;
        let snapshot = &evaluation.snapshot;

        if !snapshot.status.is_running() {
            let message = match snapshot.status {
                RelayStatus::NotCreated => format!("Relay {} workload not found", name),
                ref status => format!("Relay {} is not running (status: {})", name, status),
            };
            alerts.push(Alert {
                severity: Severity::Critical,
                subject: name.clone(),
                message,
                kind: AlertKind::RelayDown,
            });
        }

        if snapshot.restart_count > RESTART_ALERT_THRESHOLD {
            alerts.push(Alert {
                severity: Severity::Warning,
                subject: name.clone(),
                message: format!("Relay {} has {} restarts", name, snapshot.restart_count),
                kind: AlertKind::HighRestarts,
            });
        }

        if let Some(stats) = &evaluation.stats {
            if stats.total_handshakes > HANDSHAKE_ALERT_MIN_ATTEMPTS {
                if let Some(ratio) = stats.handshake_ratio().filter(|r| *r < HANDSHAKE_ALERT_RATIO) {
                    alerts.push(Alert {
                        severity: Severity::Warning,
                        subject: name.clone(),
                        message: format!(
                            "Low handshake completion rate on {} ({}%)",
                            name,
                            round1(ratio * 100.0)
                        ),
                        kind: AlertKind::LowHandshakeRate,
                    });
                }
            }
        }
    }

    for quota in quotas.iter().filter(|q| q.is_near_limit()) {
        alerts.push(Alert {
            severity: Severity::Warning,
            subject: quota.name.clone(),
            message: format!(
                "Tenant {} uses {}/{} relays",
                quota.name, quota.used_relays, quota.max_relays
            ),
            kind: AlertKind::QuotaWarning,
        });
    }

    AlertReport::new(alerts)
}
