//! Fleet KPI reduction

use crate::evaluator::RelayEvaluation;
use relaydeck_proto::{round1, round2, FleetSummary, RelaySummary};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Reduce per-relay evaluations to fleet KPIs.
///
/// Bandwidth and peers only count relays whose stats were available. The
/// health mean divides by the relay count floored at 1, so an empty fleet
/// scores 0.
pub fn summarize(evaluations: &[RelayEvaluation], tenants_active: u64) -> FleetSummary {
    let relays_total = evaluations.len();
    let relays_active = evaluations.iter().filter(|e| e.is_running()).count();

    let mut total_bytes: u64 = 0;
    let mut total_peers: usize = 0;
    let mut total_health = 0.0;

    let relays = evaluations
        .iter()
        .map(|evaluation| {
            let (bytes, peers) = evaluation
                .stats
                .as_ref()
                .map(|s| (s.total_bytes_transferred, s.peer_count()))
                .unwrap_or((0, 0));

            total_bytes = total_bytes.saturating_add(bytes);
            total_peers += peers;
            total_health += evaluation.health.score;

            RelaySummary {
                id: evaluation.relay.id,
                name: evaluation.relay.name.clone(),
                status: evaluation.snapshot.status.clone(),
                health: round1(evaluation.health.score),
                bytes_transferred: bytes,
                peers_count: peers,
            }
        })
        .collect();

    FleetSummary {
        relays_active,
        relays_total,
        tenants_active,
        bandwidth_aggregated_mb: round2(total_bytes as f64 / BYTES_PER_MB),
        total_peers,
        global_health_score: round1(total_health / relays_total.max(1) as f64),
        relays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::evaluation;
    use relaydeck_proto::RelayStatus;
    use serde_json::json;

    #[test]
    fn test_empty_fleet() {
        let summary = summarize(&[], 0);
        assert_eq!(summary.global_health_score, 0.0);
        assert_eq!(summary.relays_total, 0);
        assert_eq!(summary.bandwidth_aggregated_mb, 0.0);
        assert!(summary.relays.is_empty());
    }

    #[test]
    fn test_fleet_totals() {
        let evaluations = vec![
            evaluation(
                1,
                "alpha",
                RelayStatus::Running,
                0,
                Some(json!({
                    "total_bytes_transferred": 3 * 1024 * 1024,
                    "peers": {"a": {"status": 1}, "b": {"status": 1}}
                })),
            ),
            evaluation(2, "beta", RelayStatus::Running, 0, None),
            evaluation(
                3,
                "gamma",
                RelayStatus::Stopped,
                0,
                Some(json!({"total_bytes_transferred": 524288, "peers": {"c": {}}})),
            ),
        ];

        let summary = summarize(&evaluations, 2);
        assert_eq!(summary.relays_total, 3);
        assert_eq!(summary.relays_active, 2);
        assert_eq!(summary.tenants_active, 2);
        assert_eq!(summary.bandwidth_aggregated_mb, 3.5);
        assert_eq!(summary.total_peers, 3);
        // (100 + 100 + 0) / 3
        assert_eq!(summary.global_health_score, 66.7);

        let names: Vec<_> = summary.relays.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(summary.relays[1].bytes_transferred, 0);
        assert_eq!(summary.relays[2].status, RelayStatus::Stopped);
        assert_eq!(summary.relays[2].health, 0.0);
    }
}
