//! Health scoring of a single relay
//!
//! `score(snapshot, stats)` is a pure function of the orchestrator snapshot,
//! the optional stats document and the configured policy.

use relaydeck_proto::{
    round1, ComponentKind, HealthComponent, HealthScore, OrchestratorSnapshot, RelayStats,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How components are combined into the final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringPolicy {
    /// Weighted mean over the components present
    #[default]
    WeightedAverage,
    /// Fixed deductions from 100 per threshold band
    PenaltySubtraction,
}

impl FromStr for ScoringPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted" => Ok(ScoringPolicy::WeightedAverage),
            "penalty" => Ok(ScoringPolicy::PenaltySubtraction),
            other => Err(format!(
                "unknown scoring policy '{}', expected 'weighted' or 'penalty'",
                other
            )),
        }
    }
}

impl fmt::Display for ScoringPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringPolicy::WeightedAverage => f.write_str("weighted"),
            ScoringPolicy::PenaltySubtraction => f.write_str("penalty"),
        }
    }
}

/// Which peers count as connected. One rule is applied to every peer of
/// a score computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectedPeerRule {
    /// Only an explicit connectivity flag counts
    #[default]
    StatusFlag,
    /// The flag when present, else a live endpoint
    StatusOrEndpoint,
}

impl FromStr for ConnectedPeerRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(ConnectedPeerRule::StatusFlag),
            "status-or-endpoint" => Ok(ConnectedPeerRule::StatusOrEndpoint),
            other => Err(format!(
                "unknown peer rule '{}', expected 'status' or 'status-or-endpoint'",
                other
            )),
        }
    }
}

impl ConnectedPeerRule {
    pub fn connected_peers(&self, stats: &RelayStats) -> usize {
        stats
            .peers
            .iter()
            .filter(|peer| match (self, peer.stats.connectivity_flag()) {
                (_, Some(flag)) => flag,
                (ConnectedPeerRule::StatusFlag, None) => false,
                (ConnectedPeerRule::StatusOrEndpoint, None) => peer.stats.has_live_endpoint(),
            })
            .count()
    }
}

const WEIGHT_CONTAINER: f64 = 0.20;
const WEIGHT_RESTARTS: f64 = 0.15;
const WEIGHT_HANDSHAKE: f64 = 0.35;
const WEIGHT_CONNECTIVITY: f64 = 0.30;

fn weight(kind: ComponentKind) -> f64 {
    match kind {
        ComponentKind::Container => WEIGHT_CONTAINER,
        ComponentKind::Restarts => WEIGHT_RESTARTS,
        ComponentKind::HandshakeRate => WEIGHT_HANDSHAKE,
        ComponentKind::Connectivity => WEIGHT_CONNECTIVITY,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScorer {
    policy: ScoringPolicy,
    peer_rule: ConnectedPeerRule,
}

impl HealthScorer {
    pub fn new(policy: ScoringPolicy, peer_rule: ConnectedPeerRule) -> Self {
        Self { policy, peer_rule }
    }

    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    pub fn peer_rule(&self) -> ConnectedPeerRule {
        self.peer_rule
    }

    pub fn score(&self, snapshot: &OrchestratorSnapshot, stats: Option<&RelayStats>) -> HealthScore {
        if !snapshot.status.is_running() {
            let mut components = BTreeMap::new();
            components.insert(
                ComponentKind::Container,
                HealthComponent::new(0.0, format!("Container {}", snapshot.status)),
            );
            return HealthScore {
                score: 0.0,
                components,
            };
        }

        match self.policy {
            ScoringPolicy::WeightedAverage => self.weighted(snapshot.restart_count, stats),
            ScoringPolicy::PenaltySubtraction => self.penalty(snapshot.restart_count, stats),
        }
    }

    fn weighted(&self, restart_count: u32, stats: Option<&RelayStats>) -> HealthScore {
        let mut components = BTreeMap::new();
        components.insert(ComponentKind::Container, HealthComponent::new(100.0, "Running"));

        let restarts = (100.0 - f64::from(restart_count) * 10.0).max(0.0);
        components.insert(
            ComponentKind::Restarts,
            HealthComponent::new(restarts, format!("{} restarts", restart_count)),
        );

        if let Some(stats) = stats {
            let handshake = match stats.handshake_ratio() {
                Some(ratio) => {
                    let pct = round1(ratio * 100.0);
                    HealthComponent::new(pct, format!("{:.1}% success", pct))
                }
                None => HealthComponent::new(100.0, "No handshakes yet"),
            };
            components.insert(ComponentKind::HandshakeRate, handshake);

            let total = stats.peer_count();
            let connectivity = if total > 0 {
                let connected = self.peer_rule.connected_peers(stats);
                HealthComponent::new(
                    round1(connected as f64 / total as f64 * 100.0),
                    format!("{}/{} peers connected", connected, total),
                )
            } else {
                HealthComponent::new(100.0, "No peers tracked")
            };
            components.insert(ComponentKind::Connectivity, connectivity);
        }

        // Renormalize over the weights actually used
        let (weighted_sum, total_weight) = components
            .iter()
            .fold((0.0, 0.0), |(sum, weights), (kind, component)| {
                (sum + component.score * weight(*kind), weights + weight(*kind))
            });

        let score = if total_weight > 0.0 {
            round1((weighted_sum / total_weight).clamp(0.0, 100.0))
        } else {
            0.0
        };

        HealthScore { score, components }
    }

    fn penalty(&self, restart_count: u32, stats: Option<&RelayStats>) -> HealthScore {
        let mut components = BTreeMap::new();
        components.insert(ComponentKind::Container, HealthComponent::new(100.0, "Running"));

        let restart_penalty = match restart_count {
            n if n > 5 => 15.0,
            n if n > 2 => 8.0,
            n if n > 0 => 3.0,
            _ => 0.0,
        };
        components.insert(
            ComponentKind::Restarts,
            HealthComponent::new(
                100.0 - restart_penalty,
                format!("{} restarts (-{})", restart_count, restart_penalty),
            ),
        );

        let mut deduction = restart_penalty;

        if let Some(stats) = stats {
            let handshake = match stats.handshake_ratio() {
                Some(ratio) => {
                    let penalty = if ratio < 0.5 {
                        25.0
                    } else if ratio < 0.8 {
                        15.0
                    } else if ratio < 0.95 {
                        5.0
                    } else {
                        0.0
                    };
                    deduction += penalty;
                    HealthComponent::new(
                        100.0 - penalty,
                        format!("{:.1}% success (-{})", round1(ratio * 100.0), penalty),
                    )
                }
                None => HealthComponent::new(100.0, "No handshakes yet"),
            };
            components.insert(ComponentKind::HandshakeRate, handshake);

            let total = stats.peer_count();
            let connectivity = if total > 0 {
                let connected = self.peer_rule.connected_peers(stats);
                let ratio = connected as f64 / total as f64;
                let penalty = if ratio < 0.5 {
                    20.0
                } else if ratio < 0.8 {
                    10.0
                } else {
                    0.0
                };
                deduction += penalty;
                HealthComponent::new(
                    100.0 - penalty,
                    format!("{}/{} peers connected (-{})", connected, total, penalty),
                )
            } else {
                HealthComponent::new(100.0, "No peers tracked")
            };
            components.insert(ComponentKind::Connectivity, connectivity);
        }

        HealthScore {
            score: round1((100.0 - deduction).clamp(0.0, 100.0)),
            components,
        }
    }
}
