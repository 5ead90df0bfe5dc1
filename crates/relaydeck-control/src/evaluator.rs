//! Per-relay evaluation: status + stats fetch + score
//!
//! Relays are evaluated independently and concurrently; results come back
//! in input order. Each relay runs in its own task so a failure (or panic)
//! while evaluating one relay only degrades that relay. Relays not finished
//! by the overall deadline are reported as `unknown` with no stats.

use crate::scorer::HealthScorer;
use crate::stats::StatsProvider;
use futures::stream::{self, StreamExt};
use relaydeck_orchestrator::OrchestratorBackend;
use relaydeck_proto::{HealthScore, OrchestratorSnapshot, RelayRecord, RelayStats};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Point-in-time view of one relay and its score
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvaluation {
    pub relay: RelayRecord,
    pub snapshot: OrchestratorSnapshot,
    pub stats: Option<RelayStats>,
    pub health: HealthScore,
}

impl RelayEvaluation {
    pub fn is_running(&self) -> bool {
        self.snapshot.status.is_running()
    }
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Bound on a single status check
    pub orchestrator_timeout: Duration,
    /// Bound on a whole batch
    pub deadline: Duration,
    /// Relays evaluated at the same time
    pub concurrency: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            orchestrator_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(10),
            concurrency: 8,
        }
    }
}

impl EvaluatorConfig {
    pub fn with_orchestrator_timeout(mut self, timeout: Duration) -> Self {
        self.orchestrator_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[derive(Clone)]
pub struct Evaluator {
    orchestrator: Arc<dyn OrchestratorBackend>,
    stats: Arc<dyn StatsProvider>,
    scorer: HealthScorer,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(
        orchestrator: Arc<dyn OrchestratorBackend>,
        stats: Arc<dyn StatsProvider>,
        scorer: HealthScorer,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            orchestrator,
            stats,
            scorer,
            config,
        }
    }

    pub fn scorer(&self) -> &HealthScorer {
        &self.scorer
    }

    pub fn stats_provider(&self) -> &Arc<dyn StatsProvider> {
        &self.stats
    }

    /// Status check bounded by the orchestrator timeout
    pub async fn check_status(&self, relay_name: &str) -> OrchestratorSnapshot {
        match tokio::time::timeout(
            self.config.orchestrator_timeout,
            self.orchestrator.status(relay_name),
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!(relay = %relay_name, "Status check timed out");
                OrchestratorSnapshot::error()
            }
        }
    }

    /// Evaluate one relay. Status check and stats fetch are independent reads and run together.
    pub async fn evaluate(&self, relay: RelayRecord) -> RelayEvaluation {
        let (snapshot, stats) = tokio::join!(
            self.check_status(&relay.name),
            self.stats.fetch(&relay.name)
        );
        let health = self.scorer.score(&snapshot, stats.as_ref());

        debug!(
            relay = %relay.name,
            status = %snapshot.status,
            restarts = snapshot.restart_count,
            stats = stats.is_some(),
            score = health.score,
            "Relay evaluated"
        );

        RelayEvaluation {
            relay,
            snapshot,
            stats,
            health,
        }
    }

    fn degraded(&self, relay: RelayRecord, snapshot: OrchestratorSnapshot) -> RelayEvaluation {
        let health = self.scorer.score(&snapshot, None);
        RelayEvaluation {
            relay,
            snapshot,
            stats: None,
            health,
        }
    }

    /// Evaluate every relay, preserving input order
    pub async fn evaluate_all(&self, relays: Vec<RelayRecord>) -> Vec<RelayEvaluation> {
        let deadline = Instant::now() + self.config.deadline;

        let tasks = relays.into_iter().map(|relay| {
            let evaluator = self.clone();
            let record = relay.clone();
            async move {
                match run_isolated(deadline, evaluator.clone().evaluate_owned(relay)).await {
                    Isolated::Done(evaluation) => evaluation,
                    Isolated::Failed => {
                        evaluator.degraded(record, OrchestratorSnapshot::error())
                    }
                    Isolated::Expired => {
                        evaluator.degraded(record, OrchestratorSnapshot::unknown())
                    }
                }
            }
        });

        stream::iter(tasks)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    /// Stats of every relay (one fetch each), preserving input order
    pub async fn fetch_stats_all(&self, relays: &[RelayRecord]) -> Vec<Option<RelayStats>> {
        let deadline = Instant::now() + self.config.deadline;

        let tasks = relays.iter().map(|relay| {
            let provider = self.stats.clone();
            let name = relay.name.clone();
            async move {
                let fetch = async move { provider.fetch(&name).await };
                match run_isolated(deadline, fetch).await {
                    Isolated::Done(stats) => stats,
                    Isolated::Failed | Isolated::Expired => None,
                }
            }
        }).collect::<Vec<_>>();

        stream::iter(tasks)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn evaluate_owned(self, relay: RelayRecord) -> RelayEvaluation {
        self.evaluate(relay).await
    }
}

enum Isolated<T> {
    Done(T),
    /// The task panicked or was cancelled
    Failed,
    /// The batch deadline passed first
    Expired,
}

/// Run a unit of work in its own task, bounded by `deadline`
async fn run_isolated<F>(deadline: Instant, work: F) -> Isolated<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(work);
    let abort = handle.abort_handle();

    match tokio::time::timeout_at(deadline, handle).await {
        Ok(Ok(output)) => Isolated::Done(output),
        Ok(Err(e)) => {
            warn!("Relay evaluation task failed: {}", e);
            Isolated::Failed
        }
        Err(_) => {
            abort.abort();
            debug!("Relay evaluation abandoned at deadline");
            Isolated::Expired
        }
    }
}
