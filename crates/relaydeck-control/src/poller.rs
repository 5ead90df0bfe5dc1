//! Periodic push of relay metrics to Zabbix
//!
//! With a JSON-RPC endpoint configured, each relay host and its trapper
//! items are registered before the first push.
//!
//! The poller is the only writer of the last [`SyncReport`]. Readers take a
//! copy through [`MonitoringPoller::state`] or follow changes with
//! [`MonitoringPoller::subscribe`].

use crate::evaluator::{Evaluator, RelayEvaluation};
use crate::source::FleetSource;
use crate::zabbix::{SenderItem, ZabbixSender};
use crate::zabbix_api::{ZabbixApi, ZabbixApiError, ZabbixSession};
use relaydeck_orchestrator::{workload_name, DEFAULT_NAME_PREFIX};
use relaydeck_proto::{round2, FleetScope, SyncReport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Open API session for one sync run
struct Registration<'a> {
    session: ZabbixSession<'a>,
    group_id: String,
}

pub struct MonitoringPoller {
    source: Arc<dyn FleetSource>,
    evaluator: Evaluator,
    sender: ZabbixSender,
    api: Option<ZabbixApi>,
    /// Hosts whose items are known to exist
    registered: Mutex<HashSet<String>>,
    interval: Duration,
    host_prefix: String,
    state: watch::Sender<SyncReport>,
    /// Serializes runs triggered by the timer and by the API
    run_lock: Mutex<()>,
}

impl MonitoringPoller {
    pub fn new(source: Arc<dyn FleetSource>, evaluator: Evaluator, sender: ZabbixSender) -> Self {
        let (state, _) = watch::channel(SyncReport::never());
        Self {
            source,
            evaluator,
            sender,
            api: None,
            registered: Mutex::new(HashSet::new()),
            interval: DEFAULT_POLL_INTERVAL,
            host_prefix: DEFAULT_NAME_PREFIX.to_string(),
            state,
            run_lock: Mutex::new(()),
        }
    }

    /// Register hosts and items through the Zabbix API before pushing
    pub fn with_registration(mut self, api: ZabbixApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Prefix turning a relay name into its Zabbix host name
    pub fn with_host_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.host_prefix = prefix.into();
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Last completed run
    pub fn state(&self) -> SyncReport {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncReport> {
        self.state.subscribe()
    }

    /// Run one sync and record its result
    pub async fn run_once(&self) -> SyncReport {
        let _guard = self.run_lock.lock().await;

        let report = self.sync().await;
        self.state.send_replace(report.clone());
        report
    }

    async fn sync(&self) -> SyncReport {
        let registration = match &self.api {
            Some(api) => match self.open_registration(api).await {
                Ok(registration) => Some(registration),
                Err(e) => {
                    let message = format!("Zabbix API unreachable: {}", e);
                    error!("{}", message);
                    return SyncReport::failed(message);
                }
            },
            None => None,
        };

        let relays = match self.source.list_relays(FleetScope::Global).await {
            Ok(relays) => relays,
            Err(e) => {
                error!("Relay list unavailable for Zabbix sync: {}", e);
                return SyncReport::failed(e.to_string());
            }
        };

        let total = relays.len();
        let evaluations = self.evaluator.evaluate_all(relays).await;
        let report = self.push_all(&evaluations, registration.as_ref()).await;
        info!(
            pushed = report.hosts_pushed,
            relays = total,
            errors = report.errors.len(),
            "Zabbix sync done"
        );
        report
    }

    async fn open_registration<'a>(
        &self,
        api: &'a ZabbixApi,
    ) -> Result<Registration<'a>, ZabbixApiError> {
        let session = api.login().await?;
        let group_id = session.ensure_host_group().await?;
        Ok(Registration { session, group_id })
    }

    /// Make sure the host and its items exist, once per host
    async fn register(&self, registration: &Registration<'_>, host: &str) -> Result<(), ZabbixApiError> {
        let mut registered = self.registered.lock().await;
        if registered.contains(host) {
            return Ok(());
        }
        let host_id = registration
            .session
            .ensure_host(host, &registration.group_id)
            .await?;
        registration.session.ensure_items(&host_id).await?;
        registered.insert(host.to_string());
        Ok(())
    }

    async fn push_all(
        &self,
        evaluations: &[RelayEvaluation],
        registration: Option<&Registration<'_>>,
    ) -> SyncReport {
        let mut pushed = 0;
        let mut errors = Vec::new();

        for evaluation in evaluations {
            let host = workload_name(&self.host_prefix, &evaluation.relay.name);
            let Some(items) = self.metric_items(&host, evaluation) else {
                debug!(host = %host, "No stats, skipping");
                continue;
            };

            if let Some(registration) = registration {
                if let Err(e) = self.register(registration, &host).await {
                    warn!(host = %host, "Failed to register Zabbix host: {}", e);
                    errors.push(format!("{}: {}", host, e));
                    continue;
                }
            }

            match self.sender.send(&items).await {
                Ok(response) => {
                    let info = response.parse_info();
                    debug!(host = %host, processed = info.processed, failed = info.failed, "Metrics pushed");
                    pushed += 1;
                }
                Err(e) => {
                    warn!(host = %host, "Failed to push metrics: {}", e);
                    errors.push(format!("{}: {}", host, e));
                }
            }
        }

        SyncReport::completed(pushed, errors)
    }

    /// Flat trapper values for one relay, `None` when its stats are unavailable
    pub fn metric_items(&self, host: &str, evaluation: &RelayEvaluation) -> Option<Vec<SenderItem>> {
        let stats = evaluation.stats.as_ref()?;

        let active = self.evaluator.scorer().peer_rule().connected_peers(stats);
        let success_pct = stats
            .handshake_ratio()
            .map(|ratio| round2(ratio * 100.0))
            .unwrap_or(0.0);

        Some(vec![
            SenderItem::new(host, "wpex.bytes_rx", stats.bytes_received()),
            SenderItem::new(host, "wpex.bytes_tx", stats.bytes_sent()),
            SenderItem::new(host, "wpex.active_peers", active),
            SenderItem::new(host, "wpex.total_peers", stats.peer_count()),
            SenderItem::new(host, "wpex.handshake_success", success_pct),
            SenderItem::new(host, "wpex.total_handshakes", stats.total_handshakes),
            SenderItem::new(host, "wpex.uptime_seconds", stats.uptime_seconds),
            SenderItem::new(host, "wpex.health_score", evaluation.health.score),
        ])
    }

    /// Start the timer loop. The first tick fires immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_secs = self.interval.as_secs(),
                server = %self.sender.addr(),
                "Zabbix poller started"
            );

            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
