//! Control plane for the relay fleet
//!
//! Inspects, scores and aggregates relays, derives alerts and the key/relay
//! topology, provisions relay workloads, manages keys and tenants and
//! pushes metrics to Zabbix.
pub mod aggregate;
pub mod alerts;
pub mod evaluator;
pub mod keys;
pub mod monitor;
pub mod poller;
pub mod provision;
pub mod scorer;
pub mod source;
pub mod stats;
pub mod tenants;
pub mod topology;
pub mod zabbix;
pub mod zabbix_api;

pub use aggregate::summarize;
pub use alerts::{
    derive_alerts, HANDSHAKE_ALERT_MIN_ATTEMPTS, HANDSHAKE_ALERT_RATIO, RESTART_ALERT_THRESHOLD,
};
pub use evaluator::{Evaluator, EvaluatorConfig, RelayEvaluation};
pub use keys::{CreateKey, KeyStore, KeyStoreError, MAX_ALIAS_LEN};
pub use monitor::{FleetMonitor, MonitorError};
pub use poller::{MonitoringPoller, DEFAULT_POLL_INTERVAL};
pub use provision::{
    normalize_relay_name, CreateRelay, ProvisionError, ProvisionOutcome, RelayProvisioner,
    FIRST_WEB_PORT, MAX_WORKLOAD_NAME_LEN,
};
pub use scorer::{ConnectedPeerRule, HealthScorer, ScoringPolicy};
pub use source::{DatabaseFleetSource, FleetSource, FleetSourceError};
pub use stats::{HttpStatsFetcher, StatsFetchError, StatsFetcherConfig, StatsProvider};
pub use tenants::{normalize_slug, CreateTenant, TenantStore, TenantStoreError, UpdateTenant};
pub use topology::{build_topology, live_peer_slots};
pub use zabbix::{SenderItem, SenderResponse, ZabbixCodec, ZabbixError, ZabbixSender};
pub use zabbix_api::{ZabbixApi, ZabbixApiConfig, ZabbixApiError, HOST_GROUP_NAME, ITEM_DEFS};
