//! Zabbix JSON-RPC client used to register relay hosts and trapper items
//!
//! Registration is idempotent: groups, hosts and items are looked up first
//! and only created when missing.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Host group every relay host is placed in
pub const HOST_GROUP_NAME: &str = "WPEX Relays";

/// Zabbix trapper item type
const ITEM_TYPE_TRAPPER: u8 = 2;

/// Zabbix agent interface type
const INTERFACE_TYPE_AGENT: u8 = 1;

/// Trapper item the poller sends values for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemDef {
    pub key: &'static str,
    pub name: &'static str,
    pub units: &'static str,
    /// 0 = float, 3 = unsigned
    pub value_type: u8,
}

pub const ITEM_DEFS: &[ItemDef] = &[
    ItemDef { key: "wpex.bytes_rx", name: "Bytes Received (total)", units: "B", value_type: 3 },
    ItemDef { key: "wpex.bytes_tx", name: "Bytes Sent (total)", units: "B", value_type: 3 },
    ItemDef { key: "wpex.active_peers", name: "Active Peers", units: "", value_type: 3 },
    ItemDef { key: "wpex.total_peers", name: "Total Peers", units: "", value_type: 3 },
    ItemDef { key: "wpex.handshake_success", name: "Handshake Success Rate", units: "%", value_type: 0 },
    ItemDef { key: "wpex.total_handshakes", name: "Total Handshakes", units: "", value_type: 3 },
    ItemDef { key: "wpex.uptime_seconds", name: "Relay Uptime", units: "s", value_type: 0 },
    ItemDef { key: "wpex.health_score", name: "Health Score", units: "", value_type: 0 },
];

#[derive(Debug, Error)]
pub enum ZabbixApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} failed ({code}): {message} {data}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
        data: String,
    },

    #[error("Unexpected {method} response: {detail}")]
    Unexpected { method: String, detail: String },
}

#[derive(Debug, Clone)]
pub struct ZabbixApiConfig {
    /// Full JSON-RPC endpoint, e.g. `http://zabbix:8080/api_jsonrpc.php`
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

impl ZabbixApiConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: "Admin".to_string(),
            password: "zabbix".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

pub struct ZabbixApi {
    client: reqwest::Client,
    config: ZabbixApiConfig,
    next_id: AtomicU64,
}

impl ZabbixApi {
    pub fn new(config: ZabbixApiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        token: Option<&str>,
    ) -> Result<Value, ZabbixApiError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed)
        });

        let mut request = self
            .client
            .post(&self.config.url)
            .json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response: RpcResponse = request.send().await?.error_for_status()?.json().await?;
        if let Some(error) = response.error {
            return Err(ZabbixApiError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        response.result.ok_or_else(|| ZabbixApiError::Unexpected {
            method: method.to_string(),
            detail: "no result".to_string(),
        })
    }

    /// Authenticate and return a session bound to the token
    pub async fn login(&self) -> Result<ZabbixSession<'_>, ZabbixApiError> {
        let result = self
            .call(
                "user.login",
                json!({"username": self.config.user, "password": self.config.password}),
                None,
            )
            .await?;
        let token = result
            .as_str()
            .ok_or_else(|| unexpected("user.login", &result))?
            .to_string();
        debug!(url = %self.config.url, "Zabbix API session opened");
        Ok(ZabbixSession { api: self, token })
    }
}

fn unexpected(method: &str, value: &Value) -> ZabbixApiError {
    ZabbixApiError::Unexpected {
        method: method.to_string(),
        detail: value.to_string(),
    }
}

/// First `field` of the first object in a `*.get` result
fn first_id(result: &Value, field: &str) -> Option<String> {
    result
        .as_array()?
        .first()?
        .get(field)?
        .as_str()
        .map(str::to_string)
}

/// First id of a `*.create` result, e.g. `{"hostids": ["10501"]}`
fn created_id(method: &str, result: &Value, field: &str) -> Result<String, ZabbixApiError> {
    result
        .get(field)
        .and_then(|ids| ids.get(0))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| unexpected(method, result))
}

pub struct ZabbixSession<'a> {
    api: &'a ZabbixApi,
    token: String,
}

impl ZabbixSession<'_> {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ZabbixApiError> {
        self.api.call(method, params, Some(&self.token)).await
    }

    pub async fn ensure_host_group(&self) -> Result<String, ZabbixApiError> {
        let found = self
            .call(
                "hostgroup.get",
                json!({"filter": {"name": [HOST_GROUP_NAME]}, "output": ["groupid"]}),
            )
            .await?;
        if let Some(id) = first_id(&found, "groupid") {
            return Ok(id);
        }

        let created = self
            .call("hostgroup.create", json!({"name": HOST_GROUP_NAME}))
            .await?;
        let id = created_id("hostgroup.create", &created, "groupids")?;
        info!(group = HOST_GROUP_NAME, groupid = %id, "Zabbix host group created");
        Ok(id)
    }

    pub async fn ensure_host(&self, host: &str, group_id: &str) -> Result<String, ZabbixApiError> {
        let found = self
            .call(
                "host.get",
                json!({"filter": {"host": [host]}, "output": ["hostid"]}),
            )
            .await?;
        if let Some(id) = first_id(&found, "hostid") {
            return Ok(id);
        }

        let created = self
            .call(
                "host.create",
                json!({
                    "host": host,
                    "name": host,
                    "groups": [{"groupid": group_id}],
                    "interfaces": [{
                        "type": INTERFACE_TYPE_AGENT,
                        "main": 1,
                        "useip": 1,
                        "ip": "127.0.0.1",
                        "dns": "",
                        "port": "10050"
                    }]
                }),
            )
            .await?;
        let id = created_id("host.create", &created, "hostids")?;
        info!(host, hostid = %id, "Zabbix host created");
        Ok(id)
    }

    /// Create missing trapper items; returns item ids by key
    pub async fn ensure_items(&self, host_id: &str) -> Result<HashMap<String, String>, ZabbixApiError> {
        let existing = self
            .call(
                "item.get",
                json!({
                    "hostids": host_id,
                    "search": {"key_": "wpex."},
                    "output": ["itemid", "key_"]
                }),
            )
            .await?;

        let mut by_key: HashMap<String, String> = existing
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let key = item.get("key_")?.as_str()?;
                        let id = item.get("itemid")?.as_str()?;
                        Some((key.to_string(), id.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        for def in ITEM_DEFS {
            if by_key.contains_key(def.key) {
                continue;
            }
            let created = self
                .call(
                    "item.create",
                    json!({
                        "hostid": host_id,
                        "name": def.name,
                        "key_": def.key,
                        "type": ITEM_TYPE_TRAPPER,
                        "value_type": def.value_type,
                        "units": def.units,
                        "delay": 0
                    }),
                )
                .await?;
            let id = created_id("item.create", &created, "itemids")?;
            debug!(hostid = %host_id, key = def.key, itemid = %id, "Zabbix item created");
            by_key.insert(def.key.to_string(), id);
        }

        Ok(by_key)
    }
}
