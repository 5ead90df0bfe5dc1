//! Statistics document served by a relay's management endpoint

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Statistics document read from `GET http://<relay>:<port>/stats`.
///
/// Only the fields the control plane depends on are typed; anything else the
/// relay reports is kept in `extra` so the raw document can be proxied as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Handshake attempts since the relay started
    #[serde(default)]
    pub total_handshakes: u64,
    /// Handshakes that completed. Relays have been seen reporting more
    /// successes than attempts after a counter reset.
    #[serde(default)]
    pub successful_handshakes: u64,
    /// Peers known to the relay
    #[serde(default)]
    pub peers: PeerTable,
    /// Cumulative bytes forwarded
    #[serde(default)]
    pub total_bytes_transferred: u64,
    /// Relay process uptime
    #[serde(default)]
    pub uptime_seconds: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayStats {
    /// Successful / total handshakes in [0, 1], `None` when nothing was
    /// attempted yet
    pub fn handshake_ratio(&self) -> Option<f64> {
        if self.total_handshakes == 0 {
            None
        } else {
            let ratio = self.successful_handshakes as f64 / self.total_handshakes as f64;
            Some(ratio.clamp(0.0, 1.0))
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn bytes_received(&self) -> u64 {
        self.peers.iter().map(|p| p.stats.bytes_received).sum()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.peers.iter().map(|p| p.stats.bytes_sent).sum()
    }
}

/// Per-peer record. Relays report the link state either as an integer
/// (`1` = connected), a string (`"connected"`) or a boolean, so the raw value
/// is kept and interpreted by [`PeerStats::connectivity_flag`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl PeerStats {
    /// Explicit connectivity flag, `None` when the relay did not report one
    pub fn connectivity_flag(&self) -> Option<bool> {
        match self.status.as_ref()? {
            Value::Null => None,
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_i64() == Some(1)),
            Value::String(s) => Some(s.eq_ignore_ascii_case("connected")),
            _ => Some(false),
        }
    }

    /// True when the peer carries a current endpoint address
    pub fn has_live_endpoint(&self) -> bool {
        match self.endpoint.as_deref() {
            Some(ep) => !ep.is_empty() && ep != "(none)",
            None => false,
        }
    }
}

/// A peer identifier together with its record
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEntry {
    pub id: String,
    pub stats: PeerStats,
}

/// Peers keyed by identifier.
///
/// Accepts both the mapping form (`{"<key>": {...}}`) and the list form
/// (`[{"public_key": "...", ...}]`). Entries that are not objects still count
/// as peers but carry no connectivity information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerTable(Vec<PeerEntry>);

impl PeerTable {
    pub fn new(entries: Vec<PeerEntry>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.0.iter()
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(
                map.into_iter()
                    .map(|(id, v)| PeerEntry {
                        id,
                        stats: parse_peer(v),
                    })
                    .collect(),
            ),
            Value::Array(items) => Self(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, v)| {
                        let id = ["public_key", "id"]
                            .iter()
                            .find_map(|k| v.get(*k).and_then(Value::as_str))
                            .map(str::to_string)
                            .unwrap_or_else(|| idx.to_string());
                        PeerEntry {
                            id,
                            stats: parse_peer(v),
                        }
                    })
                    .collect(),
            ),
            _ => Self::default(),
        }
    }
}

fn parse_peer(value: Value) -> PeerStats {
    if value.is_object() {
        serde_json::from_value(value).unwrap_or_default()
    } else {
        PeerStats::default()
    }
}

impl<'de> Deserialize<'de> for PeerTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(PeerTable::from_value(raw))
    }
}

impl Serialize for PeerTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.id, &entry.stats)?;
        }
        map.end()
    }
}
