//! Zabbix sender ("trapper") protocol client
//!
//! Frame layout: `ZBXD` | flags (`0x01`) | payload length (u64 LE) | JSON payload.
//! Requests carry `{"request":"sender data","data":[...]}`; the server
//! answers with the same framing and `{"response":"success","info":"..."}`.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const FRAME_MAGIC: &[u8; 4] = b"ZBXD";
pub const FLAG_PROTOCOL: u8 = 0x01;
pub const FLAG_COMPRESSED: u8 = 0x02;
pub const HEADER_LEN: usize = 13;
pub const DEFAULT_SENDER_PORT: u16 = 10051;

#[derive(Debug, Error)]
pub enum ZabbixError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zabbix server did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zabbix server rejected data: {0}")]
    Rejected(String),
}

/// One trapper value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderItem {
    pub host: String,
    pub key: String,
    pub value: String,
}

impl SenderItem {
    pub fn new(host: impl Into<String>, key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SenderRequest<'a> {
    request: &'static str,
    data: &'a [SenderItem],
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SenderResponse {
    pub response: String,
    #[serde(default)]
    pub info: String,
}

/// Counters from the `info` line
/// (`processed: 7; failed: 0; total: 7; seconds spent: 0.000055`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderInfo {
    pub processed: u64,
    pub failed: u64,
    pub total: u64,
}

impl SenderResponse {
    pub fn is_success(&self) -> bool {
        self.response == "success"
    }

    pub fn parse_info(&self) -> SenderInfo {
        let mut info = SenderInfo::default();
        for part in self.info.split(';') {
            let Some((name, value)) = part.split_once(':') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<u64>() else {
                continue;
            };
            match name.trim() {
                "processed" => info.processed = value,
                "failed" => info.failed = value,
                "total" => info.total = value,
                _ => {}
            }
        }
        info
    }
}

/// Frame encoder/decoder
pub struct ZabbixCodec;

impl ZabbixCodec {
    /// Upper bound on a response payload
    pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

    pub fn encode(payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(FRAME_MAGIC);
        buf.extend_from_slice(&[FLAG_PROTOCOL]);
        buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        buf.extend_from_slice(payload);
        buf.freeze()
    }

    /// Validate a header and return the payload length it announces
    pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize, ZabbixError> {
        if &header[..4] != FRAME_MAGIC {
            return Err(ZabbixError::Protocol("bad frame magic".to_string()));
        }
        let flags = header[4];
        if flags & FLAG_PROTOCOL == 0 {
            return Err(ZabbixError::Protocol(format!("unexpected flags 0x{:02x}", flags)));
        }
        if flags & FLAG_COMPRESSED != 0 {
            return Err(ZabbixError::Protocol("compressed frames are not supported".to_string()));
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&header[5..13]);
        let len = usize::try_from(u64::from_le_bytes(len))
            .map_err(|_| ZabbixError::Protocol("payload length overflow".to_string()))?;
        if len > Self::MAX_PAYLOAD {
            return Err(ZabbixError::Protocol(format!("payload too large: {} bytes", len)));
        }
        Ok(len)
    }

    /// Decode one complete frame. `Ok(None)` means more data is needed.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Bytes>, ZabbixError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&buf[..HEADER_LEN]);
        let len = Self::decode_header(&header)?;

        if buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let _ = buf.split_to(HEADER_LEN);
        Ok(Some(buf.split_to(len).freeze()))
    }
}

/// Client pushing values to a Zabbix server or proxy
#[derive(Debug, Clone)]
pub struct ZabbixSender {
    addr: String,
    timeout: Duration,
}

impl ZabbixSender {
    /// `addr` is `host:port`; the port defaults to 10051 when omitted
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let addr = if addr.rsplit_once(':').is_some_and(|(_, p)| p.parse::<u16>().is_ok()) {
            addr
        } else {
            format!("{}:{}", addr, DEFAULT_SENDER_PORT)
        };
        Self {
            addr,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send a batch of values in one connection
    pub async fn send(&self, items: &[SenderItem]) -> Result<SenderResponse, ZabbixError> {
        let payload = serde_json::to_vec(&SenderRequest {
            request: "sender data",
            data: items,
        })?;

        let response = tokio::time::timeout(self.timeout, self.exchange(&payload))
            .await
            .map_err(|_| ZabbixError::Timeout(self.timeout))??;

        let response: SenderResponse = serde_json::from_slice(&response)?;
        debug!(addr = %self.addr, items = items.len(), info = %response.info, "Zabbix sender response");

        if !response.is_success() {
            return Err(ZabbixError::Rejected(response.info.clone()));
        }
        Ok(response)
    }

    async fn exchange(&self, payload: &[u8]) -> Result<Bytes, ZabbixError> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(&ZabbixCodec::encode(payload)).await?;
        stream.flush().await?;
        read_frame(&mut stream).await
    }
}

/// Read until one complete frame is buffered
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Bytes, ZabbixError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(payload) = ZabbixCodec::decode(&mut buf)? {
            return Ok(payload);
        }
        if reader.read_buf(&mut buf).await? == 0 {
            return Err(ZabbixError::Protocol(format!(
                "connection closed after {} bytes",
                buf.len()
            )));
        }
    }
}
