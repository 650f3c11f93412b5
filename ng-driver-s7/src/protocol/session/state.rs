use super::super::error::{Error, Result};
use crate::types::S7ClientConfig;
use std::time::Duration;

/// Public lifecycle state exposed to API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycleState {
    /// No transport; initial state and the state after any failure
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// COTP and Setup Communication exchange
    Handshaking,
    /// Accepting requests
    Ready,
}

/// Session configuration for the S7 handshake and request timeouts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub tsap_src: u16,
    pub tsap_dst: u16,
    /// PDU size proposed in Setup Communication
    pub preferred_pdu_size: u16,
    pub preferred_amq_caller: u16,
    pub preferred_amq_callee: u16,
    /// Upper bound of bytes moved by one item; further capped by the negotiated PDU
    pub max_item_bytes: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// TCP_NODELAY; small request/response PDUs
    pub tcp_nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 102,
            tsap_src: 0x0100,
            tsap_dst: 0x0301,
            preferred_pdu_size: 480,
            preferred_amq_caller: 8,
            preferred_amq_callee: 8,
            max_item_bytes: 180,
            connect_timeout: Duration::from_millis(10_000),
            read_timeout: Duration::from_millis(10_000),
            write_timeout: Duration::from_millis(10_000),
            tcp_nodelay: true,
        }
    }
}

impl TryFrom<&S7ClientConfig> for SessionConfig {
    type Error = Error;

    fn try_from(cfg: &S7ClientConfig) -> Result<Self> {
        let tsap = cfg.tsap_pair()?;
        Ok(Self {
            host: cfg.host.clone(),
            port: cfg.port,
            tsap_src: tsap.local.into(),
            tsap_dst: tsap.remote.into(),
            preferred_pdu_size: cfg.preferred_pdu_size,
            preferred_amq_caller: cfg.preferred_amq_caller,
            preferred_amq_callee: cfg.preferred_amq_callee,
            max_item_bytes: cfg.max_item_bytes,
            connect_timeout: cfg.connection.connect_timeout(),
            read_timeout: cfg.connection.read_timeout(),
            write_timeout: cfg.connection.write_timeout(),
            tcp_nodelay: true,
        })
    }
}
