use crate::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifetime of the underlying socket relative to logical operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionMode {
    /// Socket is opened once and reused across operations
    #[default]
    Persistent,
    /// A fresh socket is opened and closed around every operation
    Disposable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPolicy {
    #[serde(default = "ConnectionPolicy::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "ConnectionPolicy::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "ConnectionPolicy::default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub mode: ConnectionMode,
    /// Reconnect automatically when an operation hits a dropped connection
    #[serde(default = "ConnectionPolicy::default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub backoff: RetryPolicy,
}

impl ConnectionPolicy {
    fn default_connect_timeout_ms() -> u64 {
        10000
    }
    fn default_read_timeout_ms() -> u64 {
        10000
    }
    fn default_write_timeout_ms() -> u64 {
        10000
    }
    fn default_auto_reconnect() -> bool {
        true
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[inline]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[inline]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            connect_timeout_ms: ConnectionPolicy::default_connect_timeout_ms(),
            read_timeout_ms: ConnectionPolicy::default_read_timeout_ms(),
            write_timeout_ms: ConnectionPolicy::default_write_timeout_ms(),
            mode: ConnectionMode::default(),
            auto_reconnect: ConnectionPolicy::default_auto_reconnect(),
            backoff: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let p: ConnectionPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(p, ConnectionPolicy::default());
        assert_eq!(p.mode, ConnectionMode::Persistent);
        assert!(p.auto_reconnect);
        assert_eq!(p.read_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_disposable_mode() {
        let p: ConnectionPolicy =
            serde_json::from_str(r#"{"mode":"disposable","autoReconnect":false}"#).unwrap();
        assert_eq!(p.mode, ConnectionMode::Disposable);
        assert!(!p.auto_reconnect);
    }
}
