use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Longest session id accepted from a peer.
pub const MAX_SID_LEN: usize = 128;

/// Heartbeat interval used when the open packet does not declare one.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;

/// Heartbeat timeout used when the open packet does not declare one.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Session parameters carried by the open packet body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    /// Opaque session id assigned by the peer.
    pub sid: String,
    /// Transport names the session may upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Heartbeat timeout in milliseconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    /// Largest payload the peer accepts, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

impl OpenInfo {
    /// Parse and validate an open packet body.
    pub fn parse(body: &str) -> Result<Self> {
        let info: OpenInfo = serde_json::from_str(body)
            .map_err(|err| FrameError::MalformedPayload(format!("open packet: {err}")))?;
        validate_sid(&info.sid)?;
        Ok(info)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }

    /// Returns true if the peer advertises `transport` as an upgrade target.
    pub fn can_upgrade_to(&self, transport: &str) -> bool {
        self.upgrades.iter().any(|name| name == transport)
    }
}

/// Reject empty or oversized session ids.
pub fn validate_sid(sid: &str) -> Result<()> {
    if sid.is_empty() || sid.len() > MAX_SID_LEN {
        return Err(FrameError::MalformedPayload(format!(
            "invalid session id length: {}",
            sid.len()
        )));
    }
    Ok(())
}
