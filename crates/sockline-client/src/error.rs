use std::time::Duration;

use sockline_transport::{TransportError, TransportKind};

/// Errors surfaced by the protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// One transport candidate failed to open; fallback continues.
    #[error("failed to open {kind} transport on {path}: {source}")]
    TransportOpenFailed {
        kind: TransportKind,
        path: String,
        #[source]
        source: TransportError,
    },

    /// Every transport candidate failed.
    #[error("all {tried} transport candidates failed (last: {last})")]
    AllTransportsFailed { tried: usize, last: String },

    /// An open or handshake deadline passed.
    #[error("{operation} timed out after {timeout:?}")]
    ProtocolTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The primary transport closed or failed.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Reconnection attempts exceeded the configured maximum.
    #[error("reconnection gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The engine task is gone.
    #[error("engine stopped")]
    EngineStopped,

    /// A connection URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Packet decoding failed.
    #[error("frame error: {0}")]
    Frame(#[from] sockline_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
