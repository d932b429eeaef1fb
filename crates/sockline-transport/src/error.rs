use crate::traits::TransportKind;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport could not be opened.
    #[error("failed to open {kind} transport to {url}: {reason}")]
    Open {
        kind: TransportKind,
        url: String,
        reason: String,
    },

    /// The peer did not produce its first frame before the open deadline.
    #[error("{kind} transport to {url} timed out after {timeout:?}")]
    OpenTimeout {
        kind: TransportKind,
        url: String,
        timeout: std::time::Duration,
    },

    /// The security collaborator rejected the peer's certificate chain.
    #[error("trust evaluation rejected host {host}")]
    TrustRejected { host: String },

    /// The requested transport kind is not provided by this connector.
    #[error("{0} transport is not available")]
    Unavailable(TransportKind),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
