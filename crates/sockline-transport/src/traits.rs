use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::security::SecurityPolicy;

/// The two physical transport kinds the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    /// Persistent duplex socket.
    WebSocket,
    /// Request/response long-polling channel.
    Polling,
}

impl TransportKind {
    /// Name used in the `transport` query parameter and in upgrade lists.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }

    /// Parse a transport name as advertised by the peer.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "websocket" => Some(TransportKind::WebSocket),
            "polling" => Some(TransportKind::Polling),
            _ => None,
        }
    }

    /// Returns true for the persistent duplex kind.
    pub fn is_persistent(self) -> bool {
        matches!(self, TransportKind::WebSocket)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a connector needs to open one transport.
#[derive(Clone)]
pub struct OpenRequest {
    /// Transport kind to open.
    pub kind: TransportKind,
    /// Fully built connection URL (scheme already matches the kind).
    pub url: Url,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Optional trust collaborator; `None` means default trust evaluation.
    pub security: Option<Arc<dyn SecurityPolicy>>,
    /// Upper bound for the open handshake.
    pub timeout: Duration,
}

impl OpenRequest {
    /// Session id carried in the URL, present for probes and resumed sessions.
    ///
    /// A request with a session id joins an existing session, so the peer does
    /// not send an open frame.
    pub fn session_id(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == "sid")
            .map(|(_, value)| value.into_owned())
    }

    /// Host part of the URL, used for trust challenges.
    pub fn host(&self) -> String {
        self.url.host_str().unwrap_or_default().to_string()
    }
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("OpenRequest")
            .field("kind", &self.kind)
            .field("url", &self.url.as_str())
            .field("headers", &header_names)
            .field("security", &self.security.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Inbound traffic produced by an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame.
    Text(String),
    /// One raw binary frame.
    Binary(Bytes),
    /// The transport closed; carries the failure reason if it was not clean.
    Closed(Option<String>),
}

/// Write half of an open transport.
///
/// Sends are non-blocking: implementations queue the frame and report a
/// failure through [`TransportEvent::Closed`] if it cannot be delivered.
pub trait TransportSink: Send + Sync {
    /// Queue a text frame.
    fn send_text(&self, text: String) -> Result<()>;

    /// Queue a raw binary frame.
    fn send_binary(&self, data: Bytes) -> Result<()>;

    /// Close the transport. Idempotent.
    fn close(&self);
}

/// An open transport handed to the engine.
pub struct TransportLink {
    /// Kind of the opened transport.
    pub kind: TransportKind,
    /// First frame received while opening (the peer's open packet), if any.
    pub initial_frame: Option<String>,
    /// Write half.
    pub sink: Box<dyn TransportSink>,
    /// Inbound frames in arrival order.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLink")
            .field("kind", &self.kind)
            .field("initial_frame", &self.initial_frame)
            .finish_non_exhaustive()
    }
}

/// Future returned by [`Connector::open`].
pub type OpenFuture = Pin<Box<dyn Future<Output = Result<TransportLink>> + Send>>;

/// Opens transports on behalf of the engine.
pub trait Connector: Send + Sync + 'static {
    /// Open one transport as described by `request`.
    ///
    /// For requests without a session id the returned link carries the peer's
    /// first frame in [`TransportLink::initial_frame`].
    fn open(&self, request: OpenRequest) -> OpenFuture;
}

impl<C: Connector + ?Sized> Connector for Arc<C> {
    fn open(&self, request: OpenRequest) -> OpenFuture {
        (**self).open(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> OpenRequest {
        OpenRequest {
            kind: TransportKind::Polling,
            url: Url::parse(url).unwrap(),
            headers: vec![("authorization".to_string(), "Bearer secret".to_string())],
            security: None,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn kind_names_roundtrip() {
        for kind in [TransportKind::WebSocket, TransportKind::Polling] {
            assert_eq!(TransportKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(TransportKind::from_name("webtransport"), None);
        assert!(TransportKind::WebSocket.is_persistent());
        assert!(!TransportKind::Polling.is_persistent());
    }

    #[test]
    fn session_id_is_read_from_query() {
        let req = request("http://chat.local/socket.io/?EIO=4&transport=polling&sid=abc123");
        assert_eq!(req.session_id().as_deref(), Some("abc123"));

        let fresh = request("http://chat.local/socket.io/?EIO=4&transport=polling");
        assert_eq!(fresh.session_id(), None);
        assert_eq!(fresh.host(), "chat.local");
    }

    #[test]
    fn debug_output_omits_header_values() {
        let req = request("http://chat.local/socket.io/?EIO=4");
        let rendered = format!("{req:?}");
        assert!(rendered.contains("authorization"));
        assert!(!rendered.contains("secret"));
    }
}
