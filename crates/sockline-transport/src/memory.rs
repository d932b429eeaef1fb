//! In-process transport pair.
//!
//! [`memory_transport`] returns a [`MemoryConnector`] for the engine and a
//! [`MemoryServer`] that accepts one [`MemoryPeer`] per opened transport. Both
//! transport kinds are carried over the same duplex channel pair; the kind is
//! only a label the peer can inspect.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Result, TransportError};
use crate::security::{TrustChallenge, TrustDecision};
use crate::traits::{
    Connector, OpenFuture, OpenRequest, TransportEvent, TransportKind, TransportLink,
    TransportSink,
};

/// A frame written by the client side of a memory transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Binary(Bytes),
    /// The client closed its sink.
    Closed,
}

#[derive(Default)]
struct ConnectorState {
    refused: HashSet<(TransportKind, String)>,
    certificate_chain: Option<Vec<Bytes>>,
    attempts: Vec<(TransportKind, String)>,
}

/// Client half of the in-process transport.
#[derive(Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    state: Arc<Mutex<ConnectorState>>,
}

/// Server half; yields one peer per opened transport.
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Create a connected connector/server pair.
pub fn memory_transport() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            accept_tx,
            state: Arc::new(Mutex::new(ConnectorState::default())),
        },
        MemoryServer { accept_rx },
    )
}

impl MemoryConnector {
    /// Refuse every open of `kind` on `path` (for example `/socket.io`).
    pub fn refuse(&self, kind: TransportKind, path: impl Into<String>) {
        let path = normalize_path(&path.into());
        self.with_state(|state| {
            state.refused.insert((kind, path));
        });
    }

    /// Stop refusing `kind` on `path`.
    pub fn allow(&self, kind: TransportKind, path: impl Into<String>) {
        let path = normalize_path(&path.into());
        self.with_state(|state| {
            state.refused.remove(&(kind, path));
        });
    }

    /// Present this chain to the security collaborator on every open.
    pub fn present_certificates(&self, chain: Vec<Bytes>) {
        self.with_state(|state| state.certificate_chain = Some(chain));
    }

    /// Every `(kind, path)` the engine tried to open, in order.
    pub fn attempts(&self) -> Vec<(TransportKind, String)> {
        self.with_state(|state| state.attempts.clone())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ConnectorState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn admit(&self, request: &OpenRequest) -> Result<()> {
        let path = normalize_path(request.url.path());
        let (refused, chain) = self.with_state(|state| {
            state.attempts.push((request.kind, path.clone()));
            (
                state.refused.contains(&(request.kind, path.clone())),
                state.certificate_chain.clone(),
            )
        });

        if refused {
            return Err(TransportError::Open {
                kind: request.kind,
                url: request.url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        if let (Some(policy), Some(chain)) = (&request.security, chain) {
            let challenge = TrustChallenge {
                host: request.host(),
                certificate_chain: chain,
            };
            if policy.evaluate(&challenge) == TrustDecision::Reject {
                return Err(TransportError::TrustRejected {
                    host: challenge.host,
                });
            }
        }

        Ok(())
    }
}

impl Connector for MemoryConnector {
    fn open(&self, request: OpenRequest) -> OpenFuture {
        let connector = self.clone();
        Box::pin(async move {
            connector.admit(&request)?;

            let (client_tx, client_rx) = mpsc::unbounded_channel();
            let (event_tx, mut event_rx) = mpsc::unbounded_channel();
            let peer = MemoryPeer {
                kind: request.kind,
                url: request.url.clone(),
                headers: request.headers.clone(),
                events: event_tx,
                frames: client_rx,
            };

            if connector.accept_tx.send(peer).is_err() {
                return Err(TransportError::Open {
                    kind: request.kind,
                    url: request.url.to_string(),
                    reason: "memory server is gone".to_string(),
                });
            }

            let initial_frame = if request.session_id().is_some() {
                None
            } else {
                match tokio::time::timeout(request.timeout, event_rx.recv()).await {
                    Ok(Some(TransportEvent::Text(text))) => Some(text),
                    Ok(Some(other)) => {
                        return Err(TransportError::Open {
                            kind: request.kind,
                            url: request.url.to_string(),
                            reason: format!("unexpected first frame: {other:?}"),
                        })
                    }
                    Ok(None) => return Err(TransportError::Closed),
                    Err(_) => {
                        return Err(TransportError::OpenTimeout {
                            kind: request.kind,
                            url: request.url.to_string(),
                            timeout: request.timeout,
                        })
                    }
                }
            };

            tracing::debug!(
                event = "memory_transport_open",
                kind = %request.kind,
                path = request.url.path(),
                "memory transport opened"
            );

            Ok(TransportLink {
                kind: request.kind,
                initial_frame,
                sink: Box::new(MemorySink {
                    tx: client_tx,
                    closed: AtomicBool::new(false),
                }),
                events: event_rx,
            })
        })
    }
}

impl MemoryServer {
    /// Wait for the next opened transport.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Take an already opened transport without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server view of one opened transport.
pub struct MemoryPeer {
    kind: TransportKind,
    url: Url,
    headers: Vec<(String, String)>,
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MemoryPeer {
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Value of a query parameter on the open URL.
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Value of a request header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Deliver a text frame to the client. Returns false once the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Text(text.into())).is_ok()
    }

    /// Deliver a binary frame to the client.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.events.send(TransportEvent::Binary(data.into())).is_ok()
    }

    /// Close cleanly.
    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed(None));
    }

    /// Drop the transport with an error reason.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Closed(Some(reason.into())));
    }

    /// Next frame written by the client; `None` once the client sink is dropped.
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.frames.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<ClientFrame> {
        self.frames.try_recv().ok()
    }
}

impl std::fmt::Debug for MemoryPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeer")
            .field("kind", &self.kind)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<ClientFrame>,
    closed: AtomicBool,
}

impl MemorySink {
    fn push(&self, frame: ClientFrame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl TransportSink for MemorySink {
    fn send_text(&self, text: String) -> Result<()> {
        self.push(ClientFrame::Text(text))
    }

    fn send_binary(&self, data: Bytes) -> Result<()> {
        self.push(ClientFrame::Binary(data))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(ClientFrame::Closed);
        }
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
