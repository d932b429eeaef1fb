use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value as Json;
use sockline_frame::Value;
use sockline_transport::TransportKind;
use tokio::sync::mpsc;

use crate::error::ClientError;

/// Result handed to an acknowledgement callback.
#[derive(Debug, Clone, PartialEq)]
pub enum AckReply {
    /// The peer acknowledged with these arguments.
    Acked(Vec<Value>),
    /// No reply before the deadline.
    TimedOut,
    /// The client was disconnected before a reply arrived.
    Disconnected,
}

impl AckReply {
    pub fn is_acked(&self) -> bool {
        matches!(self, AckReply::Acked(_))
    }

    /// Acknowledgement arguments, if acked.
    pub fn args(&self) -> Option<&[Value]> {
        match self {
            AckReply::Acked(args) => Some(args),
            _ => None,
        }
    }
}

/// Callback invoked exactly once with the outcome of an acknowledged emit.
pub type AckCallback = Box<dyn FnOnce(AckReply) + Send>;

/// Listener for inbound events.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Connection lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying. Terminal until `connect` is called.
    Idle,
    Connecting,
    Connected,
    /// Waiting out a backoff delay.
    Reconnecting,
}

/// An inbound event as seen by listeners.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub namespace: String,
    pub event: String,
    pub args: Vec<Value>,
    /// Present when the sender asked for an acknowledgement.
    pub responder: Option<AckResponder>,
}

impl InboundEvent {
    /// First argument, the usual payload slot.
    pub fn payload(&self) -> Option<&Value> {
        self.args.first()
    }

    /// Acknowledge the event. Only the first acknowledgement across all
    /// listeners is sent.
    pub fn ack(&self, args: Vec<Value>) -> bool {
        self.responder
            .as_ref()
            .is_some_and(|responder| responder.send(args))
    }
}

pub(crate) struct OutboundAck {
    pub namespace: String,
    pub id: u64,
    pub args: Vec<Value>,
}

/// Sends the acknowledgement for one inbound event.
///
/// Clones share state: whichever clone sends first wins.
#[derive(Clone)]
pub struct AckResponder {
    namespace: String,
    id: u64,
    sent: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<OutboundAck>,
}

impl AckResponder {
    pub(crate) fn new(namespace: &str, id: u64, tx: mpsc::UnboundedSender<OutboundAck>) -> Self {
        Self {
            namespace: namespace.to_string(),
            id,
            sent: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns false if an acknowledgement was already sent.
    pub fn send(&self, args: Vec<Value>) -> bool {
        if self.sent.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.tx
            .send(OutboundAck {
                namespace: self.namespace.clone(),
                id: self.id,
                args,
            })
            .is_ok()
    }

    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for AckResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckResponder")
            .field("namespace", &self.namespace)
            .field("id", &self.id)
            .field("sent", &self.is_sent())
            .finish()
    }
}

/// Notifications published to every event observer.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A transport opened and the session handshake completed.
    Open {
        sid: String,
        transport: TransportKind,
    },
    /// The peer accepted a namespace connect.
    Connect { namespace: String },
    Disconnect { namespace: String, reason: String },
    /// The peer refused a namespace connect.
    ConnectError {
        namespace: String,
        data: Option<Json>,
    },
    /// Every decoded inbound event, after middleware.
    Event {
        namespace: String,
        event: String,
        args: Vec<Value>,
        id: Option<u64>,
    },
    /// An acknowledgement for one of our emits.
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    Ping,
    Pong,
    /// The session moved to a better transport.
    Upgrade { transport: TransportKind },
    /// A reconnect is scheduled after `delay`.
    ReconnectAttempt { attempt: u32, delay: Duration },
    /// Transport-level failures and exhausted retries.
    Error(Arc<ClientError>),
    /// The engine reached `Idle`.
    Close { reason: Option<String> },
}

/// Stream of [`ClientEvent`]s for one observer.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self { rx }
    }

    /// Next event; `None` once the engine stops.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}

impl futures_core::Stream for EventStream {
    type Item = ClientEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responder_sends_only_once_across_clones() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let responder = AckResponder::new("/chat", 4, tx);
        let event = InboundEvent {
            namespace: "/chat".to_string(),
            event: "ask".to_string(),
            args: vec![],
            responder: Some(responder.clone()),
        };

        assert!(event.ack(vec![Value::from("first")]));
        assert!(!responder.send(vec![Value::from("second")]));
        assert!(responder.is_sent());

        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.id, 4);
        assert_eq!(sent.namespace, "/chat");
        assert_eq!(sent.args, vec![Value::from("first")]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_without_responder_cannot_ack() {
        let event = InboundEvent {
            namespace: "/".to_string(),
            event: "news".to_string(),
            args: vec![Value::from(1)],
            responder: None,
        };
        assert!(!event.ack(vec![]));
        assert_eq!(event.payload(), Some(&Value::from(1)));
    }
}
