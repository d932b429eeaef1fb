use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sockline_frame::Value;
use sockline_transport::Connector;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ClientConfig;
use crate::engine::{Command, Engine, Target};
use crate::error::{ClientError, Result};
use crate::event::{AckCallback, AckReply, ConnectionState, EventStream, InboundEvent};
use crate::namespace::SubscriptionId;

/// Handle to one protocol engine.
///
/// Cloning is cheap; every clone drives the same engine. The engine stops
/// once the last clone and every [`Namespace`] handle are dropped.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    next_subscription: AtomicU64,
    ack_timeout: Duration,
}

impl Shared {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::EngineStopped)
    }

    fn next_id(&self) -> SubscriptionId {
        self.next_subscription.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .finish()
    }
}

impl Client {
    /// Validate `config` and start the engine. The client stays idle until
    /// [`connect`](Self::connect). Must be called within a tokio runtime.
    pub fn new<C: Connector>(config: ClientConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let ack_timeout = config.ack.timeout;
        let (commands, state) = Engine::spawn(config, Arc::new(connector));
        Ok(Self {
            shared: Arc::new(Shared {
                commands,
                state,
                next_subscription: AtomicU64::new(1),
                ack_timeout,
            }),
        })
    }

    /// Start connecting. A no-op while already connecting or connected;
    /// while waiting out a backoff delay the attempt starts immediately.
    pub fn connect(&self) -> Result<()> {
        self.shared.send(Command::Connect)
    }

    /// Close the session, cancel pending acknowledgements and drop buffered
    /// emits. The client can connect again afterwards.
    pub fn disconnect(&self) -> Result<()> {
        self.shared.send(Command::Disconnect)
    }

    /// Handle for the default namespace. Follows namespace fallback.
    pub fn socket(&self) -> Namespace {
        let _ = self.shared.send(Command::Join(Target::Default));
        Namespace {
            shared: self.shared.clone(),
            target: Target::Default,
        }
    }

    /// Handle for `name`, joining it on the current and every later open.
    pub fn of(&self, name: impl Into<String>) -> Namespace {
        let target = Target::Named(name.into());
        let _ = self.shared.send(Command::Join(target.clone()));
        Namespace {
            shared: self.shared.clone(),
            target,
        }
    }

    /// Subscribe to lifecycle and traffic notifications from now on.
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.shared.send(Command::Observe(tx));
        EventStream::new(rx)
    }

    /// Handler for every inbound event on every namespace.
    pub fn on_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_id();
        let _ = self.shared.send(Command::SubscribeAny {
            id,
            handler: Arc::new(handler),
        });
        Subscription::new(&self.shared, id)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Wait until the engine reports `state`.
    pub async fn wait_for(&self, state: ConnectionState) -> Result<()> {
        let mut rx = self.shared.state.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::EngineStopped)
    }

    /// Report a change in network reachability. Regaining the network skips
    /// any remaining backoff delay; it never revives an idle client.
    pub fn network_changed(&self, available: bool) -> Result<()> {
        self.shared.send(Command::NetworkChanged(available))
    }
}

/// Handle scoped to one namespace.
#[derive(Clone)]
pub struct Namespace {
    shared: Arc<Shared>,
    target: Target,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("target", &self.target)
            .finish()
    }
}

impl Namespace {
    /// Register `handler` for `event`. Handlers run on the engine task in
    /// registration order and must not block.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_id();
        let _ = self.shared.send(Command::Subscribe {
            target: self.target.clone(),
            event: event.into(),
            id,
            handler: Arc::new(handler),
        });
        Subscription::new(&self.shared, id)
    }

    /// Fire-and-forget emit. Buffered while the namespace is not connected.
    pub fn emit(&self, event: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.shared.send(Command::Emit {
            target: self.target.clone(),
            event: event.into(),
            args,
            ack: None,
        })
    }

    /// Emit and invoke `callback` exactly once with the outcome.
    pub fn emit_with_ack<F>(
        &self,
        event: impl Into<String>,
        args: Vec<Value>,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(AckReply) + Send + 'static,
    {
        self.emit_with_ack_timeout(event, args, self.shared.ack_timeout, callback)
    }

    pub fn emit_with_ack_timeout<F>(
        &self,
        event: impl Into<String>,
        args: Vec<Value>,
        timeout: Duration,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(AckReply) + Send + 'static,
    {
        let callback: AckCallback = Box::new(callback);
        self.shared.send(Command::Emit {
            target: self.target.clone(),
            event: event.into(),
            args,
            ack: Some((callback, timeout)),
        })
    }

    /// Emit and wait for the acknowledgement.
    pub async fn request(&self, event: impl Into<String>, args: Vec<Value>) -> Result<AckReply> {
        self.request_with_timeout(event, args, self.shared.ack_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        event: impl Into<String>,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<AckReply> {
        let (tx, rx) = oneshot::channel();
        self.emit_with_ack_timeout(event, args, timeout, move |reply| {
            let _ = tx.send(reply);
        })?;
        // An entry evicted from the offline queue drops its callback unrun.
        Ok(rx.await.unwrap_or(AckReply::Disconnected))
    }

    /// Emit `payload` followed by each blob as its own argument.
    pub fn emit_binary(
        &self,
        event: impl Into<String>,
        payload: Value,
        attachments: Vec<Bytes>,
    ) -> Result<()> {
        self.emit(event, binary_args(payload, attachments))
    }

    /// [`emit_binary`](Self::emit_binary) with an acknowledgement callback.
    pub fn emit_binary_with_ack<F>(
        &self,
        event: impl Into<String>,
        payload: Value,
        attachments: Vec<Bytes>,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(AckReply) + Send + 'static,
    {
        self.emit_with_ack(event, binary_args(payload, attachments), callback)
    }

    /// [`emit_binary`](Self::emit_binary) and wait for the acknowledgement.
    pub async fn request_binary(
        &self,
        event: impl Into<String>,
        payload: Value,
        attachments: Vec<Bytes>,
    ) -> Result<AckReply> {
        self.request(event, binary_args(payload, attachments)).await
    }

    /// Register an emit replayed after every successful namespace connect,
    /// and sent now if the namespace is already connected.
    pub fn sticky_join(&self, event: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.shared.send(Command::StickyJoin {
            target: self.target.clone(),
            event: event.into(),
            args,
        })
    }

    /// Disconnect the namespace and stop re-joining it.
    pub fn leave(&self) -> Result<()> {
        self.shared.send(Command::Leave(self.target.clone()))
    }
}

fn binary_args(payload: Value, attachments: Vec<Bytes>) -> Vec<Value> {
    let mut args = Vec::with_capacity(attachments.len() + 1);
    args.push(payload);
    args.extend(attachments.into_iter().map(Value::Binary));
    args
}

/// Token for one registered handler.
///
/// Dropping it keeps the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Subscription {
    fn new(shared: &Shared, id: SubscriptionId) -> Self {
        Self {
            id,
            commands: shared.commands.downgrade(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove exactly this handler.
    pub fn unsubscribe(self) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Unsubscribe(self.id));
        }
    }
}
