//! Engine orchestrator.
//!
//! One spawned task owns every piece of protocol state. Handles talk to it
//! through [`Command`]s; transport open attempts report back through an
//! internal channel tagged with the connection epoch that started them, and
//! results from a superseded epoch are discarded. Open transports are polled
//! directly by the task, so frames from one transport are handled in arrival
//! order.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value as Json;
use sockline_frame::{
    decode_packet, decode_socket_packet, split, AssembledPacket, BinaryAssembler, FrameError,
    OpenInfo, Packet, PacketType, SocketPacket, SocketPacketType, Split, Value,
};
use sockline_transport::{
    Connector, OpenRequest, SecurityPolicy, TransportEvent, TransportKind, TransportLink,
    TransportSink,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::ack::{deadline_after, AckCorrelator, ACK_SWEEP_INTERVAL};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::event::{
    AckCallback, AckReply, AckResponder, ClientEvent, ConnectionState, EventHandler,
    InboundEvent, OutboundAck,
};
use crate::handshake::{build_open_url, candidate_routes, Route};
use crate::log::Diagnostics;
use crate::middleware::{run_chain, Direction};
use crate::namespace::{NamespaceRegistry, SubscriptionId};
use crate::offline::{OfflineEntry, OfflineQueue, PushOutcome};
use crate::reconnect::{ReconnectController, ReconnectDecision};
use crate::store::ROUTE_KEY;
use crate::upgrade::{ProbeOutcome, UpgradeCoordinator};

/// Lower bound for the outbound heartbeat interval.
pub const MIN_PING_INTERVAL: Duration = Duration::from_secs(5);

/// Which namespace a handle addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// The default namespace; follows namespace fallback.
    Default,
    Named(String),
}

pub(crate) enum Command {
    Connect,
    Disconnect,
    Join(Target),
    Leave(Target),
    Subscribe {
        target: Target,
        event: String,
        id: SubscriptionId,
        handler: EventHandler,
    },
    SubscribeAny {
        id: SubscriptionId,
        handler: EventHandler,
    },
    Unsubscribe(SubscriptionId),
    Emit {
        target: Target,
        event: String,
        args: Vec<Value>,
        ack: Option<(AckCallback, Duration)>,
    },
    StickyJoin {
        target: Target,
        event: String,
        args: Vec<Value>,
    },
    Observe(mpsc::UnboundedSender<ClientEvent>),
    NetworkChanged(bool),
}

enum Internal {
    Opened {
        epoch: u64,
        route: Route,
        link: TransportLink,
        info: OpenInfo,
    },
    OpenFailed {
        epoch: u64,
        error: ClientError,
    },
    ProbeOpened {
        epoch: u64,
        link: TransportLink,
    },
    ProbeFailed {
        epoch: u64,
        error: ClientError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Primary,
    /// The pre-upgrade primary, drained until it closes.
    Retiring,
}

struct ActiveLink {
    kind: TransportKind,
    path: String,
    sink: Box<dyn TransportSink>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl ActiveLink {
    fn new(link: TransportLink, path: String) -> Self {
        Self {
            kind: link.kind,
            path,
            sink: link.sink,
            events: link.events,
        }
    }
}

/// Everything a spawned open attempt needs, detached from engine state.
struct OpenPlan {
    connector: Arc<dyn Connector>,
    base: Url,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    security: Option<Arc<dyn SecurityPolicy>>,
    timeout: Duration,
    diag: Diagnostics,
}

impl OpenPlan {
    /// Try every route in order until one opens with a valid handshake.
    async fn open_any(&self, routes: Vec<Route>) -> Result<(Route, TransportLink, OpenInfo)> {
        let tried = routes.len();
        let mut last = None;
        for route in routes {
            match self.open_route(&route).await {
                Ok((link, info)) => return Ok((route, link, info)),
                Err(err) => {
                    self.diag.error("transport_open_failed", &err);
                    last = Some(err.to_string());
                }
            }
        }
        Err(ClientError::AllTransportsFailed {
            tried,
            last: last.unwrap_or_else(|| "no transport candidates".to_string()),
        })
    }

    async fn open_route(&self, route: &Route) -> Result<(TransportLink, OpenInfo)> {
        let link = self.open_link(route, None).await?;
        match handshake(&link) {
            Ok(info) => Ok((link, info)),
            Err(err) => {
                link.sink.close();
                Err(err)
            }
        }
    }

    async fn open_link(&self, route: &Route, sid: Option<&str>) -> Result<TransportLink> {
        let url = build_open_url(&self.base, &route.path, route.kind, sid, &self.query)?;
        self.diag.debug("transport_open", format!("{} {url}", route.kind));
        let request = OpenRequest {
            kind: route.kind,
            url,
            headers: self.headers.clone(),
            security: self.security.clone(),
            timeout: self.timeout,
        };
        match tokio::time::timeout(self.timeout, self.connector.open(request)).await {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(source)) => Err(ClientError::TransportOpenFailed {
                kind: route.kind,
                path: route.path.clone(),
                source,
            }),
            Err(_) => Err(ClientError::ProtocolTimeout {
                operation: "transport open",
                timeout: self.timeout,
            }),
        }
    }
}

/// Validate the first frame of a freshly opened transport.
fn handshake(link: &TransportLink) -> Result<OpenInfo> {
    let frame = link.initial_frame.as_deref().ok_or_else(|| {
        FrameError::MalformedFrame("transport opened without an open packet".to_string())
    })?;
    let packet = decode_packet(frame)?;
    if packet.kind != PacketType::Open {
        return Err(FrameError::MalformedFrame(format!(
            "expected open packet, got {}",
            packet.kind
        ))
        .into());
    }
    Ok(OpenInfo::parse(&packet.body)?)
}

async fn next_event(link: &mut Option<ActiveLink>) -> TransportEvent {
    match link {
        Some(link) => link
            .events
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed(Some("transport dropped".to_string()))),
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn into_items(tree: Json) -> Vec<Json> {
    match tree {
        Json::Array(items) => items,
        other => vec![other],
    }
}

pub(crate) struct Engine {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    diag: Diagnostics,

    registry: NamespaceRegistry,
    acks: AckCorrelator,
    offline: OfflineQueue,
    reconnect: ReconnectController,
    upgrade: UpgradeCoordinator,
    assembler: BinaryAssembler,

    default_namespace: String,
    fallback_cursor: usize,

    epoch: u64,
    epoch_token: CancellationToken,
    sid: Option<String>,
    primary: Option<ActiveLink>,
    probe: Option<ActiveLink>,
    retiring: Option<ActiveLink>,

    ping_interval: Duration,
    ping_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    sweep: Interval,

    observers: Vec<mpsc::UnboundedSender<ClientEvent>>,
    state_tx: watch::Sender<ConnectionState>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    ack_tx: mpsc::UnboundedSender<OutboundAck>,
    ack_rx: mpsc::UnboundedReceiver<OutboundAck>,
}

impl Engine {
    /// Spawn the engine task. Must be called within a tokio runtime.
    pub(crate) fn spawn(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> (
        mpsc::UnboundedSender<Command>,
        watch::Receiver<ConnectionState>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let engine = Engine::new(config, connector, state_tx);
        tokio::spawn(engine.run(command_rx));
        (command_tx, state_rx)
    }

    fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let mut sweep =
            tokio::time::interval_at(Instant::now() + ACK_SWEEP_INTERVAL, ACK_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            diag: Diagnostics::new(config.log_sink.clone(), config.log_level),
            registry: NamespaceRegistry::new(),
            acks: AckCorrelator::new(),
            offline: OfflineQueue::new(config.offline_queue.clone()),
            reconnect: ReconnectController::new(config.reconnect.clone()),
            upgrade: UpgradeCoordinator::new(),
            assembler: BinaryAssembler::new(),
            default_namespace: config.namespace.initial().to_string(),
            fallback_cursor: 0,
            epoch: 0,
            epoch_token: CancellationToken::new(),
            sid: None,
            primary: None,
            probe: None,
            retiring: None,
            ping_interval: MIN_PING_INTERVAL,
            ping_at: None,
            reconnect_at: None,
            sweep,
            observers: Vec::new(),
            state_tx,
            internal_tx,
            internal_rx,
            ack_tx,
            ack_rx,
            config,
            connector,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            // Commands issued before a frame arrives apply before it. Backlog
            // on a retired transport predates anything on its replacement.
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = self.internal_rx.recv() => self.handle_internal(message),
                Some(ack) = self.ack_rx.recv() => self.send_ack(ack),
                event = next_event(&mut self.retiring) => self.on_link_event(Source::Retiring, event),
                event = next_event(&mut self.primary) => self.on_link_event(Source::Primary, event),
                event = next_event(&mut self.probe) => self.on_probe_event(event),
                () = sleep_until(self.ping_at) => self.on_ping_due(),
                () = sleep_until(self.reconnect_at) => self.on_reconnect_due(),
                _ = self.sweep.tick() => self.sweep_acks(),
            }
        }
        self.diag.debug("engine_stopped", "all handles dropped");
        self.close_session("client dropped");
    }

    // Commands

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.close_session("client disconnect"),
            Command::Join(target) => {
                let name = self.resolve(&target);
                if self.registry.join(&name) && self.primary.is_some() {
                    self.send_connect(&name);
                }
            }
            Command::Leave(target) => self.leave(&target),
            Command::Subscribe {
                target,
                event,
                id,
                handler,
            } => {
                let name = self.resolve(&target);
                self.registry.on(&name, &event, id, handler);
            }
            Command::SubscribeAny { id, handler } => self.registry.on_any(id, handler),
            Command::Unsubscribe(id) => {
                if !self.registry.off(id) {
                    self.diag.debug("unsubscribe_unknown", id);
                }
            }
            Command::Emit {
                target,
                event,
                args,
                ack,
            } => {
                let name = self.resolve(&target);
                self.emit(name, event, args, ack);
            }
            Command::StickyJoin {
                target,
                event,
                args,
            } => {
                let name = self.resolve(&target);
                self.registry.add_sticky_join(&name, &event, args.clone());
                if self.is_ready(&name) {
                    self.send_event(&name, &event, args, None);
                }
            }
            Command::Observe(tx) => self.observers.push(tx),
            Command::NetworkChanged(available) => self.network_changed(available),
        }
    }

    fn resolve(&self, target: &Target) -> String {
        match target {
            Target::Default => self.default_namespace.clone(),
            Target::Named(name) => name.clone(),
        }
    }

    fn connect(&mut self) {
        match self.reconnect.state() {
            ConnectionState::Idle => {
                let default = self.default_namespace.clone();
                self.registry.join(&default);
                self.open_transport();
            }
            ConnectionState::Reconnecting => self.on_reconnect_due(),
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.diag.debug("connect_ignored", "already connecting or connected");
            }
        }
    }

    fn leave(&mut self, target: &Target) {
        let name = self.resolve(target);
        let was_connected = self.registry.leave(&name);
        if self.primary.is_some() {
            self.send_socket_packet(&SocketPacket::disconnect(&name), &[]);
        }
        if was_connected {
            self.publish(ClientEvent::Disconnect {
                namespace: name,
                reason: "client leave".to_string(),
            });
        }
    }

    fn network_changed(&mut self, available: bool) {
        self.diag
            .debug("network_changed", format!("available={available}"));
        if available && self.reconnect_at.is_some() {
            self.on_reconnect_due();
        }
    }

    // Outbound path

    fn is_ready(&self, namespace: &str) -> bool {
        self.primary.is_some() && self.registry.is_connected(namespace)
    }

    fn emit(
        &mut self,
        namespace: String,
        event: String,
        args: Vec<Value>,
        ack: Option<(AckCallback, Duration)>,
    ) {
        let Some((event, args)) = run_chain(
            &self.config.middleware,
            Direction::Outbound,
            &namespace,
            event,
            args,
        ) else {
            self.diag.debug("emit_vetoed", &namespace);
            return;
        };
        self.emit_ready(OfflineEntry {
            namespace,
            event,
            args,
            ack,
        });
    }

    /// Send now if the namespace is ready, otherwise buffer.
    fn emit_ready(&mut self, entry: OfflineEntry) {
        if self.is_ready(&entry.namespace) {
            self.send_event(&entry.namespace, &entry.event, entry.args, entry.ack);
            return;
        }
        let label = format!("{} {}", entry.namespace, entry.event);
        match self.offline.push(entry) {
            PushOutcome::Queued => self.diag.debug("emit_buffered", label),
            PushOutcome::Evicted => self
                .diag
                .info("offline_queue_evicted", format!("oldest entry dropped for {label}")),
            PushOutcome::Dropped => self
                .diag
                .info("emit_dropped", format!("offline queue disabled, {label}")),
        }
    }

    fn send_event(
        &mut self,
        namespace: &str,
        event: &str,
        args: Vec<Value>,
        ack: Option<(AckCallback, Duration)>,
    ) {
        let id = ack.map(|(callback, timeout)| self.acks.allocate(callback, timeout, Instant::now()));
        let (packet, attachments) = match split(&Value::Array(args)) {
            Split::Plain(tree) => (
                SocketPacket::event(namespace, event, into_items(tree), id),
                Vec::new(),
            ),
            Split::Binary { tree, attachments } => (
                SocketPacket::binary_event(
                    namespace,
                    event,
                    into_items(tree),
                    id,
                    attachments.len(),
                ),
                attachments,
            ),
        };
        self.send_socket_packet(&packet, &attachments);
    }

    fn send_ack(&mut self, ack: OutboundAck) {
        let (packet, attachments) = match split(&Value::Array(ack.args)) {
            Split::Plain(tree) => (
                SocketPacket::ack(&ack.namespace, ack.id, into_items(tree)),
                Vec::new(),
            ),
            Split::Binary { tree, attachments } => (
                SocketPacket::binary_ack(
                    &ack.namespace,
                    ack.id,
                    into_items(tree),
                    attachments.len(),
                ),
                attachments,
            ),
        };
        self.send_socket_packet(&packet, &attachments);
    }

    fn send_connect(&mut self, namespace: &str) {
        let payload = self
            .config
            .auth
            .as_ref()
            .and_then(|auth| auth.connect_payload(namespace))
            .or_else(|| self.config.join_payload.clone());
        self.diag.debug("namespace_connect", namespace);
        self.send_socket_packet(&SocketPacket::connect(namespace, payload), &[]);
    }

    fn send_socket_packet(&self, packet: &SocketPacket, attachments: &[Bytes]) -> bool {
        if !self.send_outer(&Packet::message(packet.encode())) {
            return false;
        }
        let Some(primary) = &self.primary else {
            return false;
        };
        for blob in attachments {
            if let Err(err) = primary.sink.send_binary(blob.clone()) {
                self.diag.error("send_failed", err);
                return false;
            }
        }
        true
    }

    fn send_outer(&self, packet: &Packet) -> bool {
        let Some(primary) = &self.primary else {
            self.diag
                .debug("send_skipped", format!("no transport for {}", packet.kind));
            return false;
        };
        match primary.sink.send_text(packet.encode()) {
            Ok(()) => true,
            Err(err) => {
                self.diag.error("send_failed", err);
                false
            }
        }
    }

    // Transport lifecycle

    fn begin_epoch(&mut self) -> (u64, CancellationToken) {
        self.epoch_token.cancel();
        self.epoch += 1;
        self.epoch_token = CancellationToken::new();
        self.ping_at = None;
        self.reconnect_at = None;
        self.sweep.reset();
        self.assembler.clear();
        (self.epoch, self.epoch_token.clone())
    }

    fn open_plan(&self) -> OpenPlan {
        let mut headers = self.config.headers.clone();
        let mut query = self.config.query.clone();
        if let Some(auth) = &self.config.auth {
            headers.extend(auth.headers());
            query.extend(auth.query());
        }
        OpenPlan {
            connector: self.connector.clone(),
            base: self.config.url.clone(),
            headers,
            query,
            security: self.config.security.clone(),
            timeout: self.config.connect_timeout,
            diag: self.diag.clone(),
        }
    }

    fn open_transport(&mut self) {
        let (epoch, token) = self.begin_epoch();
        self.reconnect.begin_connect();
        self.sync_state();

        let remembered = self
            .config
            .store
            .as_ref()
            .and_then(|store| store.get(ROUTE_KEY))
            .and_then(|raw| Route::from_bytes(&raw));
        let routes = candidate_routes(&self.config.paths, &self.config.transports, remembered);
        self.diag
            .debug("connect_started", format!("epoch {epoch}, {} candidates", routes.len()));

        let plan = self.open_plan();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                result = plan.open_any(routes) => {
                    let message = match result {
                        Ok((route, link, info)) => Internal::Opened { epoch, route, link, info },
                        Err(error) => Internal::OpenFailed { epoch, error },
                    };
                    let _ = tx.send(message);
                }
            }
        });
    }

    fn open_probe(&mut self, path: String, sid: String) {
        let epoch = self.epoch;
        let token = self.epoch_token.clone();
        let plan = self.open_plan();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let route = Route::new(path, TransportKind::WebSocket);
            tokio::select! {
                () = token.cancelled() => {}
                result = plan.open_link(&route, Some(&sid)) => {
                    let message = match result {
                        Ok(link) => Internal::ProbeOpened { epoch, link },
                        Err(error) => Internal::ProbeFailed { epoch, error },
                    };
                    let _ = tx.send(message);
                }
            }
        });
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Opened {
                epoch,
                route,
                link,
                info,
            } => {
                if !self.awaiting_open(epoch) {
                    link.sink.close();
                    return;
                }
                self.on_opened(route, link, info);
            }
            Internal::OpenFailed { epoch, error } => {
                if !self.awaiting_open(epoch) {
                    return;
                }
                self.diag.error("connect_failed", &error);
                self.publish(ClientEvent::Error(Arc::new(error)));
                self.schedule_reconnect();
            }
            Internal::ProbeOpened { epoch, link } => {
                if epoch != self.epoch || self.primary.is_none() || self.probe.is_some() {
                    link.sink.close();
                    return;
                }
                let Some(probe_packet) = self.upgrade.probe_opened() else {
                    link.sink.close();
                    return;
                };
                let path = self
                    .primary
                    .as_ref()
                    .map(|primary| primary.path.clone())
                    .unwrap_or_default();
                let probe = ActiveLink::new(link, path);
                if let Err(err) = probe.sink.send_text(probe_packet.encode()) {
                    self.diag.error("upgrade_failed", err);
                    probe.sink.close();
                    self.upgrade.probe_failed();
                    return;
                }
                self.probe = Some(probe);
            }
            Internal::ProbeFailed { epoch, error } => {
                if epoch == self.epoch {
                    self.diag.info("upgrade_failed", &error);
                    self.upgrade.probe_failed();
                }
            }
        }
    }

    /// Open results only count for the current epoch while still connecting.
    fn awaiting_open(&self, epoch: u64) -> bool {
        epoch == self.epoch
            && self.primary.is_none()
            && self.reconnect.state() == ConnectionState::Connecting
    }

    fn on_opened(&mut self, route: Route, link: TransportLink, info: OpenInfo) {
        let link = ActiveLink::new(link, route.path.clone());
        let kind = link.kind;
        self.primary = Some(link);
        self.sid = Some(info.sid.clone());
        self.ping_interval = info.ping_interval().max(MIN_PING_INTERVAL);
        self.ping_at = Some(deadline_after(Instant::now(), self.ping_interval));
        self.reconnect.connected();
        self.sync_state();
        self.remember(&route);

        self.diag
            .info("open", format!("sid={} transport={kind} path={}", info.sid, route.path));
        self.publish(ClientEvent::Open {
            sid: info.sid.clone(),
            transport: kind,
        });

        for namespace in self.registry.joined() {
            self.send_connect(&namespace);
        }

        if self.upgrade.start(kind, &info, &self.config.transports) {
            self.diag.debug("upgrade_probe", &route.path);
            self.open_probe(route.path, info.sid);
        }
    }

    fn remember(&self, route: &Route) {
        if let Some(store) = &self.config.store {
            store.set(ROUTE_KEY, route.to_bytes());
        }
    }

    fn close_links(&mut self) {
        for link in [self.primary.take(), self.probe.take(), self.retiring.take()]
            .into_iter()
            .flatten()
        {
            link.sink.close();
        }
        self.epoch_token.cancel();
        self.upgrade.reset();
        self.assembler.clear();
        self.ping_at = None;
        self.sid = None;
    }

    fn drop_namespaces(&mut self, reason: &str) {
        for namespace in self.registry.mark_all_disconnected() {
            self.publish(ClientEvent::Disconnect {
                namespace,
                reason: reason.to_string(),
            });
        }
    }

    fn on_transport_lost(&mut self, reason: Option<String>) {
        let reason = reason.unwrap_or_else(|| "transport closed".to_string());
        self.close_links();
        self.drop_namespaces("transport closed");
        let error = ClientError::ConnectionLost(reason);
        self.diag.error("connection_lost", &error);
        self.publish(ClientEvent::Error(Arc::new(error)));
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.failed() {
            ReconnectDecision::Disabled => {
                self.sync_state();
                self.publish(ClientEvent::Close {
                    reason: Some("reconnection disabled".to_string()),
                });
            }
            ReconnectDecision::Exhausted { attempts } => {
                let error = ClientError::ReconnectExhausted { attempts };
                self.diag.error("reconnect_exhausted", &error);
                self.sync_state();
                self.publish(ClientEvent::Error(Arc::new(error)));
                self.publish(ClientEvent::Close {
                    reason: Some("reconnection exhausted".to_string()),
                });
            }
            ReconnectDecision::Retry { attempt, delay } => {
                self.reconnect_at = Some(deadline_after(Instant::now(), delay));
                self.sync_state();
                self.diag.info(
                    "reconnect_scheduled",
                    format!("attempt {attempt} in {}ms", delay.as_millis()),
                );
                self.publish(ClientEvent::ReconnectAttempt { attempt, delay });
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_at = None;
        self.open_transport();
    }

    /// Drop the transport and open a fresh one outside the backoff schedule.
    fn restart_transport(&mut self) {
        self.close_links();
        self.drop_namespaces("transport restart");
        self.open_transport();
    }

    fn close_session(&mut self, reason: &str) {
        let was_active =
            self.reconnect.state() != ConnectionState::Idle || self.primary.is_some();
        let connected = self.registry.mark_all_disconnected();
        if self.primary.is_some() {
            for namespace in &connected {
                self.send_socket_packet(&SocketPacket::disconnect(namespace), &[]);
            }
        }
        for namespace in connected {
            self.publish(ClientEvent::Disconnect {
                namespace,
                reason: reason.to_string(),
            });
        }
        self.close_links();
        // Open and probe results already in flight belong to a closed session.
        self.epoch += 1;
        self.reconnect_at = None;
        self.reconnect.stop();
        self.sync_state();

        let cancelled = self.acks.cancel_all(AckReply::Disconnected);
        let abandoned = self.offline.clear();
        if was_active || cancelled > 0 || abandoned > 0 {
            self.diag.info(
                "closed",
                format!("{reason}; {cancelled} acks cancelled, {abandoned} queued emits dropped"),
            );
            self.publish(ClientEvent::Close {
                reason: Some(reason.to_string()),
            });
        }
    }

    // Inbound path

    fn on_link_event(&mut self, source: Source, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => self.handle_text(source, &text),
            TransportEvent::Binary(data) => self.handle_binary(data),
            TransportEvent::Closed(reason) => match source {
                Source::Primary => self.on_transport_lost(reason),
                Source::Retiring => {
                    self.retiring = None;
                }
            },
        }
    }

    fn handle_text(&mut self, source: Source, text: &str) {
        let packet = match decode_packet(text) {
            Ok(packet) => packet,
            Err(err) => {
                self.diag.error("malformed_frame", err);
                return;
            }
        };
        match packet.kind {
            PacketType::Message => self.handle_message(&packet.body),
            PacketType::Ping => {
                self.send_outer(&Packet::pong(packet.body));
                self.publish(ClientEvent::Ping);
            }
            PacketType::Pong => self.publish(ClientEvent::Pong),
            PacketType::Close => match source {
                Source::Primary => self.on_transport_lost(Some("peer closed the session".to_string())),
                Source::Retiring => {
                    if let Some(link) = self.retiring.take() {
                        link.sink.close();
                    }
                }
            },
            PacketType::Open => self.diag.debug("unexpected_open", text),
            PacketType::Upgrade | PacketType::Noop => {}
        }
    }

    fn handle_binary(&mut self, data: Bytes) {
        match self.assembler.push_attachment(data) {
            Ok(Some(done)) => self.on_assembled(done),
            Ok(None) => {}
            Err(err) => self.diag.error("attachment_ordering_violation", err),
        }
    }

    fn handle_message(&mut self, body: &str) {
        let packet = match decode_socket_packet(body) {
            Ok(packet) => packet,
            Err(err) => {
                self.diag.error("malformed_payload", err);
                return;
            }
        };
        match packet.kind {
            SocketPacketType::Connect => self.on_namespace_connected(&packet.namespace),
            SocketPacketType::Disconnect => {
                if self.registry.mark_disconnected(&packet.namespace) {
                    self.publish(ClientEvent::Disconnect {
                        namespace: packet.namespace,
                        reason: "server disconnect".to_string(),
                    });
                }
            }
            SocketPacketType::Event => {
                let args = packet.args().iter().cloned().map(Value::from).collect();
                let event = packet.event_name().unwrap_or_default().to_string();
                self.dispatch_event(packet.namespace, event, args, packet.id);
            }
            SocketPacketType::Ack => {
                let args = packet.args().iter().cloned().map(Value::from).collect();
                if let Some(id) = packet.id {
                    self.resolve_ack(packet.namespace, id, args);
                }
            }
            SocketPacketType::ConnectError => {
                self.on_connect_error(packet.namespace, packet.data)
            }
            SocketPacketType::BinaryEvent | SocketPacketType::BinaryAck => {
                match self.assembler.start(&packet) {
                    Ok(Some(done)) => self.on_assembled(done),
                    Ok(None) => {}
                    Err(err) => self.diag.error("malformed_payload", err),
                }
            }
        }
    }

    fn on_assembled(&mut self, done: AssembledPacket) {
        if done.is_ack {
            match done.id {
                Some(id) => self.resolve_ack(done.namespace, id, done.args),
                None => self.diag.error("malformed_payload", "binary ack without id"),
            }
        } else {
            let event = done.event.unwrap_or_default();
            self.dispatch_event(done.namespace, event, done.args, done.id);
        }
    }

    fn dispatch_event(&mut self, namespace: String, event: String, args: Vec<Value>, id: Option<u64>) {
        let Some((event, args)) = run_chain(
            &self.config.middleware,
            Direction::Inbound,
            &namespace,
            event,
            args,
        ) else {
            self.diag.debug("receive_vetoed", &namespace);
            return;
        };
        self.publish(ClientEvent::Event {
            namespace: namespace.clone(),
            event: event.clone(),
            args: args.clone(),
            id,
        });
        let responder = id.map(|id| AckResponder::new(&namespace, id, self.ack_tx.clone()));
        let inbound = InboundEvent {
            namespace,
            event,
            args,
            responder,
        };
        let handled = self.registry.dispatch(&inbound);
        if handled == 0 {
            self.diag.debug(
                "event_unhandled",
                format!("{} {}", inbound.namespace, inbound.event),
            );
        }
    }

    fn resolve_ack(&mut self, namespace: String, id: u64, args: Vec<Value>) {
        self.publish(ClientEvent::Ack {
            namespace,
            id,
            args: args.clone(),
        });
        if !self.acks.resolve(id, args) {
            self.diag.debug("ack_unknown", format!("id {id} already resolved or expired"));
        }
    }

    fn on_namespace_connected(&mut self, namespace: &str) {
        let sticky = self.registry.mark_connected(namespace);
        self.diag.info("namespace_connected", namespace);
        self.publish(ClientEvent::Connect {
            namespace: namespace.to_string(),
        });
        for join in sticky {
            self.send_event(namespace, &join.event, join.args, None);
        }
        for entry in self.offline.drain_namespace(namespace) {
            self.emit_ready(entry);
        }
    }

    fn on_connect_error(&mut self, namespace: String, data: Option<Json>) {
        self.registry.mark_disconnected(&namespace);
        self.diag.error(
            "connect_error",
            format!(
                "{namespace}: {}",
                data.as_ref().map(Json::to_string).unwrap_or_default()
            ),
        );
        self.publish(ClientEvent::ConnectError {
            namespace: namespace.clone(),
            data: data.clone(),
        });

        if namespace == self.default_namespace {
            if let Some(next) = self
                .config
                .namespace
                .fallbacks()
                .get(self.fallback_cursor)
                .cloned()
            {
                self.fallback_cursor += 1;
                self.diag
                    .info("namespace_fallback", format!("{namespace} -> {next}"));
                self.registry.rename(&namespace, &next);
                self.offline.retarget(&namespace, &next);
                self.default_namespace = next.clone();
                self.send_connect(&next);
                return;
            }
        }

        let retry = self
            .config
            .auth
            .as_ref()
            .is_some_and(|auth| auth.should_reconnect(&namespace, data.as_ref()));
        if retry {
            self.diag.info("auth_reconnect", &namespace);
            self.restart_transport();
        }
    }

    fn on_probe_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => {
                let outcome = match decode_packet(&text) {
                    Ok(packet) => self.upgrade.probe_frame(&packet),
                    Err(_) => ProbeOutcome::Ignore,
                };
                match outcome {
                    ProbeOutcome::Handover => self.finish_upgrade(),
                    ProbeOutcome::Ignore => self.diag.debug("probe_frame_ignored", text),
                }
            }
            TransportEvent::Binary(_) => self.diag.debug("probe_frame_ignored", "binary frame"),
            TransportEvent::Closed(reason) => {
                self.probe = None;
                self.upgrade.probe_failed();
                self.diag.info(
                    "upgrade_failed",
                    reason.unwrap_or_else(|| "probe closed".to_string()),
                );
            }
        }
    }

    /// Confirm the upgrade and swap transports in one step.
    fn finish_upgrade(&mut self) {
        let Some(probe) = self.probe.take() else {
            return;
        };
        if let Err(err) = probe.sink.send_text(Packet::upgrade().encode()) {
            self.diag.error("upgrade_failed", err);
            probe.sink.close();
            self.upgrade.reset();
            return;
        }
        let kind = probe.kind;
        let route = Route::new(probe.path.clone(), kind);
        if let Some(old) = self.primary.replace(probe) {
            old.sink.close();
            self.retiring = Some(old);
        }
        self.remember(&route);
        self.diag.info("upgraded", format!("transport={kind}"));
        self.publish(ClientEvent::Upgrade { transport: kind });
    }

    // Timers

    fn on_ping_due(&mut self) {
        self.send_outer(&Packet::ping());
        self.ping_at = Some(deadline_after(Instant::now(), self.ping_interval));
    }

    fn sweep_acks(&mut self) {
        let expired = self.acks.sweep(Instant::now());
        if expired > 0 {
            self.diag
                .debug("ack_timeout", format!("{expired} acknowledgements timed out"));
        }
    }

    // Observers

    fn publish(&mut self, event: ClientEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn sync_state(&self) {
        let state = self.reconnect.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}
