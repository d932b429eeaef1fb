use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use sockline_transport::{SecurityPolicy, TransportKind};
use url::Url;

use crate::auth::AuthProvider;
use crate::error::{ClientError, Result};
use crate::log::{LogLevel, LogSink};
use crate::middleware::EventMiddleware;
use crate::store::KeyValueStore;

/// Default mount path of the realtime endpoint.
pub const DEFAULT_PATH: &str = "/socket.io";

/// Backoff policy for re-opening a lost connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Failures tolerated before giving up.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor between consecutive delays; at least 1.
    pub factor: f64,
    /// Symmetric jitter as a fraction of the delay, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            factor: 2.0,
            jitter: 0.25,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Acknowledgement deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckPolicy {
    pub timeout: Duration,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
        }
    }
}

/// Bounds for emissions buffered while no namespace is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineQueuePolicy {
    pub enabled: bool,
    pub max_items: usize,
}

impl Default for OfflineQueuePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_items: 200,
        }
    }
}

/// Which namespace the default handle joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceStrategy {
    Fixed(String),
    /// Start at `preferred`; advance through `fallbacks` each time the peer
    /// refuses the connect.
    Preferred {
        preferred: String,
        fallbacks: Vec<String>,
    },
}

impl Default for NamespaceStrategy {
    fn default() -> Self {
        NamespaceStrategy::Fixed("/".to_string())
    }
}

impl NamespaceStrategy {
    pub fn initial(&self) -> &str {
        match self {
            NamespaceStrategy::Fixed(name) => name,
            NamespaceStrategy::Preferred { preferred, .. } => preferred,
        }
    }

    pub fn fallbacks(&self) -> &[String] {
        match self {
            NamespaceStrategy::Fixed(_) => &[],
            NamespaceStrategy::Preferred { fallbacks, .. } => fallbacks,
        }
    }

    fn names(&self) -> impl Iterator<Item = &String> {
        let initial = match self {
            NamespaceStrategy::Fixed(name) => name,
            NamespaceStrategy::Preferred { preferred, .. } => preferred,
        };
        std::iter::once(initial).chain(self.fallbacks())
    }
}

/// Engine configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base address, `http(s)://host[:port]`.
    pub url: Url,
    /// Candidate mount paths, tried in order.
    pub paths: Vec<String>,
    pub namespace: NamespaceStrategy,
    /// Transport preference order.
    pub transports: Vec<TransportKind>,
    /// Bound for each transport open.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub ack: AckPolicy,
    pub offline_queue: OfflineQueuePolicy,
    /// Static query parameters added to every connection URL.
    pub query: Vec<(String, String)>,
    /// Static headers sent with every transport open.
    pub headers: Vec<(String, String)>,
    /// Payload of every namespace connect packet.
    pub join_payload: Option<Json>,
    pub log_level: LogLevel,
    pub security: Option<Arc<dyn SecurityPolicy>>,
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub store: Option<Arc<dyn KeyValueStore>>,
    pub log_sink: Option<Arc<dyn LogSink>>,
    pub middleware: Vec<Arc<dyn EventMiddleware>>,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base address.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            paths: vec![DEFAULT_PATH.to_string()],
            namespace: NamespaceStrategy::default(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            connect_timeout: Duration::from_secs(12),
            reconnect: ReconnectPolicy::default(),
            ack: AckPolicy::default(),
            offline_queue: OfflineQueuePolicy::default(),
            query: Vec::new(),
            headers: Vec::new(),
            join_payload: None,
            log_level: LogLevel::default(),
            security: None,
            auth: None,
            store: None,
            log_sink: None,
            middleware: Vec::new(),
        }
    }

    /// Parse `url` and build a default configuration.
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transports(mut self, transports: impl Into<Vec<TransportKind>>) -> Self {
        self.transports = transports.into();
        self
    }

    pub fn with_namespace(mut self, namespace: NamespaceStrategy) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack.timeout = timeout;
        self
    }

    pub fn with_offline_queue(mut self, offline_queue: OfflineQueuePolicy) -> Self {
        self.offline_queue = offline_queue;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_join_payload(mut self, payload: Json) -> Self {
        self.join_payload = Some(payload);
        self
    }

    pub fn with_security(mut self, security: Arc<dyn SecurityPolicy>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>, level: LogLevel) -> Self {
        self.log_sink = Some(sink);
        self.log_level = level;
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn EventMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        match self.url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => return Err(invalid(format!("unsupported url scheme '{other}'"))),
        }
        if self.paths.is_empty() {
            return Err(invalid("at least one path is required"));
        }
        if let Some(path) = self.paths.iter().find(|path| !path.starts_with('/')) {
            return Err(invalid(format!("path '{path}' must start with '/'")));
        }
        if self.transports.is_empty() {
            return Err(invalid("at least one transport is required"));
        }
        if let Some(name) = self.namespace.names().find(|name| !name.starts_with('/')) {
            return Err(invalid(format!("namespace '{name}' must start with '/'")));
        }
        if !self.reconnect.factor.is_finite() || self.reconnect.factor < 1.0 {
            return Err(invalid("reconnect factor must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(invalid("reconnect jitter must be within [0, 1]"));
        }
        if self.reconnect.initial_delay > self.reconnect.max_delay {
            return Err(invalid("reconnect initial delay exceeds max delay"));
        }
        if self.ack.timeout.is_zero() {
            return Err(invalid("ack timeout must be > 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("connect timeout must be > 0"));
        }
        if self.offline_queue.enabled && self.offline_queue.max_items == 0 {
            return Err(invalid("enabled offline queue needs max_items > 0"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ClientError {
    ClientError::InvalidConfig(message.into())
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted_headers: Vec<_> = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), format!("<redacted:{} bytes>", value.len())))
            .collect();
        f.debug_struct("ClientConfig")
            .field("url", &self.url.as_str())
            .field("paths", &self.paths)
            .field("namespace", &self.namespace)
            .field("transports", &self.transports)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect", &self.reconnect)
            .field("ack", &self.ack)
            .field("offline_queue", &self.offline_queue)
            .field("query", &self.query)
            .field("headers", &redacted_headers)
            .field("join_payload", &self.join_payload.is_some())
            .field("log_level", &self.log_level)
            .field("security", &self.security.is_some())
            .field("auth", &self.auth.is_some())
            .field("store", &self.store.is_some())
            .field("log_sink", &self.log_sink.is_some())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
