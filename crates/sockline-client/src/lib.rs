//! Client-side realtime messaging engine.
//!
//! A [`Client`] owns one session with a peer: it opens a transport (trying
//! every configured path and transport kind in order), keeps the session
//! alive with heartbeats, connects namespaces, correlates acknowledgements,
//! buffers emits while offline, reconnects with exponential backoff and
//! upgrades a polling session to a persistent transport when the peer
//! allows it.
//!
//! All protocol state lives on a single engine task. Handles only send
//! commands to it, so none of the public methods block.
//!
//! ```no_run
//! use sockline_client::{Client, ClientConfig, Value};
//! use sockline_transport::memory_transport;
//!
//! # async fn demo() -> sockline_client::Result<()> {
//! let (connector, _server) = memory_transport();
//! let client = Client::new(ClientConfig::parse("http://localhost:3000")?, connector)?;
//! let chat = client.of("/chat");
//! chat.on("message", |event| println!("{:?}", event.payload()));
//! chat.emit("message", vec![Value::from("hello")])?;
//! client.connect()?;
//! # Ok(())
//! # }
//! ```

pub mod ack;
pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod handshake;
pub mod log;
pub mod middleware;
pub mod namespace;
pub mod offline;
pub mod reconnect;
pub mod store;
pub mod upgrade;

pub use ack::{AckCorrelator, ACK_SWEEP_INTERVAL};
pub use auth::{AuthProvider, TokenAuth};
pub use client::{Client, Namespace, Subscription};
pub use config::{
    AckPolicy, ClientConfig, NamespaceStrategy, OfflineQueuePolicy, ReconnectPolicy,
    DEFAULT_PATH,
};
pub use engine::MIN_PING_INTERVAL;
pub use error::{ClientError, Result};
pub use event::{
    AckCallback, AckReply, AckResponder, ClientEvent, ConnectionState, EventHandler,
    EventStream, InboundEvent,
};
pub use handshake::{build_open_url, candidate_routes, Route, PROTOCOL_REVISION};
pub use log::{LogLevel, LogSink};
pub use middleware::EventMiddleware;
pub use namespace::{NamespaceRegistry, StickyJoin, SubscriptionId};
pub use offline::{OfflineEntry, OfflineQueue, PushOutcome};
pub use reconnect::{apply_jitter, ReconnectController, ReconnectDecision, MIN_RECONNECT_DELAY};
pub use sockline_frame::Value;
pub use store::{KeyValueStore, MemoryStore, ROUTE_KEY};
pub use upgrade::{ProbeOutcome, UpgradeCoordinator, UpgradeState};
