//! Transport collaborator boundary for the sockline protocol engine.
//!
//! The engine never touches sockets directly. It asks a [`Connector`] to open
//! a [`TransportLink`] of a given [`TransportKind`], writes through the link's
//! [`TransportSink`], and consumes [`TransportEvent`]s from the link's receiver.
//!
//! This is the lowest layer of sockline. Concrete network transports live
//! outside this workspace; [`memory`] provides an in-process pair used by
//! tests and demos.

pub mod error;
pub mod memory;
pub mod security;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{memory_transport, ClientFrame, MemoryConnector, MemoryPeer, MemoryServer};
pub use security::{CertificatePinning, SecurityPolicy, TrustChallenge, TrustDecision};
pub use traits::{
    Connector, OpenFuture, OpenRequest, TransportEvent, TransportKind, TransportLink,
    TransportSink,
};
