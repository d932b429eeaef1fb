//! Client-side realtime messaging over a two-layer wire protocol.
//!
//! # Crate Structure
//!
//! - [`transport`] : transport boundary, security collaborator, in-memory transport
//! - [`frame`] : outer and inner packet codecs, binary attachments, polling payloads
//! - [`client`] : the protocol engine and its handles (behind the `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use sockline_transport::*;
}

/// Re-export codec types.
pub mod frame {
    pub use sockline_frame::*;
}

/// Re-export engine types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use sockline_client::*;
}
