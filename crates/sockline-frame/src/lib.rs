//! Wire codecs for sockline.
//!
//! Two layers share every frame:
//! - the outer heartbeat layer ([`engine`]): open, close, ping, pong,
//!   message, upgrade and noop packets
//! - the inner messaging layer ([`socket`]), carried inside outer message
//!   packets: namespace connect/disconnect, events, acknowledgements and
//!   their binary variants
//!
//! Binary blobs travel out of band as separate frames; [`binary`] splits
//! payloads on send and reassembles them on receive. Nothing here performs
//! I/O.

pub mod binary;
pub mod engine;
pub mod error;
pub mod open;
pub mod polling;
pub mod socket;
pub mod value;

pub use binary::{
    placeholder, placeholder_index, reconstruct, split, AssembledPacket, BinaryAssembler,
    PendingBinaryPacket, Split,
};
pub use engine::{decode_packet, encode_packet, Packet, PacketType, PROBE};
pub use error::{FrameError, Result};
pub use open::{validate_sid, OpenInfo, MAX_SID_LEN};
pub use polling::{decode_payload, encode_payload, PollPacket};
pub use socket::{
    decode_socket_packet, encode_socket_packet, SocketPacket, SocketPacketType,
    DEFAULT_NAMESPACE,
};
pub use value::Value;
