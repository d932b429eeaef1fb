//! Outer (heartbeat layer) packet codec.
//!
//! Every frame is a single type digit followed by an opaque body:
//!
//! ```text
//! 0{"sid":"..."}   open
//! 1                close
//! 2 / 2probe       ping / probe
//! 3 / 3probe       pong / probe echo
//! 4<inner packet>  message
//! 5                upgrade
//! 6                noop
//! ```

use std::fmt;

use crate::error::{FrameError, Result};

/// Body carried by the probe ping and its echo.
pub const PROBE: &str = "probe";

/// Outer packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl PacketType {
    /// Wire character for this type.
    pub fn as_char(self) -> char {
        match self {
            PacketType::Open => '0',
            PacketType::Close => '1',
            PacketType::Ping => '2',
            PacketType::Pong => '3',
            PacketType::Message => '4',
            PacketType::Upgrade => '5',
            PacketType::Noop => '6',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '0' => PacketType::Open,
            '1' => PacketType::Close,
            '2' => PacketType::Ping,
            '3' => PacketType::Pong,
            '4' => PacketType::Message,
            '5' => PacketType::Upgrade,
            '6' => PacketType::Noop,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketType::Open => "open",
            PacketType::Close => "close",
            PacketType::Ping => "ping",
            PacketType::Pong => "pong",
            PacketType::Message => "message",
            PacketType::Upgrade => "upgrade",
            PacketType::Noop => "noop",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One outer packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub body: String,
}

impl Packet {
    pub fn new(kind: PacketType, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    pub fn ping() -> Self {
        Self::new(PacketType::Ping, "")
    }

    pub fn pong(body: impl Into<String>) -> Self {
        Self::new(PacketType::Pong, body)
    }

    /// Wrap an encoded inner packet.
    pub fn message(body: impl Into<String>) -> Self {
        Self::new(PacketType::Message, body)
    }

    /// `2probe`, sent on a candidate transport before upgrading.
    pub fn probe() -> Self {
        Self::new(PacketType::Ping, PROBE)
    }

    /// `5`, confirms the upgrade on the probed transport.
    pub fn upgrade() -> Self {
        Self::new(PacketType::Upgrade, "")
    }

    pub fn close() -> Self {
        Self::new(PacketType::Close, "")
    }

    /// Returns true for the `3probe` echo.
    pub fn is_probe_echo(&self) -> bool {
        self.kind == PacketType::Pong && self.body == PROBE
    }

    /// Returns true for the `2probe` request.
    pub fn is_probe(&self) -> bool {
        self.kind == PacketType::Ping && self.body == PROBE
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> String {
        encode_packet(self)
    }
}

/// Decode one outer frame.
pub fn decode_packet(raw: &str) -> Result<Packet> {
    let mut chars = raw.chars();
    let first = chars
        .next()
        .ok_or_else(|| FrameError::MalformedFrame("empty frame".to_string()))?;
    let kind = PacketType::from_char(first).ok_or_else(|| {
        FrameError::MalformedFrame(format!("unknown packet type {first:?}"))
    })?;
    Ok(Packet {
        kind,
        body: chars.as_str().to_string(),
    })
}

/// Encode one outer frame.
pub fn encode_packet(packet: &Packet) -> String {
    let mut out = String::with_capacity(1 + packet.body.len());
    out.push(packet.kind.as_char());
    out.push_str(&packet.body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_every_type() {
        for (raw, kind) in [
            ("0{}", PacketType::Open),
            ("1", PacketType::Close),
            ("2", PacketType::Ping),
            ("3", PacketType::Pong),
            ("42[\"a\"]", PacketType::Message),
            ("5", PacketType::Upgrade),
            ("6", PacketType::Noop),
        ] {
            let packet = decode_packet(raw).unwrap();
            assert_eq!(packet.kind, kind);
            assert_eq!(encode_packet(&packet), raw);
        }
    }

    #[test]
    fn test_message_body_is_untouched() {
        let packet = decode_packet("42/chat,7[\"msg\",\"hi\"]").unwrap();
        assert_eq!(packet.body, "2/chat,7[\"msg\",\"hi\"]");
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        assert!(matches!(
            decode_packet("9hello"),
            Err(FrameError::MalformedFrame(_))
        ));
        assert!(matches!(decode_packet(""), Err(FrameError::MalformedFrame(_))));
    }

    #[test]
    fn test_probe_helpers() {
        assert_eq!(Packet::probe().encode(), "2probe");
        assert_eq!(Packet::upgrade().encode(), "5");
        assert!(decode_packet("3probe").unwrap().is_probe_echo());
        assert!(!decode_packet("3").unwrap().is_probe_echo());
        assert!(decode_packet("2probe").unwrap().is_probe());
    }
}
