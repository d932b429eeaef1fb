//! Inner (messaging layer) packet codec.
//!
//! Carried in the body of an outer message packet:
//!
//! ```text
//! <type>[<attachments>-][<namespace>,][<id>][<json>]
//! ```
//!
//! The attachment count is present only for the binary types. The namespace
//! segment is omitted for `/`. The id segment is omitted when no
//! acknowledgement is requested.

use std::fmt;

use serde_json::Value as Json;

use crate::error::{FrameError, Result};

/// Namespace used when a packet carries no namespace segment.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Inner packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketPacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    /// Namespace connect refused by the peer.
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl SocketPacketType {
    pub fn as_char(self) -> char {
        match self {
            SocketPacketType::Connect => '0',
            SocketPacketType::Disconnect => '1',
            SocketPacketType::Event => '2',
            SocketPacketType::Ack => '3',
            SocketPacketType::ConnectError => '4',
            SocketPacketType::BinaryEvent => '5',
            SocketPacketType::BinaryAck => '6',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '0' => SocketPacketType::Connect,
            '1' => SocketPacketType::Disconnect,
            '2' => SocketPacketType::Event,
            '3' => SocketPacketType::Ack,
            '4' => SocketPacketType::ConnectError,
            '5' => SocketPacketType::BinaryEvent,
            '6' => SocketPacketType::BinaryAck,
            _ => return None,
        })
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            SocketPacketType::BinaryEvent | SocketPacketType::BinaryAck
        )
    }

    pub fn is_event(self) -> bool {
        matches!(
            self,
            SocketPacketType::Event | SocketPacketType::BinaryEvent
        )
    }

    pub fn is_ack(self) -> bool {
        matches!(self, SocketPacketType::Ack | SocketPacketType::BinaryAck)
    }

    pub fn name(self) -> &'static str {
        match self {
            SocketPacketType::Connect => "connect",
            SocketPacketType::Disconnect => "disconnect",
            SocketPacketType::Event => "event",
            SocketPacketType::Ack => "ack",
            SocketPacketType::ConnectError => "connect_error",
            SocketPacketType::BinaryEvent => "binary_event",
            SocketPacketType::BinaryAck => "binary_ack",
        }
    }
}

impl fmt::Display for SocketPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One inner packet.
///
/// `data` holds the JSON body verbatim. For binary types it is the
/// placeholder tree; the blobs travel as separate frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketType,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Json>,
    /// Declared attachment count (binary types only).
    pub attachments: usize,
}

impl SocketPacket {
    fn new(kind: SocketPacketType, namespace: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            id: None,
            data: None,
            attachments: 0,
        }
    }

    /// Namespace connect, optionally carrying a join payload.
    pub fn connect(namespace: &str, payload: Option<Json>) -> Self {
        Self {
            data: payload,
            ..Self::new(SocketPacketType::Connect, namespace)
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self::new(SocketPacketType::Disconnect, namespace)
    }

    /// Plain event: `[event, ...args]`.
    pub fn event(namespace: &str, event: &str, args: Vec<Json>, id: Option<u64>) -> Self {
        let mut array = Vec::with_capacity(args.len() + 1);
        array.push(Json::String(event.to_string()));
        array.extend(args);
        Self {
            id,
            data: Some(Json::Array(array)),
            ..Self::new(SocketPacketType::Event, namespace)
        }
    }

    /// Plain acknowledgement: `[...args]`.
    pub fn ack(namespace: &str, id: u64, args: Vec<Json>) -> Self {
        Self {
            id: Some(id),
            data: Some(Json::Array(args)),
            ..Self::new(SocketPacketType::Ack, namespace)
        }
    }

    /// Binary event whose args already hold placeholders.
    pub fn binary_event(
        namespace: &str,
        event: &str,
        args: Vec<Json>,
        id: Option<u64>,
        attachments: usize,
    ) -> Self {
        Self {
            kind: SocketPacketType::BinaryEvent,
            attachments,
            ..Self::event(namespace, event, args, id)
        }
    }

    /// Binary acknowledgement whose args already hold placeholders.
    pub fn binary_ack(namespace: &str, id: u64, args: Vec<Json>, attachments: usize) -> Self {
        Self {
            kind: SocketPacketType::BinaryAck,
            attachments,
            ..Self::ack(namespace, id, args)
        }
    }

    /// Event name for event packets.
    pub fn event_name(&self) -> Option<&str> {
        if !self.kind.is_event() {
            return None;
        }
        self.array()?.first()?.as_str()
    }

    /// Event arguments (after the name) or acknowledgement arguments.
    pub fn args(&self) -> &[Json] {
        let Some(array) = self.array() else {
            return &[];
        };
        if self.kind.is_event() {
            array.get(1..).unwrap_or(&[])
        } else {
            array
        }
    }

    fn array(&self) -> Option<&[Json]> {
        match &self.data {
            Some(Json::Array(items)) => Some(items),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        encode_socket_packet(self)
    }
}

/// Decode the body of an outer message packet.
pub fn decode_socket_packet(body: &str) -> Result<SocketPacket> {
    let mut rest = body;

    let first = rest
        .chars()
        .next()
        .ok_or_else(|| FrameError::MalformedPayload("empty packet".to_string()))?;
    let kind = SocketPacketType::from_char(first)
        .ok_or_else(|| FrameError::MalformedPayload(format!("unknown packet type {first:?}")))?;
    rest = &rest[first.len_utf8()..];

    let mut attachments = 0;
    if kind.is_binary() {
        let digits = leading_digits(rest);
        if digits == 0 || rest.as_bytes().get(digits) != Some(&b'-') {
            return Err(FrameError::MalformedPayload(
                "binary packet without attachment count".to_string(),
            ));
        }
        attachments = rest[..digits]
            .parse::<usize>()
            .map_err(|err| FrameError::MalformedPayload(format!("attachment count: {err}")))?;
        rest = &rest[digits + 1..];
    }

    let mut namespace = DEFAULT_NAMESPACE;
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(comma) => {
                namespace = &rest[..comma];
                rest = &rest[comma + 1..];
            }
            None => {
                namespace = rest;
                rest = "";
            }
        }
    }

    let mut id = None;
    let digits = leading_digits(rest);
    if digits > 0 {
        id = Some(
            rest[..digits]
                .parse::<u64>()
                .map_err(|err| FrameError::MalformedPayload(format!("packet id: {err}")))?,
        );
        rest = &rest[digits..];
    }

    let data = if rest.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Json>(rest)
                .map_err(|err| FrameError::MalformedPayload(format!("packet body: {err}")))?,
        )
    };

    let packet = SocketPacket {
        kind,
        namespace: namespace.to_string(),
        id,
        data,
        attachments,
    };
    validate_shape(&packet)?;
    Ok(packet)
}

/// Encode an inner packet; the exact inverse of [`decode_socket_packet`].
pub fn encode_socket_packet(packet: &SocketPacket) -> String {
    let mut out = String::new();
    out.push(packet.kind.as_char());
    if packet.kind.is_binary() {
        out.push_str(&packet.attachments.to_string());
        out.push('-');
    }
    if packet.namespace != DEFAULT_NAMESPACE && !packet.namespace.is_empty() {
        out.push_str(&packet.namespace);
        out.push(',');
    }
    if let Some(id) = packet.id {
        out.push_str(&id.to_string());
    }
    if let Some(data) = &packet.data {
        out.push_str(&data.to_string());
    }
    out
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

fn validate_shape(packet: &SocketPacket) -> Result<()> {
    if packet.kind.is_event() {
        match packet.array() {
            Some([Json::String(_), ..]) => {}
            _ => {
                return Err(FrameError::MalformedPayload(
                    "event body must be an array starting with the event name".to_string(),
                ))
            }
        }
    }
    if packet.kind.is_ack() {
        if packet.id.is_none() {
            return Err(FrameError::MalformedPayload(
                "ack without packet id".to_string(),
            ));
        }
        if packet.array().is_none() {
            return Err(FrameError::MalformedPayload(
                "ack body must be an array".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_event_default_namespace() {
        let packet = decode_socket_packet(r#"2["chat",{"text":"hi"}]"#).unwrap();
        assert_eq!(packet.kind, SocketPacketType::Event);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.id, None);
        assert_eq!(packet.event_name(), Some("chat"));
        assert_eq!(packet.args(), &[json!({"text": "hi"})]);
    }

    #[test]
    fn test_decode_namespace_and_id() {
        let packet = decode_socket_packet(r#"2/admin,12["kick","bob"]"#).unwrap();
        assert_eq!(packet.namespace, "/admin");
        assert_eq!(packet.id, Some(12));
        assert_eq!(packet.encode(), r#"2/admin,12["kick","bob"]"#);
    }

    #[test]
    fn test_decode_ack_has_no_event_name() {
        let packet = decode_socket_packet(r#"3/admin,12["ok",1]"#).unwrap();
        assert_eq!(packet.kind, SocketPacketType::Ack);
        assert_eq!(packet.event_name(), None);
        assert_eq!(packet.args(), &[json!("ok"), json!(1)]);
    }

    #[test]
    fn test_decode_binary_header() {
        let packet =
            decode_socket_packet(r#"52-/files,["upload",{"_placeholder":true,"num":0},{"_placeholder":true,"num":1}]"#)
                .unwrap();
        assert_eq!(packet.kind, SocketPacketType::BinaryEvent);
        assert_eq!(packet.attachments, 2);
        assert_eq!(packet.namespace, "/files");
        assert_eq!(packet.event_name(), Some("upload"));
    }

    #[test]
    fn test_connect_packets() {
        assert_eq!(SocketPacket::connect("/", None).encode(), "0");
        assert_eq!(
            SocketPacket::connect("/chat", Some(json!({"token": "t"}))).encode(),
            r#"0/chat,{"token":"t"}"#
        );
        let ack = decode_socket_packet(r#"0/chat,{"sid":"x"}"#).unwrap();
        assert_eq!(ack.kind, SocketPacketType::Connect);
        assert_eq!(ack.namespace, "/chat");

        let bare = decode_socket_packet("1/chat").unwrap();
        assert_eq!(bare.kind, SocketPacketType::Disconnect);
        assert_eq!(bare.namespace, "/chat");
        assert!(bare.data.is_none());
    }

    #[test]
    fn test_encode_omits_default_segments() {
        let packet = SocketPacket::event("/", "ping", vec![], None);
        assert_eq!(packet.encode(), r#"2["ping"]"#);
        let with_id = SocketPacket::event("/", "ping", vec![json!(1)], Some(3));
        assert_eq!(with_id.encode(), r#"23["ping",1]"#);
        let binary = SocketPacket::binary_ack("/up", 4, vec![json!({"_placeholder": true, "num": 0})], 1);
        assert_eq!(binary.encode(), r#"61-/up,4[{"_placeholder":true,"num":0}]"#);
    }

    #[test]
    fn test_malformed_bodies() {
        for raw in [
            "",
            "9[]",
            "2[\"unterminated",
            "2{\"not\":\"array\"}",
            "2[1,2]",
            "3[\"no id\"]",
            "5[\"missing count\"]",
            "599999999999999999999999-[\"x\"]",
        ] {
            assert!(
                matches!(decode_socket_packet(raw), Err(FrameError::MalformedPayload(_))),
                "{raw:?} should be malformed"
            );
        }
    }
}
