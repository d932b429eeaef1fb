//! Request/response (polling) payload codec.
//!
//! A polling body carries several outer packets as `<len>:<packet>` repeated,
//! where `len` counts characters. Binary packets are written as `b<base64>`.

use bytes::Bytes;

use crate::error::{FrameError, Result};

/// One packet inside a polling body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollPacket {
    /// An encoded outer packet.
    Text(String),
    /// A raw binary attachment.
    Binary(Bytes),
}

impl PollPacket {
    fn wire(&self) -> String {
        match self {
            PollPacket::Text(text) => text.clone(),
            PollPacket::Binary(data) => format!("b{}", base64::encode(data)),
        }
    }
}

/// Join packets into one polling body.
pub fn encode_payload(packets: &[PollPacket]) -> String {
    let mut out = String::new();
    for packet in packets {
        let wire = packet.wire();
        out.push_str(&wire.chars().count().to_string());
        out.push(':');
        out.push_str(&wire);
    }
    out
}

/// Split a polling body into packets.
///
/// A body that does not start with a length prefix is a single packet.
pub fn decode_payload(body: &str) -> Result<Vec<PollPacket>> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    if !has_length_prefix(body) {
        return Ok(vec![parse_packet(body)?]);
    }

    let mut packets = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let colon = rest
            .find(':')
            .ok_or_else(|| FrameError::MalformedFrame("missing length prefix".to_string()))?;
        let len: usize = rest[..colon].parse().map_err(|_| {
            FrameError::MalformedFrame(format!("invalid length prefix {:?}", &rest[..colon]))
        })?;
        rest = &rest[colon + 1..];

        let end = byte_offset_of_char(rest, len).ok_or_else(|| {
            FrameError::MalformedFrame(format!(
                "declared length {len} exceeds remaining body"
            ))
        })?;
        packets.push(parse_packet(&rest[..end])?);
        rest = &rest[end..];
    }
    Ok(packets)
}

fn has_length_prefix(body: &str) -> bool {
    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && body.as_bytes().get(digits) == Some(&b':')
}

fn byte_offset_of_char(s: &str, chars: usize) -> Option<usize> {
    if chars == 0 {
        return Some(0);
    }
    let mut count = 0;
    for (idx, c) in s.char_indices() {
        count += 1;
        if count == chars {
            return Some(idx + c.len_utf8());
        }
    }
    None
}

fn parse_packet(wire: &str) -> Result<PollPacket> {
    match wire.strip_prefix('b') {
        Some(encoded) => base64::decode(encoded)
            .map(|data| PollPacket::Binary(Bytes::from(data)))
            .map_err(|err| FrameError::MalformedFrame(format!("invalid base64 packet: {err}"))),
        None => Ok(PollPacket::Text(wire.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_counts_characters() {
        let body = encode_payload(&[
            PollPacket::Text("4é".to_string()),
            PollPacket::Text("2".to_string()),
        ]);
        assert_eq!(body, "2:4é1:2");
        assert_eq!(
            decode_payload(&body).unwrap(),
            vec![
                PollPacket::Text("4é".to_string()),
                PollPacket::Text("2".to_string())
            ]
        );
    }

    #[test]
    fn test_binary_packets_use_base64() {
        let body = encode_payload(&[PollPacket::Binary(Bytes::from_static(&[1, 2, 3]))]);
        assert_eq!(body, "5:bAQID");
        assert_eq!(
            decode_payload(&body).unwrap(),
            vec![PollPacket::Binary(Bytes::from_static(&[1, 2, 3]))]
        );
    }

    #[test]
    fn test_unprefixed_body_is_one_packet() {
        assert_eq!(
            decode_payload("42[\"a\"]").unwrap(),
            vec![PollPacket::Text("42[\"a\"]".to_string())]
        );
        assert!(decode_payload("").unwrap().is_empty());
    }

    #[test]
    fn test_truncated_body_is_malformed() {
        assert!(matches!(
            decode_payload("9:42"),
            Err(FrameError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_payload("1:2x"),
            Err(FrameError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_payload("3:b!!"),
            Err(FrameError::MalformedFrame(_))
        ));
    }
}
