//! Binary attachment splitter and assembler.
//!
//! On send, every blob in a payload is replaced by a placeholder
//! `{"_placeholder":true,"num":N}` and carried as a separate binary frame,
//! `N` being the blob's depth-first position. On receive, the header packet
//! is parked until the declared number of binary frames has arrived, then
//! placeholders are substituted back.

use std::collections::VecDeque;

use bytes::Bytes;
use serde_json::{Map, Value as Json};

use crate::error::{FrameError, Result};
use crate::socket::SocketPacket;
use crate::value::Value;

const PLACEHOLDER_KEY: &str = "_placeholder";
const NUM_KEY: &str = "num";

/// Outcome of splitting a value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Split {
    /// No blobs; use the plain encoding path.
    Plain(Json),
    /// Placeholder tree plus attachments in placeholder order.
    Binary { tree: Json, attachments: Vec<Bytes> },
}

impl Split {
    pub fn is_binary(&self) -> bool {
        matches!(self, Split::Binary { .. })
    }
}

/// Extract every blob from `value`.
pub fn split(value: &Value) -> Split {
    let mut attachments = Vec::new();
    let tree = extract(value, &mut attachments);
    if attachments.is_empty() {
        Split::Plain(tree)
    } else {
        Split::Binary { tree, attachments }
    }
}

fn extract(value: &Value, attachments: &mut Vec<Bytes>) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => Json::Number(n.clone()),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(items.iter().map(|v| extract(v, attachments)).collect()),
        Value::Object(map) => Json::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), extract(v, attachments)))
                .collect(),
        ),
        Value::Binary(blob) => {
            let num = attachments.len();
            attachments.push(blob.clone());
            placeholder(num)
        }
    }
}

/// Placeholder marker for attachment `num`.
pub fn placeholder(num: usize) -> Json {
    let mut map = Map::with_capacity(2);
    map.insert(PLACEHOLDER_KEY.to_string(), Json::Bool(true));
    map.insert(NUM_KEY.to_string(), Json::from(num));
    Json::Object(map)
}

/// Attachment index if `json` is a placeholder marker.
pub fn placeholder_index(json: &Json) -> Option<usize> {
    let map = json.as_object()?;
    if map.get(PLACEHOLDER_KEY)?.as_bool()? {
        usize::try_from(map.get(NUM_KEY)?.as_u64()?).ok()
    } else {
        None
    }
}

/// Rebuild a value tree, substituting placeholders with `attachments`.
///
/// Placeholders whose index is out of range stay plain mappings.
pub fn reconstruct(json: &Json, attachments: &[Bytes]) -> Value {
    if let Some(blob) = placeholder_index(json).and_then(|num| attachments.get(num)) {
        return Value::Binary(blob.clone());
    }
    match json {
        Json::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| reconstruct(item, attachments))
                .collect(),
        ),
        Json::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), reconstruct(item, attachments)))
                .collect(),
        ),
        other => Value::from(other.clone()),
    }
}

/// A binary header waiting for its attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBinaryPacket {
    pub is_ack: bool,
    pub namespace: String,
    pub id: Option<u64>,
    /// Event name; `None` for acknowledgements.
    pub event: Option<String>,
    pub args: Vec<Json>,
    pub expected: usize,
    pub received: Vec<Bytes>,
}

impl PendingBinaryPacket {
    fn complete(self) -> AssembledPacket {
        let args = self
            .args
            .iter()
            .map(|arg| reconstruct(arg, &self.received))
            .collect();
        AssembledPacket {
            is_ack: self.is_ack,
            namespace: self.namespace,
            id: self.id,
            event: self.event,
            args,
        }
    }
}

/// A binary event or acknowledgement with its blobs restored.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPacket {
    pub is_ack: bool,
    pub namespace: String,
    pub id: Option<u64>,
    pub event: Option<String>,
    pub args: Vec<Value>,
}

/// FIFO of binary packets awaiting attachments.
///
/// Each binary frame belongs to the front-most pending packet.
#[derive(Debug, Default)]
pub struct BinaryAssembler {
    pending: VecDeque<PendingBinaryPacket>,
}

impl BinaryAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a binary header packet.
    ///
    /// A header declaring zero attachments completes immediately.
    pub fn start(&mut self, packet: &SocketPacket) -> Result<Option<AssembledPacket>> {
        if !packet.kind.is_binary() {
            return Err(FrameError::MalformedPayload(format!(
                "{} packet is not a binary header",
                packet.kind
            )));
        }
        let pending = PendingBinaryPacket {
            is_ack: packet.kind.is_ack(),
            namespace: packet.namespace.clone(),
            id: packet.id,
            event: packet.event_name().map(str::to_string),
            args: packet.args().to_vec(),
            expected: packet.attachments,
            received: Vec::with_capacity(packet.attachments),
        };
        if pending.expected == 0 {
            return Ok(Some(pending.complete()));
        }
        self.pending.push_back(pending);
        Ok(None)
    }

    /// Feed one binary frame to the front-most pending packet.
    pub fn push_attachment(&mut self, data: Bytes) -> Result<Option<AssembledPacket>> {
        let Some(front) = self.pending.front_mut() else {
            return Err(FrameError::AttachmentOrderingViolation { size: data.len() });
        };
        front.received.push(data);
        if front.received.len() < front.expected {
            return Ok(None);
        }
        Ok(self.pending.pop_front().map(PendingBinaryPacket::complete))
    }

    /// Number of packets waiting for attachments.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending packet; used when the transport generation changes.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(
                event = "binary_pending_dropped",
                count = self.pending.len(),
                "dropping incomplete binary packets"
            );
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::decode_socket_packet;
    use serde_json::json;

    fn blob(bytes: &'static [u8]) -> Value {
        Value::Binary(Bytes::from_static(bytes))
    }

    #[test]
    fn test_split_without_blobs_is_plain() {
        let value = Value::from(json!(["hello", {"n": 1}]));
        assert_eq!(split(&value), Split::Plain(json!(["hello", {"n": 1}])));
    }

    #[test]
    fn test_split_numbers_depth_first() {
        let value = Value::Array(vec![
            blob(b"a"),
            [("x", blob(b"b")), ("y", Value::Array(vec![blob(b"c")]))]
                .into_iter()
                .collect(),
        ]);
        let Split::Binary { tree, attachments } = split(&value) else {
            panic!("expected binary split");
        };
        assert_eq!(
            tree,
            json!([
                {"_placeholder": true, "num": 0},
                {"x": {"_placeholder": true, "num": 1}, "y": [{"_placeholder": true, "num": 2}]}
            ])
        );
        assert_eq!(attachments, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
        assert_eq!(reconstruct(&tree, &attachments), value);
    }

    #[test]
    fn test_out_of_range_placeholder_stays_mapping() {
        let tree = json!({"_placeholder": true, "num": 5});
        assert_eq!(reconstruct(&tree, &[]), Value::from(tree.clone()));
        assert_eq!(placeholder_index(&json!({"_placeholder": false, "num": 0})), None);
    }

    #[test]
    fn test_assembler_completes_front_first() {
        let mut assembler = BinaryAssembler::new();
        let first = decode_socket_packet(r#"52-["a",{"_placeholder":true,"num":0},{"_placeholder":true,"num":1}]"#).unwrap();
        let second = decode_socket_packet(r#"61-/ns,9[{"_placeholder":true,"num":0}]"#).unwrap();
        assert!(assembler.start(&first).unwrap().is_none());
        assert!(assembler.start(&second).unwrap().is_none());
        assert_eq!(assembler.pending(), 2);

        assert!(assembler.push_attachment(Bytes::from_static(b"1")).unwrap().is_none());
        let done = assembler
            .push_attachment(Bytes::from_static(b"2"))
            .unwrap()
            .unwrap();
        assert_eq!(done.event.as_deref(), Some("a"));
        assert_eq!(done.args, vec![blob(b"1"), blob(b"2")]);

        let ack = assembler
            .push_attachment(Bytes::from_static(b"3"))
            .unwrap()
            .unwrap();
        assert!(ack.is_ack);
        assert_eq!(ack.namespace, "/ns");
        assert_eq!(ack.id, Some(9));
        assert_eq!(ack.event, None);
        assert_eq!(ack.args, vec![blob(b"3")]);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_orphan_attachment_is_rejected_without_side_effects() {
        let mut assembler = BinaryAssembler::new();
        assert!(matches!(
            assembler.push_attachment(Bytes::from_static(b"stray")),
            Err(FrameError::AttachmentOrderingViolation { size: 5 })
        ));
        let header = decode_socket_packet(r#"51-["a",{"_placeholder":true,"num":0}]"#).unwrap();
        assembler.start(&header).unwrap();
        let done = assembler
            .push_attachment(Bytes::from_static(b"ok"))
            .unwrap()
            .unwrap();
        assert_eq!(done.args, vec![blob(b"ok")]);
    }

    #[test]
    fn test_zero_attachment_header_completes_immediately() {
        let mut assembler = BinaryAssembler::new();
        let header = decode_socket_packet(r#"50-["a",1]"#).unwrap();
        let done = assembler.start(&header).unwrap().unwrap();
        assert_eq!(done.args, vec![Value::from(1)]);
        assert_eq!(assembler.pending(), 0);
    }
}
