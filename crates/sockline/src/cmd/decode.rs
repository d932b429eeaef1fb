use serde::Serialize;
use serde_json::Value as Json;
use sockline_frame::{decode_packet, decode_socket_packet, OpenInfo, PacketType, SocketPacket};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_fields, print_json, print_pretty, OutputFormat};

#[derive(Debug, Serialize)]
struct DecodeOutput {
    packet_type: &'static str,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    open: Option<OpenInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<MessageOutput>,
}

#[derive(Debug, Serialize)]
struct MessageOutput {
    kind: &'static str,
    namespace: String,
    id: Option<u64>,
    attachments: usize,
    event: Option<String>,
    data: Option<Json>,
}

impl From<SocketPacket> for MessageOutput {
    fn from(packet: SocketPacket) -> Self {
        Self {
            kind: packet.kind.name(),
            event: packet.event_name().map(str::to_string),
            namespace: packet.namespace,
            id: packet.id,
            attachments: packet.attachments,
            data: packet.data,
        }
    }
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let out = decode(&args.frame)?;
    tracing::debug!(event = "frame_decoded", packet_type = out.packet_type);

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_fields(&fields(&out)),
        OutputFormat::Pretty => print_pretty(&fields(&out)),
    }
    Ok(SUCCESS)
}

fn decode(frame: &str) -> CliResult<DecodeOutput> {
    let packet = decode_packet(frame).map_err(|err| frame_error("decode", err))?;
    let open = match packet.kind {
        PacketType::Open => {
            Some(OpenInfo::parse(&packet.body).map_err(|err| frame_error("open packet", err))?)
        }
        _ => None,
    };
    let message = match packet.kind {
        PacketType::Message => Some(
            decode_socket_packet(&packet.body)
                .map_err(|err| frame_error("message packet", err))?
                .into(),
        ),
        _ => None,
    };

    Ok(DecodeOutput {
        packet_type: packet.kind.name(),
        body: packet.body,
        open,
        message,
    })
}

fn fields(out: &DecodeOutput) -> Vec<(&'static str, String)> {
    let mut fields = vec![("type", out.packet_type.to_string())];
    if let Some(open) = &out.open {
        fields.push(("sid", open.sid.clone()));
        fields.push(("upgrades", open.upgrades.join(",")));
        fields.push(("ping_interval_ms", open.ping_interval.to_string()));
        fields.push(("ping_timeout_ms", open.ping_timeout.to_string()));
    } else if let Some(message) = &out.message {
        fields.push(("kind", message.kind.to_string()));
        fields.push(("namespace", message.namespace.clone()));
        if let Some(id) = message.id {
            fields.push(("id", id.to_string()));
        }
        if message.attachments > 0 {
            fields.push(("attachments", message.attachments.to_string()));
        }
        if let Some(event) = &message.event {
            fields.push(("event", event.clone()));
        }
        if let Some(data) = &message.data {
            fields.push(("data", data.to_string()));
        }
    } else if !out.body.is_empty() {
        fields.push(("body", out.body.clone()));
    }
    fields
}
