use serde::Serialize;
use sockline_frame::{decode_packet, decode_payload, PollPacket};

use crate::cmd::UnpackArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{preview, print_json, print_table, OutputFormat};

const PREVIEW_CHARS: usize = 60;

#[derive(Serialize, Debug, PartialEq)]
struct PacketRow {
    index: usize,
    kind: &'static str,
    packet_type: Option<&'static str>,
    size: usize,
    content: String,
}

#[derive(Serialize)]
struct UnpackOutput {
    count: usize,
    packets: Vec<PacketRow>,
}

pub fn run(args: UnpackArgs, format: OutputFormat) -> CliResult<i32> {
    let packets = unpack(&args.body)?;
    tracing::debug!(event = "payload_unpacked", count = packets.len());

    match format {
        OutputFormat::Json => print_json(&UnpackOutput {
            count: packets.len(),
            packets,
        }),
        OutputFormat::Table => {
            let rows = packets
                .into_iter()
                .map(|row| {
                    vec![
                        row.index.to_string(),
                        row.kind.to_string(),
                        row.packet_type.unwrap_or("-").to_string(),
                        row.size.to_string(),
                        preview(&row.content, PREVIEW_CHARS),
                    ]
                })
                .collect();
            print_table(&["#", "KIND", "TYPE", "SIZE", "CONTENT"], rows);
        }
        OutputFormat::Pretty => {
            for row in packets {
                println!("{} {} {}", row.index, row.kind, row.content);
            }
        }
    }
    Ok(SUCCESS)
}

fn unpack(body: &str) -> CliResult<Vec<PacketRow>> {
    let packets = decode_payload(body).map_err(|err| frame_error("unpack", err))?;
    Ok(packets
        .into_iter()
        .enumerate()
        .map(|(index, packet)| match packet {
            PollPacket::Text(text) => PacketRow {
                index,
                kind: "text",
                packet_type: decode_packet(&text).ok().map(|p| p.kind.name()),
                size: text.len(),
                content: text,
            },
            PollPacket::Binary(data) => PacketRow {
                index,
                kind: "binary",
                packet_type: None,
                size: data.len(),
                content: format!("<binary {} bytes>", data.len()),
            },
        })
        .collect())
}
