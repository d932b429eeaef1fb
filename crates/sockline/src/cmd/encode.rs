use serde::Serialize;
use serde_json::Value as Json;
use sockline_frame::{Packet, SocketPacket};

use crate::cmd::EncodeArgs;
use crate::exit::{json_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_fields, print_json, OutputFormat};

#[derive(Serialize, Debug)]
struct EncodeOutput {
    kind: &'static str,
    namespace: String,
    id: Option<u64>,
    frame: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let out = encode(&args)?;
    tracing::debug!(event = "frame_encoded", kind = out.kind, len = out.frame.len());

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut fields = vec![
                ("kind", out.kind.to_string()),
                ("namespace", out.namespace.clone()),
            ];
            if let Some(id) = out.id {
                fields.push(("id", id.to_string()));
            }
            fields.push(("frame", out.frame.clone()));
            print_fields(&fields);
        }
        OutputFormat::Pretty => println!("{}", out.frame),
    }
    Ok(SUCCESS)
}

fn encode(args: &EncodeArgs) -> CliResult<EncodeOutput> {
    if !args.namespace.starts_with('/') {
        return Err(CliError::new(
            USAGE,
            format!("namespace must start with '/': {}", args.namespace),
        ));
    }
    let items = match serde_json::from_str::<Json>(&args.args).map_err(|err| json_error("--args", err))? {
        Json::Array(items) => items,
        other => {
            return Err(CliError::new(
                USAGE,
                format!("--args must be a JSON array, got {other}"),
            ))
        }
    };

    let packet = match (args.ack, args.id, args.event.as_deref()) {
        (true, Some(id), _) => SocketPacket::ack(&args.namespace, id, items),
        (false, id, Some(event)) => SocketPacket::event(&args.namespace, event, items, id),
        (true, None, _) => return Err(CliError::new(USAGE, "--ack needs --id")),
        (false, _, None) => return Err(CliError::new(USAGE, "event name is required")),
    };

    Ok(EncodeOutput {
        kind: packet.kind.name(),
        id: packet.id,
        frame: Packet::message(packet.encode()).encode(),
        namespace: packet.namespace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::DATA_INVALID;

    fn args(event: Option<&str>, namespace: &str, id: Option<u64>, json: &str) -> EncodeArgs {
        EncodeArgs {
            event: event.map(str::to_string),
            namespace: namespace.to_string(),
            id,
            args: json.to_string(),
            ack: false,
        }
    }

    #[test]
    fn builds_event_frame() {
        let out = encode(&args(Some("message"), "/chat", Some(3), r#"["hi",{"n":1}]"#)).unwrap();
        assert_eq!(out.frame, r#"42/chat,3["message","hi",{"n":1}]"#);
        assert_eq!(out.kind, "event");
    }

    #[test]
    fn default_namespace_is_omitted() {
        let out = encode(&args(Some("ping"), "/", None, "[]")).unwrap();
        assert_eq!(out.frame, r#"42["ping"]"#);
    }

    #[test]
    fn builds_ack_frame() {
        let mut ack = args(None, "/", Some(9), r#"["ok"]"#);
        ack.ack = true;
        let out = encode(&ack).unwrap();
        assert_eq!(out.frame, r#"439["ok"]"#);
        assert_eq!(out.kind, "ack");
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            encode(&args(Some("x"), "/", None, "{}")).unwrap_err().code,
            USAGE
        );
        assert_eq!(
            encode(&args(Some("x"), "/", None, "[")).unwrap_err().code,
            DATA_INVALID
        );
        assert_eq!(
            encode(&args(Some("x"), "chat", None, "[]")).unwrap_err().code,
            USAGE
        );
    }
}
