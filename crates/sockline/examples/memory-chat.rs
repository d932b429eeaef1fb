//! In-process chat session against a scripted peer.
//!
//! Run with:
//!   cargo run --example memory-chat
//!
//! The peer accepts one transport, confirms every namespace connect, echoes
//! events back as `echo` and acknowledges events that ask for it.

use std::time::Duration;

use serde_json::json;
use sockline::client::{Client, ClientConfig, ClientEvent, Value};
use sockline::frame::{
    decode_packet, decode_socket_packet, Packet, PacketType, SocketPacket, SocketPacketType,
};
use sockline::transport::{memory_transport, ClientFrame, MemoryServer, TransportKind};

async fn scripted_peer(mut server: MemoryServer) {
    let Some(mut peer) = server.accept().await else {
        return;
    };
    peer.send_text(r#"0{"sid":"demo","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#);

    while let Some(frame) = peer.recv().await {
        let ClientFrame::Text(text) = frame else {
            continue;
        };
        let Ok(packet) = decode_packet(&text) else {
            continue;
        };
        if packet.kind != PacketType::Message {
            continue;
        }
        let Ok(inner) = decode_socket_packet(&packet.body) else {
            continue;
        };
        let reply = match inner.kind {
            SocketPacketType::Connect => {
                SocketPacket::connect(&inner.namespace, Some(json!({"sid": "n-demo"})))
            }
            SocketPacketType::Event => match inner.id {
                Some(id) => SocketPacket::ack(&inner.namespace, id, vec![json!("stored")]),
                None => SocketPacket::event(&inner.namespace, "echo", inner.args().to_vec(), None),
            },
            _ => continue,
        };
        peer.send_text(Packet::message(reply.encode()).encode());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (connector, server) = memory_transport();
    tokio::spawn(scripted_peer(server));

    let config = ClientConfig::parse("http://localhost:3000")?
        .with_transports(vec![TransportKind::WebSocket]);
    let client = Client::new(config, connector)?;
    let mut events = client.events();

    let chat = client.of("/chat");
    chat.on("echo", |event| {
        println!("echo: {:?}", event.args);
    });
    chat.emit("message", vec![Value::from("sent before connecting")])?;
    client.connect()?;

    loop {
        match events.recv().await {
            Some(ClientEvent::Connect { namespace }) if namespace == "/chat" => break,
            Some(other) => eprintln!("event: {other:?}"),
            None => return Ok(()),
        }
    }

    let reply = chat
        .request_with_timeout("save", vec![Value::from("note")], Duration::from_secs(2))
        .await?;
    println!("save acknowledged: {reply:?}");

    client.disconnect()?;
    Ok(())
}
