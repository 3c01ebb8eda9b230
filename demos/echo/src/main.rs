//! Echo server for the BF packet protocol.
//!
//! ```text
//! echo-server serve [config.json]
//! echo-server client <addr> <message>...
//! ```
//!
//! The server registers type id 7 as a raw packet and writes every packet
//! it receives straight back. The client sends one echo frame per message
//! and prints the replies.

use std::time::Duration;

use bfnet::prelude::*;
use bfnet::protocol::{HEADER_LEN, decode_header, encode_frame};
use bfnet::transport::TcpConnection;

const ECHO: PacketId = PacketId(7);

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

struct Echo;

impl Handler for Echo {
    type Session = PacketSession;

    async fn on_connection(&self, ctx: &Context, info: &ConnectionInfo) {
        tracing::info!(
            conn_id = %info.id,
            peer = ?info.peer_addr,
            active = ctx.active_connections(),
            "client connected"
        );
    }

    async fn handle(&self, _ctx: &Context, mut session: PacketSession) {
        while let Some(packet) = session.read().await {
            if let Err(e) = session.write(packet.as_ref()) {
                tracing::warn!(conn_id = %session.id(), error = %e, "echo failed");
            }
        }
    }

    async fn on_disconnect(&self, ctx: &Context, info: &ConnectionInfo) {
        tracing::info!(
            conn_id = %info.id,
            served = ctx.accepted_connections(),
            "client disconnected"
        );
    }
}

fn load_config(path: Option<&str>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ServerConfig::from_json_str(&std::fs::read_to_string(path)?)?),
        None => Ok(ServerConfig::default()),
    }
}

async fn serve(config: ServerConfig) -> Result<(), BfnetError> {
    let server = ServerBuilder::new()
        .config(config)
        .register_raw(ECHO)
        .build(Echo)
        .await?;
    tracing::info!(addr = %server.local_addr()?, "echo server listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "ctrl-c handler failed");
            }
        })
        .await
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sends each message as one echo frame and returns the echoed payloads.
async fn run_client(addr: &str, messages: &[String]) -> Result<Vec<Vec<u8>>, BfnetError> {
    let conn = TcpConnection::connect(addr).await?;
    let mut replies = Vec::with_capacity(messages.len());

    for message in messages {
        conn.send(&encode_frame(1, ECHO, message.as_bytes())).await?;
        let Some(reply) = conn.recv().await? else {
            tracing::warn!("server closed the connection");
            break;
        };
        let (header, _) = decode_header(&reply).map_err(bfnet::protocol::ProtocolError::from)?;
        tracing::debug!(version = header.version, type_id = %header.type_id, "reply");
        replies.push(reply[HEADER_LEN..].to_vec());
    }

    conn.close().await?;
    Ok(replies)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("client") if args.len() >= 3 => {
            bfnet::init_tracing("warn")?;
            let replies = tokio::time::timeout(
                Duration::from_secs(10),
                run_client(&args[1], &args[2..]),
            )
            .await??;
            for reply in replies {
                println!("{}", String::from_utf8_lossy(&reply));
            }
        }
        Some("serve") | None => {
            let config = load_config(args.get(1).map(String::as_str))?;
            bfnet::init_tracing(&config.log_filter)?;
            serve(config).await?;
        }
        _ => {
            eprintln!("usage: echo-server serve [config.json]");
            eprintln!("       echo-server client <addr> <message>...");
            std::process::exit(2);
        }
    }
    Ok(())
}
