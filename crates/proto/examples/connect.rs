//! Minimal SSH handshake client.
//!
//! This example demonstrates how to:
//! - Run the transport handshake against a real server
//! - Start the cipher writer
//! - Send the first encrypted packet (SSH_MSG_SERVICE_REQUEST)
//! - Read the server's encrypted answer
//!
//! Usage:
//!   cargo run --example connect -- [-p port] user@host
//!
//! Example:
//!   RUST_LOG=sushi_proto=debug cargo run --example connect -- -p 2222 alice@127.0.0.1

use std::env;
use std::process;
use std::time::Duration;
use sushi_proto::ssh::client::{self, ClientConfig};
use sushi_proto::ssh::message::{MessageType, ServiceRequest};
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 22;

struct Args {
    user: String,
    host: String,
    port: u16,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [-p port] user@host", program);
    process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("connect");

    let mut port = DEFAULT_PORT;
    let mut target = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-p" => {
                port = match iter.next().and_then(|p| p.parse().ok()) {
                    Some(port) => port,
                    None => usage(program),
                };
            }
            _ if target.is_none() => target = Some(arg.clone()),
            _ => usage(program),
        }
    }

    let target = target.unwrap_or_else(|| usage(program));
    let (user, host) = match target.split_once('@') {
        Some((user, host)) if !user.is_empty() && !host.is_empty() => (user, host),
        _ => usage(program),
    };

    Args {
        user: user.to_string(),
        host: host.to_string(),
        port,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();
    let addr = format!("{}:{}", args.host, args.port);
    println!("Connecting to {} as {}...", addr, args.user);

    // Step 1: TCP connect, version exchange, KEXINIT, ECDH, NEWKEYS
    let config = ClientConfig::default();
    let session = client::connect(&addr, &config).await?;

    let state = session.state();
    println!("✓ Handshake complete");
    println!("  Server: {}", session.server_version());
    println!("  Kex: {}", state.selection().kex);
    println!("  Host key: {}", state.selection().host_key);
    println!(
        "  Cipher: {} / {}",
        state.selection().encryption_client_to_server,
        state.selection().mac_client_to_server
    );
    println!("  Session id: {}", hex::encode(state.session_id()));

    // Step 2: everything from here on is encrypted
    let mut active = session.start_writer()?;
    active
        .sender
        .send(ServiceRequest::new("ssh-userauth").to_bytes())
        .await?;
    println!("✓ SERVICE_REQUEST sent");

    // Step 3: the server should accept the service
    match tokio::time::timeout(
        Duration::from_secs(10),
        active.inbound.open(&mut active.reader),
    )
    .await
    {
        Ok(Ok(packet)) => match packet.message_type().and_then(MessageType::from_u8) {
            Some(kind) => println!("✓ Server answered with {}", kind),
            None => println!("  Server answered with code {:?}", packet.message_type()),
        },
        Ok(Err(e)) => eprintln!("✗ Failed to read server answer: {}", e),
        Err(_) => eprintln!("✗ No answer from server"),
    }

    // Step 4: close the queue and wait for the writer to drain
    drop(active.sender);
    active.writer.await??;
    println!("✓ Writer drained, closing");

    Ok(())
}
