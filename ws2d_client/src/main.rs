//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p ws2d_client -- [--config client.json] [--server 127.0.0.1]... [--port 3272] [--timeout-ms 1500]
//!
//! The client connects to the first reachable server (failing over on a
//! watchdog), answers heartbeats, and renders headless frames.
//!
//! Console commands:
//!   status      - Show connection status
//!   connect     - Reconnect starting from the first server
//!   disconnect  - Disconnect from server
//!   quit        - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use ws2d_client::{transport::WsTransport, GameClient};
use ws2d_shared::{config::ClientConfig, surface::NullSurface};

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            ClientConfig::load(&args[i + 1]).context("load config")?
        }
        _ => ClientConfig::default(),
    };

    let mut servers = Vec::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" if i + 1 < args.len() => {
                servers.push(args[i + 1].clone());
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.port = args[i + 1].parse().context("parse --port")?;
                i += 2;
            }
            "--timeout-ms" if i + 1 < args.len() => {
                cfg.connect_timeout_ms = args[i + 1].parse().context("parse --timeout-ms")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    if !servers.is_empty() {
        cfg.servers = servers;
    }
    Ok(cfg)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(servers = ?cfg.servers, port = cfg.port, timeout_ms = cfg.connect_timeout_ms, "Starting client");

    let mut client = GameClient::new(&cfg, Arc::new(WsTransport)).context("invalid config")?;
    let mut surface = NullSurface {
        width: cfg.viewport_width,
        height: cfg.viewport_height,
    };

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Type 'status' for info, 'quit' to exit.");
    println!();

    client.start();
    client.run(&mut surface, console_rx).await
}
