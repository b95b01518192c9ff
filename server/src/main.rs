//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Netsupport multi-port server
//!
//! Starts one support server per port, logs everything clients send, and
//! stops every server on Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use netsupport_service::{
    ClientConnection, ClientKey, DisconnectReason, ServerConfig, SessionHandler, SupportServer,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "netsupport-server")]
#[command(about = "Multi-port TCP support server with heartbeats and broadcast")]
#[command(version)]
struct CliArgs {
    /// Port to listen on, repeatable
    #[arg(short, long = "port", default_values_t = [6000u16, 6001, 6002])]
    ports: Vec<u16>,

    /// Interface to bind every port on
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Inactivity period after which a client is dropped (e.g. 10m, 30s)
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    idle_timeout: Duration,

    /// Period between heartbeats (e.g. 1s, 500ms)
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    heartbeat_interval: Duration,

    /// Heartbeat text pushed to every client
    #[arg(long, default_value = "Message from the server")]
    heartbeat_message: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl CliArgs {
    fn server_config(&self, port: u16) -> ServerConfig {
        ServerConfig::with_address(SocketAddr::new(self.bind, port))
            .with_idle_timeout(self.idle_timeout)
            .with_heartbeat_interval(self.heartbeat_interval)
            .with_heartbeat_payload(self.heartbeat_message.clone())
    }
}

/// Logs client activity
struct LoggingHandler;

#[async_trait]
impl SessionHandler for LoggingHandler {
    async fn on_data(&self, key: ClientKey, _conn: &ClientConnection, data: &[u8]) {
        info!(client = %key, message = %String::from_utf8_lossy(data), "Received data");
    }

    async fn on_disconnect(&self, key: ClientKey, conn: &ClientConnection, reason: DisconnectReason) {
        info!(
            client = %key,
            reason = %reason,
            sent = conn.bytes_sent(),
            received = conn.bytes_received(),
            "Session ended"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting netsupport server");

    let handler: Arc<dyn SessionHandler> = Arc::new(LoggingHandler);
    let mut servers = Vec::with_capacity(args.ports.len());
    for &port in &args.ports {
        let server = SupportServer::new(args.server_config(port))
            .with_context(|| format!("Invalid configuration for port {}", port))?;
        let addr = server
            .start(handler.clone())
            .await
            .with_context(|| format!("Failed to start server on port {}", port))?;
        info!(address = %addr, "Listening");
        servers.push(server);
    }

    wait_for_shutdown_signal()
        .await
        .context("Failed to install signal handlers")?;
    info!("Initiating graceful shutdown");

    for server in &servers {
        if let Err(e) = server.stop().await {
            error!(address = ?server.local_addr(), error = %e, "Failed to stop server");
            continue;
        }
        let snapshot = server.metrics().snapshot();
        info!(
            address = ?server.local_addr(),
            accepted = snapshot.accepted_connections,
            registered = snapshot.registered_connections,
            heartbeats = snapshot.heartbeats_sent,
            "Server stopped"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => {
            warn!("Received SIGTERM");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn init_tracing(args: &CliArgs) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true),
        )
        .with(env_filter)
        .init();
}
