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

//! TCP Connection Lifecycle Service
//!
//! This crate accepts TCP clients on one port per server, keeps every live
//! client in a concurrent registry keyed by its remote address, pushes a
//! periodic heartbeat to each client, and offers unicast and broadcast
//! delivery of raw byte payloads.
//!
//! - One task per accepted connection plus one accept loop
//! - A single cancellation token observed by the accept loop and every session
//! - Per-connection write lock shared by heartbeats and caller sends
//! - Registry iteration only through point-in-time snapshots
//!
//! # Architecture
//!
//! ```text
//! SupportServer ─── ClientSender
//!     ↓                 ↓
//! Acceptor         ClientRegistry
//!     ↓                 ↑
//! SessionWorker → ClientConnection
//! ```
//!
//! # Example
//!
//! ```no_run
//! use netsupport_service::{ClientConnection, ClientKey, ServerConfig, SessionHandler, SupportServer};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl SessionHandler for Printer {
//!     async fn on_data(&self, key: ClientKey, _conn: &ClientConnection, data: &[u8]) {
//!         println!("{}: {}", key, String::from_utf8_lossy(data));
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = SupportServer::new(ServerConfig::new(6000))?;
//!     server.start(Arc::new(Printer)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

mod acceptor;
mod config;
mod connection;
mod error;
mod handler;
mod metrics;
mod registry;
mod sender;
mod server;
mod types;
mod worker;

pub use acceptor::AcceptorHandle;
pub use config::{DEFAULT_HEARTBEAT_PAYLOAD, DuplicatePolicy, ServerConfig};
pub use connection::{ClientConnection, ProbeOutcome, probe};
pub use error::{Result, SupportError};
pub use handler::{CallbackHandler, NoopHandler, SessionHandler};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use registry::{ClientRegistry, Registration};
pub use sender::{BroadcastResult, ClientSender};
pub use server::SupportServer;
pub use types::{ClientKey, ConnectionId, ConnectionInfo, DisconnectReason, ServerSnapshot, SessionState};
pub use worker::WorkerConfig;
