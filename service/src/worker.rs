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

//! Session worker implementation
//!
//! The SessionWorker owns one accepted socket from accept to teardown:
//!
//! ```text
//! Probing -> Registered -> Active (heartbeat, read-wait)* -> Disconnected
//! ```
//!
//! - Probing peeks without consuming; a peer that already closed is dropped
//!   without ever touching the registry.
//! - Active sends a heartbeat whenever one is due, then races the next read
//!   against the heartbeat deadline, the idle deadline and cancellation.
//! - Disconnected closes the handle, removes the registry entry this session
//!   added, and asks the acceptor to resume if the server is still running.

use crate::acceptor::AcceptorHandle;
use crate::connection::{ProbeOutcome, probe};
use crate::{
    ClientConnection, ClientKey, ClientRegistry, ConnectionId, DisconnectReason, DuplicatePolicy,
    Registration, ServerConfig, ServerMetrics, SessionHandler, SessionState,
};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Per-session settings derived from [`ServerConfig`]
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max time without inbound data
    pub idle_timeout: Duration,
    /// Period between heartbeats
    pub heartbeat_interval: Duration,
    /// Heartbeat bytes
    pub heartbeat_payload: Bytes,
    /// Probe wait
    pub probe_timeout: Duration,
    /// Read buffer size
    pub read_buffer_size: usize,
    /// Write bound
    pub write_timeout: Duration,
    /// Duplicate key handling
    pub duplicate_policy: DuplicatePolicy,
}

impl From<&ServerConfig> for WorkerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_payload: config.heartbeat_payload.clone(),
            probe_timeout: config.probe_timeout,
            read_buffer_size: config.read_buffer_size,
            write_timeout: config.write_timeout,
            duplicate_policy: config.duplicate_policy,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Everything a session shares with its server
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) config: WorkerConfig,
    pub(crate) registry: Arc<ClientRegistry>,
    pub(crate) metrics: Arc<ServerMetrics>,
    pub(crate) handler: Arc<dyn SessionHandler>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) acceptor: AcceptorHandle,
}

impl SessionContext {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }
}

/// What woke the read-wait race
enum Wake {
    Cancelled,
    Read(std::io::Result<usize>),
    Deadline,
}

/// Worker that drives a single connection's lifecycle
pub(crate) struct SessionWorker {
    id: ConnectionId,
    socket: TcpStream,
    ctx: SessionContext,
}

impl SessionWorker {
    /// Take ownership of an accepted socket
    pub(crate) fn new(id: ConnectionId, socket: TcpStream, ctx: SessionContext) -> Self {
        Self { id, socket, ctx }
    }

    /// Run the session to completion
    pub(crate) async fn run(self) -> DisconnectReason {
        let Self { id, socket, ctx } = self;

        match probe(&socket, ctx.config.probe_timeout).await {
            Ok(ProbeOutcome::Alive) => {}
            Ok(ProbeOutcome::Closed) => {
                ctx.metrics.probe_rejected();
                debug!(connection_id = %id, "Peer closed before registration");
                return DisconnectReason::ProbeClosed;
            }
            Err(e) => {
                ctx.metrics.probe_rejected();
                debug!(connection_id = %id, error = %e, "Probe failed");
                return DisconnectReason::ReadFault(e.to_string());
            }
        }

        if !ctx.is_running() {
            return DisconnectReason::Cancelled;
        }

        let (conn, reader) = match ClientConnection::wrap(
            socket,
            id,
            &ctx.shutdown,
            ctx.config.write_timeout,
            ctx.metrics.clone(),
        ) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Failed to set up connection");
                return DisconnectReason::ReadFault(e.to_string());
            }
        };
        let key = conn.key();

        let registration = ctx.registry.add(key, id, conn.clone());
        if let Registration::Existing(owner) = registration {
            match ctx.config.duplicate_policy {
                DuplicatePolicy::KeepExisting => {
                    warn!(
                        client = %key,
                        connection_id = %id,
                        owner = %owner,
                        "Client key already registered, session will not be addressable"
                    );
                }
                DuplicatePolicy::Reject => {
                    warn!(client = %key, connection_id = %id, owner = %owner, "Rejecting duplicate client key");
                    conn.set_state(SessionState::Disconnected);
                    conn.close().await;
                    return DisconnectReason::Rejected;
                }
            }
        }

        conn.set_state(SessionState::Registered);
        let live = ctx.metrics.session_registered();
        info!(
            client = %key,
            connection_id = %id,
            live,
            addressable = registration.is_inserted(),
            "Client connection accepted"
        );
        ctx.handler.on_connect(key, &conn).await;

        conn.set_state(SessionState::Active);
        let reason = Self::active_loop(&ctx, &conn, reader).await;

        Self::teardown(&ctx, &conn, key, &reason).await;
        reason
    }

    /// Heartbeat and read-wait loop
    async fn active_loop(
        ctx: &SessionContext,
        conn: &ClientConnection,
        mut reader: OwnedReadHalf,
    ) -> DisconnectReason {
        let key = conn.key();
        let token = conn.close_token().clone();
        let mut buf = vec![0u8; ctx.config.read_buffer_size];
        let mut idle_deadline = Instant::now() + ctx.config.idle_timeout;
        let mut next_heartbeat = Instant::now();

        loop {
            if token.is_cancelled() {
                return Self::closed_reason(ctx);
            }

            if Instant::now() >= next_heartbeat {
                if let Some(reason) = Self::heartbeat(ctx, conn, idle_deadline).await {
                    return reason;
                }
                next_heartbeat = Instant::now() + ctx.config.heartbeat_interval;
            }

            let wake_at = next_heartbeat.min(idle_deadline);
            let wake = tokio::select! {
                biased;
                _ = token.cancelled() => Wake::Cancelled,
                res = reader.read(&mut buf) => Wake::Read(res),
                _ = sleep_until(wake_at) => Wake::Deadline,
            };

            match wake {
                Wake::Cancelled => return Self::closed_reason(ctx),
                Wake::Read(Ok(0)) => return DisconnectReason::PeerClosed,
                Wake::Read(Ok(n)) => {
                    idle_deadline = Instant::now() + ctx.config.idle_timeout;
                    conn.record_received(n);
                    trace!(client = %key, bytes = n, "Data received");
                    ctx.handler.on_data(key, conn, &buf[..n]).await;
                }
                Wake::Read(Err(e)) => {
                    warn!(client = %key, error = %e, "Read failed");
                    return DisconnectReason::ReadFault(e.to_string());
                }
                Wake::Deadline => {
                    if Instant::now() >= idle_deadline {
                        ctx.metrics.idle_timeout();
                        return DisconnectReason::IdleTimeout;
                    }
                }
            }
        }
    }

    /// Push the heartbeat payload
    ///
    /// The write never outlives the idle deadline: a peer that stopped
    /// reading is timed out on schedule even while the heartbeat is blocked
    /// on a full socket buffer.
    async fn heartbeat(
        ctx: &SessionContext,
        conn: &ClientConnection,
        idle_deadline: Instant,
    ) -> Option<DisconnectReason> {
        tokio::select! {
            res = conn.send(&ctx.config.heartbeat_payload) => match res {
                Ok(()) => {
                    ctx.metrics.heartbeat_sent();
                    None
                }
                Err(e) => {
                    // A failed write closes the connection; the loop picks that up
                    debug!(client = %conn.key(), error = %e, "Heartbeat dropped");
                    None
                }
            },
            _ = sleep_until(idle_deadline) => {
                debug!(client = %conn.key(), "Heartbeat still pending at idle deadline");
                ctx.metrics.idle_timeout();
                Some(DisconnectReason::IdleTimeout)
            }
        }
    }

    /// Reason for a session whose connection token fired
    fn closed_reason(ctx: &SessionContext) -> DisconnectReason {
        if ctx.shutdown.is_cancelled() {
            DisconnectReason::Cancelled
        } else {
            DisconnectReason::WriteFailed
        }
    }

    async fn teardown(
        ctx: &SessionContext,
        conn: &ClientConnection,
        key: ClientKey,
        reason: &DisconnectReason,
    ) {
        conn.set_state(SessionState::Disconnected);
        conn.close().await;
        ctx.registry.remove_owned(&key, conn.id());
        let live = ctx.metrics.session_closed(conn.created_at().elapsed());

        info!(
            client = %key,
            connection_id = %conn.id(),
            reason = %reason,
            live,
            "Client disconnected"
        );
        ctx.handler.on_disconnect(key, conn, reason.clone()).await;

        if ctx.is_running() {
            ctx.acceptor.resume();
        }
    }
}

impl std::fmt::Debug for SessionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWorker")
            .field("id", &self.id)
            .field("peer", &self.socket.peer_addr().ok())
            .finish()
    }
}
