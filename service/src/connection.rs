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

//! Client connection handle
//!
//! A [`ClientConnection`] is the write side of one accepted socket plus its
//! metadata. The read side stays with the session worker. Every write goes
//! through a per-connection lock, so the heartbeat and any number of
//! concurrent `send_to`/`broadcast` calls never interleave their bytes.

use crate::{ClientKey, ConnectionId, ConnectionInfo, Result, ServerMetrics, SessionState, SupportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Outcome of the post-accept liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Peer has not closed; unread bytes, if any, are left in the socket
    Alive,
    /// Peer closed before any data exchange
    Closed,
}

/// Peek at the socket without consuming anything
///
/// A zero-length peek means the peer already sent FIN. If nothing arrives
/// within `wait` the peer is considered alive.
pub async fn probe(socket: &TcpStream, wait: Duration) -> std::io::Result<ProbeOutcome> {
    let mut buf = [0u8; 1];
    match tokio::time::timeout(wait, socket.peek(&mut buf)).await {
        Ok(Ok(0)) => Ok(ProbeOutcome::Closed),
        Ok(Ok(_)) => Ok(ProbeOutcome::Alive),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(ProbeOutcome::Alive),
    }
}

/// Shared handle to one live client
///
/// Cloning is cheap; all clones refer to the same socket.
#[derive(Clone)]
pub struct ClientConnection {
    writer: Arc<Mutex<OwnedWriteHalf>>,

    id: ConnectionId,
    key: ClientKey,
    created_at: Instant,
    write_timeout: Duration,

    state: Arc<AtomicU8>,
    closed: Arc<AtomicBool>,
    close_token: CancellationToken,

    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    metrics: Arc<ServerMetrics>,
}

impl ClientConnection {
    /// Split an accepted socket into a shared handle and the session's read half
    ///
    /// `shutdown` is the server-wide token; closing the server closes every
    /// connection derived from it.
    pub fn wrap(
        socket: TcpStream,
        id: ConnectionId,
        shutdown: &CancellationToken,
        write_timeout: Duration,
        metrics: Arc<ServerMetrics>,
    ) -> Result<(Self, OwnedReadHalf)> {
        let key = ClientKey::new(socket.peer_addr()?);
        let (reader, writer) = socket.into_split();

        let connection = Self {
            writer: Arc::new(Mutex::new(writer)),
            id,
            key,
            created_at: Instant::now(),
            write_timeout,
            state: Arc::new(AtomicU8::new(SessionState::Probing.as_u8())),
            closed: Arc::new(AtomicBool::new(false)),
            close_token: shutdown.child_token(),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            metrics,
        };

        Ok((connection, reader))
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the registry key
    pub fn key(&self) -> ClientKey {
        self.key
    }

    /// Get when the connection was accepted
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Check if the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Token cancelled when this connection is closed or the server stops
    pub(crate) fn close_token(&self) -> &CancellationToken {
        &self.close_token
    }

    /// Get bytes sent
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Get bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub(crate) fn record_received(&self, count: usize) {
        self.bytes_received.fetch_add(count as u64, Ordering::Relaxed);
        self.metrics.bytes_received(count as u64);
    }

    /// Get a connection info snapshot
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            key: self.key,
            state: self.state(),
            created_at: self.created_at,
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
        }
    }

    /// Write a payload to the client
    ///
    /// Writes are serialized per connection. A write in progress when the
    /// connection is closed fails with [`SupportError::ConnectionClosed`].
    /// A write that fails or times out closes the connection, since the
    /// peer may have received only part of the payload.
    #[instrument(level = "trace", skip_all, fields(client = %self.key, len = data.len()))]
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(SupportError::ConnectionClosed);
        }

        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(data).await?;
            writer.flush().await
        };

        let result = tokio::select! {
            biased;
            _ = self.close_token.cancelled() => Err(SupportError::ConnectionClosed),
            res = tokio::time::timeout(self.write_timeout, write) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(SupportError::Write { key: self.key, source }),
                Err(_) => Err(SupportError::WriteTimeout(self.key)),
            },
        };

        match result {
            Ok(()) => {
                self.bytes_sent.fetch_add(data.len() as u64, Ordering::Relaxed);
                self.metrics.bytes_sent(data.len() as u64);
                trace!("Payload written");
                Ok(())
            }
            Err(e) => {
                self.metrics.write_error();
                // Part of the payload may already be on the wire
                if matches!(e, SupportError::Write { .. } | SupportError::WriteTimeout(_)) {
                    debug!(client = %self.key, error = %e, "Closing connection after failed write");
                    self.close().await;
                }
                Err(e)
            }
        }
    }

    /// Close the connection
    ///
    /// Cancels the session's read race and any pending writes, then shuts
    /// down the write side. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_token.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(client = %self.key, error = %e, "Shutdown of closed socket failed");
        }
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}
