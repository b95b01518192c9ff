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

//! Core types for the connection service

use crate::SupportError;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Registry key identifying a client by its remote endpoint
///
/// Displayed and parsed as `address:port`, so callers can address a client
/// with the same string that shows up in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(SocketAddr);

impl ClientKey {
    /// Create a key from a remote address
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Get the remote address
    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for ClientKey {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for ClientKey {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| SupportError::InvalidClientKey(s.to_string()))
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an accepted connection (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Session state (stored as atomic u8 for lock-free state queries)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Checking that the peer did not close between accept and setup
    Probing = 0,
    /// Registered in the client registry, loop not yet entered
    Registered = 1,
    /// Heartbeat and read loop running
    Active = 2,
    /// Terminal state
    Disconnected = 3,
}

impl SessionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Probing,
            1 => Self::Registered,
            2 => Self::Active,
            _ => Self::Disconnected,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the session has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probing => write!(f, "probing"),
            Self::Registered => write!(f, "registered"),
            Self::Active => write!(f, "active"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed before the session was registered
    ProbeClosed,
    /// Peer closed the connection (zero-length read)
    PeerClosed,
    /// No inbound data within the idle timeout
    IdleTimeout,
    /// Read failed
    ReadFault(String),
    /// A write was abandoned partway and the connection was closed
    WriteFailed,
    /// Server shutdown or forced close
    Cancelled,
    /// Another connection already owns the client key
    Rejected,
}

impl DisconnectReason {
    /// True if the peer went away on its own
    pub fn is_peer_initiated(&self) -> bool {
        matches!(self, Self::ProbeClosed | Self::PeerClosed)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeClosed => write!(f, "closed before registration"),
            Self::PeerClosed => write!(f, "closed by peer"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::ReadFault(e) => write!(f, "read fault: {}", e),
            Self::WriteFailed => write!(f, "write failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "duplicate client key"),
        }
    }
}

/// Connection information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Registry key
    pub key: ClientKey,
    /// Current state
    pub state: SessionState,
    /// When the connection was accepted
    pub created_at: Instant,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
}

impl ConnectionInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Whether the server is accepting and serving sessions
    pub running: bool,
    /// Number of registered connections
    pub active_connections: usize,
    /// Total connections accepted since start
    pub total_connections: u64,
    /// Bound address, if the server was started
    pub bind_address: Option<SocketAddr>,
    /// Server uptime
    pub uptime: Duration,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self
            .bind_address
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unbound".to_string());
        write!(
            f,
            "SupportServer {{ running: {}, active: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.running, self.active_connections, self.total_connections, addr, self.uptime
        )
    }
}
