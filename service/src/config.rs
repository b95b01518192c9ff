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

//! Server configuration types and builders
//!
//! # Examples
//!
//! ```
//! use netsupport_service::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::new(6000)
//!     .with_idle_timeout(Duration::from_secs(120))
//!     .with_heartbeat_interval(Duration::from_millis(500))
//!     .with_heartbeat_payload("tick");
//!
//! assert_eq!(config.bind_address.port(), 6000);
//! assert!(config.validate().is_ok());
//! ```

use crate::{Result, SupportError};
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Payload pushed to every client on each heartbeat unless overridden
pub const DEFAULT_HEARTBEAT_PAYLOAD: &[u8] = b"Message from the server";

/// What to do when a second connection arrives with a client key that is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// First registration stays authoritative; the newcomer runs its own
    /// session but cannot be addressed by key
    #[default]
    KeepExisting,
    /// Close the newcomer immediately
    Reject,
}

/// Configuration for a single listening server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: SocketAddr,

    /// How long a session waits for inbound data before treating the peer as gone
    pub idle_timeout: Duration,

    /// Period between heartbeat sends
    pub heartbeat_interval: Duration,

    /// Bytes pushed on each heartbeat
    pub heartbeat_payload: Bytes,

    /// How long the liveness probe waits for the peer
    pub probe_timeout: Duration,

    /// Per-session read buffer size
    pub read_buffer_size: usize,

    /// Upper bound on any single write
    pub write_timeout: Duration,

    /// Sleep after a failed accept
    pub accept_backoff: Duration,

    /// Consecutive accept failures after which the listener is dropped
    pub max_accept_failures: u32,

    /// How long `stop()` waits for sessions to finish
    pub shutdown_timeout: Duration,

    /// Duplicate client key handling
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 6000),
            idle_timeout: Duration::from_secs(600), // 10 minutes
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_payload: Bytes::from_static(DEFAULT_HEARTBEAT_PAYLOAD),
            probe_timeout: Duration::from_millis(10),
            read_buffer_size: 1024,
            write_timeout: Duration::from_secs(30),
            accept_backoff: Duration::from_millis(100),
            max_accept_failures: 16,
            shutdown_timeout: Duration::from_secs(5),
            duplicate_policy: DuplicatePolicy::KeepExisting,
        }
    }
}

impl ServerConfig {
    /// Create a configuration listening on all interfaces at `port`
    pub fn new(port: u16) -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            ..Default::default()
        }
    }

    /// Create a configuration for an explicit bind address
    pub fn with_address(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the heartbeat payload
    pub fn with_heartbeat_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.heartbeat_payload = payload.into();
        self
    }

    /// Set the probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the accept backoff
    pub fn with_accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }

    /// Set the consecutive accept failure limit
    pub fn with_max_accept_failures(mut self, max: u32) -> Self {
        self.max_accept_failures = max;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the duplicate key policy
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(SupportError::InvalidConfig(
                "idle_timeout must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(SupportError::InvalidConfig(
                "heartbeat_interval must be greater than zero".to_string(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(SupportError::InvalidConfig(
                "write_timeout must be greater than zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(SupportError::InvalidConfig(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
