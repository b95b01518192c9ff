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

//! Lock-free per-server metrics
//!
//! Each server owns one [`ServerMetrics`]. Process-wide counters are also
//! emitted through the `metrics` facade so an installed recorder sees the
//! sum over every server.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a point-in-time view.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    accepted_connections: AtomicU64,
    registered_connections: AtomicU64,
    active_connections: AtomicU64,
    probe_rejections: AtomicU64,

    // Throughput
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    heartbeats_sent: AtomicU64,

    // Errors
    accept_errors: AtomicU64,
    write_errors: AtomicU64,
    idle_timeouts: AtomicU64,

    // Timing (stored as nanoseconds)
    total_session_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            accepted_connections: AtomicU64::new(0),
            registered_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            probe_rejections: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
            total_session_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record an accepted socket
    pub fn connection_accepted(&self) {
        self.accepted_connections.fetch_add(1, Ordering::Relaxed);
        counter!("netsupport.connections.accepted").increment(1);
    }

    /// Record a session entering the registry, returns the new live count
    pub fn session_registered(&self) -> u64 {
        self.registered_connections.fetch_add(1, Ordering::Relaxed);
        gauge!("netsupport.connections.active").increment(1.0);
        self.active_connections.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record a registered session ending, returns the new live count
    pub fn session_closed(&self, duration: Duration) -> u64 {
        self.total_session_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("netsupport.connections.active").decrement(1.0);
        self.active_connections.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Record a peer that closed before registration
    pub fn probe_rejected(&self) {
        self.probe_rejections.fetch_add(1, Ordering::Relaxed);
        counter!("netsupport.connections.probe_rejected").increment(1);
    }

    /// Get the current number of live (registered) sessions
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Get the total number of accepted sockets
    pub fn total_connections(&self) -> u64 {
        self.accepted_connections.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record bytes written to a client
    pub fn bytes_sent(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
        counter!("netsupport.bytes.sent").increment(count);
    }

    /// Record bytes read from a client
    pub fn bytes_received(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
        counter!("netsupport.bytes.received").increment(count);
    }

    /// Record a heartbeat delivered
    pub fn heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
        counter!("netsupport.heartbeats.sent").increment(1);
    }

    // Error tracking

    /// Record a failed accept
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("netsupport.errors.accept").increment(1);
    }

    /// Record a failed write
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
        counter!("netsupport.errors.write").increment(1);
    }

    /// Record a session ended by idle timeout
    pub fn idle_timeout(&self) {
        self.idle_timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("netsupport.errors.idle_timeout").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Fields are loaded one at a time, so the snapshot may be slightly
    /// inconsistent while sessions are changing state.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted_connections: self.accepted_connections.load(Ordering::Relaxed),
            registered_connections: self.registered_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Acquire),
            probe_rejections: self.probe_rejections.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_session_duration: self.average_session_duration(),
        }
    }

    fn average_session_duration(&self) -> Duration {
        let total = self.registered_connections.load(Ordering::Relaxed);
        if total == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_session_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / total)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Sockets accepted since start
    pub accepted_connections: u64,
    /// Sessions that passed the probe and registered
    pub registered_connections: u64,
    /// Currently live sessions
    pub active_connections: u64,
    /// Peers that closed before registration
    pub probe_rejections: u64,
    /// Total bytes written
    pub bytes_sent: u64,
    /// Total bytes read
    pub bytes_received: u64,
    /// Heartbeats delivered
    pub heartbeats_sent: u64,
    /// Failed accepts
    pub accept_errors: u64,
    /// Failed writes
    pub write_errors: u64,
    /// Sessions ended by idle timeout
    pub idle_timeouts: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average registered session duration
    pub avg_session_duration: Duration,
}
