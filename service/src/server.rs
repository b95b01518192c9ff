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

//! Support server implementation
//!
//! The SupportServer is the lifecycle coordinator. It binds the listener
//! and launches the accept loop on `start()`, and on `stop()` cancels every
//! session, closes every registered handle and clears the registry.

use crate::acceptor::{Acceptor, AcceptorHandle};
use crate::worker::{SessionContext, WorkerConfig};
use crate::{
    BroadcastResult, ClientKey, ClientRegistry, ClientSender, Result, ServerConfig, ServerMetrics,
    ServerSnapshot, SessionHandler, SupportError,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// TCP server managing the lifecycle of every client on one port
///
/// # Example
///
/// ```no_run
/// use netsupport_service::{NoopHandler, ServerConfig, SupportServer};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = SupportServer::new(ServerConfig::new(6000))?;
///     server.start(Arc::new(NoopHandler)).await?;
///
///     server.broadcast("hello").await?;
///
///     // tokio::signal::ctrl_c().await?;
///     server.stop().await?;
///     Ok(())
/// }
/// ```
pub struct SupportServer {
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    metrics: Arc<ServerMetrics>,
    sender: ClientSender,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Cancelled once by `stop()`, never reset
    shutdown: CancellationToken,
    /// Session tasks
    tracker: TaskTracker,
    /// Actual bind address, set by the first successful `start()`
    local_addr: OnceLock<SocketAddr>,
    acceptor: OnceLock<AcceptorHandle>,
    /// Accept loop task handle
    accept_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    started_at: Instant,
}

impl SupportServer {
    /// Create a server; nothing is bound until `start()`
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ClientRegistry::new());
        let running = Arc::new(AtomicBool::new(false));
        let sender = ClientSender::new(registry.clone(), running.clone());

        Ok(Self {
            config,
            registry,
            metrics: Arc::new(ServerMetrics::new()),
            sender,
            running,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            local_addr: OnceLock::new(),
            acceptor: OnceLock::new(),
            accept_handle: tokio::sync::Mutex::new(None),
            started_at: Instant::now(),
        })
    }

    /// Bind the listener and start accepting
    ///
    /// Returns the bound address. Fails with [`SupportError::Bind`] if the
    /// port is unavailable, [`SupportError::AlreadyRunning`] on a second
    /// call and [`SupportError::Stopped`] after `stop()`.
    pub async fn start(&self, handler: Arc<dyn SessionHandler>) -> Result<SocketAddr> {
        if self.shutdown.is_cancelled() {
            return Err(SupportError::Stopped);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(SupportError::AlreadyRunning);
        }

        match self.launch(handler).await {
            Ok(addr) => {
                tracing::info!(address = %addr, "Server started");
                Ok(addr)
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                tracing::error!(address = %self.config.bind_address, error = %e, "Server failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self, handler: Arc<dyn SessionHandler>) -> Result<SocketAddr> {
        let listener = Acceptor::bind(self.config.bind_address).await?;
        let (acceptor_handle, commands) = AcceptorHandle::channel();

        let ctx = SessionContext {
            config: WorkerConfig::from(&self.config),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            handler,
            shutdown: self.shutdown.clone(),
            running: self.running.clone(),
            acceptor: acceptor_handle.clone(),
        };
        let acceptor = Acceptor::new(listener, commands, ctx, self.tracker.clone(), &self.config)?;
        let addr = self.local_addr.get_or_init(|| acceptor.bind_address());
        let _ = self.acceptor.set(acceptor_handle);

        *self.accept_handle.lock().await = Some(tokio::spawn(acceptor.run()));
        Ok(*addr)
    }

    /// Stop the server
    ///
    /// Cancels the accept loop and every session, force-closes every
    /// registered connection and clears the registry. A stopped server
    /// cannot be started again.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(SupportError::NotRunning);
        }

        tracing::info!("Stopping server");
        self.shutdown.cancel();

        // Wait for accept loop to finish; dropping it closes the listener
        let accept_handle = self.accept_handle.lock().await.take();
        if let Some(handle) = accept_handle {
            if tokio::time::timeout(self.config.shutdown_timeout, handle)
                .await
                .is_err()
            {
                tracing::warn!("Accept loop did not stop in time");
            }
        }

        self.close_registered().await;

        self.tracker.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Sessions still running after shutdown timeout"
            );
        }

        // Catch sessions that registered while the first pass ran
        self.close_registered().await;

        tracing::info!("Server stopped");
        Ok(())
    }

    async fn close_registered(&self) {
        for (key, conn) in self.registry.drain() {
            tracing::debug!(client = %key, "Closing connection");
            conn.close().await;
        }
    }

    /// Rebind the listener
    ///
    /// Only valid while the server is running.
    pub fn restart_listener(&self) -> Result<()> {
        if !self.is_running() {
            return Err(SupportError::NotRunning);
        }
        match self.acceptor.get() {
            Some(handle) if handle.restart() => Ok(()),
            _ => Err(SupportError::NotRunning),
        }
    }

    /// Write `payload` to one client
    pub async fn send_to(&self, key: ClientKey, payload: impl AsRef<[u8]>) -> Result<()> {
        self.sender.send_to(key, payload).await
    }

    /// Write `payload` to every registered client
    pub async fn broadcast(&self, payload: impl AsRef<[u8]>) -> Result<BroadcastResult> {
        self.sender.broadcast(payload).await
    }

    /// Get a sender handle that can outlive borrows of the server
    pub fn sender(&self) -> ClientSender {
        self.sender.clone()
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get the bound address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Get the number of registered clients
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Keys of every registered client
    pub fn clients(&self) -> Vec<ClientKey> {
        self.registry.keys()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            running: self.is_running(),
            active_connections: self.registry.len(),
            total_connections: self.metrics.total_connections(),
            bind_address: self.local_addr(),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the client registry
    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for SupportServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportServer")
            .field("bind_address", &self.config.bind_address)
            .field("local_addr", &self.local_addr())
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .finish()
    }
}

impl Drop for SupportServer {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::warn!("SupportServer dropped while still running");
            self.shutdown.cancel();
        }
    }
}
