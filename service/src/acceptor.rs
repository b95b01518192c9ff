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

//! Accept loop
//!
//! The Acceptor owns the listening socket and spawns one session task per
//! accepted connection. It supervises its own listener: after too many
//! consecutive accept failures the listener is dropped, and it is bound
//! again when a session ends (`Resume`) or the server asks for it
//! (`Restart`). Both commands are ignored once the server is stopping.

use crate::worker::{SessionContext, SessionWorker};
use crate::{ConnectionId, Result, ServerConfig, SupportError};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

/// Commands accepted by the accept loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcceptorCommand {
    /// Rebind only if the listener is down
    Resume,
    /// Drop the current listener and bind again
    Restart,
}

/// Cloneable handle used to steer a running acceptor
#[derive(Debug, Clone)]
pub struct AcceptorHandle {
    tx: mpsc::UnboundedSender<AcceptorCommand>,
}

impl AcceptorHandle {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<AcceptorCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask the acceptor to start listening again if its listener stopped
    ///
    /// Returns false if the accept loop has already exited.
    pub fn resume(&self) -> bool {
        self.tx.send(AcceptorCommand::Resume).is_ok()
    }

    /// Ask the acceptor to rebind its listener
    pub fn restart(&self) -> bool {
        self.tx.send(AcceptorCommand::Restart).is_ok()
    }
}

enum AcceptEvent {
    Shutdown,
    Command(Option<AcceptorCommand>),
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
}

/// Listening side of a server
pub(crate) struct Acceptor {
    bind_address: SocketAddr,
    listener: Option<TcpListener>,
    commands: mpsc::UnboundedReceiver<AcceptorCommand>,
    ctx: SessionContext,
    tracker: TaskTracker,
    next_id: u64,
    consecutive_failures: u32,
    accept_backoff: Duration,
    max_accept_failures: u32,
}

impl Acceptor {
    /// Bind a listener, mapping failures to [`SupportError::Bind`]
    pub(crate) async fn bind(address: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(address)
            .await
            .map_err(|source| SupportError::Bind { address, source })
    }

    /// Wrap an already bound listener
    ///
    /// Rebinds reuse the listener's actual local address, so a server
    /// started on port 0 keeps the port it was given.
    pub(crate) fn new(
        listener: TcpListener,
        commands: mpsc::UnboundedReceiver<AcceptorCommand>,
        ctx: SessionContext,
        tracker: TaskTracker,
        config: &ServerConfig,
    ) -> Result<Self> {
        let bind_address = listener.local_addr()?;
        Ok(Self {
            bind_address,
            listener: Some(listener),
            commands,
            ctx,
            tracker,
            next_id: 1,
            consecutive_failures: 0,
            accept_backoff: config.accept_backoff,
            max_accept_failures: config.max_accept_failures.max(1),
        })
    }

    /// Address the listener is (re)bound to
    pub(crate) fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Accept until the server's shutdown token is cancelled
    pub(crate) async fn run(mut self) {
        let shutdown = self.ctx.shutdown.clone();
        info!(address = %self.bind_address, "Accept loop started");

        loop {
            let event = match self.listener.as_ref() {
                Some(listener) => tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => AcceptEvent::Shutdown,
                    cmd = self.commands.recv() => AcceptEvent::Command(cmd),
                    res = listener.accept() => AcceptEvent::Accepted(res),
                },
                None => tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => AcceptEvent::Shutdown,
                    cmd = self.commands.recv() => AcceptEvent::Command(cmd),
                },
            };

            match event {
                AcceptEvent::Shutdown | AcceptEvent::Command(None) => break,
                AcceptEvent::Command(Some(AcceptorCommand::Resume)) => {
                    if self.listener.is_some() {
                        trace!("Listener already accepting");
                    } else {
                        self.rebind().await;
                    }
                }
                AcceptEvent::Command(Some(AcceptorCommand::Restart)) => {
                    self.listener = None;
                    self.rebind().await;
                }
                AcceptEvent::Accepted(Ok((socket, peer))) => self.spawn_session(socket, peer),
                AcceptEvent::Accepted(Err(e)) => self.accept_failed(e).await,
            }
        }

        self.listener = None;
        info!(address = %self.bind_address, "Accept loop terminated");
    }

    fn spawn_session(&mut self, socket: TcpStream, peer: SocketAddr) {
        self.consecutive_failures = 0;
        self.ctx.metrics.connection_accepted();

        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        debug!(client = %peer, connection_id = %id, "Accepted connection");

        let worker = SessionWorker::new(id, socket, self.ctx.clone());
        self.tracker.spawn(worker.run());
    }

    async fn accept_failed(&mut self, e: std::io::Error) {
        self.ctx.metrics.accept_error();
        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.max_accept_failures {
            error!(
                address = %self.bind_address,
                failures = self.consecutive_failures,
                error = %e,
                "Listener stopped after repeated accept failures"
            );
            self.listener = None;
            return;
        }

        warn!(error = %e, "Failed to accept connection");

        // Back off on errors to avoid tight loop
        tokio::select! {
            _ = self.ctx.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.accept_backoff) => {}
        }
    }

    async fn rebind(&mut self) {
        if self.ctx.shutdown.is_cancelled() || !self.ctx.running.load(Ordering::Acquire) {
            return;
        }

        match TcpListener::bind(self.bind_address).await {
            Ok(listener) => {
                info!(address = %self.bind_address, "Listener restarted");
                self.listener = Some(listener);
                self.consecutive_failures = 0;
            }
            Err(e) => {
                error!(address = %self.bind_address, error = %e, "Failed to restart listener");
            }
        }
    }
}

impl std::fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("bind_address", &self.bind_address)
            .field("listening", &self.listener.is_some())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerConfig;
    use crate::{ClientRegistry, NoopHandler, ServerMetrics};
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tokio_util::sync::CancellationToken;

    async fn build_acceptor(config: ServerConfig) -> (SocketAddr, AcceptorHandle, SessionContext, Acceptor) {
        let listener = Acceptor::bind(config.bind_address).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (handle, commands) = AcceptorHandle::channel();
        let ctx = SessionContext {
            config: WorkerConfig::from(&config),
            registry: Arc::new(ClientRegistry::new()),
            metrics: Arc::new(ServerMetrics::new()),
            handler: Arc::new(NoopHandler),
            shutdown: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(true)),
            acceptor: handle.clone(),
        };
        let acceptor = Acceptor::new(listener, commands, ctx.clone(), TaskTracker::new(), &config).unwrap();
        (addr, handle, ctx, acceptor)
    }

    async fn spawn_acceptor() -> (SocketAddr, AcceptorHandle, SessionContext, tokio::task::JoinHandle<()>) {
        let config = ServerConfig::with_address("127.0.0.1:0".parse().unwrap());
        let (addr, handle, ctx, acceptor) = build_acceptor(config).await;
        let task = tokio::spawn(acceptor.run());
        (addr, handle, ctx, task)
    }

    async fn is_listening(addr: SocketAddr) -> bool {
        TcpStream::connect(addr).await.is_ok()
    }

    async fn wait_for_registered(ctx: &SessionContext, count: usize) {
        for _ in 0..100 {
            if ctx.registry.len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} registered clients, found {}", count, ctx.registry.len());
    }

    #[tokio::test]
    async fn test_bind_error_reports_address() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let err = Acceptor::bind(addr).await.unwrap_err();
        match err {
            SupportError::Bind { address, .. } => assert_eq!(address, addr),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accepts_and_spawns_sessions() {
        let (addr, _handle, ctx, task) = spawn_acceptor().await;

        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        wait_for_registered(&ctx, 2).await;
        assert_eq!(ctx.metrics.total_connections(), 2);

        ctx.running.store(false, Ordering::SeqCst);
        ctx.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_accept() {
        let (_addr, _handle, ctx, task) = spawn_acceptor().await;

        ctx.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("accept loop should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_restart_keeps_port() {
        let (addr, handle, ctx, task) = spawn_acceptor().await;

        assert!(handle.restart());
        assert!(handle.resume());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _client = TcpStream::connect(addr).await.unwrap();
        wait_for_registered(&ctx, 1).await;

        ctx.shutdown.cancel();
        task.await.unwrap();
        assert!(!handle.resume());
    }

    #[tokio::test]
    async fn test_repeated_accept_failures_drop_listener() {
        let config = ServerConfig::with_address("127.0.0.1:0".parse().unwrap())
            .with_max_accept_failures(3)
            .with_accept_backoff(Duration::from_millis(1));
        let (addr, handle, ctx, mut acceptor) = build_acceptor(config).await;

        for _ in 0..2 {
            acceptor.accept_failed(std::io::Error::other("accept failed")).await;
            assert!(acceptor.listener.is_some());
        }
        acceptor.accept_failed(std::io::Error::other("accept failed")).await;
        assert!(acceptor.listener.is_none());
        assert_eq!(ctx.metrics.snapshot().accept_errors, 3);
        assert!(!is_listening(addr).await);

        // The next session teardown brings the listener back on the same port
        let task = tokio::spawn(acceptor.run());
        assert!(handle.resume());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _client = TcpStream::connect(addr).await.unwrap();
        wait_for_registered(&ctx, 1).await;

        ctx.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_rebinds_missing_listener() {
        let config = ServerConfig::with_address("127.0.0.1:0".parse().unwrap());
        let (addr, handle, ctx, mut acceptor) = build_acceptor(config).await;
        acceptor.listener = None;
        assert!(!is_listening(addr).await);

        let task = tokio::spawn(acceptor.run());
        assert!(handle.resume());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _client = TcpStream::connect(addr).await.unwrap();
        wait_for_registered(&ctx, 1).await;
        assert_eq!(ctx.metrics.total_connections(), 1);

        ctx.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_ignored_once_stopped() {
        let config = ServerConfig::with_address("127.0.0.1:0".parse().unwrap());
        let (addr, handle, ctx, mut acceptor) = build_acceptor(config).await;
        acceptor.listener = None;
        ctx.running.store(false, Ordering::SeqCst);

        let task = tokio::spawn(acceptor.run());
        assert!(handle.resume());
        assert!(handle.restart());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!is_listening(addr).await);

        ctx.shutdown.cancel();
        task.await.unwrap();
        assert!(ctx.registry.is_empty());
    }
}
