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

//! Unicast and broadcast delivery
//!
//! The ClientSender reads the registry at call time and writes through each
//! connection's own write lock, so it can run concurrently with session
//! heartbeats without interleaving payloads.

use crate::{ClientKey, ClientRegistry, Result, SupportError};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Result of a broadcast operation
#[derive(Debug)]
pub struct BroadcastResult {
    /// Number of clients in the snapshot
    pub total: usize,
    /// Number of successful sends
    pub succeeded: usize,
    /// Number of failed sends
    pub failed: usize,
    /// Errors that occurred, per client
    pub errors: Vec<(ClientKey, SupportError)>,
}

impl BroadcastResult {
    fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    /// Check if all sends succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

/// Stateless send operations over a client registry
#[derive(Clone)]
pub struct ClientSender {
    registry: Arc<ClientRegistry>,
    running: Arc<AtomicBool>,
}

impl ClientSender {
    pub(crate) fn new(registry: Arc<ClientRegistry>, running: Arc<AtomicBool>) -> Self {
        Self { registry, running }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SupportError::NotRunning)
        }
    }

    /// Write `payload` to the client registered under `key`
    ///
    /// Fails with [`SupportError::ClientNotFound`] without writing anything
    /// if the key is absent. Failures are not retried.
    pub async fn send_to(&self, key: ClientKey, payload: impl AsRef<[u8]>) -> Result<()> {
        self.ensure_running()?;

        let conn = self
            .registry
            .get(&key)
            .ok_or(SupportError::ClientNotFound(key))?;

        conn.send(payload.as_ref()).await.inspect_err(|e| {
            warn!(client = %key, error = %e, "Send failed");
        })
    }

    /// Write `payload` to every registered client
    ///
    /// Delivery is best effort over a snapshot taken at call time; a
    /// failure on one client is recorded and does not stop the rest.
    pub async fn broadcast(&self, payload: impl AsRef<[u8]>) -> Result<BroadcastResult> {
        self.ensure_running()?;

        let payload = Bytes::copy_from_slice(payload.as_ref());
        let snapshot = self.registry.snapshot();

        let mut result = BroadcastResult::new();
        result.total = snapshot.len();

        let sends = snapshot.into_iter().map(|(key, conn)| {
            let payload = payload.clone();
            async move { (key, conn.send(&payload).await) }
        });

        // Execute all sends concurrently
        let results = futures_util::future::join_all(sends).await;

        for (key, res) in results {
            match res {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    warn!(client = %key, error = %e, "Broadcast delivery failed");
                    result.failed += 1;
                    result.errors.push((key, e));
                }
            }
        }

        debug!(
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            "Broadcast complete"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for ClientSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSender")
            .field("clients", &self.registry.len())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}
