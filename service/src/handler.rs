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

//! Session event hooks

use crate::{ClientConnection, ClientKey, DisconnectReason};
use async_trait::async_trait;

/// Session event handler trait
///
/// Implement this trait to observe sessions. All methods have default
/// implementations that do nothing. Handlers run inline on the session
/// task, so a slow handler delays that session's next heartbeat.
///
/// # Example
///
/// ```no_run
/// use netsupport_service::{ClientConnection, ClientKey, SessionHandler};
/// use async_trait::async_trait;
///
/// struct Echo;
///
/// #[async_trait]
/// impl SessionHandler for Echo {
///     async fn on_data(&self, _key: ClientKey, conn: &ClientConnection, data: &[u8]) {
///         let _ = conn.send(data).await;
///     }
/// }
/// ```
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Called once the session passed the probe and was registered
    async fn on_connect(&self, _key: ClientKey, _conn: &ClientConnection) {}

    /// Called for every non-empty read
    ///
    /// No framing is applied; `data` is exactly what one read returned.
    async fn on_data(&self, _key: ClientKey, _conn: &ClientConnection, _data: &[u8]) {}

    /// Called when a registered session ends
    async fn on_disconnect(&self, _key: ClientKey, _conn: &ClientConnection, _reason: DisconnectReason) {}
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl SessionHandler for NoopHandler {}

type ConnectCallback = Box<dyn Fn(ClientKey, &ClientConnection) + Send + Sync + 'static>;
type DataCallback = Box<dyn Fn(ClientKey, &[u8]) + Send + Sync + 'static>;
type DisconnectCallback = Box<dyn Fn(ClientKey, DisconnectReason) + Send + Sync + 'static>;

/// Callback-based handler implementation
///
/// # Example
///
/// ```no_run
/// use netsupport_service::CallbackHandler;
/// use std::sync::Arc;
///
/// let handler = Arc::new(CallbackHandler {
///     on_data: Some(Box::new(|key, data| {
///         println!("{} wrote {} bytes", key, data.len());
///     })),
///     on_disconnect: Some(Box::new(|key, reason| {
///         println!("{} gone: {}", key, reason);
///     })),
///     ..Default::default()
/// });
/// ```
#[derive(Default)]
pub struct CallbackHandler {
    /// Called on registration
    pub on_connect: Option<ConnectCallback>,
    /// Called on inbound data
    pub on_data: Option<DataCallback>,
    /// Called on disconnection
    pub on_disconnect: Option<DisconnectCallback>,
}

#[async_trait]
impl SessionHandler for CallbackHandler {
    async fn on_connect(&self, key: ClientKey, conn: &ClientConnection) {
        if let Some(ref f) = self.on_connect {
            f(key, conn);
        }
    }

    async fn on_data(&self, key: ClientKey, _conn: &ClientConnection, data: &[u8]) {
        if let Some(ref f) = self.on_data {
            f(key, data);
        }
    }

    async fn on_disconnect(&self, key: ClientKey, _conn: &ClientConnection, reason: DisconnectReason) {
        if let Some(ref f) = self.on_disconnect {
            f(key, reason);
        }
    }
}
