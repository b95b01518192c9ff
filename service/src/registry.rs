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

//! Client registry
//!
//! Concurrent map from [`ClientKey`] to a live connection handle. All
//! operations are internally synchronized (sharded `DashMap`), and
//! iteration is only offered through [`ClientRegistry::snapshot`], which
//! copies the entries out before the caller touches them.

use crate::{ClientConnection, ClientKey, ConnectionId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Outcome of [`ClientRegistry::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The handle is now the registered entry for its key
    Inserted,
    /// Another connection already owns the key and stays authoritative
    Existing(ConnectionId),
}

impl Registration {
    /// True if the caller's handle was inserted
    pub fn is_inserted(&self) -> bool {
        matches!(self, Registration::Inserted)
    }
}

struct RegistryEntry<C> {
    owner: ConnectionId,
    handle: C,
}

/// Thread-safe map of live client handles
pub struct ClientRegistry<C = ClientConnection> {
    entries: DashMap<ClientKey, RegistryEntry<C>>,
}

impl<C: Clone> Default for ClientRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clone> ClientRegistry<C> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert `handle` under `key` if the key is free
    ///
    /// An existing entry is never replaced; the result reports which
    /// connection is authoritative for the key.
    pub fn add(&self, key: ClientKey, owner: ConnectionId, handle: C) -> Registration {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => Registration::Existing(existing.get().owner),
            Entry::Vacant(slot) => {
                slot.insert(RegistryEntry { owner, handle });
                Registration::Inserted
            }
        }
    }

    /// Remove the entry for `key` unconditionally
    pub fn remove(&self, key: &ClientKey) -> Option<C> {
        self.entries.remove(key).map(|(_, entry)| entry.handle)
    }

    /// Remove the entry for `key` only if it was added by `owner`
    ///
    /// Sessions tear down through this so a connection that lost a duplicate
    /// key race never evicts the registered one.
    pub fn remove_owned(&self, key: &ClientKey, owner: ConnectionId) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.owner == owner)
            .is_some()
    }

    /// Look up the handle for `key`
    pub fn get(&self, key: &ClientKey) -> Option<C> {
        self.entries.get(key).map(|entry| entry.handle.clone())
    }

    /// Check whether `key` is registered
    pub fn contains(&self, key: &ClientKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> Vec<(ClientKey, C)> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().handle.clone()))
            .collect()
    }

    /// All registered keys
    pub fn keys(&self) -> Vec<ClientKey> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Remove every entry and hand them back to the caller
    pub fn drain(&self) -> Vec<(ClientKey, C)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.remove(&key).map(|handle| (key, handle)))
            .collect()
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C> std::fmt::Debug for ClientRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}
