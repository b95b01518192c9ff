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

//! Error types for the connection service

use crate::types::ClientKey;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, SupportError>;

/// Errors surfaced to callers of the service
#[derive(Debug, Error)]
pub enum SupportError {
    /// The listening socket could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested bind address
        address: SocketAddr,
        /// Underlying bind failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start()` called on a server that is already running
    #[error("Server already running")]
    AlreadyRunning,

    /// Operation requires a running server
    #[error("Server not running")]
    NotRunning,

    /// `start()` called after `stop()`; a stopped server cannot be restarted
    #[error("Server has been stopped")]
    Stopped,

    /// No client registered under the given key
    #[error("Client {0} not found")]
    ClientNotFound(ClientKey),

    /// Writing to a client failed
    #[error("Write to {key} failed: {source}")]
    Write {
        /// Client the write was addressed to
        key: ClientKey,
        /// Underlying write failure
        #[source]
        source: std::io::Error,
    },

    /// Writing to a client did not complete in time
    #[error("Write to {0} timed out")]
    WriteTimeout(ClientKey),

    /// Connection has already been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// String could not be parsed as `address:port`
    #[error("Invalid client key: {0}")]
    InvalidClientKey(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SupportError {
    /// Check if the error concerns a single connection
    ///
    /// Connection errors never affect other connections or the acceptor.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SupportError::ClientNotFound(_)
                | SupportError::Write { .. }
                | SupportError::WriteTimeout(_)
                | SupportError::ConnectionClosed
                | SupportError::Io(_)
        )
    }

    /// Check if the error concerns the server lifecycle
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            SupportError::Bind { .. }
                | SupportError::AlreadyRunning
                | SupportError::NotRunning
                | SupportError::Stopped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_connection_error() {
        let key = ClientKey::new("127.0.0.1:6000".parse().unwrap());
        assert!(SupportError::ClientNotFound(key).is_connection_error());
        assert!(SupportError::ConnectionClosed.is_connection_error());
        assert!(!SupportError::NotRunning.is_connection_error());
    }

    #[test]
    fn test_error_is_lifecycle_error() {
        let err = SupportError::Bind {
            address: "0.0.0.0:6000".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.is_lifecycle_error());
        assert!(SupportError::AlreadyRunning.is_lifecycle_error());
        assert!(!SupportError::ConnectionClosed.is_lifecycle_error());
    }

    #[test]
    fn test_error_display() {
        let key = ClientKey::new("10.0.0.7:51000".parse().unwrap());
        let err = SupportError::ClientNotFound(key);
        assert_eq!(err.to_string(), "Client 10.0.0.7:51000 not found");

        let err = SupportError::WriteTimeout(key);
        assert_eq!(err.to_string(), "Write to 10.0.0.7:51000 timed out");
    }
}
