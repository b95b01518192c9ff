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

//! Unit tests for configuration types

use netsupport_service::{
    DEFAULT_HEARTBEAT_PAYLOAD, DuplicatePolicy, ServerConfig, SupportError, SupportServer,
    WorkerConfig,
};
use std::net::SocketAddr;
use std::time::Duration;

#[test]
fn test_server_config_defaults() {
    let config = ServerConfig::default();

    assert_eq!(config.bind_address, "0.0.0.0:6000".parse::<SocketAddr>().unwrap());
    assert_eq!(config.idle_timeout, Duration::from_secs(600));
    assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
    assert_eq!(&config.heartbeat_payload[..], DEFAULT_HEARTBEAT_PAYLOAD);
    assert_eq!(&config.heartbeat_payload[..], b"Message from the server");
    assert_eq!(config.probe_timeout, Duration::from_millis(10));
    assert_eq!(config.read_buffer_size, 1024);
    assert_eq!(config.write_timeout, Duration::from_secs(30));
    assert_eq!(config.accept_backoff, Duration::from_millis(100));
    assert_eq!(config.max_accept_failures, 16);
    assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    assert_eq!(config.duplicate_policy, DuplicatePolicy::KeepExisting);
    assert!(config.validate().is_ok());
}

#[test]
fn test_server_config_new_uses_all_interfaces() {
    for port in [6000, 6001, 6002] {
        let config = ServerConfig::new(port);
        assert!(config.bind_address.ip().is_unspecified());
        assert_eq!(config.bind_address.port(), port);
    }
}

#[test]
fn test_server_config_builder() {
    let config = ServerConfig::with_address("127.0.0.1:7000".parse().unwrap())
        .with_idle_timeout(Duration::from_secs(30))
        .with_heartbeat_interval(Duration::from_millis(250))
        .with_heartbeat_payload("tick")
        .with_probe_timeout(Duration::from_millis(50))
        .with_read_buffer_size(4096)
        .with_write_timeout(Duration::from_secs(2))
        .with_accept_backoff(Duration::from_millis(10))
        .with_max_accept_failures(3)
        .with_shutdown_timeout(Duration::from_secs(1))
        .with_duplicate_policy(DuplicatePolicy::Reject);

    assert_eq!(config.bind_address.port(), 7000);
    assert_eq!(config.idle_timeout, Duration::from_secs(30));
    assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
    assert_eq!(&config.heartbeat_payload[..], b"tick");
    assert_eq!(config.probe_timeout, Duration::from_millis(50));
    assert_eq!(config.read_buffer_size, 4096);
    assert_eq!(config.write_timeout, Duration::from_secs(2));
    assert_eq!(config.accept_backoff, Duration::from_millis(10));
    assert_eq!(config.max_accept_failures, 3);
    assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
}

#[test]
fn test_worker_config_follows_server_config() {
    let config = ServerConfig::default()
        .with_idle_timeout(Duration::from_secs(42))
        .with_heartbeat_payload(vec![1u8, 2, 3])
        .with_duplicate_policy(DuplicatePolicy::Reject);
    let worker = WorkerConfig::from(&config);

    assert_eq!(worker.idle_timeout, Duration::from_secs(42));
    assert_eq!(worker.heartbeat_interval, config.heartbeat_interval);
    assert_eq!(&worker.heartbeat_payload[..], &[1, 2, 3]);
    assert_eq!(worker.read_buffer_size, config.read_buffer_size);
    assert_eq!(worker.duplicate_policy, DuplicatePolicy::Reject);

    let default = WorkerConfig::default();
    assert_eq!(default.idle_timeout, Duration::from_secs(600));
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        ServerConfig::default().with_idle_timeout(Duration::ZERO),
        ServerConfig::default().with_heartbeat_interval(Duration::ZERO),
        ServerConfig::default().with_write_timeout(Duration::ZERO),
        ServerConfig::default().with_read_buffer_size(0),
    ];

    for config in cases {
        assert!(matches!(config.validate(), Err(SupportError::InvalidConfig(_))));
        assert!(matches!(
            SupportServer::new(config),
            Err(SupportError::InvalidConfig(_))
        ));
    }
}

#[test]
fn test_empty_heartbeat_payload_is_allowed() {
    let config = ServerConfig::default().with_heartbeat_payload(&b""[..]);
    assert!(config.heartbeat_payload.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_server_config_clone() {
    let config1 = ServerConfig::new(6001).with_heartbeat_payload("x");
    let config2 = config1.clone();

    assert_eq!(config1.bind_address, config2.bind_address);
    assert_eq!(config1.heartbeat_payload, config2.heartbeat_payload);
}
