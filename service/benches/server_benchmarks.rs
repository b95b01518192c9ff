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

//! Benchmarks for the support server

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use netsupport_service::{
    ClientConnection, ClientKey, ClientRegistry, ConnectionId, NoopHandler, ServerConfig,
    ServerMetrics, SessionState, SupportServer,
};
use std::hint::black_box;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

// Helper to create a connected socket pair
async fn create_test_connection() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

    let (server, _) = listener.accept().await.unwrap();
    let client = client_task.await.unwrap();

    (server, client)
}

// Keep the client side drained so sends never block
fn drain(mut client: TcpStream) {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok(n) = client.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    });
}

fn bench_connection_wrap(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let token = CancellationToken::new();
    let metrics = Arc::new(ServerMetrics::new());

    c.bench_function("connection_wrap", |b| {
        b.to_async(&runtime).iter(|| async {
            let (server, _client) = create_test_connection().await;
            let conn = ClientConnection::wrap(
                server,
                ConnectionId::new(1),
                &token,
                Duration::from_secs(5),
                metrics.clone(),
            )
            .unwrap();
            black_box(conn);
        });
    });
}

fn bench_metrics_updates(c: &mut Criterion) {
    let metrics = Arc::new(ServerMetrics::new());

    c.bench_function("metrics_bytes_sent", |b| {
        b.iter(|| {
            metrics.bytes_sent(1024);
            black_box(&metrics);
        });
    });

    c.bench_function("metrics_snapshot", |b| {
        b.iter(|| black_box(metrics.snapshot()));
    });
}

fn bench_registry_operations(c: &mut Criterion) {
    let registry: ClientRegistry<u64> = ClientRegistry::new();
    let keys: Vec<ClientKey> = (0..1000u16)
        .map(|port| ClientKey::new(SocketAddr::from(([10, 0, 0, 1], 10_000 + port))))
        .collect();
    for (i, key) in keys.iter().enumerate() {
        registry.add(*key, ConnectionId::new(i as u64), i as u64);
    }

    c.bench_function("registry_get", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(registry.get(&keys[i]))
        });
    });

    c.bench_function("registry_add_remove", |b| {
        let key = ClientKey::new(SocketAddr::from(([10, 0, 0, 2], 5000)));
        let owner = ConnectionId::new(u64::MAX);
        b.iter(|| {
            registry.add(key, owner, 0);
            black_box(registry.remove_owned(&key, owner))
        });
    });

    c.bench_function("registry_snapshot_1000", |b| {
        b.iter(|| black_box(registry.snapshot()));
    });
}

// Broadcast fan-out with varying client counts
fn bench_broadcast_scaling(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("broadcast_scaling");

    for client_count in [10, 50, 100] {
        let server = runtime.block_on(async {
            let config = ServerConfig::with_address("127.0.0.1:0".parse().unwrap())
                .with_heartbeat_interval(Duration::from_secs(3600));
            let server = SupportServer::new(config).unwrap();
            let addr = server.start(Arc::new(NoopHandler)).await.unwrap();

            for _ in 0..client_count {
                drain(TcpStream::connect(addr).await.unwrap());
            }
            while server.connection_count() < client_count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            server
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(client_count),
            &server,
            |b, server| {
                b.to_async(&runtime).iter(|| async {
                    let result = server.broadcast(b"Message from the server").await.unwrap();
                    black_box(result);
                });
            },
        );

        runtime.block_on(server.stop()).unwrap();
    }
    group.finish();
}

fn bench_state_transitions(c: &mut Criterion) {
    use std::sync::atomic::{AtomicU8, Ordering};

    let state = AtomicU8::new(SessionState::Probing.as_u8());

    c.bench_function("state_transition", |b| {
        b.iter(|| {
            state.store(SessionState::Active.as_u8(), Ordering::Release);
            let current = SessionState::from_u8(state.load(Ordering::Acquire));
            black_box(current);
        });
    });
}

criterion_group!(
    benches,
    bench_connection_wrap,
    bench_metrics_updates,
    bench_registry_operations,
    bench_broadcast_scaling,
    bench_state_transitions,
);

criterion_main!(benches);
