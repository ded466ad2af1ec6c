#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::BytesMut;
use serde_json::json;
use socket_runtime::command::{CommandRegistry, CommandResult, ParamType};
use socket_runtime::component::{PermissionGroup, PermissionLevel};
use socket_runtime::config::{EventBusConfig, ShutdownPolicy};
use socket_runtime::core::codec::PacketCodec;
use socket_runtime::core::packet::Packet;
use socket_runtime::protocol::event_bus::{handler_fn, EventBus};
use socket_runtime::session::Session;
use socket_runtime::utils::metrics::Metrics;
use socket_runtime::utils::pool::buffer_pool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, Encoder};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_encode_decode_shared_scratch_pool() {
    let iterations = 5_000usize;
    let body_sizes = [0usize, 64, 512, 4096, 32_768];
    let pool = buffer_pool(4);

    let mut tasks = JoinSet::new();
    for &size in &body_sizes {
        let pool = pool.clone();
        tasks.spawn(async move {
            let mut codec = PacketCodec::default().with_scratch(pool.clone());
            let mut buf = BytesMut::new();
            for i in 0..iterations {
                let p = Packet::message(format!("m{i}"), "x".repeat(size));
                codec.encode(p.clone(), &mut buf).unwrap();
                let decoded = codec.decode(&mut buf).unwrap().expect("full frame");
                assert_eq!(decoded, p);
                assert!(pool.total_count() <= pool.max_size());
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    assert!(pool.total_count() <= 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_command_execution_counts_exactly() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let metrics = Arc::new(Metrics::new());
    let commands = Arc::new(
        CommandRegistry::builder()
            .command("incr", PermissionLevel::CLIENT, vec![ParamType::UInt], move |args, _| {
                let n = args[0].as_u64().unwrap_or(0) as usize;
                seen.fetch_add(n, Ordering::SeqCst);
                CommandResult::ok(n)
            })
            .unwrap()
            .build()
            .with_metrics(metrics.clone()),
    );

    let mut tasks = JoinSet::new();
    for worker in 0..16u32 {
        let commands = commands.clone();
        tasks.spawn(async move {
            // Even workers are guests and must be refused
            let level = if worker % 2 == 0 {
                PermissionLevel::GUEST
            } else {
                PermissionLevel::CLIENT
            };
            let session = Session::detached();
            session.components().add(PermissionGroup::new(level)).unwrap();
            for _ in 0..500 {
                let result = commands.execute("incr", &[json!(1)], &session);
                assert_eq!(result.success, level == PermissionLevel::CLIENT);
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8 * 500);
    let snap = metrics.snapshot();
    assert_eq!(snap.commands_executed, 8 * 500);
    assert_eq!(snap.commands_denied, 8 * 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_publishers_deliver_every_event() {
    let metrics = Arc::new(Metrics::new());
    let bus = EventBus::new(
        &EventBusConfig {
            capacity: 8,
            shutdown_policy: ShutdownPolicy::Flush,
        },
        metrics.clone(),
    );
    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    bus.add_listener(
        "tick",
        handler_fn(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    )
    .unwrap();

    let mut tasks = JoinSet::new();
    for publisher in 0..16 {
        let bus = bus.clone();
        tasks.spawn(async move {
            for i in 0..250 {
                bus.publish("tick", json!({"from": publisher, "n": i}))
                    .await
                    .unwrap();
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    bus.shutdown().await;

    assert_eq!(received.load(Ordering::SeqCst), 16 * 250);
    let snap = metrics.snapshot();
    assert_eq!(snap.events_published, 16 * 250);
    assert_eq!(snap.events_dispatched, 16 * 250);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_close_has_single_winner() {
    for _ in 0..200 {
        let session = Arc::new(Session::detached());
        session.activate();

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let session = session.clone();
            tasks.spawn(async move {
                session.close(socket_runtime::session::CloseReason::Disconnected)
            });
        }
        let mut winners = 0;
        while let Some(res) = tasks.join_next().await {
            if res.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
