//! Object pool bounds, hit accounting and lifecycle

#![allow(clippy::expect_used, clippy::unwrap_used)]

use socket_runtime::error::FrameworkError;
use socket_runtime::utils::pool::{buffer_pool, ObjectPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn second_rent_from_single_slot_pool_fails() {
    let pool = ObjectPool::new(1, String::new);
    let held = pool.rent().unwrap();
    let err = pool.rent().expect_err("pool of one is exhausted");
    assert!(matches!(err, FrameworkError::PoolExhausted(1)));

    pool.release(held);
    assert!(pool.rent().is_ok());
}

#[test]
fn concurrent_renters_never_exceed_max() {
    const MAX: usize = 8;
    const THREADS: usize = 32;

    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let pool = ObjectPool::new(MAX, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Vec::<u8>::new()
    });
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let pool = pool.clone();
            let live = live.clone();
            let peak = peak.clone();
            let barrier = barrier.clone();
            scope.spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    match pool.lease() {
                        Ok(item) => {
                            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            assert!(pool.total_count() <= MAX);
                            live.fetch_sub(1, Ordering::SeqCst);
                            drop(item);
                        }
                        Err(FrameworkError::PoolExhausted(n)) => assert_eq!(n, MAX),
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            });
        }
    });

    assert!(peak.load(Ordering::SeqCst) <= MAX);
    assert!(constructed.load(Ordering::SeqCst) <= MAX);
    assert!(pool.total_count() <= MAX);
    assert_eq!(pool.total_count(), pool.idle_count());
}

#[test]
fn hit_rate_rises_with_reuse() {
    let pool = ObjectPool::new(4, || 0u64);
    assert_eq!(pool.hit_rate(), 0.0);

    let first = pool.rent().unwrap();
    assert_eq!(pool.hit_rate(), 0.0);
    pool.release(first);

    let mut last = pool.hit_rate();
    for _ in 0..5 {
        let item = pool.rent().unwrap();
        let rate = pool.hit_rate();
        assert!(rate > last, "hit rate {rate} did not rise above {last}");
        last = rate;
        pool.release(item);
    }
    assert_eq!(pool.miss_count(), 1);
    assert_eq!(pool.hit_count(), 5);
}

#[test]
fn preload_fills_idle_and_counts_as_hits() {
    let pool = ObjectPool::new(16, || 0u8);
    assert_eq!(pool.preload(4).unwrap(), 4);
    assert_eq!(pool.idle_count(), 4);

    let leases: Vec<_> = (0..4).map(|_| pool.lease().unwrap()).collect();
    assert_eq!(pool.hit_count(), 4);
    assert_eq!(pool.miss_count(), 0);
    drop(leases);
    assert_eq!(pool.idle_count(), 4);
}

#[test]
fn trim_keeps_requested_idle() {
    let pool = ObjectPool::new(10, || 0u8);
    pool.preload(10).unwrap();
    let held = pool.rent().unwrap();

    assert_eq!(pool.trim(3).unwrap(), 6);
    assert_eq!(pool.idle_count(), 3);
    assert_eq!(pool.total_count(), 4);

    pool.release(held);
    assert_eq!(pool.trim(10).unwrap(), 0);
}

#[test]
fn dispose_is_terminal() {
    let pool = buffer_pool(4);
    pool.preload(2).unwrap();
    let lease = pool.lease().unwrap();

    pool.dispose();
    pool.dispose();
    assert!(pool.is_disposed());
    assert_eq!(pool.idle_count(), 0);

    drop(lease);
    assert_eq!(pool.total_count(), 0);
    assert!(matches!(pool.rent(), Err(FrameworkError::PoolDisposed)));
    assert!(matches!(pool.preload(1), Err(FrameworkError::PoolDisposed)));
    assert!(matches!(pool.trim(0), Err(FrameworkError::PoolDisposed)));
}

#[test]
fn discard_frees_slot_without_caching() {
    let pool = ObjectPool::new(1, || 5u8);
    let item = pool.rent().unwrap();
    pool.discard(item);
    assert_eq!(pool.total_count(), 0);
    assert_eq!(pool.idle_count(), 0);
    assert!(pool.rent().is_ok());
    assert_eq!(pool.miss_count(), 2);
}
