//! # Object Pool
//!
//! Bounded pool of reusable instances shared by the codec and session layer to
//! cut allocation churn under many concurrent connections.
//!
//! ## Behavior
//! - `rent()` tries a single cached idle slot first, then the general idle
//!   collection, then constructs a new instance if the pool is below its
//!   maximum. It never waits: a full pool fails with `PoolExhausted`.
//! - `release()` resets the item and caches it, fast slot first.
//! - The number of instances live-or-idle never exceeds `max_size`.
//!
//! ## Usage
//! ```rust
//! use socket_runtime::utils::pool::ObjectPool;
//!
//! let pool = ObjectPool::new(8, || Vec::<u8>::with_capacity(256));
//! let mut buffer = pool.lease().expect("pool has room");
//! buffer.extend_from_slice(b"payload");
//! // Buffer automatically returned to pool on drop
//! ```

use crate::error::{FrameworkError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Maximum capacity a pooled scratch buffer keeps across leases (4KB)
pub const MAX_POOLED_BUFFER_SIZE: usize = 4096;

/// Default scratch buffer capacity
const DEFAULT_BUFFER_CAPACITY: usize = 1024;

type Factory<T> = dyn Fn() -> std::result::Result<T, String> + Send + Sync;
type Reset<T> = dyn Fn(&mut T) + Send + Sync;

struct PoolInner<T> {
    fast_slot: Mutex<Option<T>>,
    idle: Mutex<Vec<T>>,
    factory: Box<Factory<T>>,
    reset: Option<Box<Reset<T>>>,
    max_size: usize,
    count: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    disposed: AtomicBool,
}

/// Thread-safe bounded object pool.
///
/// Cloning yields another handle onto the same pool.
pub struct ObjectPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("total", &self.inner.count.load(Ordering::Relaxed))
            .field("max_size", &self.inner.max_size)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ObjectPool<T> {
    /// Create a pool whose factory cannot fail
    pub fn new<F>(max_size: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(max_size, Box::new(move || Ok(factory())), None)
    }

    /// Create a pool whose factory may fail; failures surface as `PoolConstruction`
    pub fn try_new<F, E>(max_size: usize, factory: F) -> Self
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Self::build(
            max_size,
            Box::new(move || factory().map_err(|e| e.to_string())),
            None,
        )
    }

    /// Create a pool that applies `reset` to every returned item
    pub fn with_reset<F, R>(max_size: usize, factory: F, reset: R) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::build(
            max_size,
            Box::new(move || Ok(factory())),
            Some(Box::new(reset)),
        )
    }

    fn build(max_size: usize, factory: Box<Factory<T>>, reset: Option<Box<Reset<T>>>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                fast_slot: Mutex::new(None),
                idle: Mutex::new(Vec::new()),
                factory,
                reset,
                max_size,
                count: AtomicUsize::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Rent an instance. Never waits.
    pub fn rent(&self) -> Result<T> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            return Err(FrameworkError::PoolDisposed);
        }

        // Fast path: single cached slot, skipped under contention
        if let Ok(mut slot) = inner.fast_slot.try_lock() {
            if let Some(item) = slot.take() {
                inner.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(item);
            }
        }

        if let Some(item) = inner.idle.lock().ok().and_then(|mut idle| idle.pop()) {
            inner.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(item);
        }

        inner.misses.fetch_add(1, Ordering::Relaxed);
        if inner.count.fetch_add(1, Ordering::AcqRel) < inner.max_size {
            return (inner.factory)().map_err(|reason| {
                inner.count.fetch_sub(1, Ordering::AcqRel);
                warn!(%reason, "Pooled object construction failed");
                FrameworkError::PoolConstruction(reason)
            });
        }

        inner.count.fetch_sub(1, Ordering::AcqRel);
        debug!(max_size = inner.max_size, "Object pool exhausted");
        Err(FrameworkError::PoolExhausted(inner.max_size))
    }

    /// Rent an instance wrapped in a guard that returns it on drop
    pub fn lease(&self) -> Result<Pooled<T>> {
        let item = self.rent()?;
        Ok(Pooled {
            item: Some(item),
            pool: self.clone(),
        })
    }

    /// Return a rented instance to the pool
    pub fn release(&self, mut item: T) {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            self.discard(item);
            return;
        }

        if let Some(reset) = &inner.reset {
            reset(&mut item);
        }

        // `dispose` sets the flag before clearing each store, so it is
        // checked again under the store's lock
        let item = match inner.fast_slot.try_lock() {
            Ok(mut slot) if slot.is_none() => {
                if inner.disposed.load(Ordering::Acquire) {
                    drop(slot);
                    self.discard(item);
                } else {
                    *slot = Some(item);
                }
                return;
            }
            _ => item,
        };

        match inner.idle.lock() {
            Ok(mut idle) if !inner.disposed.load(Ordering::Acquire) => idle.push(item),
            _ => self.discard(item),
        }
    }

    /// Drop a rented instance without caching it, freeing its slot
    pub fn discard(&self, item: T) {
        self.inner.count.fetch_sub(1, Ordering::AcqRel);
        drop(item);
    }

    /// Eagerly construct up to `n` idle instances, bounded by the maximum.
    ///
    /// Returns how many were created.
    pub fn preload(&self, n: usize) -> Result<usize> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            return Err(FrameworkError::PoolDisposed);
        }

        let mut created = Vec::with_capacity(n.min(inner.max_size));
        for _ in 0..n {
            let reserved = inner
                .count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                    (c < inner.max_size).then_some(c + 1)
                })
                .is_ok();
            if !reserved {
                break;
            }
            match (inner.factory)() {
                Ok(item) => created.push(item),
                Err(reason) => {
                    inner.count.fetch_sub(1, Ordering::AcqRel);
                    self.stash(created);
                    return Err(FrameworkError::PoolConstruction(reason));
                }
            }
        }

        let total = created.len();
        self.stash(created);
        debug!(created = total, "Object pool preloaded");
        Ok(total)
    }

    fn stash(&self, items: Vec<T>) {
        match self.inner.idle.lock() {
            Ok(mut idle) => idle.extend(items),
            Err(_) => {
                self.inner.count.fetch_sub(items.len(), Ordering::AcqRel);
            }
        }
    }

    /// Evict and drop idle instances beyond `keep_alive`.
    ///
    /// Returns how many were evicted.
    pub fn trim(&self, keep_alive: usize) -> Result<usize> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            return Err(FrameworkError::PoolDisposed);
        }

        let mut evicted: Vec<T> = Vec::new();
        if let Ok(mut idle) = inner.idle.lock() {
            if idle.len() > keep_alive {
                evicted.extend(idle.drain(keep_alive..));
            }
            // The fast slot is idle too and only survives if there is room left
            if idle.len() >= keep_alive {
                if let Ok(mut slot) = inner.fast_slot.lock() {
                    evicted.extend(slot.take());
                }
            }
        }
        let total = evicted.len();
        inner.count.fetch_sub(total, Ordering::AcqRel);
        drop(evicted);

        if total > 0 {
            debug!(evicted = total, keep_alive, "Object pool trimmed");
        }
        Ok(total)
    }

    /// Drop every cached instance; later returns are dropped immediately.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut dropped = 0;
        if let Ok(mut idle) = inner.idle.lock() {
            dropped += idle.len();
            idle.clear();
        }
        if let Ok(mut slot) = inner.fast_slot.lock() {
            if slot.take().is_some() {
                dropped += 1;
            }
        }
        inner.count.fetch_sub(dropped, Ordering::AcqRel);
        debug!(dropped, "Object pool disposed");
    }

    /// Whether `dispose()` has been called
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Number of idle instances, fast slot included
    pub fn idle_count(&self) -> usize {
        let idle = self.inner.idle.lock().map(|i| i.len()).unwrap_or(0);
        let fast = self
            .inner
            .fast_slot
            .lock()
            .map(|s| usize::from(s.is_some()))
            .unwrap_or(0);
        idle + fast
    }

    /// Number of instances live or idle
    pub fn total_count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Configured upper bound
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    pub fn hit_count(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    /// `hits / (hits + misses)`, zero before any rent
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Scratch byte buffers, cleared on return and capped at `MAX_POOLED_BUFFER_SIZE`
pub type BufferPool = ObjectPool<Vec<u8>>;

/// Build the scratch buffer pool used by the codec and sessions
pub fn buffer_pool(max_size: usize) -> BufferPool {
    ObjectPool::with_reset(
        max_size,
        || Vec::with_capacity(DEFAULT_BUFFER_CAPACITY),
        |buf: &mut Vec<u8>| {
            buf.clear();
            if buf.capacity() > MAX_POOLED_BUFFER_SIZE {
                buf.shrink_to(DEFAULT_BUFFER_CAPACITY);
            }
        },
    )
}

/// A pooled instance that returns itself to the pool when dropped
pub struct Pooled<T: Send + 'static> {
    item: Option<T>,
    pool: ObjectPool<T>,
}

impl<T: Send + 'static> Pooled<T> {
    /// Detach the instance from the pool, freeing its slot
    pub fn into_inner(mut self) -> Option<T> {
        let item = self.item.take();
        if item.is_some() {
            self.pool.inner.count.fetch_sub(1, Ordering::AcqRel);
        }
        item
    }
}

impl<T: Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

impl<T: Send + 'static> std::ops::Deref for Pooled<T> {
    type Target = T;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        // Only `into_inner` and `drop` empty the slot, both consume the guard
        self.item.as_ref().expect("pooled item present")
    }
}

impl<T: Send + 'static> std::ops::DerefMut for Pooled<T> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.item.as_mut().expect("pooled item present")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_release_reuse() {
        let pool = ObjectPool::new(4, || Vec::<u8>::with_capacity(8));

        let item = pool.rent().unwrap();
        assert_eq!(pool.total_count(), 1);
        assert_eq!(pool.miss_count(), 1);

        pool.release(item);
        assert_eq!(pool.idle_count(), 1);

        let _again = pool.rent().unwrap();
        assert_eq!(pool.hit_count(), 1);
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn test_max_size_one_exhausts() {
        let pool = ObjectPool::new(1, || 0u32);
        let first = pool.rent();
        assert!(first.is_ok());
        assert!(matches!(pool.rent(), Err(FrameworkError::PoolExhausted(1))));
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn test_construction_failure_frees_reservation() {
        let pool: ObjectPool<u32> = ObjectPool::try_new(2, || Err::<u32, _>("boom"));
        assert!(matches!(
            pool.rent(),
            Err(FrameworkError::PoolConstruction(ref r)) if r == "boom"
        ));
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn test_reset_applied_on_release() {
        let pool = buffer_pool(2);
        {
            let mut buf = pool.lease().unwrap();
            buf.extend_from_slice(b"test");
            assert_eq!(buf.len(), 4);
        }
        let buf = pool.lease().unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_buffer_shrunk() {
        let pool = buffer_pool(1);
        {
            let mut buf = pool.lease().unwrap();
            buf.extend_from_slice(&vec![0u8; MAX_POOLED_BUFFER_SIZE * 4]);
        }
        let buf = pool.lease().unwrap();
        assert!(buf.capacity() <= MAX_POOLED_BUFFER_SIZE);
    }

    #[test]
    fn test_preload_and_trim() {
        let pool = ObjectPool::new(5, || 1u8);
        assert_eq!(pool.preload(10).unwrap(), 5);
        assert_eq!(pool.total_count(), 5);
        assert_eq!(pool.idle_count(), 5);

        assert_eq!(pool.trim(2).unwrap(), 3);
        assert_eq!(pool.total_count(), 2);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn test_trim_to_zero_evicts_fast_slot() {
        let pool = ObjectPool::new(3, || 0u16);
        let a = pool.rent().unwrap();
        let b = pool.rent().unwrap();
        let c = pool.rent().unwrap();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.idle_count(), 3);

        assert_eq!(pool.trim(0).unwrap(), 3);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn test_trim_keeps_fast_slot_within_keep_alive() {
        let pool = ObjectPool::new(4, || 0u16);
        let items: Vec<_> = (0..4).map(|_| pool.rent().unwrap()).collect();
        for item in items {
            pool.release(item);
        }

        assert_eq!(pool.trim(2).unwrap(), 2);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.total_count(), 2);
    }

    #[test]
    fn test_release_racing_dispose_never_caches() {
        for _ in 0..200 {
            let pool = ObjectPool::new(8, || 0u8);
            let items: Vec<_> = (0..8).map(|_| pool.rent().unwrap()).collect();
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let releaser = {
                let pool = pool.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    for item in items {
                        pool.release(item);
                    }
                })
            };
            barrier.wait();
            pool.dispose();
            releaser.join().unwrap();

            assert_eq!(pool.idle_count(), 0);
            assert_eq!(pool.total_count(), 0);
        }
    }

    #[test]
    fn test_release_after_dispose_drops() {
        let pool = ObjectPool::new(2, || 7u8);
        let item = pool.rent().unwrap();
        pool.dispose();
        pool.release(item);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.total_count(), 0);
        assert!(matches!(pool.rent(), Err(FrameworkError::PoolDisposed)));
    }

    #[test]
    fn test_into_inner_detaches() {
        let pool = ObjectPool::new(1, || 3u8);
        let leased = pool.lease().unwrap();
        assert_eq!(leased.into_inner(), Some(3));
        assert_eq!(pool.total_count(), 0);
        assert!(pool.rent().is_ok());
    }
}
