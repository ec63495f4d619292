//! Optimized Execution Service: the sharded, lock-contention-minimized
//! front door for order submission.
//!
//! Shard selection uses a cheap rolling hash over the order id's bytes
//! (`h = h*31 + byte`), identical in shape to the reference codebase's
//! shard-selection helper. Each shard is an independent `RwLock`-guarded
//! map so two orders hashing to different shards never contend.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::order::{Order, OrderId, OrderStatus};
use crate::perf::pools::ObjectPool;
use crate::ports::{ExecutionEngine, ExecutionResult, ExecutionStatus, OrderValidator};
use crate::resilience::{retry_engine_call, CircuitBreaker, CircuitBreakerConfig, RetryConfig};

fn shard_hash(id: OrderId) -> u64 {
    let mut h: u64 = 0;
    for byte in id.0.to_be_bytes() {
        h = h.wrapping_mul(31).wrapping_add(byte as u64);
    }
    h
}

fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// A pooled slot holding an order while it moves through submit/cancel/
/// complete. `Default`/`Clone` (required by [`ObjectPool`]) are trivial
/// since an idle slot just holds `None`.
#[derive(Default, Clone)]
struct OrderSlot {
    order: Option<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub shard_count: usize,
    pub max_concurrent: usize,
    pub order_timeout: Duration,
    pub gc_interval: Duration,
    pub gc_retention: Duration,
    pub metrics_interval: Duration,
    pub pool_capacity: usize,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            shard_count: 16,
            max_concurrent: 10_000,
            order_timeout: Duration::from_secs(5),
            gc_interval: Duration::from_secs(60),
            gc_retention: Duration::from_secs(3_600),
            metrics_interval: Duration::from_secs(1),
            pool_capacity: 4_096,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Cache-aligned atomic counters, one per cache line, matching the
/// reference codebase's cache-padded metrics layout so false sharing
/// between submit/cancel/GC/metrics threads cannot degrade throughput.
#[repr(C, align(64))]
pub struct ExecutionMetrics {
    pub submitted: AtomicU64,
    _pad1: [u8; 56],
    pub processed: AtomicU64,
    _pad2: [u8; 56],
    pub rejected: AtomicU64,
    _pad3: [u8; 56],
    pub validation_failures: AtomicU64,
    _pad4: [u8; 56],
    pub engine_failures: AtomicU64,
    _pad5: [u8; 56],
    pub avg_processing_ns: AtomicU64,
    _pad6: [u8; 56],
    pub p99_processing_ns: AtomicU64,
    _pad7: [u8; 56],
    pub throughput_per_sec: AtomicU64,
    _pad8: [u8; 56],
    pub active_count: AtomicUsize,
    _pad9: [u8; 56],
    pub last_updated_unix: AtomicI64,
}

impl ExecutionMetrics {
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            _pad1: [0; 56],
            processed: AtomicU64::new(0),
            _pad2: [0; 56],
            rejected: AtomicU64::new(0),
            _pad3: [0; 56],
            validation_failures: AtomicU64::new(0),
            _pad4: [0; 56],
            engine_failures: AtomicU64::new(0),
            _pad5: [0; 56],
            avg_processing_ns: AtomicU64::new(0),
            _pad6: [0; 56],
            p99_processing_ns: AtomicU64::new(0),
            _pad7: [0; 56],
            throughput_per_sec: AtomicU64::new(0),
            _pad8: [0; 56],
            active_count: AtomicUsize::new(0),
            _pad9: [0; 56],
            last_updated_unix: AtomicI64::new(0),
        }
    }

    /// Integer EMA with a fixed 9:1 weighting: exactly `avg = (9*avg + new)
    /// / 10`, with no scaling indirection.
    fn record_processing_time(&self, elapsed_ns: u64) {
        let prev = self.avg_processing_ns.load(Ordering::Relaxed);
        let next = if prev == 0 {
            elapsed_ns
        } else {
            (prev * 9 + elapsed_ns) / 10
        };
        self.avg_processing_ns.store(next, Ordering::Relaxed);

        self.p99_processing_ns.fetch_max(elapsed_ns, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        ExecutionMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            engine_failures: self.engine_failures.load(Ordering::Relaxed),
            avg_processing_ns: self.avg_processing_ns.load(Ordering::Relaxed),
            p99_processing_ns: self.p99_processing_ns.load(Ordering::Relaxed),
            throughput_per_sec: self.throughput_per_sec.load(Ordering::Relaxed),
            active_count: self.active_count.load(Ordering::Relaxed),
            last_updated_unix: self.last_updated_unix.load(Ordering::Relaxed),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionMetricsSnapshot {
    pub submitted: u64,
    pub processed: u64,
    pub rejected: u64,
    pub validation_failures: u64,
    pub engine_failures: u64,
    pub avg_processing_ns: u64,
    pub p99_processing_ns: u64,
    pub throughput_per_sec: u64,
    pub active_count: usize,
    pub last_updated_unix: i64,
}

struct Shard {
    orders: RwLock<std::collections::HashMap<OrderId, OrderSlot>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            orders: RwLock::new(std::collections::HashMap::new()),
        }
    }
}

pub struct ExecutionService {
    config: ExecutionConfig,
    shards: Vec<Shard>,
    engine: Arc<dyn ExecutionEngine>,
    validator: Option<Arc<dyn OrderValidator>>,
    circuit_breaker: CircuitBreaker,
    pub metrics: ExecutionMetrics,
    running: AtomicBool,
    order_pool: ObjectPool<OrderSlot>,
    gc_thread: Mutex<Option<JoinHandle<()>>>,
    metrics_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionService {
    pub fn new(config: ExecutionConfig, engine: Arc<dyn ExecutionEngine>, validator: Option<Arc<dyn OrderValidator>>) -> Arc<Self> {
        let shard_count = config.shard_count.max(1);
        let shards = (0..shard_count).map(|_| Shard::new()).collect();
        let pool_capacity = config.pool_capacity;
        let circuit_breaker = CircuitBreaker::new(config.circuit_breaker.clone());

        Arc::new(Self {
            config,
            shards,
            engine,
            validator,
            circuit_breaker,
            metrics: ExecutionMetrics::new(),
            running: AtomicBool::new(false),
            order_pool: ObjectPool::new(pool_capacity),
            gc_thread: Mutex::new(None),
            metrics_thread: Mutex::new(None),
        })
    }

    fn shard_for(&self, id: OrderId) -> &Shard {
        let idx = (shard_hash(id) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Start the service: engine boot, background GC loop, background
    /// metrics loop. Idempotent under concurrent callers via a
    /// CAS on the running flag.
    pub fn start(self: &Arc<Self>) -> CoreResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        self.engine.start()?;

        let gc_self = Arc::clone(self);
        let gc_interval = self.config.gc_interval;
        *self.gc_thread.lock().unwrap() = Some(thread::spawn(move || {
            while gc_self.running.load(Ordering::SeqCst) {
                thread::sleep(gc_interval);
                if !gc_self.running.load(Ordering::SeqCst) {
                    break;
                }
                gc_self.sweep(now_unix_nanos());
            }
        }));

        let metrics_self = Arc::clone(self);
        let metrics_interval = self.config.metrics_interval;
        *self.metrics_thread.lock().unwrap() = Some(thread::spawn(move || {
            let mut last_processed = 0u64;
            while metrics_self.running.load(Ordering::SeqCst) {
                thread::sleep(metrics_interval);
                if !metrics_self.running.load(Ordering::SeqCst) {
                    break;
                }
                let processed = metrics_self.metrics.processed.load(Ordering::Relaxed);
                let delta = processed.saturating_sub(last_processed);
                let secs = metrics_interval.as_secs_f64().max(0.001);
                metrics_self
                    .metrics
                    .throughput_per_sec
                    .store((delta as f64 / secs) as u64, Ordering::Relaxed);
                metrics_self.metrics.last_updated_unix.store(now_unix_nanos() / 1_000_000_000, Ordering::Relaxed);
                last_processed = processed;
            }
        }));

        Ok(())
    }

    /// Submit an order. Runs the full admit → validate → shard
    /// insert → engine submit pipeline, undoing each step on the
    /// corresponding failure path.
    pub fn submit(&self, order: Order) -> CoreResult<ExecutionResult> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CoreError::invalid_state("execution service is not running"));
        }

        let active = self.metrics.active_count.load(Ordering::SeqCst);
        if active >= self.config.max_concurrent {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(CoreError::CapacityExceeded {
                active,
                max: self.config.max_concurrent,
            });
        }

        let mut slot = self.order_pool.acquire().unwrap_or_default();
        slot.order = Some(order);

        if let Some(validator) = &self.validator {
            let order_ref = slot.order.as_ref().unwrap();
            if let Err(err) = validator.validate_order(order_ref) {
                slot.order = None;
                self.order_pool.release(slot);
                self.metrics.validation_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        }

        let id = slot.order.as_ref().unwrap().id;
        let shard = self.shard_for(id);
        shard.orders.write().insert(id, slot);
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        self.metrics.active_count.fetch_add(1, Ordering::SeqCst);

        let start = now_unix_nanos();
        let order_snapshot = shard.orders.read().get(&id).and_then(|s| s.order.clone());
        let order_snapshot = match order_snapshot {
            Some(o) => o,
            None => return Err(CoreError::engine_failure("order vanished from shard before engine submit")),
        };

        let engine = Arc::clone(&self.engine);
        let retry_config = self.config.retry;
        let submit_result = self
            .circuit_breaker
            .call(|| retry_engine_call(retry_config, || engine.submit(&order_snapshot)));

        match submit_result {
            Ok(result) => {
                let elapsed = (now_unix_nanos() - start).max(0) as u64;
                self.metrics.record_processing_time(elapsed);
                Ok(result)
            }
            Err(err) => {
                let mut removed = shard.orders.write();
                if let Some(mut s) = removed.remove(&id) {
                    s.order = None;
                    self.order_pool.release(s);
                }
                drop(removed);
                self.metrics.active_count.fetch_sub(1, Ordering::SeqCst);
                self.metrics.engine_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    pub fn get_status(&self, id: OrderId) -> CoreResult<Order> {
        let shard = self.shard_for(id);
        shard
            .orders
            .read()
            .get(&id)
            .and_then(|s| s.order.clone())
            .ok_or_else(|| CoreError::not_found(format!("order {} not in execution service", id)))
    }

    /// Mark an order cancelled and forward the cancellation to the engine.
    /// The shard lock is held only for the in-place mutation, never across
    /// the engine call.
    pub fn cancel(&self, id: OrderId, now: i64) -> CoreResult<()> {
        let shard = self.shard_for(id);
        {
            let mut guard = shard.orders.write();
            let slot = guard
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(format!("order {} not in execution service", id)))?;
            let order = slot.order.as_mut().unwrap();
            order.status = OrderStatus::Cancelled;
            order.cancelled_at = Some(now);
            order.updated_at = now;
        }
        self.engine.cancel(id)
    }

    /// Remove a terminal order from its shard and return its slot to the
    /// pool.
    pub fn complete(&self, id: OrderId) -> CoreResult<Order> {
        let shard = self.shard_for(id);
        let mut guard = shard.orders.write();
        let mut slot = guard
            .remove(&id)
            .ok_or_else(|| CoreError::not_found(format!("order {} not in execution service", id)))?;
        drop(guard);

        let order = slot.order.take().ok_or_else(|| CoreError::engine_failure("slot had no order"))?;
        self.order_pool.release(slot);
        self.metrics.active_count.fetch_sub(1, Ordering::SeqCst);
        Ok(order)
    }

    /// Sweep every shard for terminal orders whose `updated_at` predates
    /// `now - gc_retention`, returning their slots to the pool.
    pub fn sweep(&self, now_nanos: i64) -> usize {
        let cutoff = now_nanos.saturating_sub(self.config.gc_retention.as_nanos() as i64);
        let mut total = 0;
        for shard in &self.shards {
            let mut guard = shard.orders.write();
            let stale: Vec<OrderId> = guard
                .iter()
                .filter(|(_, slot)| match &slot.order {
                    Some(o) => o.status.is_terminal() && o.updated_at < cutoff,
                    None => false,
                })
                .map(|(id, _)| *id)
                .collect();
            for id in stale {
                if let Some(mut slot) = guard.remove(&id) {
                    slot.order = None;
                    self.order_pool.release(slot);
                    self.metrics.active_count.fetch_sub(1, Ordering::SeqCst);
                    total += 1;
                }
            }
        }
        total
    }

    pub fn metrics_snapshot(&self) -> ExecutionMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// CAS running→stopped, signal the background threads, join them, stop
    /// the engine.
    pub fn stop(&self) -> CoreResult<()> {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        if let Some(handle) = self.gc_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.metrics_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.engine.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, AssetType};
    use crate::decimal::Decimal;
    use crate::order::{OrderType, Side};
    use crate::testing::FakeExecutionEngine;
    use std::sync::atomic::Ordering as O;

    fn asset() -> Asset {
        Asset::builder("AAPL", AssetType::Stock).build().unwrap()
    }

    fn new_order() -> Order {
        Order::builder(asset(), Side::Buy, OrderType::Market, Decimal::from_i64(10))
            .build()
            .unwrap()
    }

    #[test]
    fn submit_then_get_status_then_complete() {
        let engine = Arc::new(FakeExecutionEngine::new());
        let service = ExecutionService::new(ExecutionConfig::default(), engine, None);
        service.start().unwrap();

        let order = new_order();
        let id = order.id;
        service.submit(order).unwrap();

        let fetched = service.get_status(id).unwrap();
        assert_eq!(fetched.id, id);

        let completed = service.complete(id).unwrap();
        assert_eq!(completed.id, id);
        assert!(service.get_status(id).is_err());

        service.stop().unwrap();
    }

    #[test]
    fn capacity_cap_rejects_beyond_max_concurrent() {
        let engine = Arc::new(FakeExecutionEngine::new());
        let config = ExecutionConfig {
            max_concurrent: 2,
            ..ExecutionConfig::default()
        };
        let service = ExecutionService::new(config, engine, None);
        service.start().unwrap();

        service.submit(new_order()).unwrap();
        service.submit(new_order()).unwrap();
        let result = service.submit(new_order());
        assert!(matches!(result, Err(CoreError::CapacityExceeded { .. })));

        service.stop().unwrap();
    }

    #[test]
    fn engine_rejection_undoes_shard_insert_and_frees_capacity() {
        let engine = Arc::new(FakeExecutionEngine::new());
        engine.set_should_fail(true);
        let service = ExecutionService::new(ExecutionConfig::default(), engine, None);
        service.start().unwrap();

        let order = new_order();
        let id = order.id;
        let result = service.submit(order);
        assert!(result.is_err());
        assert!(service.get_status(id).is_err());
        assert_eq!(service.metrics.active_count.load(O::SeqCst), 0);
        assert_eq!(service.metrics.engine_failures.load(O::SeqCst), 1);

        service.stop().unwrap();
    }

    #[test]
    fn cancel_marks_status_and_forwards_to_engine() {
        let engine = Arc::new(FakeExecutionEngine::new());
        let service = ExecutionService::new(ExecutionConfig::default(), engine.clone(), None);
        service.start().unwrap();

        let order = new_order();
        let id = order.id;
        service.submit(order).unwrap();
        service.cancel(id, 42).unwrap();

        let fetched = service.get_status(id).unwrap();
        assert_eq!(fetched.status, OrderStatus::Cancelled);
        assert!(engine.was_cancelled(id));

        service.stop().unwrap();
    }

    #[test]
    fn sweep_reclaims_stale_terminal_orders() {
        let engine = Arc::new(FakeExecutionEngine::new());
        let service = ExecutionService::new(ExecutionConfig::default(), engine, None);
        service.start().unwrap();

        let order = new_order();
        let id = order.id;
        service.submit(order).unwrap();
        service.cancel(id, 1_000).unwrap();

        let far_future = 1_000 + Duration::from_secs(7_200).as_nanos() as i64;
        assert_eq!(service.sweep(far_future), 1);
        assert!(service.get_status(id).is_err());

        service.stop().unwrap();
    }

    #[test]
    fn circuit_opens_after_repeated_engine_failures() {
        let engine = Arc::new(FakeExecutionEngine::new());
        engine.set_should_fail(true);
        let config = ExecutionConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                failure_window: Duration::from_secs(60),
                timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
            retry: RetryConfig {
                max_attempts: 1,
                backoff: Duration::from_millis(0),
            },
            ..ExecutionConfig::default()
        };
        let service = ExecutionService::new(config, engine, None);
        service.start().unwrap();

        for _ in 0..3 {
            let _ = service.submit(new_order());
        }
        let result = service.submit(new_order());
        assert!(matches!(result, Err(CoreError::CircuitOpen { .. })));

        service.stop().unwrap();
    }
}
