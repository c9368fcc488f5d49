//! # Overflow Policies & Adaptive Backpressure
//!
//! A bounded queue guarded by one mutex, with a pluggable policy applied
//! when the queue is full, plus the adaptive controller that tunes batch
//! size and flush interval from observed load.
//!
//! The queue tracks in-flight items (popped but not yet committed by the
//! worker) under the same lock, so `wait_idle` gives a true "everything
//! handed to the sink" barrier for flush.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Policy applied when a bounded queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Pop the front record, enqueue the new one.
    DropOldest,
    /// Reject the new record.
    DropNewest,
    /// Wait up to the timeout for space, then drop.
    Block { timeout: Duration },
    /// Extend capacity in increments of `growth_factor x current`, up to
    /// `max_total_size`, then behave like `DropNewest`.
    Grow {
        growth_factor: usize,
        max_total_size: usize,
    },
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropOldest
    }
}

/// Counters exposed by [`OverflowQueue`].
#[derive(Debug, Default)]
pub struct OverflowStats {
    pub total: AtomicU64,
    pub dropped: AtomicU64,
    pub blocked: AtomicU64,
    pub grown: AtomicU64,
    pub max_size_reached: AtomicUsize,
}

impl OverflowStats {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        self.grown.store(0, Ordering::Relaxed);
        self.max_size_reached.store(0, Ordering::Relaxed);
    }
}

struct QueueInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    in_flight: usize,
    stopped: bool,
}

/// Bounded MPSC-style queue with overflow-policy semantics.
pub struct OverflowQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    idle: Condvar,
    policy: OverflowPolicy,
    stats: OverflowStats,
}

impl<T> OverflowQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        OverflowQueue {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(4096)),
                capacity: capacity.max(1),
                in_flight: 0,
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            idle: Condvar::new(),
            policy,
            stats: OverflowStats::default(),
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn stats(&self) -> &OverflowStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Fraction of capacity currently occupied, for backpressure sampling.
    pub fn usage(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.capacity == 0 {
            return 0.0;
        }
        inner.items.len() as f64 / inner.capacity as f64
    }

    /// Enqueue an item, applying the overflow policy when full.
    /// Returns false when the item was dropped (or the queue is stopped).
    pub fn push(&self, item: T) -> bool {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        if inner.stopped {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if inner.items.len() >= inner.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    inner.items.pop_front();
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
                OverflowPolicy::DropNewest => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                OverflowPolicy::Block { timeout } => {
                    self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                    let deadline = Instant::now() + timeout;
                    while inner.items.len() >= inner.capacity && !inner.stopped {
                        if self
                            .not_full
                            .wait_until(&mut inner, deadline)
                            .timed_out()
                        {
                            break;
                        }
                    }
                    if inner.stopped || inner.items.len() >= inner.capacity {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        return false;
                    }
                }
                OverflowPolicy::Grow {
                    growth_factor,
                    max_total_size,
                } => {
                    if inner.capacity < max_total_size {
                        let increment = (inner.capacity * growth_factor.max(1)).max(1);
                        inner.capacity = (inner.capacity + increment).min(max_total_size);
                        self.stats.grown.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        return false;
                    }
                }
            }
        }

        inner.items.push_back(item);
        let len = inner.items.len();
        self.stats.max_size_reached.fetch_max(len, Ordering::Relaxed);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Wait for at least one item (or the timeout), then drain up to `max`
    /// items into `out`. Drained items count as in-flight until the caller
    /// acknowledges them with [`OverflowQueue::complete`].
    ///
    /// Returns the number of items drained; 0 on timeout or when the queue
    /// is stopped and empty.
    pub fn pop_batch(&self, out: &mut Vec<T>, max: usize, timeout: Duration) -> usize {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() {
            if inner.stopped {
                return 0;
            }
            let deadline = Instant::now() + timeout;
            while inner.items.is_empty() && !inner.stopped {
                if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                    break;
                }
            }
        }

        let take = inner.items.len().min(max.max(1));
        for _ in 0..take {
            if let Some(item) = inner.items.pop_front() {
                out.push(item);
            }
        }
        inner.in_flight += take;
        drop(inner);
        if take > 0 {
            self.not_full.notify_all();
        }
        take
    }

    /// Acknowledge `count` in-flight items as committed downstream.
    pub fn complete(&self, count: usize) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(count);
        let idle = inner.items.is_empty() && inner.in_flight == 0;
        drop(inner);
        if idle {
            self.idle.notify_all();
        }
    }

    /// Block until the queue is empty and no items are in flight.
    /// Does not prevent subsequent enqueues.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !(inner.items.is_empty() && inner.in_flight == 0) {
            if self.idle.wait_until(&mut inner, deadline).timed_out() {
                return inner.items.is_empty() && inner.in_flight == 0;
            }
        }
        true
    }

    /// Stop the queue: further pushes are rejected, waiters wake up.
    /// Remaining items stay poppable for the shutdown drain.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.idle.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Remove and count everything still queued. Shutdown-deadline path.
    pub fn discard_remaining(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.items.len();
        inner.items.clear();
        self.stats
            .dropped
            .fetch_add(count as u64, Ordering::Relaxed);
        drop(inner);
        self.idle.notify_all();
        count
    }
}

/// Tunables for [`AdaptiveBackpressure`].
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub initial_batch_size: usize,
    pub min_flush_interval: Duration,
    pub max_flush_interval: Duration,
    pub initial_flush_interval: Duration,
    /// Below this load, pressure is relaxed.
    pub load_threshold_low: f64,
    /// Above this load, pressure is increased.
    pub load_threshold_high: f64,
    /// Fraction of the current value moved per adjustment (0.0 - 1.0).
    pub adaptation_rate: f64,
    /// Minimum spacing between adjustments.
    pub min_adjust_interval: Duration,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        BackpressureConfig {
            min_batch_size: 10,
            max_batch_size: 1000,
            initial_batch_size: 100,
            min_flush_interval: Duration::from_millis(10),
            max_flush_interval: Duration::from_millis(1000),
            initial_flush_interval: Duration::from_millis(100),
            load_threshold_low: 0.3,
            load_threshold_high: 0.7,
            adaptation_rate: 0.1,
            min_adjust_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
struct BackpressureState {
    batch_size: usize,
    flush_interval: Duration,
    load: f64,
    last_adjust: Option<Instant>,
    adaptation_count: u64,
    increase_count: u64,
    decrease_count: u64,
    enabled: bool,
}

/// Snapshot of the controller for diagnostics.
#[derive(Debug, Clone)]
pub struct BackpressureSnapshot {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub load: f64,
    pub adaptation_count: u64,
    pub increase_count: u64,
    pub decrease_count: u64,
}

/// Adjusts batch size and flush interval from queue usage and per-batch
/// processing time. Batch size moves with load; flush interval moves
/// against it. All state sits behind a single mutex.
pub struct AdaptiveBackpressure {
    config: BackpressureConfig,
    state: Mutex<BackpressureState>,
}

impl AdaptiveBackpressure {
    pub fn new(config: BackpressureConfig) -> Self {
        let state = BackpressureState {
            batch_size: config.initial_batch_size,
            flush_interval: config.initial_flush_interval,
            load: 0.0,
            last_adjust: None,
            adaptation_count: 0,
            increase_count: 0,
            decrease_count: 0,
            enabled: true,
        };
        AdaptiveBackpressure {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.state.lock().batch_size
    }

    pub fn flush_interval(&self) -> Duration {
        self.state.lock().flush_interval
    }

    pub fn current_load(&self) -> f64 {
        self.state.lock().load
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    /// Feed an observation and, rate-limited, adapt the tunables.
    pub fn update(&self, queue_usage: f64, processing_time: Duration) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }

        // Blend queue fill with how much of the flush window the last batch
        // consumed; either can saturate the loop on its own.
        let time_load = processing_time.as_secs_f64()
            / self.config.max_flush_interval.as_secs_f64().max(f64::EPSILON);
        let observed = queue_usage.clamp(0.0, 1.0).max(time_load.clamp(0.0, 1.0));
        let rate = self.config.adaptation_rate.clamp(0.0, 1.0);
        state.load = state.load * (1.0 - rate) + observed * rate;

        let now = Instant::now();
        if let Some(last) = state.last_adjust {
            if now.duration_since(last) < self.config.min_adjust_interval {
                return;
            }
        }

        if state.load > self.config.load_threshold_high {
            let step = ((state.batch_size as f64 * rate) as usize).max(1);
            state.batch_size = (state.batch_size + step).min(self.config.max_batch_size);
            let shrink = state.flush_interval.mul_f64(1.0 - rate);
            state.flush_interval = shrink.max(self.config.min_flush_interval);
            state.increase_count += 1;
        } else if state.load < self.config.load_threshold_low {
            let step = ((state.batch_size as f64 * rate) as usize).max(1);
            state.batch_size = state.batch_size.saturating_sub(step).max(self.config.min_batch_size);
            let grow = state.flush_interval.mul_f64(1.0 + rate);
            state.flush_interval = grow.min(self.config.max_flush_interval);
            state.decrease_count += 1;
        } else {
            return;
        }
        state.adaptation_count += 1;
        state.last_adjust = Some(now);
    }

    /// Restore the initial batch size and flush interval.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.batch_size = self.config.initial_batch_size;
        state.flush_interval = self.config.initial_flush_interval;
        state.load = 0.0;
        state.last_adjust = None;
    }

    pub fn snapshot(&self) -> BackpressureSnapshot {
        let state = self.state.lock();
        BackpressureSnapshot {
            batch_size: state.batch_size,
            flush_interval: state.flush_interval,
            load: state.load,
            adaptation_count: state.adaptation_count,
            increase_count: state.increase_count,
            decrease_count: state.decrease_count,
        }
    }
}

impl Default for AdaptiveBackpressure {
    fn default() -> Self {
        AdaptiveBackpressure::new(BackpressureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let queue = OverflowQueue::new(3, OverflowPolicy::DropOldest);
        for i in 0..5 {
            assert!(queue.push(i));
        }
        let mut out = Vec::new();
        queue.pop_batch(&mut out, 10, Duration::from_millis(1));
        queue.complete(out.len());
        assert_eq!(out, vec![2, 3, 4]);
        assert_eq!(queue.stats().dropped_count(), 2);
    }

    #[test]
    fn test_drop_newest_rejects() {
        let queue = OverflowQueue::new(2, OverflowPolicy::DropNewest);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(!queue.push(3));
        let mut out = Vec::new();
        queue.pop_batch(&mut out, 10, Duration::from_millis(1));
        assert_eq!(out, vec![1, 2]);
        assert_eq!(queue.stats().dropped_count(), 1);
    }

    #[test]
    fn test_block_times_out_within_bound() {
        let timeout = Duration::from_millis(50);
        let queue = OverflowQueue::new(1, OverflowPolicy::Block { timeout });
        assert!(queue.push(1));
        let started = Instant::now();
        assert!(!queue.push(2));
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(500));
        assert_eq!(queue.stats().blocked.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_grow_extends_capacity_then_drops() {
        let queue = OverflowQueue::new(
            2,
            OverflowPolicy::Grow {
                growth_factor: 1,
                max_total_size: 4,
            },
        );
        for i in 0..4 {
            assert!(queue.push(i));
        }
        assert_eq!(queue.capacity(), 4);
        assert!(!queue.push(99));
        assert_eq!(queue.stats().grown.load(Ordering::Relaxed), 1);
        assert_eq!(queue.stats().dropped_count(), 1);
    }

    #[test]
    fn test_stop_rejects_push_but_drains() {
        let queue = OverflowQueue::new(4, OverflowPolicy::DropNewest);
        queue.push(1);
        queue.push(2);
        queue.stop();
        assert!(!queue.push(3));
        let mut out = Vec::new();
        assert_eq!(queue.pop_batch(&mut out, 10, Duration::from_millis(1)), 2);
    }

    #[test]
    fn test_wait_idle_sees_in_flight() {
        let queue = OverflowQueue::new(4, OverflowPolicy::DropNewest);
        queue.push(1);
        let mut out = Vec::new();
        queue.pop_batch(&mut out, 1, Duration::from_millis(1));
        // Popped but not completed: still not idle.
        assert!(!queue.wait_idle(Duration::from_millis(20)));
        queue.complete(1);
        assert!(queue.wait_idle(Duration::from_millis(20)));
    }

    #[test]
    fn test_backpressure_raises_batch_under_load() {
        let bp = AdaptiveBackpressure::new(BackpressureConfig {
            min_adjust_interval: Duration::ZERO,
            ..BackpressureConfig::default()
        });
        let initial_batch = bp.batch_size();
        let initial_interval = bp.flush_interval();
        for _ in 0..200 {
            bp.update(0.95, Duration::from_millis(1));
        }
        assert!(bp.batch_size() > initial_batch);
        assert!(bp.flush_interval() < initial_interval);
    }

    #[test]
    fn test_backpressure_relaxes_when_quiet() {
        let bp = AdaptiveBackpressure::new(BackpressureConfig {
            min_adjust_interval: Duration::ZERO,
            ..BackpressureConfig::default()
        });
        for _ in 0..200 {
            bp.update(0.0, Duration::ZERO);
        }
        assert_eq!(
            bp.batch_size(),
            BackpressureConfig::default().min_batch_size
        );
        assert_eq!(
            bp.flush_interval(),
            BackpressureConfig::default().max_flush_interval
        );
    }

    #[test]
    fn test_backpressure_bounds_respected() {
        let config = BackpressureConfig {
            min_adjust_interval: Duration::ZERO,
            ..BackpressureConfig::default()
        };
        let bp = AdaptiveBackpressure::new(config.clone());
        for _ in 0..10_000 {
            bp.update(1.0, Duration::from_secs(5));
        }
        assert!(bp.batch_size() <= config.max_batch_size);
        assert!(bp.flush_interval() >= config.min_flush_interval);
    }

    #[test]
    fn test_reset_restores_initial() {
        let bp = AdaptiveBackpressure::new(BackpressureConfig {
            min_adjust_interval: Duration::ZERO,
            ..BackpressureConfig::default()
        });
        for _ in 0..50 {
            bp.update(1.0, Duration::from_secs(1));
        }
        bp.reset();
        let config = BackpressureConfig::default();
        assert_eq!(bp.batch_size(), config.initial_batch_size);
        assert_eq!(bp.flush_interval(), config.initial_flush_interval);
    }
}
