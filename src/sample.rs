//! # Sampling
//!
//! Volume reduction ahead of the collector. Four strategies; records at or
//! above the bypass level (error by default) are always retained.

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rand::Rng;

use crate::level::LogLevel;
use crate::record::LogRecord;

/// Fixed seeds so hash-based sampling is stable for a given trace id.
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x7065_7273_6973_7431,
    0x7361_6d70_6c65_7232,
    0x6465_7465_726d_3333,
    0x6c6f_6770_6970_6534,
);

/// Retention strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingStrategy {
    /// Keep each record independently with probability `probability`.
    Random { probability: f64 },
    /// Token bucket: keep while a token is available.
    RateLimit { per_second: f64, capacity: f64 },
    /// Probability tuned against the measured producer rate: halved above
    /// `high_water` records/sec, doubled (capped at 1.0) below `low_water`.
    Adaptive {
        initial_probability: f64,
        low_water: f64,
        high_water: f64,
    },
    /// Deterministic per trace: keep iff `hash % modulus < keep`.
    HashBased { modulus: u64, keep: u64 },
}

/// Sampler settings.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    pub strategy: SamplingStrategy,
    /// Records at or above this level skip sampling. `None` disables the
    /// bypass entirely.
    pub bypass_level: Option<LogLevel>,
}

impl SamplingConfig {
    pub fn random(probability: f64) -> Self {
        SamplingConfig {
            strategy: SamplingStrategy::Random {
                probability: probability.clamp(0.0, 1.0),
            },
            bypass_level: Some(LogLevel::Error),
        }
    }

    pub fn rate_limit(per_second: f64, capacity: f64) -> Self {
        SamplingConfig {
            strategy: SamplingStrategy::RateLimit {
                per_second,
                capacity,
            },
            bypass_level: Some(LogLevel::Error),
        }
    }

    pub fn adaptive(initial_probability: f64, low_water: f64, high_water: f64) -> Self {
        SamplingConfig {
            strategy: SamplingStrategy::Adaptive {
                initial_probability: initial_probability.clamp(0.0, 1.0),
                low_water,
                high_water,
            },
            bypass_level: Some(LogLevel::Error),
        }
    }

    pub fn hash_based(modulus: u64, keep: u64) -> Self {
        SamplingConfig {
            strategy: SamplingStrategy::HashBased {
                modulus: modulus.max(1),
                keep,
            },
            bypass_level: Some(LogLevel::Error),
        }
    }

    pub fn without_bypass(mut self) -> Self {
        self.bypass_level = None;
        self
    }
}

struct AdaptiveState {
    probability: f64,
    window_start: Instant,
    window_count: u64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

enum SamplerState {
    Stateless,
    Bucket(BucketState),
    Adaptive(AdaptiveState),
}

/// Decides record retention. Exposes sampled/dropped counters.
pub struct LogSampler {
    config: SamplingConfig,
    state: Mutex<SamplerState>,
    hasher: ahash::RandomState,
    sampled: AtomicU64,
    dropped: AtomicU64,
}

impl LogSampler {
    pub fn new(config: SamplingConfig) -> Self {
        let state = match config.strategy {
            SamplingStrategy::RateLimit { capacity, .. } => SamplerState::Bucket(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            SamplingStrategy::Adaptive {
                initial_probability,
                ..
            } => SamplerState::Adaptive(AdaptiveState {
                probability: initial_probability,
                window_start: Instant::now(),
                window_count: 0,
            }),
            _ => SamplerState::Stateless,
        };
        LogSampler {
            config,
            state: Mutex::new(state),
            hasher: ahash::RandomState::with_seeds(
                HASH_SEEDS.0,
                HASH_SEEDS.1,
                HASH_SEEDS.2,
                HASH_SEEDS.3,
            ),
            sampled: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn sampled_count(&self) -> u64 {
        self.sampled.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Clear the counters. Tuned adaptive state is left alone; see
    /// [`LogSampler::reset_adaptive`].
    pub fn reset_stats(&self) {
        self.sampled.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Restore the adaptive probability to its configured initial value.
    pub fn reset_adaptive(&self) {
        if let SamplingStrategy::Adaptive {
            initial_probability,
            ..
        } = self.config.strategy
        {
            let mut state = self.state.lock();
            if let SamplerState::Adaptive(adaptive) = &mut *state {
                adaptive.probability = initial_probability;
                adaptive.window_start = Instant::now();
                adaptive.window_count = 0;
            }
        }
    }

    /// Current adaptive probability, for diagnostics.
    pub fn current_probability(&self) -> Option<f64> {
        match &*self.state.lock() {
            SamplerState::Adaptive(adaptive) => Some(adaptive.probability),
            _ => None,
        }
    }

    /// Decide whether the record is retained.
    pub fn should_sample(&self, record: &LogRecord) -> bool {
        if let Some(bypass) = self.config.bypass_level {
            if record.level() >= bypass {
                self.sampled.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }

        let keep = match self.config.strategy {
            SamplingStrategy::Random { probability } => {
                rand::rng().random::<f64>() < probability
            }
            SamplingStrategy::RateLimit {
                per_second,
                capacity,
            } => {
                let mut state = self.state.lock();
                if let SamplerState::Bucket(bucket) = &mut *state {
                    let elapsed = bucket.last_refill.elapsed().as_secs_f64();
                    bucket.tokens = (bucket.tokens + elapsed * per_second).min(capacity);
                    bucket.last_refill = Instant::now();
                    if bucket.tokens >= 1.0 {
                        bucket.tokens -= 1.0;
                        true
                    } else {
                        false
                    }
                } else {
                    true
                }
            }
            SamplingStrategy::Adaptive {
                low_water,
                high_water,
                ..
            } => {
                let mut state = self.state.lock();
                if let SamplerState::Adaptive(adaptive) = &mut *state {
                    adaptive.window_count += 1;
                    let elapsed = adaptive.window_start.elapsed().as_secs_f64();
                    if elapsed >= 1.0 {
                        let observed = adaptive.window_count as f64 / elapsed;
                        if observed > high_water {
                            adaptive.probability = (adaptive.probability / 2.0).max(1.0 / 65536.0);
                        } else if observed < low_water {
                            adaptive.probability = (adaptive.probability * 2.0).min(1.0);
                        }
                        adaptive.window_start = Instant::now();
                        adaptive.window_count = 0;
                    }
                    let probability = adaptive.probability;
                    drop(state);
                    rand::rng().random::<f64>() < probability
                } else {
                    true
                }
            }
            SamplingStrategy::HashBased { modulus, keep } => {
                let mut hasher = self.hasher.build_hasher();
                match record.trace() {
                    Some(trace) if !trace.trace_id.is_empty() => {
                        trace.trace_id.hash(&mut hasher);
                    }
                    _ => {
                        // Fingerprint: stable per message/category pair.
                        record.category().unwrap_or("").hash(&mut hasher);
                        record.message().hash(&mut hasher);
                    }
                }
                hasher.finish() % modulus < keep
            }
        };

        if keep {
            self.sampled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        keep
    }
}
