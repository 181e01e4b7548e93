//! Shared credential pool and rate-limit state

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Rate-limit bookkeeping shared by every client using the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    pub consecutive_rate_limit_hits: u32,
    pub using_fallback_permanently: bool,
}

/// Outcome of reporting a rate limit to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    /// Retry immediately with this credential
    Retry { index: usize, key: String },

    /// No credential left; the pool is now in permanent fallback
    Exhausted,
}

#[derive(Debug)]
struct PoolInner {
    keys: Vec<String>,
    index: usize,
    state: RateLimitState,
}

/// Ordered API credentials with the current index and rate-limit state
///
/// Detect-and-rotate is one critical section: [`on_rate_limit`](Self::on_rate_limit)
/// takes the index the caller actually used, so two callers hitting a rate
/// limit on the same credential advance the index only once.
#[derive(Debug)]
pub struct CredentialPool {
    inner: Mutex<PoolInner>,
    threshold: u32,
}

impl CredentialPool {
    /// Creates a pool; blank keys are ignored and a zero threshold counts as one
    pub fn new(keys: Vec<String>, threshold: u32) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            inner: Mutex::new(PoolInner {
                keys,
                index: 0,
                state: RateLimitState::default(),
            }),
            threshold: threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Credential to use next, or `None` when empty or in permanent fallback
    pub fn current(&self) -> Option<(usize, String)> {
        let inner = self.lock();
        if inner.state.using_fallback_permanently {
            return None;
        }
        inner
            .keys
            .get(inner.index)
            .map(|key| (inner.index, key.clone()))
    }

    pub fn state(&self) -> RateLimitState {
        self.lock().state
    }

    pub fn is_fallback_permanent(&self) -> bool {
        self.lock().state.using_fallback_permanently
    }

    /// Records a rate limit observed while using credential `used_index`
    pub fn on_rate_limit(&self, used_index: usize) -> Rotation {
        let mut inner = self.lock();
        if inner.state.using_fallback_permanently {
            return Rotation::Exhausted;
        }

        inner.state.consecutive_rate_limit_hits += 1;
        let hits = inner.state.consecutive_rate_limit_hits;

        if hits >= self.threshold {
            tracing::warn!(
                hits,
                threshold = self.threshold,
                "Rate limit threshold reached, switching to offline fallback"
            );
            inner.state.using_fallback_permanently = true;
            return Rotation::Exhausted;
        }

        if used_index != inner.index {
            // Another caller already rotated past the credential we used
            let index = inner.index;
            return match inner.keys.get(index) {
                Some(key) => Rotation::Retry {
                    index,
                    key: key.clone(),
                },
                None => {
                    inner.state.using_fallback_permanently = true;
                    Rotation::Exhausted
                }
            };
        }

        if inner.index + 1 < inner.keys.len() {
            inner.index += 1;
            tracing::info!(
                credential = inner.index + 1,
                of = inner.keys.len(),
                "Rate limited, rotating credential"
            );
            Rotation::Retry {
                index: inner.index,
                key: inner.keys[inner.index].clone(),
            }
        } else {
            tracing::warn!("Rate limited on last credential, switching to offline fallback");
            inner.state.using_fallback_permanently = true;
            Rotation::Exhausted
        }
    }

    /// Clears the consecutive-hit counter after a live success
    pub fn record_success(&self) {
        self.lock().state.consecutive_rate_limit_hits = 0;
    }

    /// Operator reset: clears all rate-limit state and rewinds to the first credential
    pub fn reset_rate_limit_state(&self) {
        let mut inner = self.lock();
        inner.state = RateLimitState::default();
        inner.index = 0;
        tracing::info!("Rate limit state reset");
    }
}
