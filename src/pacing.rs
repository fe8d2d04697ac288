//! Spacing between extraction-service calls.
//!
//! Pacing is an injected policy, not a sleep sprinkled through the
//! orchestrator: tests swap in [`NoPacing`], the CLI picks a fixed cooldown
//! or a per-minute quota from its flags.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Waits until the next extraction-service call may go out.
#[async_trait]
pub trait CallPacer: Send + Sync {
    async fn acquire(&self);
}

/// Never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPacing;

#[async_trait]
impl CallPacer for NoPacing {
    async fn acquire(&self) {}
}

/// Enforces a minimum gap between consecutive calls.
///
/// The first call goes out immediately; each later call waits until
/// `cooldown` has passed since the previous one was released.
#[derive(Debug)]
pub struct FixedDelayPacer {
    cooldown: Duration,
    last: Mutex<Option<Instant>>,
}

impl FixedDelayPacer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl CallPacer for FixedDelayPacer {
    async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.cooldown;
            if Instant::now() < ready_at {
                debug!("Cooling down {:?} before next service call", ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Token bucket allowing `per_minute` calls per minute, bursting up to the quota.
pub struct TokenBucketPacer {
    per_minute: NonZeroU32,
    limiter: DirectLimiter,
}

impl TokenBucketPacer {
    pub fn per_minute(per_minute: NonZeroU32) -> Self {
        Self {
            per_minute,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }
}

impl std::fmt::Debug for TokenBucketPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketPacer")
            .field("per_minute", &self.per_minute)
            .finish()
    }
}

#[async_trait]
impl CallPacer for TokenBucketPacer {
    async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
