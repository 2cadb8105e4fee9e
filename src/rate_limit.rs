use axum::{extract::Request, middleware::Next, response::Response};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::error::Error;

const DEFAULT_GENERATIONS_PER_HOUR: NonZeroU32 = match NonZeroU32::new(100) {
    Some(n) => n,
    None => panic!("quota must be positive"),
};

// Global generation throttle. Burst equals the hourly quota, so a fresh
// process admits the whole quota at once and then refills continuously.
#[derive(Clone, Debug)]
pub struct RateLimitState {
    pub global_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    pub global_rate_limit_hits: Arc<AtomicU64>,
    pub total_requests: Arc<AtomicU64>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new(DEFAULT_GENERATIONS_PER_HOUR)
    }
}

impl RateLimitState {
    pub fn new(per_hour: NonZeroU32) -> Self {
        let quota = Quota::per_hour(per_hour).allow_burst(per_hour);
        Self {
            global_limiter: Arc::new(RateLimiter::direct(quota)),
            global_rate_limit_hits: Arc::new(AtomicU64::new(0)),
            total_requests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Zero is raised to one.
    pub fn per_hour(per_hour: u32) -> Self {
        Self::new(NonZeroU32::new(per_hour).unwrap_or(NonZeroU32::MIN))
    }
}

// Applied as a route layer, so every request reaching it is a generation.
pub async fn rate_limit_middleware(
    state: axum::extract::State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    state.total_requests.fetch_add(1, Ordering::Relaxed);

    if state.global_limiter.check().is_err() {
        state.global_rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            hits = state.global_rate_limit_hits.load(Ordering::Relaxed),
            "Global rate limit exceeded for image generation"
        );
        return Err(Error::RateLimited);
    }

    Ok(next.run(request).await)
}
