//! Process-wide token bucket in front of the collector routes
//!
//! Complements the per-app limiter in `gptlens_common::ratelimit`: this one
//! caps the total collector load one gateway instance accepts.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use gptlens_common::{config::RateLimitConfig, errors::AppError};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Global limiter together with its advertised limit
#[derive(Clone)]
pub struct GlobalRateLimit {
    limiter: Arc<DefaultDirectRateLimiter>,
    requests_per_second: u32,
}

impl GlobalRateLimit {
    /// Build from config; `None` when disabled or configured with zero
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let rate = NonZeroU32::new(config.requests_per_second)?;
        let burst = NonZeroU32::new(config.burst).unwrap_or(rate);

        Some(Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))),
            requests_per_second: rate.get(),
        })
    }
}

/// Rate limiting middleware
pub async fn global_rate_limit(
    State(limit): State<GlobalRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match limit.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("Global collector rate limit exceeded");
            Err(AppError::RateLimited {
                limit: limit.requests_per_second,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limit = GlobalRateLimit::from_config(&RateLimitConfig {
            requests_per_second: 100,
            burst: 2,
            enabled: true,
        })
        .unwrap();

        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_err());
    }

    #[test]
    fn test_disabled_or_zero_rate() {
        let disabled = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        assert!(GlobalRateLimit::from_config(&disabled).is_none());

        let zero = RateLimitConfig {
            requests_per_second: 0,
            ..RateLimitConfig::default()
        };
        assert!(GlobalRateLimit::from_config(&zero).is_none());
    }
}
