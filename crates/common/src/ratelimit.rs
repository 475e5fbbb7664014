//! Per-app write rate limiting
//!
//! Fixed one-second windows keyed by app. Each app owns one `AtomicU64`
//! holding `(window_second << 32) | count`; admission is a compare-and-swap
//! loop on that word, so concurrent callers can never admit more than the
//! app's limit within a window. Counters live in process memory and start
//! over after a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{AppError, Result};

const COUNT_MASK: u64 = 0xFFFF_FFFF;

fn pack(window: u32, count: u32) -> u64 {
    ((window as u64) << 32) | count as u64
}

fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, (word & COUNT_MASK) as u32)
}

/// Per-app limiter for the collector routes
#[derive(Debug, Default)]
pub struct WriteKeyLimiter {
    windows: RwLock<HashMap<Uuid, Arc<AtomicU64>>>,
}

impl WriteKeyLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one request for `app_id` in the window of `unix_secs`
    pub async fn check_at(&self, app_id: Uuid, limit: u32, unix_secs: u64) -> Result<()> {
        let slot = self.slot(app_id).await;
        let window = unix_secs as u32;

        let mut current = slot.load(Ordering::Acquire);
        loop {
            let (seen_window, count) = unpack(current);
            let count = if seen_window == window { count } else { 0 };

            if count >= limit {
                metrics::counter!(
                    format!("{}_rate_limit_denials_total", crate::metrics::METRICS_PREFIX)
                )
                .increment(1);
                return Err(AppError::RateLimited { limit });
            }

            match slot.compare_exchange_weak(
                current,
                pack(window, count + 1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Number of apps with a live counter
    pub async fn tracked_apps(&self) -> usize {
        self.windows.read().await.len()
    }

    async fn slot(&self, app_id: Uuid) -> Arc<AtomicU64> {
        {
            let read_guard = self.windows.read().await;
            if let Some(slot) = read_guard.get(&app_id) {
                return slot.clone();
            }
        }

        let mut write_guard = self.windows.write().await;
        // Double-check after acquiring write lock
        write_guard
            .entry(app_id)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_admits_exactly_limit_per_window() {
        let limiter = WriteKeyLimiter::new();
        let app = Uuid::new_v4();

        for _ in 0..3 {
            assert_ok!(limiter.check_at(app, 3, 1_000).await);
        }
        let err = limiter.check_at(app, 3, 1_000).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
        assert!(matches!(err, AppError::RateLimited { limit: 3 }));

        // Next second starts a fresh window
        assert_ok!(limiter.check_at(app, 3, 1_001).await);
    }

    #[tokio::test]
    async fn test_apps_are_isolated() {
        let limiter = WriteKeyLimiter::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert_ok!(limiter.check_at(a, 1, 50).await);
        assert_err!(limiter.check_at(a, 1, 50).await);
        assert_ok!(limiter.check_at(b, 1, 50).await);
        assert_eq!(limiter.tracked_apps().await, 2);
    }

    #[tokio::test]
    async fn test_zero_limit_denies_everything() {
        let limiter = WriteKeyLimiter::new();
        assert_err!(limiter.check_at(Uuid::new_v4(), 0, 7).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(WriteKeyLimiter::new());
        let app = Uuid::new_v4();
        let limit = 25;

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check_at(app, limit, 42).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, limit);
    }
}
