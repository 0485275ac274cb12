//! Fixed-window rate limiting
//!
//! One counter per sanitized identity, incremented atomically against the
//! shared store; the first increment in a window arms the window's expiry.
//! When the store is unreachable the limiter fails OPEN: availability wins
//! over strict quota enforcement under infrastructure failure, and the
//! degradation is logged.

use crate::counter::{CounterStore, StoreError};
use codemend_core::{now_ms, RateLimitSettings, RateLimitStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "codemend:ratelimit";

/// Rate-limit rejection
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded, resets at epoch ms {}", .status.reset_at_epoch_ms)]
    Exceeded { status: RateLimitStatus },
}

/// Fixed-window limiter over an injected counter store
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, settings: &RateLimitSettings) -> Self {
        Self {
            store,
            limit: settings.limit,
            window: Duration::from_secs(settings.window_seconds),
        }
    }

    /// Count this request against the identity's window.
    ///
    /// Never fails: store errors degrade to a fail-open allow.
    pub async fn check(&self, identity: &str) -> RateLimitStatus {
        let key = self.key(identity);
        match self.count_request(&key).await {
            Ok(status) => status,
            Err(err) => {
                warn!("Counter store degraded, failing open: {err}");
                self.open_status()
            }
        }
    }

    /// Like [`check`](Self::check) but rejects when the quota is exhausted.
    pub async fn check_or_reject(&self, identity: &str) -> Result<RateLimitStatus, RateLimitError> {
        let status = self.check(identity).await;
        if status.allowed {
            Ok(status)
        } else {
            Err(RateLimitError::Exceeded { status })
        }
    }

    /// Read the identity's current standing without consuming quota.
    pub async fn status(&self, identity: &str) -> RateLimitStatus {
        let key = self.key(identity);
        let peek = async {
            let count = self.store.get(&key).await?.unwrap_or(0);
            let ttl = self.store.ttl(&key).await?;
            Ok::<_, StoreError>(self.status_for(count, ttl))
        };
        match peek.await {
            Ok(status) => status,
            Err(err) => {
                warn!("Counter store degraded, failing open: {err}");
                self.open_status()
            }
        }
    }

    async fn count_request(&self, key: &str) -> Result<RateLimitStatus, StoreError> {
        let count = self.store.increment(key).await?;
        if count == 1 {
            self.store.set_expiry(key, self.window).await?;
        }
        let ttl = self.store.ttl(key).await?;
        let status = self.status_for(count, ttl);
        debug!(
            "Rate limit {key}: count={count} remaining={} allowed={}",
            status.remaining, status.allowed
        );
        Ok(status)
    }

    fn status_for(&self, count: u64, ttl: Option<u64>) -> RateLimitStatus {
        // Missing TTL means the expiry raced away between increment and
        // read; report a full window from now, the conservative value for a
        // just-started window.
        let ttl_seconds = ttl.unwrap_or(self.window.as_secs());
        RateLimitStatus {
            allowed: count <= u64::from(self.limit),
            limit: self.limit,
            remaining: u32::try_from(u64::from(self.limit).saturating_sub(count)).unwrap_or(0),
            reset_at_epoch_ms: now_ms() + (ttl_seconds as i64) * 1_000,
        }
    }

    fn open_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            allowed: true,
            limit: self.limit,
            remaining: self.limit,
            reset_at_epoch_ms: now_ms() + (self.window.as_secs() as i64) * 1_000,
        }
    }

    fn key(&self, identity: &str) -> String {
        format!("{KEY_PREFIX}:{}", sanitize_identity(identity))
    }
}

/// Strip everything but alphanumerics so an identity can never smuggle key
/// separators or commands into the store.
fn sanitize_identity(identity: &str) -> String {
    let cleaned: String = identity.chars().filter(|c| c.is_alphanumeric()).collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MemoryCounterStore;
    use async_trait::async_trait;

    /// Store that always fails, for the fail-open path.
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn increment(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn ttl(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn limiter_with(store: Arc<dyn CounterStore>, limit: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(
            store,
            &RateLimitSettings {
                limit,
                window_seconds,
            },
        )
    }

    #[tokio::test]
    async fn test_exactly_limit_requests_allowed() {
        let limiter = limiter_with(Arc::new(MemoryCounterStore::new()), 3, 3_600);

        for expected_remaining in [2u32, 1, 0] {
            let status = limiter.check("10.0.0.1").await;
            assert!(status.allowed);
            assert_eq!(status.remaining, expected_remaining);
            assert_eq!(status.limit, 3);
        }

        // Request limit+1 within the same window is rejected
        let status = limiter.check("10.0.0.1").await;
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
    }

    #[tokio::test]
    async fn test_check_or_reject_raises_on_exhaustion() {
        let limiter = limiter_with(Arc::new(MemoryCounterStore::new()), 1, 3_600);
        assert!(limiter.check_or_reject("caller").await.is_ok());

        let before = now_ms();
        match limiter.check_or_reject("caller").await {
            Err(RateLimitError::Exceeded { status }) => {
                assert!(!status.allowed);
                // Reset lands one window after the window started
                assert!(status.reset_at_epoch_ms <= before + 3_600_000 + 1_000);
                assert!(status.reset_at_epoch_ms > before);
            }
            Ok(_) => panic!("second request should be rejected"),
        }
    }

    #[tokio::test]
    async fn test_identities_are_counted_separately() {
        let limiter = limiter_with(Arc::new(MemoryCounterStore::new()), 1, 3_600);
        assert!(limiter.check("1.2.3.4").await.allowed);
        assert!(limiter.check("5.6.7.8").await.allowed);
        assert!(!limiter.check("1.2.3.4").await.allowed);
    }

    #[tokio::test]
    async fn test_fail_open_when_store_unreachable() {
        let limiter = limiter_with(Arc::new(BrokenStore), 3, 3_600);
        // Far past any quota — every check still reports full remaining
        for _ in 0..10 {
            let status = limiter.check("caller").await;
            assert!(status.allowed);
            assert_eq!(status.remaining, 3);
        }
        assert!(limiter.check_or_reject("caller").await.is_ok());
    }

    #[tokio::test]
    async fn test_status_does_not_consume_quota() {
        let limiter = limiter_with(Arc::new(MemoryCounterStore::new()), 2, 3_600);
        for _ in 0..5 {
            let status = limiter.status("caller").await;
            assert!(status.allowed);
            assert_eq!(status.remaining, 2);
        }
        let status = limiter.check("caller").await;
        assert_eq!(status.remaining, 1);
    }

    #[tokio::test]
    async fn test_window_reset_allows_again() {
        let limiter = limiter_with(Arc::new(MemoryCounterStore::new()), 1, 1);
        assert!(limiter.check("caller").await.allowed);
        assert!(!limiter.check("caller").await.allowed);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let status = limiter.check("caller").await;
        assert!(status.allowed, "fresh window should admit the request");
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn test_sanitize_identity_strips_injection() {
        assert_eq!(sanitize_identity("10.0.0.1"), "10001");
        assert_eq!(sanitize_identity("abc\r\nFLUSHALL"), "abcFLUSHALL");
        assert_eq!(sanitize_identity("::1"), "1");
        assert_eq!(sanitize_identity("!!!"), "anonymous");
    }
}
