//! Staleness-tolerant cache around the backlog-size query.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::error::Result;

/// Caches the last successfully fetched backlog-bytes value.
///
/// The query behind it is expensive and advisory (a lag signal for
/// monitoring and auto-scaling), so results are served from cache inside
/// `refresh_interval`, and a transiently failing fetch falls back to the
/// last good value instead of propagating. Only a successful fetch moves
/// the freshness instant: after a failure the next call retries
/// immediately rather than waiting the interval out.
pub(crate) struct BacklogCache {
    last_bytes: i64,
    last_fetched_at: Option<Instant>,
    refresh_interval: Duration,
}

impl BacklogCache {
    pub(crate) fn new(refresh_interval: Duration) -> Self {
        Self {
            last_bytes: 0,
            last_fetched_at: None,
            refresh_interval,
        }
    }

    pub(crate) async fn get<F, Fut>(&mut self, now: Instant, fetch: F) -> Result<i64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64>>,
    {
        if let Some(fetched_at) = self.last_fetched_at {
            if now.duration_since(fetched_at) < self.refresh_interval {
                return Ok(self.last_bytes);
            }
        }
        match fetch().await {
            Ok(bytes) => {
                self.last_bytes = bytes;
                self.last_fetched_at = Some(now);
                Ok(bytes)
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Backlog fetch failed transiently, serving last known value");
                Ok(self.last_bytes)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn transient() -> Error {
        Error::TransientService("throttled".to_string())
    }

    #[tokio::test]
    async fn test_zero_interval_masks_transient_failures() {
        let mut cache = BacklogCache::new(Duration::ZERO);
        let now = Instant::now();

        assert_eq!(cache.get(now, || async { Ok(10) }).await.unwrap(), 10);
        assert_eq!(cache.get(now, || async { Err(transient()) }).await.unwrap(), 10);
        assert_eq!(cache.get(now, || async { Ok(20) }).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_fresh_value_served_from_cache() {
        let mut cache = BacklogCache::new(Duration::from_secs(30));
        let now = Instant::now();

        assert_eq!(cache.get(now, || async { Ok(10) }).await.unwrap(), 10);
        // the second fetch would return 20; inside the interval it must
        // not run at all
        let result = cache
            .get(now + Duration::from_secs(1), || async { Ok(20) })
            .await
            .unwrap();
        assert_eq!(result, 10);
    }

    #[tokio::test]
    async fn test_stale_value_refetched_after_interval() {
        let mut cache = BacklogCache::new(Duration::from_secs(30));
        let now = Instant::now();

        assert_eq!(cache.get(now, || async { Ok(10) }).await.unwrap(), 10);
        let result = cache
            .get(now + Duration::from_secs(30), || async { Ok(20) })
            .await
            .unwrap();
        assert_eq!(result, 20);
    }

    #[tokio::test]
    async fn test_failure_does_not_refresh_the_interval() {
        let mut cache = BacklogCache::new(Duration::from_secs(30));
        let now = Instant::now();

        assert_eq!(cache.get(now, || async { Ok(10) }).await.unwrap(), 10);

        // past the interval: the fetch fails, the stale value is served
        let later = now + Duration::from_secs(31);
        assert_eq!(
            cache.get(later, || async { Err(transient()) }).await.unwrap(),
            10
        );

        // the failed attempt did not refresh freshness, so the very next
        // call fetches again instead of waiting out the interval
        assert_eq!(cache.get(later, || async { Ok(20) }).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_non_transient_failures_propagate() {
        let mut cache = BacklogCache::new(Duration::ZERO);
        let now = Instant::now();

        let err = cache
            .get(now, || async { Err(Error::FatalShard("gone".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FatalShard(_)));
    }
}
