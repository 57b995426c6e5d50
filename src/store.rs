//! Failure categories of the external entity store and the retry plan that
//! data-access layers wrap around store calls.

use crate::config::RetrySettings;
use crate::core::Result;
use crate::retry::RetryPlan;
use thiserror::Error;

/// Failure reported by an entity store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Remote call failed: {0}")]
    RemoteCallFailed(String),

    #[error("Datastore timeout: {0}")]
    Timeout(String),

    #[error("Datastore failure: {0}")]
    Failure(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::Rejected(_))
    }
}

/// Retry plan over [`StoreError`] that retries transient failures only.
pub fn store_retry_plan(settings: &RetrySettings) -> Result<RetryPlan<StoreError>> {
    settings
        .stages()
        .matching(StoreError::is_transient)
        .build()
}

/// [`store_retry_plan`] with [`RetrySettings::default`]: 3 attempts, 250 ms
/// exponential backoff.
pub fn default_store_retry_plan() -> Result<RetryPlan<StoreError>> {
    store_retry_plan(&RetrySettings::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KeyError;
    use crate::retry::Backoff;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn permanent_failures_are_not_transient() {
        assert!(StoreError::Timeout("put".into()).is_transient());
        assert!(StoreError::ConcurrentModification("tx".into()).is_transient());
        assert!(!StoreError::NotFound("Person:1".into()).is_transient());
        assert!(!StoreError::Rejected("too large".into()).is_transient());
    }

    #[test]
    fn default_plan_uses_exponential_quarter_seconds() {
        let plan = default_store_retry_plan().unwrap();
        assert_eq!(plan.max_attempts(), 3);
        assert_eq!(plan.backoff_schedule(), vec![250, 62_500]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let plan = store_retry_plan(&RetrySettings::new().base_delay(10).backoff(Backoff::Fixed)).unwrap();
        let calls = AtomicU32::new(0);
        let value = plan
            .execute_named("put", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StoreError::CacheUnavailable("memcache".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_propagate_immediately() {
        let plan = default_store_retry_plan().unwrap();
        let calls = AtomicU32::new(0);
        let err = plan
            .execute_named("get", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::NotFound("Person:1".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("Person:1".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_attempts_are_rejected() {
        assert!(matches!(
            store_retry_plan(&RetrySettings::new().max_attempts(0)),
            Err(KeyError::ConfigurationError(_))
        ));
    }
}
