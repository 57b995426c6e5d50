use super::plan::RetryPlan;
use super::units::TimeUnit;

/// Details handed to listeners right before a backoff sleep.
pub struct RetryEvent<'a, E> {
    pub plan: &'a RetryPlan<E>,
    /// Delay about to be slept, in `unit`.
    pub delay: u64,
    pub unit: TimeUnit,
    /// Name of the operation being retried.
    pub operation: &'a str,
    /// Number of attempts made so far.
    pub attempt: u32,
    /// The failure that triggered the retry.
    pub error: &'a E,
}

/// Observer notified before each retry of an operation.
pub trait RetryListener<E>: Send + Sync {
    fn on_retry(&self, event: &RetryEvent<'_, E>);
}

impl<E, F> RetryListener<E> for F
where
    F: Fn(&RetryEvent<'_, E>) + Send + Sync,
{
    fn on_retry(&self, event: &RetryEvent<'_, E>) {
        self(event)
    }
}
