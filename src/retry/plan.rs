use super::backoff::BackoffStrategy;
use super::builder::{FailureMatcher, MatchStyle};
use super::error::RetryError;
use super::listener::{RetryEvent, RetryListener};
use super::units::TimeUnit;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

/// Immutable retry configuration plus the executor that applies it.
///
/// Attempts run from 1 to `max_attempts`. After a failed attempt `n` that
/// the plan matches, with attempts remaining, the executor waits
/// `strategy(base_delay, n - 1)` units and tries again. Successful values
/// and non-retried failures are returned exactly as the operation produced
/// them, so exhausting the attempts looks the same as failing once.
pub struct RetryPlan<E> {
    max_attempts: u32,
    base_delay: u64,
    unit: TimeUnit,
    strategy: Arc<dyn BackoffStrategy>,
    matcher: FailureMatcher<E>,
    listeners: Vec<Arc<dyn RetryListener<E>>>,
}

impl<E> RetryPlan<E> {
    pub(crate) fn from_parts(
        max_attempts: u32,
        base_delay: u64,
        unit: TimeUnit,
        strategy: Arc<dyn BackoffStrategy>,
        matcher: FailureMatcher<E>,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            unit,
            strategy,
            matcher,
            listeners: Vec::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> u64 {
        self.base_delay
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn match_style(&self) -> &MatchStyle {
        self.matcher.style()
    }

    /// Delay, in [`RetryPlan::unit`], before the retry at zero-indexed `step`.
    pub fn delay_for(&self, step: u32) -> u64 {
        self.strategy.compute(self.base_delay, step)
    }

    /// Every delay slept when all attempts fail, in order, computed lazily.
    pub fn backoff_steps(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|step| self.delay_for(step))
    }

    /// [`RetryPlan::backoff_steps`] collected; sized by `max_attempts`.
    pub fn backoff_schedule(&self) -> Vec<u64> {
        self.backoff_steps().collect()
    }

    /// Total time slept when all attempts fail.
    pub fn total_backoff(&self) -> Duration {
        let mut total = Duration::ZERO;
        for delay in self.backoff_steps() {
            total = total.saturating_add(self.unit.to_duration(delay));
            if total == Duration::MAX {
                break;
            }
        }
        total
    }

    pub fn is_retryable(&self, err: &E) -> bool {
        self.matcher.matches(err)
    }

    pub fn add_listener(&mut self, listener: Arc<dyn RetryListener<E>>) {
        self.listeners.push(listener);
    }

    pub fn with_listener(mut self, listener: Arc<dyn RetryListener<E>>) -> Self {
        self.add_listener(listener);
        self
    }

    /// Removes a previously added listener; returns whether it was present.
    pub fn remove_listener(&mut self, listener: &Arc<dyn RetryListener<E>>) -> bool {
        let before = self.listeners.len();
        self.listeners
            .retain(|existing| !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(listener)));
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error
    /// or runs out of attempts.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_named(std::any::type_name::<F>(), operation)
            .await
    }

    /// [`RetryPlan::execute`] with an explicit operation name for logs and listeners.
    pub async fn execute_named<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            event!(Level::TRACE, operation = name, attempt, "executing attempt");
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.backoff_after(name, attempt, &err) {
                    Some(delay) => {
                        drop(err);
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// [`RetryPlan::execute`] for call sites that cannot name `E`: the final
    /// failure is converted into an [`anyhow::Error`].
    pub async fn execute_anyhow<T, F, Fut>(&self, operation: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + Into<anyhow::Error>,
    {
        self.execute(operation).await.map_err(Into::into)
    }

    /// [`RetryPlan::execute`] that stops as soon as `cancel` fires, whether
    /// an attempt is in flight or a backoff is pending.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let name = std::any::type_name::<F>();
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(name, attempt - 1));
            }

            event!(Level::TRACE, operation = name, attempt, "executing attempt");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(name, attempt)),
                outcome = operation() => outcome,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => match self.backoff_after(name, attempt, &err) {
                    Some(delay) => {
                        drop(err);
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(self.cancelled(name, attempt)),
                            _ = sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                    None => return Err(RetryError::Operation(err)),
                },
            }
        }
    }

    /// Synchronous variant that blocks the calling thread while backing off.
    pub fn execute_blocking<T, F>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: fmt::Display,
    {
        let name = std::any::type_name::<F>();
        let mut attempt = 1;
        loop {
            event!(Level::TRACE, operation = name, attempt, "executing attempt");
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) => match self.backoff_after(name, attempt, &err) {
                    Some(delay) => {
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// Decides whether failed `attempt` is retried; notifies listeners and
    /// returns the delay to sleep when it is.
    fn backoff_after(&self, name: &str, attempt: u32, err: &E) -> Option<Duration>
    where
        E: fmt::Display,
    {
        event!(Level::DEBUG, operation = name, attempt, error = %err, "operation attempt failed");

        if !self.matcher.matches(err) {
            return None;
        }
        if attempt >= self.max_attempts {
            event!(
                Level::WARN,
                operation = name,
                attempts = attempt,
                error = %err,
                "retry attempts exhausted"
            );
            return None;
        }

        let delay = self.delay_for(attempt - 1);
        let retry = RetryEvent {
            plan: self,
            delay,
            unit: self.unit,
            operation: name,
            attempt,
            error: err,
        };
        for listener in &self.listeners {
            listener.on_retry(&retry);
        }

        event!(
            Level::DEBUG,
            operation = name,
            attempt,
            delay,
            unit = %self.unit,
            "backing off before retry"
        );
        Some(self.unit.to_duration(delay))
    }

    fn cancelled(&self, name: &str, attempts: u32) -> RetryError<E> {
        event!(Level::DEBUG, operation = name, attempts, "retry cancelled");
        RetryError::Cancelled { attempts }
    }
}

impl<E> Clone for RetryPlan<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            unit: self.unit,
            strategy: Arc::clone(&self.strategy),
            matcher: self.matcher.clone(),
            listeners: self.listeners.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPlan<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPlan")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("unit", &self.unit)
            .field("match_style", self.matcher.style())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
