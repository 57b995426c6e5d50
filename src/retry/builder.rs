//! Staged construction of [`RetryPlan`]s.
//!
//! Each stage only exposes the next configuration step, so a plan cannot be
//! built without attempts, interval, strategy and failure matching, in that
//! order.

use super::backoff::BackoffStrategy;
use super::plan::RetryPlan;
use super::units::TimeUnit;
use crate::core::{KeyError, Result};
use std::any::TypeId;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Set of error types that make a failure retryable.
///
/// A failure matches when it, or any error in its [`Error::source`] chain,
/// is one of the registered types.
#[derive(Clone, Default)]
pub struct ErrorCategories {
    categories: Vec<ErrorCategory>,
}

#[derive(Clone, Copy)]
struct ErrorCategory {
    type_id: TypeId,
    name: &'static str,
    matches: fn(&(dyn Error + 'static)) -> bool,
}

fn is_category<C: Error + 'static>(err: &(dyn Error + 'static)) -> bool {
    err.is::<C>()
}

impl ErrorCategories {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding the single category `C`.
    pub fn of<C: Error + 'static>() -> Self {
        Self::new().with::<C>()
    }

    /// Adds `C` to the set.
    pub fn with<C: Error + 'static>(mut self) -> Self {
        let type_id = TypeId::of::<C>();
        if !self.categories.iter().any(|c| c.type_id == type_id) {
            self.categories.push(ErrorCategory {
                type_id,
                name: std::any::type_name::<C>(),
                matches: is_category::<C>,
            });
        }
        self
    }

    pub fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        let mut current = Some(err);
        while let Some(err) = current {
            if self.categories.iter().any(|category| (category.matches)(err)) {
                return true;
            }
            current = err.source();
        }
        false
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.categories.iter().map(|category| category.name).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl fmt::Debug for ErrorCategories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// How a plan decides that a failure is retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStyle {
    /// The failure's type, or a type in its source chain, is in the set.
    Categories(Vec<&'static str>),
    /// An arbitrary predicate over the failure.
    Predicate,
}

pub(crate) struct FailureMatcher<E> {
    style: MatchStyle,
    test: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> FailureMatcher<E> {
    pub(crate) fn matches(&self, err: &E) -> bool {
        (self.test)(err)
    }

    pub(crate) fn style(&self) -> &MatchStyle {
        &self.style
    }
}

impl<E> Clone for FailureMatcher<E> {
    fn clone(&self) -> Self {
        Self {
            style: self.style.clone(),
            test: Arc::clone(&self.test),
        }
    }
}

/// Entry point of the staged builder.
pub struct RetryBuilder;

impl RetryBuilder {
    /// Starts a plan that invokes an operation at most `max_attempts` times.
    pub fn retry_times(max_attempts: u32) -> RetryIntervalStage {
        RetryIntervalStage { max_attempts }
    }
}

/// First stage: choose the base interval.
#[derive(Debug, Clone)]
pub struct RetryIntervalStage {
    max_attempts: u32,
}

impl RetryIntervalStage {
    /// Base delay between attempts, before the backoff strategy is applied.
    pub fn every(self, base_delay: u64, unit: TimeUnit) -> RetryStrategyStage {
        RetryStrategyStage {
            max_attempts: self.max_attempts,
            base_delay,
            unit,
        }
    }
}

/// Second stage: choose the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryStrategyStage {
    max_attempts: u32,
    base_delay: u64,
    unit: TimeUnit,
}

impl RetryStrategyStage {
    pub fn with_backoff(self, strategy: impl BackoffStrategy + 'static) -> RetryPredicateStage {
        RetryPredicateStage {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            unit: self.unit,
            strategy: Arc::new(strategy),
        }
    }
}

/// Third stage: choose which failures are retried.
#[derive(Clone)]
pub struct RetryPredicateStage {
    max_attempts: u32,
    base_delay: u64,
    unit: TimeUnit,
    strategy: Arc<dyn BackoffStrategy>,
}

impl RetryPredicateStage {
    /// Retry failures whose type (or a source's type) is in `categories`.
    pub fn for_errors<E>(self, categories: ErrorCategories) -> RetryBuildStage<E>
    where
        E: Error + 'static,
    {
        let style = MatchStyle::Categories(categories.names());
        let empty = categories.is_empty();
        let test = move |err: &E| categories.matches(err);
        self.finish(
            FailureMatcher {
                style,
                test: Arc::new(test),
            },
            empty,
        )
    }

    /// Retry failures accepted by `predicate`.
    pub fn matching<E, P>(self, predicate: P) -> RetryBuildStage<E>
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.finish(
            FailureMatcher {
                style: MatchStyle::Predicate,
                test: Arc::new(predicate),
            },
            false,
        )
    }

    fn finish<E>(self, matcher: FailureMatcher<E>, empty_categories: bool) -> RetryBuildStage<E> {
        RetryBuildStage {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            unit: self.unit,
            strategy: self.strategy,
            matcher,
            empty_categories,
        }
    }
}

/// Final stage.
pub struct RetryBuildStage<E> {
    max_attempts: u32,
    base_delay: u64,
    unit: TimeUnit,
    strategy: Arc<dyn BackoffStrategy>,
    matcher: FailureMatcher<E>,
    empty_categories: bool,
}

impl<E> RetryBuildStage<E> {
    pub fn build(self) -> Result<RetryPlan<E>> {
        if self.max_attempts == 0 {
            return Err(KeyError::ConfigurationError(
                "Retry plan needs at least one attempt".to_string(),
            ));
        }
        if self.empty_categories {
            return Err(KeyError::ConfigurationError(
                "No error categories specified".to_string(),
            ));
        }
        Ok(RetryPlan::from_parts(
            self.max_attempts,
            self.base_delay,
            self.unit,
            self.strategy,
            self.matcher,
        ))
    }
}
