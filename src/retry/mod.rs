//! Retry/backoff execution for calls to unreliable dependencies.
//!
//! A [`RetryPlan`] is assembled with a staged builder that fixes the order of
//! configuration at compile time:
//!
//! ```
//! use keyforge::retry::{Backoff, ErrorCategories, RetryBuilder, TimeUnit};
//!
//! let plan = RetryBuilder::retry_times(3)
//!     .every(500, TimeUnit::Milliseconds)
//!     .with_backoff(Backoff::Linear)
//!     .for_errors::<std::io::Error>(ErrorCategories::of::<std::io::Error>())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(plan.backoff_schedule(), vec![500, 1000]);
//! ```
//!
//! Failures that match the plan are retried after a backoff delay computed
//! by a [`BackoffStrategy`]; anything else, and the last failure once the
//! attempts are spent, propagates to the caller unchanged.

mod backoff;
mod builder;
mod error;
mod listener;
mod plan;
mod units;

pub use backoff::{Backoff, BackoffStrategy};
pub use builder::{
    ErrorCategories, MatchStyle, RetryBuildStage, RetryBuilder, RetryIntervalStage,
    RetryPredicateStage, RetryStrategyStage,
};
pub use error::RetryError;
pub use listener::{RetryEvent, RetryListener};
pub use plan::RetryPlan;
pub use units::TimeUnit;
