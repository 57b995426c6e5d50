use serde::{Deserialize, Serialize};
use std::fmt;

/// Maps a base delay and a zero-indexed retry step to the next delay.
pub trait BackoffStrategy: Send + Sync {
    fn compute(&self, base: u64, step: u32) -> u64;
}

impl<F> BackoffStrategy for F
where
    F: Fn(u64, u32) -> u64 + Send + Sync,
{
    fn compute(&self, base: u64, step: u32) -> u64 {
        self(base, step)
    }
}

/// Built-in backoff curves.
///
/// All arithmetic saturates at `u64::MAX` instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `base` for every step: 5, 5, 5, ...
    Fixed,
    /// `base * (step + 1)`: 5, 10, 15, ...
    Linear,
    /// `base ^ (step + 1)`: 5, 25, 125, 625, ...
    ///
    /// Grows much faster than doubling; the curve is relied on as-is.
    Exponential,
}

impl BackoffStrategy for Backoff {
    fn compute(&self, base: u64, step: u32) -> u64 {
        match self {
            Self::Fixed => base,
            Self::Linear => base.saturating_mul(u64::from(step) + 1),
            Self::Exponential => base.saturating_pow(step.saturating_add(1)),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential
    }
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
        };
        write!(f, "{label}")
    }
}
