use thiserror::Error;

/// Outcome of a cancellable retry run that did not produce a value.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The caller cancelled the run; the operation is not retried again.
    #[error("Retry cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The operation's own failure, unchanged.
    #[error(transparent)]
    Operation(E),
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The underlying operation failure, if this is not a cancellation.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Cancelled { .. } => None,
        }
    }
}
