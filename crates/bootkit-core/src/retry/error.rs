//! Terminal outcomes of a retried operation

use thiserror::Error;

/// Why a retried operation gave up
///
/// Both variants carry the error of the last attempt made.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("{last} (gave up after {attempts} attempts)")]
    Exhausted { attempts: u32, last: E },

    #[error("{last} (not retryable, attempt {attempt})")]
    Rejected { attempt: u32, last: E },
}

impl<E> RetryError<E> {
    /// Attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Rejected { attempt, .. } => *attempt,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Rejected { last, .. } => last,
        }
    }
}
