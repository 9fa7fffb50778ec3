//! Policy-driven retry loop used for artifact downloads
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use bootkit_core::retry::{RetryError, RetryExecutor};
//! use bootkit_core::types::RetryPolicy;
//!
//! async fn example() -> Result<u64, RetryError<std::io::Error>> {
//!     RetryExecutor::new(RetryPolicy::fixed(3, Duration::from_secs(5)))
//!         .execute(|| async { Ok(42) })
//!         .await
//! }
//! ```

mod error;
mod executor;
mod observer;

pub use error::RetryError;
pub use executor::RetryExecutor;
pub use observer::{RetryObserver, TracingObserver};
