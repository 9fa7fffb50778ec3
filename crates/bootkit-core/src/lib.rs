//! # bootkit-core
//!
//! Core library for bootkit providing:
//! - Manifest and run configuration types
//! - Layered configuration loading (preferences, environment, CLI)
//! - Retry execution engine with policy-based configuration
//! - Version comparison and host architecture detection

pub mod arch;
pub mod config;
pub mod error;
pub mod paths;
pub mod retry;
pub mod types;
pub mod version;

pub use arch::Architecture;
pub use config::{ConfigLoader, RunOverrides};
pub use error::{Error, Result};
pub use paths::Paths;

/// Version of the bootkit crates, recorded in status and the completion marker
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
