//! Type definitions for manifests, retry policies and run configuration

mod config_types;
mod manifest;
mod retry_policy;

pub use config_types::*;
pub use manifest::*;
pub use retry_policy::*;
