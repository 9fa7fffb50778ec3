//! Common test infrastructure for bootkit-engine tests
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! # Modules
//!
//! - `constants`: Script bodies and payloads
//! - `builders`: Fluent builder for manifest items
//! - `mocks`: In-memory fetcher and recording progress reporter
//! - `mock_server`: Wiremock setup helpers for download tests
//! - `fixtures`: A temporary base directory wired to an orchestrator

// Not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod constants;
pub mod fixtures;
pub mod mock_server;
pub mod mocks;

pub use builders::*;
pub use constants::*;
pub use fixtures::*;
pub use mock_server::*;
pub use mocks::*;
