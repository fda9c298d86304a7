//! # Harbor Testing Utils
//!
//! Shared testing utilities for the harbor dispatch workspace: builders with
//! sensible defaults, mock downstream services and small async helpers.
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! harbor-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
