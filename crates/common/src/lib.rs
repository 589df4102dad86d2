//! profile-e2e Common Library
//!
//! Shared profile types, the domain error taxonomy, and the SQLite-backed
//! store that backs the stub control API.

pub mod db;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use db::ProfileStore;
pub use error::{Error, Result};
pub use types::*;

/// Name prefix carried by every fixture profile
pub const FIXTURE_PREFIX: &str = "E2E Test ";

/// Server-side message for a duplicate profile name
pub fn conflict_detail(name: &str) -> String {
    format!("Profile with name '{}' already exists", name)
}

/// Server-side message for an attempt to delete the sole profile
pub const LAST_PROFILE_DETAIL: &str = "Cannot delete the last profile";
