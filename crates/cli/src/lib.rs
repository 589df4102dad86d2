//! profile-e2e CLI
//!
//! Runs the profile end-to-end scenarios and inspects the backend they leave
//! behind.

pub mod commands;
pub mod output;
