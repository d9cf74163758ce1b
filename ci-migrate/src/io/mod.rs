//! I/O adapters for `ci-migrate` commands.

pub mod config;
pub mod github;
