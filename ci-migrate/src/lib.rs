//! Travis-CI to GitHub Actions migration for an organization's repositories.
//!
//! The crate audits each repository's CI setup and branch protection, decides
//! which remediation actions apply, and can apply them. The layout keeps the
//! decisions separate from the API traffic:
//!
//! - **[`core`]**: Pure, deterministic logic (Travis matching, the workflow
//!   catalogue, the assessment rule table, status-check reconciliation).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (configuration, the GitHub REST client
//!   behind the [`io::github::Forge`] trait).
//!
//! Orchestration modules ([`detect`], [`update`], [`fetch`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod detect;
pub mod exit_codes;
pub mod fetch;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod update;
