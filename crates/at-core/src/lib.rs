//! Shared foundation for the coding-agent gateway: ambient correlation
//! context, the error-kind taxonomy, configuration, typed ids, and the
//! SQLite connection helper every persistence-backed subsystem builds on.
//!
//! Downstream crates (`at-eventlog`, `at-hub`, `at-caam`, `at-gitsync`,
//! `at-dcg`, `at-audit`, `at-cliwrap`, `at-gateway`) depend on this crate
//! but never on each other's internals — composition happens at the
//! daemon's `Runtime` boundary.

pub mod config;
pub mod correlation;
pub mod crypto;
pub mod db;
pub mod error;
pub mod ids;
pub mod lockfile;
pub mod rate_limiter;
pub mod redact;
pub mod shutdown;
pub mod types;
