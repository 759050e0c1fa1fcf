//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! member billing test suite.
//!
//! # Modules
//!
//! - `fixtures`: A seeded in-memory billing world and standard test data
//! - `builders`: Builder patterns for billable items, bills and payments
//! - `assertions`: Custom assertion helpers for domain types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
