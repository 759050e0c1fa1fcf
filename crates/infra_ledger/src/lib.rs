//! REST Ledger Adapter
//!
//! Connects the billing domain's ledger sync to an external double-entry
//! accounting system through its manual-entry REST API.
//!
//! Bookings are written as single-line manual entries. The entry
//! description carries the booking text followed by `jb:<docnumber>`, which
//! is how entries created by this system are recognised when reading back.
//!
//! # Error Handling
//!
//! Ledger errors are mapped to `PortError` variants:
//! - 404 -> `PortError::NotFound`
//! - 401/403 -> `PortError::Unauthorized`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - timeouts -> `PortError::Timeout`
//! - unknown account numbers -> `PortError::Validation`

pub mod client;
pub mod config;
pub mod error;
pub mod wire;

pub use client::RestLedger;
pub use config::LedgerConfig;
pub use error::LedgerApiError;
pub use wire::{BaseData, ManualEntry};
