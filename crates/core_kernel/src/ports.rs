//! Port contracts shared by the billing domain and its adapters
//!
//! The billing domain declares two ports, `BillingRepository` and
//! `LedgerPort`. Both extend [`DomainPort`] and report failures as
//! [`PortError`], so a service does not care whether a bill came out of
//! PostgreSQL or a booking went to a REST ledger.
//!
//! ```text
//!   BillAggregator  PaymentProcessor  BookingGenerator  LedgerSync
//!          \              |                 |             /
//!           BillingRepository ──────────── LedgerPort
//!                 |                             |
//!          PgBillingRepository             RestLedger
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a port call
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// Uniqueness violation, e.g. a payment unique id imported twice
    #[error("Duplicate {entity_type}: {key}")]
    Duplicate { entity_type: String, key: String },

    /// The store or the ledger rejected the input
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// The write contradicts stored data (foreign keys, check constraints)
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    /// Credentials of the adapter were refused
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    /// Stored or received data could not be mapped onto domain types
    #[error("Transformation error: {message}")]
    Transformation { message: String },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity_type: impl Into<String>, key: impl fmt::Display) -> Self {
        PortError::Duplicate {
            entity_type: entity_type.into(),
            key: key.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Validation error naming the offending field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        PortError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        PortError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>) -> Self {
        PortError::ServiceUnavailable {
            service: service.into(),
        }
    }

    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying error to a `Connection` or `Internal` error
    ///
    /// Other variants are returned unchanged.
    pub fn with_source(self, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        match self {
            PortError::Connection { message, .. } => PortError::Connection {
                message,
                source: Some(Box::new(error)),
            },
            PortError::Internal { message, .. } => PortError::Internal {
                message,
                source: Some(Box::new(error)),
            },
            other => other,
        }
    }

    /// True for failures a later run may not hit again
    ///
    /// Ledger sync reports these so the book-keeper knows re-running it
    /// is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. } | PortError::Timeout { .. } | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, PortError::Duplicate { .. })
    }
}

/// Marker trait for all domain ports
///
/// Ports are shared as `Arc<dyn ...>` between the HTTP handlers.
pub trait DomainPort: Send + Sync + 'static {}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Unhealthy,
}

/// Health check result for an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    /// Why the adapter is unhealthy, or other detail
    pub message: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    /// Builds a result stamped with the current time
    pub fn new(adapter_id: impl Into<String>, status: AdapterHealth, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms,
            message: None,
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn healthy(adapter_id: impl Into<String>, latency_ms: u64) -> Self {
        Self::new(adapter_id, AdapterHealth::Healthy, latency_ms)
    }

    pub fn unhealthy(adapter_id: impl Into<String>, latency_ms: u64, message: impl Into<String>) -> Self {
        Self::new(adapter_id, AdapterHealth::Unhealthy, latency_ms).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

/// Trait for adapters that support health checks
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Probes the adapter with the cheapest call it offers
    async fn health_check(&self) -> HealthCheckResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_entity() {
        let error = PortError::not_found("Bill", 123);
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert_eq!(error.to_string(), "Not found: Bill with id 123");
    }

    #[test]
    fn test_duplicate_payment() {
        let error = PortError::duplicate("Payment", "ZLG-2018-001");
        assert!(error.is_duplicate());
        assert_eq!(error.to_string(), "Duplicate Payment: ZLG-2018-001");
    }

    #[test]
    fn test_transient_errors() {
        assert!(PortError::timeout("list_entries").is_transient());
        assert!(PortError::unavailable("ledger").is_transient());
        assert!(PortError::connection("refused").is_transient());
        assert!(!PortError::validation("Invalid account").is_transient());
        assert!(!PortError::unauthorized("bad token").is_transient());
    }

    #[test]
    fn test_with_source_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = PortError::connection("Ledger unreachable").with_source(io);
        assert_eq!(error.to_string(), "Connection error: Ledger unreachable");
        assert!(std::error::Error::source(&error).is_some());

        let untouched = PortError::conflict("fk").with_source(std::fmt::Error);
        assert!(std::error::Error::source(&untouched).is_none());
    }

    #[test]
    fn test_health_check_result() {
        let ok = HealthCheckResult::healthy("postgres-billing", 3);
        assert!(ok.is_healthy());
        assert!(ok.message.is_none());

        let down = HealthCheckResult::unhealthy("rest-ledger", 30_000, "timeout");
        assert!(!down.is_healthy());
        assert_eq!(down.message.as_deref(), Some("timeout"));
    }
}
