//! Ledger adapter errors

use core_kernel::PortError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while talking to the ledger
#[derive(Debug, Error)]
pub enum LedgerApiError {
    /// Transport failure (connect, timeout, body decoding)
    #[error("Ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The ledger answered with a non-success status
    #[error("Ledger returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// A booking names an account number the ledger does not know
    #[error("Unknown account number {0}")]
    UnknownAccount(String),

    /// The configured currency is not available in the ledger
    #[error("Unknown currency {0}")]
    UnknownCurrency(String),

    /// A booking without ledger entry id was passed to update or delete
    #[error("Booking {0} has no ledger entry id")]
    MissingEntryId(String),
}

impl From<LedgerApiError> for PortError {
    fn from(error: LedgerApiError) -> Self {
        match error {
            LedgerApiError::Http(e) if e.is_timeout() => {
                PortError::timeout(e.url().map(|u| u.path().to_string()).unwrap_or_default())
            }
            LedgerApiError::Http(e) if e.is_connect() => PortError::connection("Ledger unreachable").with_source(e),
            LedgerApiError::Http(e) if e.is_decode() => PortError::transformation(e.to_string()),
            LedgerApiError::Status { status, body } => match status {
                StatusCode::NOT_FOUND => PortError::not_found("LedgerEntry", body),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::unauthorized(body),
                s if s.is_server_error() => PortError::unavailable(format!("ledger ({s})")),
                s => PortError::validation(format!("Ledger rejected request ({s}): {body}")),
            },
            LedgerApiError::UnknownAccount(account) => {
                PortError::validation_field(format!("Unknown account number {account}"), "account")
            }
            LedgerApiError::UnknownCurrency(currency) => {
                PortError::validation_field(format!("Unknown currency {currency}"), "currency")
            }
            other => PortError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode) -> PortError {
        LedgerApiError::Status {
            status: code,
            body: "entry 7".to_string(),
        }
        .into()
    }

    #[test]
    fn test_status_mapping() {
        assert!(status(StatusCode::NOT_FOUND).is_not_found());
        assert!(matches!(status(StatusCode::UNAUTHORIZED), PortError::Unauthorized { .. }));
        assert!(status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(matches!(status(StatusCode::UNPROCESSABLE_ENTITY), PortError::Validation { .. }));
    }

    #[test]
    fn test_unknown_account_names_the_account() {
        let error: PortError = LedgerApiError::UnknownAccount("1100".to_string()).into();
        assert!(error.to_string().contains("1100"));
        let error: PortError = LedgerApiError::MissingEntryId("500011".to_string()).into();
        assert!(matches!(error, PortError::Internal { .. }));
    }
}
