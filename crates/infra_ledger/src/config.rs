//! Ledger connection settings

use std::time::Duration;

/// Configuration for the REST ledger adapter
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use infra_ledger::LedgerConfig;
///
/// let config = LedgerConfig::new("https://ledger.example.com", "secret")
///     .timeout(Duration::from_secs(10));
/// assert_eq!(config.currency, "CHF");
/// ```
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL without trailing slash, e.g. "https://api.bexio.com"
    pub base_url: String,
    /// Bearer token
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Currency name every entry is booked in
    pub currency: String,
    /// Maximum number of manual entries fetched per listing
    pub page_limit: u32,
}

impl LedgerConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            currency: "CHF".to_string(),
            page_limit: 2000,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_dropped() {
        let config = LedgerConfig::new("http://localhost:8080/", "t");
        assert_eq!(config.url("/2.0/accounts"), "http://localhost:8080/2.0/accounts");
    }

    #[test]
    fn test_builder() {
        let config = LedgerConfig::new("http://ledger", "t")
            .timeout(Duration::from_secs(5))
            .currency("EUR")
            .page_limit(100);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.currency, "EUR");
        assert_eq!(config.page_limit, 100);
    }
}
