//! REST ledger client
//!
//! Implements the billing domain's `LedgerPort` on top of the ledger's
//! manual-entry API. Accounts and currencies are fetched on first use and
//! kept for the lifetime of the adapter.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_ledger::{LedgerConfig, RestLedger};
//! use domain_billing::{BookingGenerator, LedgerSync, SyncOptions};
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(RestLedger::new(LedgerConfig::new("https://api.bexio.com", token))?);
//! let sync = LedgerSync::new(BookingGenerator::new(repository), ledger, SyncOptions::default());
//! ```

use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error, instrument};

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, PortError};
use domain_billing::{Booking, LedgerPort};

use crate::config::LedgerConfig;
use crate::error::LedgerApiError;
use crate::wire::{AccountDto, BaseData, CurrencyDto, ManualEntry};

const ACCOUNTS_PATH: &str = "/2.0/accounts";
const CURRENCIES_PATH: &str = "/3.0/currencies";
const MANUAL_ENTRIES_PATH: &str = "/3.0/accounting/manual_entries";

/// Ledger adapter speaking the manual-entry REST API
#[derive(Debug)]
pub struct RestLedger {
    client: Client,
    config: LedgerConfig,
    base: OnceCell<BaseData>,
}

impl RestLedger {
    /// Creates the adapter
    ///
    /// # Errors
    ///
    /// Returns `LedgerApiError::Http` if the HTTP client cannot be built
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            base: OnceCell::new(),
        })
    }

    /// Makes an authenticated JSON request
    async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, LedgerApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, path, body).await?;
        response.json::<T>().await.map_err(|e| {
            error!(error = %e, path, "Failed to parse ledger response");
            LedgerApiError::from(e)
        })
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<reqwest::Response, LedgerApiError>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self
            .client
            .request(method.clone(), self.config.url(path))
            .bearer_auth(&self.config.token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, %method, path, "Ledger request failed");
            LedgerApiError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %method, path, body = %body, "Ledger API error");
            return Err(LedgerApiError::Status { status, body });
        }
        Ok(response)
    }

    async fn base_data(&self) -> Result<&BaseData, LedgerApiError> {
        self.base
            .get_or_try_init(|| async {
                let accounts: Vec<AccountDto> = self.request(Method::GET, ACCOUNTS_PATH, None::<&()>).await?;
                let currencies: Vec<CurrencyDto> = self.request(Method::GET, CURRENCIES_PATH, None::<&()>).await?;
                debug!(accounts = accounts.len(), currencies = currencies.len(), "Ledger base data loaded");
                Ok(BaseData::new(accounts, currencies))
            })
            .await
    }

    fn entry_path(existing: &Booking) -> Result<String, LedgerApiError> {
        existing
            .external_id
            .as_deref()
            .map(|id| format!("{MANUAL_ENTRIES_PATH}/{id}"))
            .ok_or_else(|| LedgerApiError::MissingEntryId(existing.doc_number.clone()))
    }
}

impl DomainPort for RestLedger {}

#[async_trait]
impl HealthCheckable for RestLedger {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = self.send(Method::GET, CURRENCIES_PATH, None::<&()>).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy("rest-ledger", latency_ms),
            Err(e) => HealthCheckResult::unhealthy("rest-ledger", latency_ms, e.to_string()),
        }
    }
}

#[async_trait]
impl LedgerPort for RestLedger {
    #[instrument(skip(self))]
    async fn existing_bookings(&self, from: NaiveDate, till: NaiveDate) -> Result<Vec<Booking>, PortError> {
        let base = self.base_data().await?;
        let path = format!("{MANUAL_ENTRIES_PATH}?limit={}", self.config.page_limit);
        let entries: Vec<ManualEntry> = self.request(Method::GET, &path, None::<&()>).await?;

        let bookings: Vec<Booking> = entries
            .iter()
            .filter_map(|entry| base.booking_from(entry, from, till))
            .collect();
        debug!(listed = entries.len(), ours = bookings.len(), "Ledger entries read");
        Ok(bookings)
    }

    #[instrument(skip(self, booking), fields(doc_number = %booking.doc_number))]
    async fn create_booking(&self, booking: &Booking) -> Result<(), PortError> {
        let entry = self.base_data().await?.entry_for(booking, &self.config.currency)?;
        self.send(Method::POST, MANUAL_ENTRIES_PATH, Some(&entry)).await?;
        Ok(())
    }

    #[instrument(skip(self, existing, new), fields(doc_number = %new.doc_number))]
    async fn update_booking(&self, existing: &Booking, new: &Booking) -> Result<(), PortError> {
        let path = Self::entry_path(existing)?;
        let entry = self.base_data().await?.entry_for(new, &self.config.currency)?;
        self.send(Method::PUT, &path, Some(&entry)).await?;
        Ok(())
    }

    #[instrument(skip(self, existing), fields(doc_number = %existing.doc_number))]
    async fn delete_booking(&self, existing: &Booking) -> Result<(), PortError> {
        let path = Self::entry_path(existing)?;
        self.send(Method::DELETE, &path, None::<&()>).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Money;

    fn booking(external_id: Option<&str>) -> Booking {
        Booking {
            date: NaiveDate::from_ymd_opt(2018, 1, 15).unwrap(),
            doc_number: "500011".to_string(),
            text: "Bill 1: Subscription Michael Test".to_string(),
            debit_account: "1100".to_string(),
            credit_account: "3001".to_string(),
            amount: Money::from_cents(120000),
            vat_amount: Money::zero(),
            member_account: String::new(),
            external_id: external_id.map(str::to_string),
        }
    }

    #[test]
    fn test_entry_path() {
        assert_eq!(
            RestLedger::entry_path(&booking(Some("42"))).unwrap(),
            "/3.0/accounting/manual_entries/42"
        );
        assert!(matches!(
            RestLedger::entry_path(&booking(None)),
            Err(LedgerApiError::MissingEntryId(doc)) if doc == "500011"
        ));
    }
}
