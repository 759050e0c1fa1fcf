//! Request handlers

pub mod billing;
pub mod health;
pub mod ledger;
pub mod payments;

use validator::Validate;

use core_kernel::BusinessYearId;
use domain_billing::{BillingError, BusinessYear};

use crate::error::ApiError;
use crate::AppState;

fn validate<T: Validate>(request: &T) -> Result<(), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

async fn business_year(state: &AppState, id: i64) -> Result<BusinessYear, ApiError> {
    let id = BusinessYearId::new(id);
    state.repository.business_year(id).await.map_err(|e| {
        if e.is_not_found() {
            BillingError::BusinessYearNotFound(id).into()
        } else {
            ApiError::from(e)
        }
    })
}
