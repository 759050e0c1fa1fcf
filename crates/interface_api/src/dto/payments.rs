//! Payment DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{BillId, MemberId};
use domain_billing::{BillingError, MatchOutcome, PaymentMatch, PaymentRecord};

/// A batch of bank payments, as parsed from a camt.054 or ESR file
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentBatchRequest {
    #[validate(length(min = 1, max = 5000))]
    pub payments: Vec<PaymentRecord>,
}

/// Check result of one payment record
#[derive(Debug, Serialize)]
pub struct PaymentCheckResult {
    pub unique_id: String,
    pub importable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MatchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_id: Option<BillId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentCheckResult {
    pub fn new(record: &PaymentRecord, result: Result<PaymentMatch, BillingError>) -> Self {
        match result {
            Ok(m) => Self {
                unique_id: record.unique_id.clone(),
                importable: true,
                outcome: Some(m.outcome),
                member_id: Some(m.member_id),
                bill_id: Some(m.bill_id),
                error: None,
            },
            Err(e) => Self {
                unique_id: record.unique_id.clone(),
                importable: false,
                outcome: None,
                member_id: None,
                bill_id: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentCheckResponse {
    /// True when the whole batch can be imported
    pub importable: bool,
    pub results: Vec<PaymentCheckResult>,
}

#[derive(Debug, Serialize)]
pub struct PaymentImportResponse {
    pub imported: usize,
    pub payments: Vec<PaymentMatch>,
}
