//! Billing DTOs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{BillId, MemberId, Money};
use domain_billing::reference::format_grouped;
use domain_billing::{Bill, OpenBill, ReferenceError, StructuredReference};

#[derive(Debug, Deserialize)]
pub struct CreateBillsRequest {
    /// Date printed on every bill of the run
    pub bill_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct OpenBillsQuery {
    /// Bills with a smaller paid percentage are listed; defaults to 100
    pub max_paid_percentage: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddCustomItemRequest {
    pub custom_item_type_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub description: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PublishBillsRequest {
    #[validate(length(min = 1, max = 1000))]
    pub bill_ids: Vec<i64>,
}

/// A bill together with the reference number printed on its payment slip
#[derive(Debug, Serialize)]
pub struct BillResponse {
    #[serde(flatten)]
    pub bill: Bill,
    pub reference: String,
}

impl TryFrom<Bill> for BillResponse {
    type Error = ReferenceError;

    fn try_from(bill: Bill) -> Result<Self, Self::Error> {
        let reference = StructuredReference::new(bill.member_id, bill.id).encode()?;
        Ok(Self {
            reference: format_grouped(&reference),
            bill,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateBillsResponse {
    pub created: usize,
    pub bills: Vec<BillResponse>,
}

#[derive(Debug, Serialize)]
pub struct OpenBillResponse {
    #[serde(flatten)]
    pub bill: BillResponse,
    pub amount_paid: Money,
    pub amount_open: Money,
}

impl TryFrom<OpenBill> for OpenBillResponse {
    type Error = ReferenceError;

    fn try_from(open: OpenBill) -> Result<Self, Self::Error> {
        let amount_open = open.bill.amount - open.amount_paid;
        Ok(Self {
            bill: BillResponse::try_from(open.bill)?,
            amount_paid: open.amount_paid,
            amount_open,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PublishBillsResponse {
    pub requested: usize,
    pub published: usize,
}

#[derive(Debug, Serialize)]
pub struct ReferenceResponse {
    pub bill_id: BillId,
    pub member_id: MemberId,
    /// The 27 digits as read by banking software
    pub reference: String,
    /// The digits in groups of five as printed on the slip
    pub formatted: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_publish_request_needs_ids() {
        let request = PublishBillsRequest { bill_ids: vec![] };
        assert!(request.validate().is_err());
        let request = PublishBillsRequest { bill_ids: vec![1, 2] };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_custom_item_needs_description() {
        let request = AddCustomItemRequest {
            custom_item_type_id: 1,
            description: String::new(),
            amount: dec!(20),
        };
        assert!(request.validate().is_err());
    }
}
