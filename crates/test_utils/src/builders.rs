//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::NaiveDate;
use core_kernel::{
    BillId, BillableItemId, BusinessYearId, MemberId, Money, PaymentId, PaymentTypeId, Rate, SubscriptionId,
};
use domain_billing::{Bill, BillableItem, ItemType, NewBill, Payment, PaymentRecord, StructuredReference};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{AccountFixtures, BillingFixtures, DateFixtures, IdFixtures};

/// Builder for billable items
pub struct BillableItemBuilder {
    id: BillableItemId,
    subscription_id: SubscriptionId,
    member_id: MemberId,
    item_type: ItemType,
    activation_date: Option<NaiveDate>,
    deactivation_date: Option<NaiveDate>,
}

impl Default for BillableItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BillableItemBuilder {
    /// A vegetable subscription of Michael, active the whole year
    pub fn new() -> Self {
        Self {
            id: BillableItemId::new(100),
            subscription_id: SubscriptionId::new(1),
            member_id: IdFixtures::michael(),
            item_type: BillingFixtures::vegetables(),
            activation_date: Some(DateFixtures::year_start()),
            deactivation_date: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = BillableItemId::new(id);
        self
    }

    pub fn for_member(mut self, member: MemberId) -> Self {
        self.member_id = member;
        self
    }

    pub fn of_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    pub fn activated(mut self, date: NaiveDate) -> Self {
        self.activation_date = Some(date);
        self
    }

    pub fn deactivated(mut self, date: NaiveDate) -> Self {
        self.deactivation_date = Some(date);
        self
    }

    /// Leaves the item without activation date
    pub fn never_activated(mut self) -> Self {
        self.activation_date = None;
        self
    }

    pub fn build(self) -> BillableItem {
        BillableItem {
            id: self.id,
            subscription_id: self.subscription_id,
            member_id: self.member_id,
            item_type: self.item_type,
            activation_date: self.activation_date,
            deactivation_date: self.deactivation_date,
        }
    }
}

/// Builder for bank payment records
pub struct PaymentRecordBuilder {
    date: NaiveDate,
    credit_account: String,
    amount: Decimal,
    reference: String,
    unique_id: String,
}

impl PaymentRecordBuilder {
    /// A payment quoting the reference of `bill` of `member`
    pub fn for_bill(member: MemberId, bill: BillId) -> Self {
        let reference = StructuredReference::new(member, bill).encode().unwrap();
        Self {
            date: DateFixtures::payment_date(),
            credit_account: AccountFixtures::iban().to_string(),
            amount: dec!(100),
            reference,
            unique_id: format!("ZV-{}-{}", member.get(), bill.get()),
        }
    }

    /// Replaces the reference with a raw string
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    /// Sets the credited IBAN
    pub fn to_account(mut self, iban: impl Into<String>) -> Self {
        self.credit_account = iban.into();
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn build(self) -> PaymentRecord {
        PaymentRecord {
            date: self.date,
            credit_account: self.credit_account,
            amount: Money::new(self.amount),
            reference_type: "QRR".to_string(),
            reference: self.reference,
            unique_id: self.unique_id,
        }
    }
}

/// Builder for stored bills, bypassing the aggregator
pub struct BillBuilder {
    id: BillId,
    member_id: MemberId,
    business_year_id: BusinessYearId,
    bill_date: NaiveDate,
    amount: Decimal,
    published: bool,
    paid: bool,
}

impl Default for BillBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BillBuilder {
    /// An unpublished, unpaid bill of Michael over 1500
    pub fn new() -> Self {
        Self {
            id: BillId::new(1000),
            member_id: IdFixtures::michael(),
            business_year_id: IdFixtures::year_2018(),
            bill_date: DateFixtures::bill_date(),
            amount: dec!(1500),
            published: false,
            paid: false,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = BillId::new(id);
        self
    }

    pub fn for_member(mut self, member: MemberId) -> Self {
        self.member_id = member;
        self
    }

    pub fn dated(mut self, date: NaiveDate) -> Self {
        self.bill_date = date;
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn published(mut self) -> Self {
        self.published = true;
        self
    }

    pub fn paid(mut self) -> Self {
        self.paid = true;
        self
    }

    pub fn build(self) -> Bill {
        let mut bill = Bill::from_new(
            self.id,
            NewBill {
                member_id: self.member_id,
                business_year_id: self.business_year_id,
                bill_date: self.bill_date,
                booking_date: self.bill_date,
                vat_rate: Rate::zero(),
            },
        );
        bill.amount = Money::new(self.amount);
        bill.published = self.published;
        bill.paid = self.paid;
        bill
    }
}

/// Creates a stored payment against a bill
pub fn stored_payment(id: i64, bill: BillId, amount: Decimal, paid_date: NaiveDate) -> Payment {
    Payment {
        id: PaymentId::new(id),
        bill_id: bill,
        payment_type_id: PaymentTypeId::new(1),
        amount: Money::new(amount),
        paid_date,
        unique_id: format!("STORED-{id}"),
    }
}
