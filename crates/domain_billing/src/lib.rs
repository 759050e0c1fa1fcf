//! Billing Domain - Member Bills, Payments and Ledger Export
//!
//! This crate bills the members of a subscription cooperative once per
//! business year, imports their bank payments and keeps an external
//! double-entry ledger in step with both.
//!
//! # Flow
//!
//! 1. **Billing run**: [`BillAggregator`] collects the billable items active
//!    in a business year and creates one bill per member, pricing every item
//!    with [`prorate`].
//! 2. **Payment import**: [`PaymentProcessor`] decodes the structured
//!    reference of each bank payment ([`StructuredReference`]) and assigns it
//!    to a bill.
//! 3. **Booking**: [`BookingGenerator`] derives one booking per bill item and
//!    per payment, numbered so that every run produces the same document
//!    numbers.
//! 4. **Ledger sync**: [`LedgerSync`] compares generated bookings with the
//!    ledger and applies only the difference.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillAggregator, LedgerSync, BookingGenerator, SyncOptions};
//!
//! let aggregator = BillAggregator::new(repository.clone());
//! let items = aggregator.billable_items(&year).await?;
//! aggregator.create_bills_for_items(&items, &year, bill_date).await?;
//!
//! let sync = LedgerSync::new(BookingGenerator::new(repository), ledger, SyncOptions::default());
//! let outcome = sync.sync(year.start_date, year.end_date).await?;
//! ```

pub mod aggregator;
pub mod balance;
pub mod bill;
pub mod billable;
pub mod booking;
pub mod error;
pub mod export;
pub mod payment;
pub mod ports;
pub mod proration;
pub mod reference;
pub mod settings;
pub mod sync;

pub use aggregator::{BillAggregator, OpenBill};
pub use balance::{BalanceReport, MemberBalance};
pub use bill::{Bill, BillItem, BillItemRef, BusinessYear, CustomItemType, NewBill, NewBillItem};
pub use billable::{BillableItem, BillingPeriod, ItemKind, ItemType, Member, Pricing};
pub use booking::{Booking, BookingGenerator, BILL_DOC_OFFSET, PAYMENT_DOC_OFFSET};
pub use error::BillingError;
pub use export::{bookings_to_csv, write_bookings_csv, ExportError};
pub use payment::{
    MatchOutcome, NewPayment, Payment, PaymentMatch, PaymentProcessor, PaymentRecord, PaymentType,
};
pub use ports::{BillingRepository, LedgerPort, UnitOfWork};
pub use proration::prorate;
pub use reference::{LegacyKind, LegacyReference, ReferenceError, StructuredReference};
pub use settings::{AccountPlan, BillingSettings};
pub use sync::{
    plan_sync, LedgerDescription, LedgerSync, SyncCounts, SyncFailure, SyncOptions, SyncOutcome, SyncPlan,
};
