//! Billing Domain Ports
//!
//! Port interfaces the billing services depend on:
//!
//! - [`BillingRepository`]: members, billable items, bills and payments
//! - [`UnitOfWork`]: an atomic batch of writes against the repository
//! - [`LedgerPort`]: the external double-entry accounting system
//!
//! # Architecture
//!
//! Services receive the ports as `Arc<dyn ...>` and never see the concrete
//! adapter:
//!
//! - **PostgreSQL adapter**: `infra_db::PgBillingRepository`
//! - **REST ledger adapter**: `infra_ledger::RestLedger`
//! - **In-memory adapters**: [`mock`], for tests and local runs
//!
//! # Units of work
//!
//! Every mutation goes through a unit of work obtained from
//! [`BillingRepository::begin`]. Nothing written through it is visible to
//! other readers until [`UnitOfWork::commit`]; dropping it without commit
//! discards all writes.
//!
//! ```rust,ignore
//! let mut uow = repository.begin().await?;
//! let bill = uow.insert_bill(draft).await?;
//! uow.replace_billable_items(bill.id, items).await?;
//! uow.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{
    BillId, BusinessYearId, CustomItemTypeId, DateRange, DomainPort, HealthCheckable, MemberId,
    PortError,
};

use crate::bill::{Bill, BillItem, BusinessYear, CustomItemType, NewBill, NewBillItem};
use crate::billable::{BillableItem, Member};
use crate::booking::Booking;
use crate::payment::{NewPayment, Payment, PaymentType};
use crate::settings::BillingSettings;

/// Read access to billing data and entry point for writes
#[async_trait]
pub trait BillingRepository: DomainPort + HealthCheckable {
    // ========================================================================
    // Reference data
    // ========================================================================

    /// Loads the billing settings including the account plan
    async fn settings(&self) -> Result<BillingSettings, PortError>;

    /// Retrieves a member by id, or `PortError::NotFound`
    async fn member(&self, id: MemberId) -> Result<Member, PortError>;

    /// All members
    async fn members(&self) -> Result<Vec<Member>, PortError>;

    /// Retrieves a business year by id, or `PortError::NotFound`
    async fn business_year(&self, id: BusinessYearId) -> Result<BusinessYear, PortError>;

    /// All business years ordered by start date
    async fn business_years(&self) -> Result<Vec<BusinessYear>, PortError>;

    /// Retrieves a custom item type by id, or `PortError::NotFound`
    async fn custom_item_type(&self, id: CustomItemTypeId) -> Result<CustomItemType, PortError>;

    /// All configured payment types
    async fn payment_types(&self) -> Result<Vec<PaymentType>, PortError>;

    // ========================================================================
    // Billable items
    // ========================================================================

    /// Activated items active on at least one day of `range`
    async fn billable_items(&self, range: DateRange) -> Result<Vec<BillableItem>, PortError>;

    /// Activated items of one member active on at least one day of `range`
    async fn member_billable_items(
        &self,
        member: MemberId,
        range: DateRange,
    ) -> Result<Vec<BillableItem>, PortError>;

    // ========================================================================
    // Bills
    // ========================================================================

    /// Retrieves a bill with its items, or `PortError::NotFound`
    async fn bill(&self, id: BillId) -> Result<Bill, PortError>;

    /// All bills of a business year
    async fn bills_for_year(&self, year: BusinessYearId) -> Result<Vec<Bill>, PortError>;

    /// All bills of a member
    async fn bills_for_member(&self, member: MemberId) -> Result<Vec<Bill>, PortError>;

    /// Bills whose booking date lies within `range`, ordered by id
    async fn bills_booked_between(&self, range: DateRange) -> Result<Vec<Bill>, PortError>;

    // ========================================================================
    // Payments
    // ========================================================================

    /// Payments whose paid date lies within `range`, ordered by id
    async fn payments_between(&self, range: DateRange) -> Result<Vec<Payment>, PortError>;

    /// Payments recorded against a bill
    async fn payments_for_bill(&self, bill: BillId) -> Result<Vec<Payment>, PortError>;

    // ========================================================================
    // Writes
    // ========================================================================

    /// Starts a unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError>;
}

/// An atomic batch of writes
///
/// Reads through the unit of work see its own uncommitted writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Stores a new empty bill and returns it with its id
    async fn insert_bill(&mut self, bill: NewBill) -> Result<Bill, PortError>;

    /// Updates the header fields of a bill (dates, amount, flags, notes)
    ///
    /// Items are not touched.
    async fn update_bill(&mut self, bill: &Bill) -> Result<(), PortError>;

    /// Reads a bill including uncommitted changes
    async fn bill(&mut self, id: BillId) -> Result<Bill, PortError>;

    /// Deletes all subscription-linked items of a bill and stores `items`
    ///
    /// # Returns
    ///
    /// The stored items with their ids, in input order
    async fn replace_billable_items(
        &mut self,
        bill: BillId,
        items: Vec<NewBillItem>,
    ) -> Result<Vec<BillItem>, PortError>;

    /// Adds a single item to a bill
    async fn insert_bill_item(&mut self, bill: BillId, item: NewBillItem) -> Result<BillItem, PortError>;

    /// Stores a payment
    ///
    /// # Errors
    ///
    /// `PortError::Duplicate` if a payment with the same unique id exists
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, PortError>;

    /// Payments of a bill including uncommitted ones
    async fn payments_for_bill(&mut self, bill: BillId) -> Result<Vec<Payment>, PortError>;

    /// Makes all writes visible
    async fn commit(self: Box<Self>) -> Result<(), PortError>;

    /// Discards all writes
    async fn rollback(self: Box<Self>) -> Result<(), PortError>;
}

/// The external double-entry ledger
#[async_trait]
pub trait LedgerPort: DomainPort {
    /// Bookings exported earlier whose date lies within `[from, till]`
    ///
    /// Entries that were not created by this system are not returned.
    async fn existing_bookings(&self, from: NaiveDate, till: NaiveDate) -> Result<Vec<Booking>, PortError>;

    /// Creates a booking
    async fn create_booking(&self, booking: &Booking) -> Result<(), PortError>;

    /// Replaces `existing` with the content of `new`
    async fn update_booking(&self, existing: &Booking, new: &Booking) -> Result<(), PortError>;

    /// Deletes a booking previously returned by `existing_bookings`
    async fn delete_booking(&self, existing: &Booking) -> Result<(), PortError>;
}

/// Mock implementations for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use core_kernel::{
        BillItemId, HealthCheckResult, PaymentId, Rate,
    };

    /// Everything the in-memory repository holds
    #[derive(Debug, Clone)]
    pub struct BillingState {
        pub settings: BillingSettings,
        pub members: BTreeMap<MemberId, Member>,
        pub business_years: BTreeMap<BusinessYearId, BusinessYear>,
        pub billable_items: Vec<BillableItem>,
        pub custom_item_types: BTreeMap<CustomItemTypeId, CustomItemType>,
        pub payment_types: Vec<PaymentType>,
        pub bills: BTreeMap<BillId, Bill>,
        pub payments: BTreeMap<PaymentId, Payment>,
        next_id: i64,
    }

    impl Default for BillingState {
        fn default() -> Self {
            Self {
                settings: BillingSettings::new("", Rate::zero()),
                members: BTreeMap::new(),
                business_years: BTreeMap::new(),
                billable_items: Vec::new(),
                custom_item_types: BTreeMap::new(),
                payment_types: Vec::new(),
                bills: BTreeMap::new(),
                payments: BTreeMap::new(),
                next_id: 1,
            }
        }
    }

    impl BillingState {
        fn next_id(&mut self) -> i64 {
            let id = self.next_id;
            self.next_id += 1;
            id
        }

        fn bill(&self, id: BillId) -> Result<Bill, PortError> {
            self.bills.get(&id).cloned().ok_or_else(|| PortError::not_found("Bill", id))
        }

        fn bill_mut(&mut self, id: BillId) -> Result<&mut Bill, PortError> {
            self.bills.get_mut(&id).ok_or_else(|| PortError::not_found("Bill", id))
        }

        fn payments_for_bill(&self, bill: BillId) -> Vec<Payment> {
            self.payments.values().filter(|p| p.bill_id == bill).cloned().collect()
        }
    }

    /// In-memory implementation of BillingRepository
    ///
    /// A unit of work operates on a snapshot of the state and swaps it in on
    /// commit.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryBillingRepository {
        state: Arc<RwLock<BillingState>>,
    }

    impl InMemoryBillingRepository {
        /// Creates an empty repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a repository with the given settings
        pub fn with_settings(settings: BillingSettings) -> Self {
            let state = BillingState {
                settings,
                ..BillingState::default()
            };
            Self {
                state: Arc::new(RwLock::new(state)),
            }
        }

        pub async fn add_member(&self, member: Member) {
            self.state.write().await.members.insert(member.id, member);
        }

        pub async fn add_business_year(&self, year: BusinessYear) {
            self.state.write().await.business_years.insert(year.id, year);
        }

        pub async fn add_billable_item(&self, item: BillableItem) {
            self.state.write().await.billable_items.push(item);
        }

        pub async fn add_custom_item_type(&self, item_type: CustomItemType) {
            self.state.write().await.custom_item_types.insert(item_type.id, item_type);
        }

        pub async fn add_payment_type(&self, payment_type: PaymentType) {
            self.state.write().await.payment_types.push(payment_type);
        }

        /// Stores a bill as-is, bypassing the aggregator
        pub async fn put_bill(&self, bill: Bill) {
            self.state.write().await.bills.insert(bill.id, bill);
        }

        /// Stores a payment as-is, bypassing the processor
        pub async fn put_payment(&self, payment: Payment) {
            self.state.write().await.payments.insert(payment.id, payment);
        }

        /// Replaces the stored billable item with the same id
        pub async fn update_billable_item(&self, item: BillableItem) {
            let mut state = self.state.write().await;
            if let Some(existing) = state.billable_items.iter_mut().find(|i| i.id == item.id) {
                *existing = item;
            }
        }

        /// Copy of the current committed state
        pub async fn snapshot(&self) -> BillingState {
            self.state.read().await.clone()
        }
    }

    impl DomainPort for InMemoryBillingRepository {}

    #[async_trait]
    impl HealthCheckable for InMemoryBillingRepository {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("in-memory-billing", 0)
        }
    }

    fn items_active(items: &[BillableItem], range: &DateRange, member: Option<MemberId>) -> Vec<BillableItem> {
        items
            .iter()
            .filter(|item| member.map_or(true, |m| item.member_id == m))
            .filter(|item| item.is_active_during(range))
            .cloned()
            .collect()
    }

    #[async_trait]
    impl BillingRepository for InMemoryBillingRepository {
        async fn settings(&self) -> Result<BillingSettings, PortError> {
            Ok(self.state.read().await.settings.clone())
        }

        async fn member(&self, id: MemberId) -> Result<Member, PortError> {
            self.state
                .read()
                .await
                .members
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Member", id))
        }

        async fn members(&self) -> Result<Vec<Member>, PortError> {
            Ok(self.state.read().await.members.values().cloned().collect())
        }

        async fn business_year(&self, id: BusinessYearId) -> Result<BusinessYear, PortError> {
            self.state
                .read()
                .await
                .business_years
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("BusinessYear", id))
        }

        async fn business_years(&self) -> Result<Vec<BusinessYear>, PortError> {
            let mut years: Vec<_> = self.state.read().await.business_years.values().cloned().collect();
            years.sort_by_key(|y| y.start_date);
            Ok(years)
        }

        async fn custom_item_type(&self, id: CustomItemTypeId) -> Result<CustomItemType, PortError> {
            self.state
                .read()
                .await
                .custom_item_types
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("CustomItemType", id))
        }

        async fn payment_types(&self) -> Result<Vec<PaymentType>, PortError> {
            Ok(self.state.read().await.payment_types.clone())
        }

        async fn billable_items(&self, range: DateRange) -> Result<Vec<BillableItem>, PortError> {
            Ok(items_active(&self.state.read().await.billable_items, &range, None))
        }

        async fn member_billable_items(
            &self,
            member: MemberId,
            range: DateRange,
        ) -> Result<Vec<BillableItem>, PortError> {
            Ok(items_active(&self.state.read().await.billable_items, &range, Some(member)))
        }

        async fn bill(&self, id: BillId) -> Result<Bill, PortError> {
            self.state.read().await.bill(id)
        }

        async fn bills_for_year(&self, year: BusinessYearId) -> Result<Vec<Bill>, PortError> {
            let state = self.state.read().await;
            Ok(state.bills.values().filter(|b| b.business_year_id == year).cloned().collect())
        }

        async fn bills_for_member(&self, member: MemberId) -> Result<Vec<Bill>, PortError> {
            let state = self.state.read().await;
            Ok(state.bills.values().filter(|b| b.member_id == member).cloned().collect())
        }

        async fn bills_booked_between(&self, range: DateRange) -> Result<Vec<Bill>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .bills
                .values()
                .filter(|b| range.contains(b.booking_date))
                .cloned()
                .collect())
        }

        async fn payments_between(&self, range: DateRange) -> Result<Vec<Payment>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .payments
                .values()
                .filter(|p| range.contains(p.paid_date))
                .cloned()
                .collect())
        }

        async fn payments_for_bill(&self, bill: BillId) -> Result<Vec<Payment>, PortError> {
            Ok(self.state.read().await.payments_for_bill(bill))
        }

        async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
            let working = self.state.read().await.clone();
            Ok(Box::new(InMemoryUnitOfWork {
                shared: Arc::clone(&self.state),
                working,
            }))
        }
    }

    /// Unit of work over a private copy of the repository state
    #[derive(Debug)]
    pub struct InMemoryUnitOfWork {
        shared: Arc<RwLock<BillingState>>,
        working: BillingState,
    }

    #[async_trait]
    impl UnitOfWork for InMemoryUnitOfWork {
        async fn insert_bill(&mut self, bill: NewBill) -> Result<Bill, PortError> {
            let id = BillId::new(self.working.next_id());
            let bill = Bill::from_new(id, bill);
            self.working.bills.insert(id, bill.clone());
            Ok(bill)
        }

        async fn update_bill(&mut self, bill: &Bill) -> Result<(), PortError> {
            let stored = self.working.bill_mut(bill.id)?;
            let items = std::mem::take(&mut stored.items);
            *stored = Bill { items, ..bill.clone() };
            Ok(())
        }

        async fn bill(&mut self, id: BillId) -> Result<Bill, PortError> {
            self.working.bill(id)
        }

        async fn replace_billable_items(
            &mut self,
            bill: BillId,
            items: Vec<NewBillItem>,
        ) -> Result<Vec<BillItem>, PortError> {
            let ids: Vec<i64> = items.iter().map(|_| self.working.next_id()).collect();
            let stored = self.working.bill_mut(bill)?;
            stored.items.retain(|item| !item.reference.is_billable());

            let created: Vec<BillItem> = ids
                .into_iter()
                .zip(items)
                .map(|(id, item)| BillItem::from_new(BillItemId::new(id), bill, item))
                .collect();
            stored.items.extend(created.iter().cloned());
            Ok(created)
        }

        async fn insert_bill_item(&mut self, bill: BillId, item: NewBillItem) -> Result<BillItem, PortError> {
            let id = BillItemId::new(self.working.next_id());
            let stored = self.working.bill_mut(bill)?;
            let item = BillItem::from_new(id, bill, item);
            stored.items.push(item.clone());
            Ok(item)
        }

        async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, PortError> {
            if self.working.payments.values().any(|p| p.unique_id == payment.unique_id) {
                return Err(PortError::duplicate("Payment", &payment.unique_id));
            }
            if !self.working.bills.contains_key(&payment.bill_id) {
                return Err(PortError::not_found("Bill", payment.bill_id));
            }
            let id = PaymentId::new(self.working.next_id());
            let payment = Payment::from_new(id, payment);
            self.working.payments.insert(id, payment.clone());
            Ok(payment)
        }

        async fn payments_for_bill(&mut self, bill: BillId) -> Result<Vec<Payment>, PortError> {
            Ok(self.working.payments_for_bill(bill))
        }

        async fn commit(self: Box<Self>) -> Result<(), PortError> {
            let mut shared = self.shared.write().await;
            *shared = self.working;
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), PortError> {
            Ok(())
        }
    }

    /// In-memory ledger keyed by generated entry ids
    ///
    /// Can be told to fail after a number of successful write calls, to
    /// exercise partial sync failures.
    #[derive(Debug, Default)]
    pub struct InMemoryLedger {
        entries: RwLock<BTreeMap<u64, Booking>>,
        next_id: AtomicUsize,
        writes: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl InMemoryLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// A ledger that rejects every write after the first `writes`
        pub fn failing_after(writes: usize) -> Self {
            Self {
                fail_after: Some(writes),
                ..Self::default()
            }
        }

        /// Stores a booking directly, as if created by an earlier run
        pub async fn seed(&self, booking: Booking) -> String {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            self.entries.write().await.insert(id, booking);
            id.to_string()
        }

        /// All stored bookings ordered by entry id
        pub async fn bookings(&self) -> Vec<Booking> {
            self.entries
                .read()
                .await
                .iter()
                .map(|(id, b)| Booking {
                    external_id: Some(id.to_string()),
                    ..b.clone()
                })
                .collect()
        }

        /// Number of successful write calls so far
        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        fn record_write(&self) -> Result<(), PortError> {
            let done = self.writes.load(Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| done >= limit) {
                return Err(PortError::ServiceUnavailable {
                    service: "in-memory ledger".to_string(),
                });
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn entry_id(booking: &Booking) -> Result<u64, PortError> {
            booking
                .external_id
                .as_deref()
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| PortError::validation("Booking has no ledger entry id"))
        }
    }

    impl DomainPort for InMemoryLedger {}

    #[async_trait]
    impl LedgerPort for InMemoryLedger {
        async fn existing_bookings(&self, from: NaiveDate, till: NaiveDate) -> Result<Vec<Booking>, PortError> {
            Ok(self
                .bookings()
                .await
                .into_iter()
                .filter(|b| b.date >= from && b.date <= till)
                .collect())
        }

        async fn create_booking(&self, booking: &Booking) -> Result<(), PortError> {
            self.record_write()?;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            let stored = Booking {
                external_id: None,
                ..booking.clone()
            };
            self.entries.write().await.insert(id, stored);
            Ok(())
        }

        async fn update_booking(&self, existing: &Booking, new: &Booking) -> Result<(), PortError> {
            let id = Self::entry_id(existing)?;
            self.record_write()?;
            let mut entries = self.entries.write().await;
            let entry = entries.get_mut(&id).ok_or_else(|| PortError::not_found("LedgerEntry", id))?;
            *entry = Booking {
                external_id: None,
                ..new.clone()
            };
            Ok(())
        }

        async fn delete_booking(&self, existing: &Booking) -> Result<(), PortError> {
            let id = Self::entry_id(existing)?;
            self.record_write()?;
            self.entries
                .write()
                .await
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| PortError::not_found("LedgerEntry", id))
        }
    }

    /// Unique ids of all payments in a state, for assertions
    pub fn payment_unique_ids(state: &BillingState) -> HashSet<String> {
        state.payments.values().map(|p| p.unique_id.clone()).collect()
    }
}
