//! Bill creation and recalculation
//!
//! The aggregator turns billable items into bills: one bill per member and
//! business year, with one item per subscription part priced over the whole
//! year. Custom items added by the book-keeper survive recalculation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use core_kernel::{BillId, BillableItemId, CustomItemTypeId, MemberId, Money, Rate};

use crate::bill::{Bill, BillItemRef, BusinessYear, NewBill, NewBillItem};
use crate::billable::BillableItem;
use crate::error::BillingError;
use crate::payment::amount_paid;
use crate::ports::{BillingRepository, UnitOfWork};
use crate::proration::prorate;

/// An unpaid bill together with what has been paid so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBill {
    pub bill: Bill,
    pub amount_paid: Money,
}

/// Creates, recalculates and publishes bills
pub struct BillAggregator {
    repository: Arc<dyn BillingRepository>,
}

impl BillAggregator {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }

    /// Creates a bill for billable items of a single member
    ///
    /// # Arguments
    ///
    /// * `items` - Billable items, all owned by the same member
    /// * `year` - The business year being billed
    /// * `bill_date` - Date printed on the bill
    /// * `vat_rate` - VAT rate snapshotted onto the bill
    ///
    /// # Returns
    ///
    /// The stored bill. Its booking date is the bill date, but never before
    /// the start of the business year.
    ///
    /// # Errors
    ///
    /// * `NoBillableItems` - `items` is empty
    /// * `MixedMember` - the items belong to more than one member
    pub async fn create_bill(
        &self,
        items: &[BillableItem],
        year: &BusinessYear,
        bill_date: NaiveDate,
        vat_rate: Rate,
    ) -> Result<Bill, BillingError> {
        let member_id = single_member(items)?;
        let draft = NewBill {
            member_id,
            business_year_id: year.id,
            bill_date,
            booking_date: year.start_date.max(bill_date),
            vat_rate,
        };

        let mut uow = self.repository.begin().await?;
        let mut bill = uow.insert_bill(draft).await?;
        apply_items(uow.as_mut(), &mut bill, items, year).await?;
        uow.commit().await?;

        info!(bill_id = %bill.id, member_id = %member_id, amount = %bill.amount, "Bill created");
        Ok(bill)
    }

    /// Replaces the subscription-linked items of a bill
    ///
    /// Custom items are kept. Each item is priced over the bill's whole
    /// business year and the bill amount is recomputed.
    pub async fn update_bill_items(&self, bill_id: BillId, items: &[BillableItem]) -> Result<Bill, BillingError> {
        let mut bill = self
            .repository
            .bill(bill_id)
            .await
            .map_err(BillingError::bill_lookup(bill_id))?;
        if let Some(other) = items.iter().find(|item| item.member_id != bill.member_id) {
            return Err(BillingError::MixedMember(vec![bill.member_id, other.member_id]));
        }
        let year = self.year_of(&bill).await?;

        let mut uow = self.repository.begin().await?;
        apply_items(uow.as_mut(), &mut bill, items, &year).await?;
        uow.commit().await?;
        Ok(bill)
    }

    /// Recalculates a bill from the member's current billable items
    ///
    /// Items already billed on another bill of the same year are left out.
    /// Running it twice without changes in between yields the same bill.
    pub async fn recalc_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        let mut bill = self
            .repository
            .bill(bill_id)
            .await
            .map_err(BillingError::bill_lookup(bill_id))?;
        let year = self.year_of(&bill).await?;

        let candidates = self
            .repository
            .member_billable_items(bill.member_id, year.range())
            .await?;
        let claimed: HashSet<BillableItemId> = self
            .repository
            .bills_for_year(year.id)
            .await?
            .iter()
            .filter(|other| other.id != bill.id)
            .flat_map(|other| other.billable_item_ids().collect::<Vec<_>>())
            .collect();
        let targets: Vec<BillableItem> = candidates
            .into_iter()
            .filter(|item| !claimed.contains(&item.id))
            .collect();

        let previous = bill.amount;
        let mut uow = self.repository.begin().await?;
        apply_items(uow.as_mut(), &mut bill, &targets, &year).await?;
        uow.commit().await?;

        info!(bill_id = %bill.id, previous = %previous, amount = %bill.amount, "Bill recalculated");
        Ok(bill)
    }

    /// Items active during the year that are not on any bill of the year
    pub async fn billable_items(&self, year: &BusinessYear) -> Result<Vec<BillableItem>, BillingError> {
        let active = self.repository.billable_items(year.range()).await?;
        let billed: HashSet<BillableItemId> = self
            .repository
            .bills_for_year(year.id)
            .await?
            .iter()
            .flat_map(|bill| bill.billable_item_ids().collect::<Vec<_>>())
            .collect();

        Ok(active.into_iter().filter(|item| !billed.contains(&item.id)).collect())
    }

    /// Creates one bill per member for the given items
    ///
    /// Bills are created with the default VAT rate from the settings, each
    /// in its own unit of work.
    pub async fn create_bills_for_items(
        &self,
        items: &[BillableItem],
        year: &BusinessYear,
        bill_date: NaiveDate,
    ) -> Result<Vec<Bill>, BillingError> {
        let settings = self.repository.settings().await?;

        let mut per_member: BTreeMap<MemberId, Vec<BillableItem>> = BTreeMap::new();
        for item in items {
            per_member.entry(item.member_id).or_default().push(item.clone());
        }

        let mut bills = Vec::with_capacity(per_member.len());
        for member_items in per_member.values() {
            bills.push(
                self.create_bill(member_items, year, bill_date, settings.default_vat_rate)
                    .await?,
            );
        }

        info!(year = %year.name, bills = bills.len(), "Billing run complete");
        Ok(bills)
    }

    /// Marks bills as published
    ///
    /// # Returns
    ///
    /// The number of bills that were not published before
    pub async fn publish_bills(&self, ids: &[BillId]) -> Result<usize, BillingError> {
        let mut uow = self.repository.begin().await?;
        let mut published = 0;
        for &id in ids {
            let mut bill = uow.bill(id).await.map_err(BillingError::bill_lookup(id))?;
            if !bill.published {
                bill.published = true;
                uow.update_bill(&bill).await?;
                published += 1;
            }
        }
        uow.commit().await?;

        info!(requested = ids.len(), published, "Bills published");
        Ok(published)
    }

    /// Unpaid bills of a year whose paid share is below a threshold
    ///
    /// # Arguments
    ///
    /// * `year` - The business year
    /// * `expected_percentage_paid` - Bills with a smaller paid percentage
    ///   are open; 100 lists every bill not fully paid
    pub async fn open_bills(
        &self,
        year: &BusinessYear,
        expected_percentage_paid: Decimal,
    ) -> Result<Vec<OpenBill>, BillingError> {
        let bills = self.repository.bills_for_year(year.id).await?;
        let mut open = Vec::new();
        for bill in bills.into_iter().filter(|b| !b.paid && b.amount.is_positive()) {
            let payments = self.repository.payments_for_bill(bill.id).await?;
            let paid = amount_paid(&payments);
            let percentage = paid.amount() / bill.amount.amount() * Decimal::ONE_HUNDRED;
            if percentage < expected_percentage_paid {
                open.push(OpenBill { bill, amount_paid: paid });
            }
        }
        Ok(open)
    }

    /// Adds a custom item to a bill
    ///
    /// Custom items carry no VAT.
    pub async fn add_custom_item(
        &self,
        bill_id: BillId,
        item_type: CustomItemTypeId,
        description: &str,
        amount: Money,
    ) -> Result<Bill, BillingError> {
        let custom = self.repository.custom_item_type(item_type).await?;

        let mut uow = self.repository.begin().await?;
        let mut bill = uow.bill(bill_id).await.map_err(BillingError::bill_lookup(bill_id))?;
        let draft = NewBillItem::new(BillItemRef::Custom(custom), description, amount, bill.vat_rate);
        let item = uow.insert_bill_item(bill.id, draft).await?;
        bill.items.push(item);
        bill.recompute_amount();
        uow.update_bill(&bill).await?;
        uow.commit().await?;

        debug!(bill_id = %bill.id, amount = %bill.amount, "Custom item added");
        Ok(bill)
    }

    async fn year_of(&self, bill: &Bill) -> Result<BusinessYear, BillingError> {
        self.repository
            .business_year(bill.business_year_id)
            .await
            .map_err(BillingError::year_lookup(bill.business_year_id))
    }
}

/// The owner of all items, or an error if there is none or several
fn single_member(items: &[BillableItem]) -> Result<MemberId, BillingError> {
    let members: BTreeSet<MemberId> = items.iter().map(|item| item.member_id).collect();
    let mut iter = members.iter();
    match (iter.next(), iter.next()) {
        (None, _) => Err(BillingError::NoBillableItems),
        (Some(&member), None) => Ok(member),
        _ => Err(BillingError::MixedMember(members.into_iter().collect())),
    }
}

/// Prices `items` over the year and stores them as the bill's billable items
async fn apply_items(
    uow: &mut dyn UnitOfWork,
    bill: &mut Bill,
    items: &[BillableItem],
    year: &BusinessYear,
) -> Result<(), BillingError> {
    let mut drafts = Vec::with_capacity(items.len());
    for item in items {
        let amount = prorate(item, year.start_date, year.end_date)?;
        drafts.push(NewBillItem::new(
            BillItemRef::billable(item),
            item.item_type.name.clone(),
            amount,
            bill.vat_rate,
        ));
    }

    let created = uow.replace_billable_items(bill.id, drafts).await?;
    bill.items.retain(|item| !item.reference.is_billable());
    bill.items.extend(created);
    bill.recompute_amount();

    let payments = uow.payments_for_bill(bill.id).await?;
    if !payments.is_empty() {
        bill.refresh_paid(&payments.iter().map(|p| p.amount).collect::<Vec<_>>());
    }
    uow.update_bill(bill).await?;

    debug!(bill_id = %bill.id, items = bill.items.len(), amount = %bill.amount, "Bill items updated");
    Ok(())
}
