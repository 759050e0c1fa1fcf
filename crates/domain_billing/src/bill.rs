//! Bills, bill items and business years
//!
//! A bill belongs to one member and one business year. Its amount, the VAT
//! share of each item and the paid flag are derived values; they are only
//! updated through the explicit `recompute_*` / `refresh_paid` calls made by
//! the aggregator and the payment processor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{
    BillId, BillItemId, BillableItemId, BusinessYearId, CustomItemTypeId, DateRange,
    ItemTypeId, MemberId, Money, Rate,
};

use crate::billable::{BillableItem, ItemKind};
use crate::error::BillingError;

/// A fiscal period scoping one billing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessYear {
    pub id: BusinessYearId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BusinessYear {
    /// Creates a business year
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Validation` unless `end_date > start_date`.
    pub fn new(
        id: BusinessYearId,
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, BillingError> {
        let name = name.into();
        if end_date <= start_date {
            return Err(BillingError::Validation(format!(
                "Business year {name} must end after {start_date}"
            )));
        }
        Ok(Self { id, name, start_date, end_date })
    }

    /// The days covered by this year
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// A non-subscription bill item type (donations, fees, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomItemType {
    pub id: CustomItemTypeId,
    pub name: String,
    /// Revenue account credited by items of this type
    pub account: String,
}

impl CustomItemType {
    pub fn new(id: CustomItemTypeId, name: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            account: account.into(),
        }
    }
}

/// What a bill item was created from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillItemRef {
    /// A subscription part or extra subscription
    Billable {
        item_id: BillableItemId,
        item_type_id: ItemTypeId,
        kind: ItemKind,
    },
    /// A manually added item
    Custom(CustomItemType),
    /// An item without any reference
    Unlinked,
}

impl BillItemRef {
    /// Reference to a billable item
    pub fn billable(item: &BillableItem) -> Self {
        BillItemRef::Billable {
            item_id: item.id,
            item_type_id: item.item_type.id,
            kind: item.item_type.kind.clone(),
        }
    }

    /// Returns true for items produced from subscription parts
    pub fn is_billable(&self) -> bool {
        matches!(self, BillItemRef::Billable { .. })
    }

    /// The billable item this reference points to, if any
    pub fn billable_item_id(&self) -> Option<BillableItemId> {
        match self {
            BillItemRef::Billable { item_id, .. } => Some(*item_id),
            _ => None,
        }
    }

    /// Human-readable kind of the item; empty for unlinked items
    pub fn kind_label(&self) -> String {
        match self {
            BillItemRef::Billable { kind, .. } => kind.label().to_string(),
            BillItemRef::Custom(custom) => custom.name.clone(),
            BillItemRef::Unlinked => String::new(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            BillItemRef::Billable { kind, .. } => kind.rank(),
            BillItemRef::Custom(_) => 2,
            BillItemRef::Unlinked => 3,
        }
    }
}

/// VAT included in an item amount
///
/// Only subscription-linked items carry VAT; the rate is inclusive.
pub fn vat_for(reference: &BillItemRef, amount: Money, rate: Rate) -> Money {
    if reference.is_billable() {
        rate.included_in(&amount)
    } else {
        Money::zero()
    }
}

/// A bill item that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBillItem {
    pub reference: BillItemRef,
    pub description: String,
    pub amount: Money,
    pub vat_amount: Money,
}

impl NewBillItem {
    /// Creates an item draft with its VAT share computed at `rate`
    pub fn new(reference: BillItemRef, description: impl Into<String>, amount: Money, rate: Rate) -> Self {
        let vat_amount = vat_for(&reference, amount, rate);
        Self {
            reference,
            description: description.into(),
            amount,
            vat_amount,
        }
    }
}

/// A stored bill item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub id: BillItemId,
    pub bill_id: BillId,
    pub reference: BillItemRef,
    pub description: String,
    pub amount: Money,
    pub vat_amount: Money,
}

impl BillItem {
    /// Combines a draft with its assigned identifiers
    pub fn from_new(id: BillItemId, bill_id: BillId, item: NewBillItem) -> Self {
        Self {
            id,
            bill_id,
            reference: item.reference,
            description: item.description,
            amount: item.amount,
            vat_amount: item.vat_amount,
        }
    }

    /// Recomputes the included VAT at the given rate
    pub fn recompute_vat(&mut self, rate: Rate) {
        self.vat_amount = vat_for(&self.reference, self.amount, rate);
    }

    pub fn item_kind(&self) -> String {
        self.reference.kind_label()
    }
}

/// A bill that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBill {
    pub member_id: MemberId,
    pub business_year_id: BusinessYearId,
    pub bill_date: NaiveDate,
    pub booking_date: NaiveDate,
    pub vat_rate: Rate,
}

/// An invoice for one member and business year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub member_id: MemberId,
    pub business_year_id: BusinessYearId,
    pub bill_date: NaiveDate,
    /// Date the bill is booked on, never before the year start
    pub booking_date: NaiveDate,
    /// VAT rate at the time the bill was created
    pub vat_rate: Rate,
    /// Sum of all item amounts
    pub amount: Money,
    pub published: bool,
    pub paid: bool,
    pub notification_sent: bool,
    pub public_notes: Option<String>,
    pub private_notes: Option<String>,
    pub items: Vec<BillItem>,
}

impl Bill {
    /// Creates an empty, unpublished bill from a stored draft
    pub fn from_new(id: BillId, bill: NewBill) -> Self {
        Self {
            id,
            member_id: bill.member_id,
            business_year_id: bill.business_year_id,
            bill_date: bill.bill_date,
            booking_date: bill.booking_date,
            vat_rate: bill.vat_rate,
            amount: Money::zero(),
            published: false,
            paid: false,
            notification_sent: false,
            public_notes: None,
            private_notes: None,
            items: Vec::new(),
        }
    }

    /// Sets the amount to the sum of all items
    pub fn recompute_amount(&mut self) {
        self.amount = self.items.iter().map(|item| item.amount).sum();
    }

    /// Recomputes the paid flag from the payments recorded against the bill
    ///
    /// A bill is paid once the payments cover its amount.
    pub fn refresh_paid(&mut self, payments: &[Money]) {
        let paid: Money = payments.iter().sum();
        self.paid = paid >= self.amount;
    }

    /// Items sorted subscription, extra subscription, custom, unlinked
    pub fn ordered_items(&self) -> Vec<&BillItem> {
        let mut items: Vec<&BillItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.reference.rank());
        items
    }

    /// Distinct item kinds in display order, e.g. "Subscription, Extra subscription"
    pub fn item_kinds(&self) -> String {
        let mut kinds: Vec<String> = Vec::new();
        for item in self.ordered_items() {
            let kind = item.item_kind();
            if !kind.is_empty() && !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds.join(", ")
    }

    /// Billable items already on this bill
    pub fn billable_item_ids(&self) -> impl Iterator<Item = BillableItemId> + '_ {
        self.items.iter().filter_map(|item| item.reference.billable_item_id())
    }

    /// Total VAT over all items
    pub fn vat_amount(&self) -> Money {
        self.items.iter().map(|item| item.vat_amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bill() -> Bill {
        Bill::from_new(
            BillId::new(1),
            NewBill {
                member_id: MemberId::new(1),
                business_year_id: BusinessYearId::new(1),
                bill_date: d(2018, 1, 1),
                booking_date: d(2018, 1, 1),
                vat_rate: Rate::new(dec!(0.025)),
            },
        )
    }

    fn push(bill: &mut Bill, id: i64, reference: BillItemRef, amount: Money) {
        let item = NewBillItem::new(reference, "item", amount, bill.vat_rate);
        bill.items.push(BillItem::from_new(BillItemId::new(id), bill.id, item));
    }

    fn subscription_ref() -> BillItemRef {
        BillItemRef::Billable {
            item_id: BillableItemId::new(1),
            item_type_id: ItemTypeId::new(1),
            kind: ItemKind::Subscription,
        }
    }

    fn extra_ref() -> BillItemRef {
        BillItemRef::Billable {
            item_id: BillableItemId::new(2),
            item_type_id: ItemTypeId::new(2),
            kind: ItemKind::ExtraSubscription { category: "Eggs".to_string() },
        }
    }

    #[test]
    fn test_business_year_requires_end_after_start() {
        assert!(BusinessYear::new(BusinessYearId::new(1), "2018", d(2018, 1, 1), d(2018, 12, 31)).is_ok());
        assert!(BusinessYear::new(BusinessYearId::new(1), "2018", d(2018, 1, 1), d(2018, 1, 1)).is_err());
    }

    #[test]
    fn test_vat_only_on_subscription_items() {
        let mut bill = bill();
        push(&mut bill, 1, subscription_ref(), Money::new(dec!(1200)));
        let custom = CustomItemType::new(CustomItemTypeId::new(1), "Donation", "2211");
        push(&mut bill, 2, BillItemRef::Custom(custom), Money::new(dec!(200)));

        assert_eq!(bill.items[0].vat_amount.amount(), dec!(29.27));
        assert!(bill.items[1].vat_amount.is_zero());
        assert_eq!(bill.vat_amount().amount(), dec!(29.27));
    }

    #[test]
    fn test_recompute_amount() {
        let mut bill = bill();
        push(&mut bill, 1, subscription_ref(), Money::new(dec!(1200)));
        push(&mut bill, 2, extra_ref(), Money::new(dec!(300)));
        bill.recompute_amount();
        assert_eq!(bill.amount.amount(), dec!(1500));
    }

    #[test]
    fn test_refresh_paid() {
        let mut bill = bill();
        push(&mut bill, 1, subscription_ref(), Money::new(dec!(1200)));
        bill.recompute_amount();

        bill.refresh_paid(&[Money::new(dec!(500))]);
        assert!(!bill.paid);

        bill.refresh_paid(&[Money::new(dec!(500)), Money::new(dec!(700))]);
        assert!(bill.paid);
    }

    #[test]
    fn test_ordered_items_and_kinds() {
        let mut bill = bill();
        push(&mut bill, 1, BillItemRef::Unlinked, Money::new(dec!(100)));
        let custom = CustomItemType::new(CustomItemTypeId::new(1), "Custom", "2211");
        push(&mut bill, 2, BillItemRef::Custom(custom), Money::new(dec!(200)));
        push(&mut bill, 3, extra_ref(), Money::new(dec!(300)));
        push(&mut bill, 4, subscription_ref(), Money::new(dec!(1200)));

        let kinds: Vec<String> = bill.ordered_items().iter().map(|i| i.item_kind()).collect();
        assert_eq!(kinds, vec!["Subscription", "Extra subscription", "Custom", ""]);
        assert_eq!(bill.item_kinds(), "Subscription, Extra subscription, Custom");
    }

    #[test]
    fn test_item_reference_serialization() {
        let json = serde_json::to_value(subscription_ref()).unwrap();
        assert_eq!(json["type"], "billable");
        assert_eq!(json["item_id"], 1);

        let back: BillItemRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, subscription_ref());
    }

    #[test]
    fn test_billable_item_ids() {
        let mut bill = bill();
        push(&mut bill, 1, subscription_ref(), Money::new(dec!(1200)));
        push(&mut bill, 2, BillItemRef::Unlinked, Money::new(dec!(10)));
        let ids: Vec<_> = bill.billable_item_ids().collect();
        assert_eq!(ids, vec![BillableItemId::new(1)]);
    }
}
