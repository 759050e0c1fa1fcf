//! Database rows and their conversion into domain values
//!
//! Rows mirror the columns selected by the repository queries one to one.
//! Conversion never touches the database, so it is tested without one.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;

use core_kernel::{
    BillId, BillItemId, BillableItemId, BusinessYearId, CustomItemTypeId, ItemTypeId, MemberId, Money,
    PaymentId, PaymentTypeId, Rate, SubscriptionId,
};
use domain_billing::{
    AccountPlan, Bill, BillItem, BillItemRef, BillableItem, BillingSettings, BusinessYear, CustomItemType,
    ItemKind, ItemType, Member, Payment, PaymentType, Pricing,
};

use crate::error::DatabaseError;

pub(crate) const KIND_SUBSCRIPTION: &str = "subscription";
pub(crate) const KIND_EXTRA: &str = "extra_subscription";

#[derive(Debug, Clone, FromRow)]
pub struct SettingsRow {
    pub debtor_account: String,
    pub default_vat_rate: Decimal,
    pub account_plan: Json<AccountPlan>,
}

impl From<SettingsRow> for BillingSettings {
    fn from(row: SettingsRow) -> Self {
        BillingSettings::new(row.debtor_account, Rate::new(row.default_vat_rate)).with_accounts(row.account_plan.0)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member::new(MemberId::new(row.id), row.first_name, row.last_name)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BusinessYearRow {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TryFrom<BusinessYearRow> for BusinessYear {
    type Error = DatabaseError;

    fn try_from(row: BusinessYearRow) -> Result<Self, Self::Error> {
        BusinessYear::new(BusinessYearId::new(row.id), row.name, row.start_date, row.end_date)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomItemTypeRow {
    pub id: i64,
    pub name: String,
    pub account: String,
}

impl From<CustomItemTypeRow> for CustomItemType {
    fn from(row: CustomItemTypeRow) -> Self {
        CustomItemType::new(CustomItemTypeId::new(row.id), row.name, row.account)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentTypeRow {
    pub id: i64,
    pub name: String,
    pub iban: String,
    pub account: String,
}

impl From<PaymentTypeRow> for PaymentType {
    fn from(row: PaymentTypeRow) -> Self {
        PaymentType::new(PaymentTypeId::new(row.id), row.name, row.iban, row.account)
    }
}

/// Maps the `kind` and `category` columns of an item type
pub(crate) fn item_kind(kind: &str, category: Option<String>) -> Result<ItemKind, DatabaseError> {
    match (kind, category) {
        (KIND_SUBSCRIPTION, _) => Ok(ItemKind::Subscription),
        (KIND_EXTRA, Some(category)) => Ok(ItemKind::ExtraSubscription { category }),
        (KIND_EXTRA, None) => Err(DatabaseError::SerializationError(
            "Extra subscription type without category".to_string(),
        )),
        (other, _) => Err(DatabaseError::SerializationError(format!("Unknown item kind '{other}'"))),
    }
}

/// A billable item joined with its item type
#[derive(Debug, Clone, FromRow)]
pub struct BillableItemRow {
    pub id: i64,
    pub subscription_id: i64,
    pub member_id: i64,
    pub activation_date: Option<NaiveDate>,
    pub deactivation_date: Option<NaiveDate>,
    pub item_type_id: i64,
    pub item_type_name: String,
    pub kind: String,
    pub category: Option<String>,
    pub pricing: Json<Pricing>,
}

impl TryFrom<BillableItemRow> for BillableItem {
    type Error = DatabaseError;

    fn try_from(row: BillableItemRow) -> Result<Self, Self::Error> {
        let item_type = ItemType {
            id: ItemTypeId::new(row.item_type_id),
            name: row.item_type_name,
            kind: item_kind(&row.kind, row.category)?,
            pricing: row.pricing.0,
        };
        Ok(BillableItem {
            id: BillableItemId::new(row.id),
            subscription_id: SubscriptionId::new(row.subscription_id),
            member_id: MemberId::new(row.member_id),
            item_type,
            activation_date: row.activation_date,
            deactivation_date: row.deactivation_date,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BillRow {
    pub id: i64,
    pub member_id: i64,
    pub business_year_id: i64,
    pub bill_date: NaiveDate,
    pub booking_date: NaiveDate,
    pub vat_rate: Decimal,
    pub amount: Decimal,
    pub published: bool,
    pub paid: bool,
    pub notification_sent: bool,
    pub public_notes: Option<String>,
    pub private_notes: Option<String>,
}

impl BillRow {
    /// Combines the bill header with its items
    pub fn into_bill(self, items: Vec<BillItem>) -> Bill {
        Bill {
            id: BillId::new(self.id),
            member_id: MemberId::new(self.member_id),
            business_year_id: BusinessYearId::new(self.business_year_id),
            bill_date: self.bill_date,
            booking_date: self.booking_date,
            vat_rate: Rate::new(self.vat_rate),
            amount: Money::new(self.amount),
            published: self.published,
            paid: self.paid,
            notification_sent: self.notification_sent,
            public_notes: self.public_notes,
            private_notes: self.private_notes,
            items,
        }
    }
}

/// A bill item joined with whatever it references
#[derive(Debug, Clone, FromRow)]
pub struct BillItemRow {
    pub id: i64,
    pub bill_id: i64,
    pub description: String,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub billable_item_id: Option<i64>,
    pub item_type_id: Option<i64>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub custom_type_id: Option<i64>,
    pub custom_type_name: Option<String>,
    pub custom_type_account: Option<String>,
}

impl BillItemRow {
    fn reference(&mut self) -> Result<BillItemRef, DatabaseError> {
        if let (Some(item_id), Some(item_type_id), Some(kind)) =
            (self.billable_item_id, self.item_type_id, self.kind.take())
        {
            return Ok(BillItemRef::Billable {
                item_id: BillableItemId::new(item_id),
                item_type_id: ItemTypeId::new(item_type_id),
                kind: item_kind(&kind, self.category.take())?,
            });
        }
        if let Some(id) = self.custom_type_id {
            return Ok(BillItemRef::Custom(CustomItemType::new(
                CustomItemTypeId::new(id),
                self.custom_type_name.take().unwrap_or_default(),
                self.custom_type_account.take().unwrap_or_default(),
            )));
        }
        Ok(BillItemRef::Unlinked)
    }
}

impl TryFrom<BillItemRow> for BillItem {
    type Error = DatabaseError;

    fn try_from(mut row: BillItemRow) -> Result<Self, Self::Error> {
        let reference = row.reference()?;
        Ok(BillItem {
            id: BillItemId::new(row.id),
            bill_id: BillId::new(row.bill_id),
            reference,
            description: row.description,
            amount: Money::new(row.amount),
            vat_amount: Money::new(row.vat_amount),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub bill_id: i64,
    pub payment_type_id: i64,
    pub amount: Decimal,
    pub paid_date: NaiveDate,
    pub unique_id: String,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: PaymentId::new(row.id),
            bill_id: BillId::new(row.bill_id),
            payment_type_id: PaymentTypeId::new(row.payment_type_id),
            amount: Money::new(row.amount),
            paid_date: row.paid_date,
            unique_id: row.unique_id,
        }
    }
}

/// Columns written for a bill item reference: (billable item, custom type)
pub(crate) fn reference_columns(reference: &BillItemRef) -> (Option<i64>, Option<i64>) {
    match reference {
        BillItemRef::Billable { item_id, .. } => (Some(item_id.get()), None),
        BillItemRef::Custom(custom) => (None, Some(custom.id.get())),
        BillItemRef::Unlinked => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item_row() -> BillItemRow {
        BillItemRow {
            id: 7,
            bill_id: 3,
            description: "Vegetables".to_string(),
            amount: dec!(1200),
            vat_amount: dec!(29.27),
            billable_item_id: None,
            item_type_id: None,
            kind: None,
            category: None,
            custom_type_id: None,
            custom_type_name: None,
            custom_type_account: None,
        }
    }

    #[test]
    fn test_item_kind_mapping() {
        assert_eq!(item_kind("subscription", None).unwrap(), ItemKind::Subscription);
        assert_eq!(
            item_kind("extra_subscription", Some("Eggs".to_string())).unwrap(),
            ItemKind::ExtraSubscription { category: "Eggs".to_string() }
        );
        assert!(item_kind("extra_subscription", None).is_err());
        assert!(item_kind("share", None).is_err());
    }

    #[test]
    fn test_billable_bill_item() {
        let row = BillItemRow {
            billable_item_id: Some(11),
            item_type_id: Some(2),
            kind: Some("extra_subscription".to_string()),
            category: Some("Eggs".to_string()),
            ..item_row()
        };
        let item = BillItem::try_from(row).unwrap();
        assert_eq!(item.id, BillItemId::new(7));
        assert_eq!(item.reference.billable_item_id(), Some(BillableItemId::new(11)));
        assert_eq!(item.item_kind(), "Extra subscription");
        assert_eq!(item.vat_amount.amount(), dec!(29.27));
    }

    #[test]
    fn test_custom_and_unlinked_bill_items() {
        let row = BillItemRow {
            custom_type_id: Some(1),
            custom_type_name: Some("Donation".to_string()),
            custom_type_account: Some("3900".to_string()),
            ..item_row()
        };
        let item = BillItem::try_from(row).unwrap();
        assert!(matches!(&item.reference, BillItemRef::Custom(c) if c.account == "3900"));

        let item = BillItem::try_from(item_row()).unwrap();
        assert_eq!(item.reference, BillItemRef::Unlinked);
    }

    #[test]
    fn test_reference_columns() {
        let custom = BillItemRef::Custom(CustomItemType::new(CustomItemTypeId::new(4), "Fee", "3900"));
        assert_eq!(reference_columns(&custom), (None, Some(4)));
        assert_eq!(reference_columns(&BillItemRef::Unlinked), (None, None));
    }

    #[test]
    fn test_invalid_business_year_row() {
        let row = BusinessYearRow {
            id: 1,
            name: "2018".to_string(),
            start_date: NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        };
        assert!(BusinessYear::try_from(row).is_err());
    }

    #[test]
    fn test_bill_row_conversion() {
        let row = BillRow {
            id: 3,
            member_id: 4321,
            business_year_id: 1,
            bill_date: NaiveDate::from_ymd_opt(2018, 1, 15).unwrap(),
            booking_date: NaiveDate::from_ymd_opt(2018, 1, 15).unwrap(),
            vat_rate: dec!(0.025),
            amount: dec!(1200),
            published: true,
            paid: false,
            notification_sent: false,
            public_notes: None,
            private_notes: Some("called".to_string()),
        };
        let bill = row.into_bill(vec![BillItem::try_from(item_row()).unwrap()]);
        assert_eq!(bill.member_id, MemberId::new(4321));
        assert_eq!(bill.vat_rate, Rate::new(dec!(0.025)));
        assert_eq!(bill.items.len(), 1);
        assert!(bill.published);
    }
}
