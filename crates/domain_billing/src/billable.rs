//! Members and the things they can be billed for
//!
//! A billable item is a subscription part or an extra subscription. Both are
//! activated and deactivated per member; what differs is how their price is
//! defined, which is captured by [`Pricing`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{BillableItemId, DateRange, ItemTypeId, MemberId, Money, SubscriptionId};
use core_kernel::temporal::resolve_month_day;

use crate::error::BillingError;

/// A member of the organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub first_name: String,
    pub last_name: String,
}

impl Member {
    pub fn new(id: MemberId, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Name as printed on bookings ("First Last")
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

/// A priced sub-interval of a calendar year
///
/// Boundaries are month/day pairs and are resolved against a concrete year
/// when prices are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub name: String,
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
    pub price: Money,
}

impl BillingPeriod {
    /// Creates a billing period
    ///
    /// # Arguments
    ///
    /// * `name` - Display name, e.g. "Summer"
    /// * `start` - (month, day) of the first day
    /// * `end` - (month, day) of the last day, not before `start`
    /// * `price` - Price of the full period
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Validation` if a boundary is not a calendar
    /// day or the period ends before it starts.
    pub fn new(
        name: impl Into<String>,
        start: (u32, u32),
        end: (u32, u32),
        price: Money,
    ) -> Result<Self, BillingError> {
        let name = name.into();
        let invalid = |problem: &str| BillingError::Validation(format!("Billing period {name} {problem}"));

        // 2000 is a leap year, so Feb 29 is accepted here
        let first = resolve_month_day(2000, start.0, start.1).map_err(|_| invalid("has an invalid start"))?;
        let last = resolve_month_day(2000, end.0, end.1).map_err(|_| invalid("has an invalid end"))?;
        if last < first {
            return Err(invalid("ends before it starts"));
        }

        Ok(Self {
            name,
            start_month: start.0,
            start_day: start.1,
            end_month: end.0,
            end_day: end.1,
            price,
        })
    }

    /// Resolves the period against a calendar year
    pub fn resolve(&self, year: i32) -> Result<DateRange, BillingError> {
        let start = resolve_month_day(year, self.start_month, self.start_day)?;
        let end = resolve_month_day(year, self.end_month, self.end_day)?;
        Ok(DateRange::new(start, end)?)
    }
}

/// How the price of an item type is defined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pricing {
    /// A fixed price per business year
    Fixed { price: Money },
    /// Priced billing periods within the calendar year
    Periods { periods: Vec<BillingPeriod> },
}

/// Subscription part or extra subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    Subscription,
    ExtraSubscription { category: String },
}

impl ItemKind {
    /// Label used in booking texts and bill summaries
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Subscription => "Subscription",
            ItemKind::ExtraSubscription { .. } => "Extra subscription",
        }
    }

    /// Sort rank of the kind on printed bills
    pub(crate) fn rank(&self) -> u8 {
        match self {
            ItemKind::Subscription => 0,
            ItemKind::ExtraSubscription { .. } => 1,
        }
    }
}

/// A subscription type or extra-subscription type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: ItemTypeId,
    pub name: String,
    pub kind: ItemKind,
    pub pricing: Pricing,
}

impl ItemType {
    /// A subscription type with a fixed yearly price
    pub fn subscription(id: ItemTypeId, name: impl Into<String>, price: Money) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ItemKind::Subscription,
            pricing: Pricing::Fixed { price },
        }
    }

    /// An extra-subscription type priced by billing periods
    pub fn extra(
        id: ItemTypeId,
        name: impl Into<String>,
        category: impl Into<String>,
        periods: Vec<BillingPeriod>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ItemKind::ExtraSubscription { category: category.into() },
            pricing: Pricing::Periods { periods },
        }
    }
}

/// Something a member can be billed for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableItem {
    pub id: BillableItemId,
    pub subscription_id: SubscriptionId,
    /// Owner of the subscription the item belongs to
    pub member_id: MemberId,
    pub item_type: ItemType,
    pub activation_date: Option<NaiveDate>,
    pub deactivation_date: Option<NaiveDate>,
}

impl BillableItem {
    pub fn new(
        id: BillableItemId,
        subscription_id: SubscriptionId,
        member_id: MemberId,
        item_type: ItemType,
    ) -> Self {
        Self {
            id,
            subscription_id,
            member_id,
            item_type,
            activation_date: None,
            deactivation_date: None,
        }
    }

    pub fn activated(mut self, date: NaiveDate) -> Self {
        self.activation_date = Some(date);
        self
    }

    pub fn deactivated(mut self, date: NaiveDate) -> Self {
        self.deactivation_date = Some(date);
        self
    }

    /// Days on which the item is active; `None` if it was never activated
    pub fn active_range(&self) -> Option<DateRange> {
        let start = self.activation_date?;
        let range = DateRange::open(Some(start), self.deactivation_date);
        (range.start <= range.end).then_some(range)
    }

    /// Returns true if the item is active on at least one day of `range`
    pub fn is_active_during(&self, range: &DateRange) -> bool {
        self.active_range().is_some_and(|active| active.overlaps(range))
    }
}
