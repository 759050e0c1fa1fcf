//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for the billing domain. The data
//! describes one small cooperative in business year 2018:
//!
//! | Member          | Items                                   | Yearly amount |
//! |-----------------|-----------------------------------------|---------------|
//! | Michael Test    | Vegetables (full year), Eggs (full year) | 1500.00      |
//! | Anna Amsel      | Vegetables from July 1st                 | 604.95       |

use std::sync::Arc;

use chrono::NaiveDate;
use core_kernel::{
    BillableItemId, BusinessYearId, CustomItemTypeId, ItemTypeId, MemberId, Money, PaymentTypeId, Rate,
    SubscriptionId,
};
use domain_billing::ports::mock::InMemoryBillingRepository;
use domain_billing::{
    AccountPlan, BillableItem, BillingPeriod, BillingRepository, BillingSettings, BusinessYear, CustomItemType,
    ItemType, Member, PaymentType,
};
use rust_decimal_macros::dec;

/// Fixture for calendar dates
pub struct DateFixtures;

impl DateFixtures {
    /// First day of business year 2018
    pub fn year_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
    }

    /// Last day of business year 2018
    pub fn year_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 12, 31).unwrap()
    }

    /// Date printed on bills of the standard billing run
    pub fn bill_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 1, 15).unwrap()
    }

    /// Start of the second half of the year
    pub fn mid_year() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, 1).unwrap()
    }

    /// Standard payment date
    pub fn payment_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 3, 1).unwrap()
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    pub fn michael() -> MemberId {
        MemberId::new(1)
    }

    pub fn anna() -> MemberId {
        MemberId::new(2)
    }

    /// A member id that is not in the fixture world
    pub fn unknown_member() -> MemberId {
        MemberId::new(99)
    }

    pub fn year_2018() -> BusinessYearId {
        BusinessYearId::new(1)
    }

    pub fn vegetables() -> ItemTypeId {
        ItemTypeId::new(1)
    }

    pub fn eggs() -> ItemTypeId {
        ItemTypeId::new(2)
    }

    pub fn bank_account() -> PaymentTypeId {
        PaymentTypeId::new(1)
    }

    pub fn donation() -> CustomItemTypeId {
        CustomItemTypeId::new(1)
    }
}

/// Fixture for ledger accounts and bank accounts
pub struct AccountFixtures;

impl AccountFixtures {
    /// Receivables
    pub fn debtor() -> &'static str {
        "1100"
    }

    /// Bank account debited by payments
    pub fn bank() -> &'static str {
        "1010"
    }

    pub fn vegetables_revenue() -> &'static str {
        "3001"
    }

    pub fn eggs_revenue() -> &'static str {
        "3010"
    }

    pub fn donations() -> &'static str {
        "3900"
    }

    /// Cost-center account of Michael
    pub fn michael_cost_center() -> &'static str {
        "4001"
    }

    /// IBAN payments are received on
    pub fn iban() -> &'static str {
        "CH44 3199 9123 0008 8901 2"
    }

    /// An IBAN without payment type
    pub fn foreign_iban() -> &'static str {
        "CH93 0076 2011 6238 5295 7"
    }
}

/// Fixture for billing reference data
pub struct BillingFixtures;

impl BillingFixtures {
    /// Standard VAT rate (2.5%, included in prices)
    pub fn vat_rate() -> Rate {
        Rate::new(dec!(0.025))
    }

    pub fn settings() -> BillingSettings {
        let accounts = AccountPlan::new()
            .with_subscription_type(IdFixtures::vegetables(), AccountFixtures::vegetables_revenue())
            .with_extra_category("Eggs", AccountFixtures::eggs_revenue())
            .with_member(IdFixtures::michael(), AccountFixtures::michael_cost_center());
        BillingSettings::new(AccountFixtures::debtor(), Self::vat_rate()).with_accounts(accounts)
    }

    pub fn business_year() -> BusinessYear {
        BusinessYear::new(
            IdFixtures::year_2018(),
            "2018",
            DateFixtures::year_start(),
            DateFixtures::year_end(),
        )
        .unwrap()
    }

    pub fn michael() -> Member {
        Member::new(IdFixtures::michael(), "Michael", "Test")
    }

    pub fn anna() -> Member {
        Member::new(IdFixtures::anna(), "Anna", "Amsel")
    }

    /// Vegetable subscription at 1200 per year
    pub fn vegetables() -> ItemType {
        ItemType::subscription(IdFixtures::vegetables(), "Vegetables", Money::new(dec!(1200)))
    }

    /// Eggs extra subscription: 100 for the first half, 200 for the second
    pub fn eggs() -> ItemType {
        ItemType::extra(
            IdFixtures::eggs(),
            "Eggs",
            "Eggs",
            vec![
                BillingPeriod::new("First half", (1, 1), (6, 30), Money::new(dec!(100))).unwrap(),
                BillingPeriod::new("Second half", (7, 1), (12, 31), Money::new(dec!(200))).unwrap(),
            ],
        )
    }

    pub fn payment_type() -> PaymentType {
        PaymentType::new(IdFixtures::bank_account(), "Bank", AccountFixtures::iban(), AccountFixtures::bank())
    }

    pub fn donation() -> CustomItemType {
        CustomItemType::new(IdFixtures::donation(), "Donation", AccountFixtures::donations())
    }

    /// Billable items of the fixture world
    pub fn billable_items() -> Vec<BillableItem> {
        vec![
            BillableItem::new(
                BillableItemId::new(1),
                SubscriptionId::new(1),
                IdFixtures::michael(),
                Self::vegetables(),
            )
            .activated(DateFixtures::year_start()),
            BillableItem::new(BillableItemId::new(2), SubscriptionId::new(1), IdFixtures::michael(), Self::eggs())
                .activated(DateFixtures::year_start()),
            BillableItem::new(
                BillableItemId::new(3),
                SubscriptionId::new(2),
                IdFixtures::anna(),
                Self::vegetables(),
            )
            .activated(DateFixtures::mid_year()),
        ]
    }
}

/// An in-memory repository seeded with the fixture data
pub struct BillingWorld {
    pub repository: Arc<InMemoryBillingRepository>,
    pub year: BusinessYear,
}

impl BillingWorld {
    /// Repository with members, year, accounts and billable items, but no bills
    pub async fn seeded() -> Self {
        let repository = Arc::new(InMemoryBillingRepository::with_settings(BillingFixtures::settings()));
        repository.add_member(BillingFixtures::michael()).await;
        repository.add_member(BillingFixtures::anna()).await;
        repository.add_business_year(BillingFixtures::business_year()).await;
        repository.add_payment_type(BillingFixtures::payment_type()).await;
        repository.add_custom_item_type(BillingFixtures::donation()).await;
        for item in BillingFixtures::billable_items() {
            repository.add_billable_item(item).await;
        }

        Self {
            repository,
            year: BillingFixtures::business_year(),
        }
    }

    /// The repository behind the port trait, as services take it
    pub fn port(&self) -> Arc<dyn BillingRepository> {
        self.repository.clone()
    }
}
