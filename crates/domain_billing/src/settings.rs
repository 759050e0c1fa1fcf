//! Billing settings and the account plan
//!
//! Settings are passed explicitly to every component that needs them; there
//! is no global settings lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use core_kernel::{ItemTypeId, MemberId, Rate};

use crate::bill::BillItemRef;
use crate::billable::ItemKind;

/// Ledger accounts used when generating bookings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPlan {
    /// Revenue account per subscription item type
    #[serde(default)]
    pub subscription_types: HashMap<ItemTypeId, String>,
    /// Revenue account per extra-subscription category
    #[serde(default)]
    pub extra_categories: HashMap<String, String>,
    /// Cost-center account per member
    #[serde(default)]
    pub members: HashMap<MemberId, String>,
}

impl AccountPlan {
    /// Creates an empty account plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the revenue account of a subscription type
    pub fn with_subscription_type(mut self, id: ItemTypeId, account: impl Into<String>) -> Self {
        self.subscription_types.insert(id, account.into());
        self
    }

    /// Assigns the revenue account of an extra-subscription category
    pub fn with_extra_category(mut self, category: impl Into<String>, account: impl Into<String>) -> Self {
        self.extra_categories.insert(category.into(), account.into());
        self
    }

    /// Assigns the cost-center account of a member
    pub fn with_member(mut self, id: MemberId, account: impl Into<String>) -> Self {
        self.members.insert(id, account.into());
        self
    }

    /// Resolves the credit account for a bill item
    ///
    /// Returns an empty string when no account is configured.
    pub fn credit_account(&self, reference: &BillItemRef) -> String {
        let account = match reference {
            BillItemRef::Billable { item_type_id, kind, .. } => match kind {
                ItemKind::Subscription => self.subscription_types.get(item_type_id),
                ItemKind::ExtraSubscription { category } => self.extra_categories.get(category),
            },
            BillItemRef::Custom(custom) => Some(&custom.account),
            BillItemRef::Unlinked => None,
        };
        account.cloned().unwrap_or_default()
    }

    /// Cost-center account of a member, empty when unassigned
    pub fn member_account(&self, id: MemberId) -> String {
        self.members.get(&id).cloned().unwrap_or_default()
    }
}

/// Organization-wide billing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSettings {
    /// Receivables account debited by bills and credited by payments
    pub debtor_account: String,
    /// VAT rate snapshotted onto new bills
    pub default_vat_rate: Rate,
    /// Revenue and member accounts
    #[serde(default)]
    pub accounts: AccountPlan,
}

impl BillingSettings {
    pub fn new(debtor_account: impl Into<String>, default_vat_rate: Rate) -> Self {
        Self {
            debtor_account: debtor_account.into(),
            default_vat_rate,
            accounts: AccountPlan::default(),
        }
    }

    pub fn with_accounts(mut self, accounts: AccountPlan) -> Self {
        self.accounts = accounts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::CustomItemType;
    use core_kernel::{BillableItemId, CustomItemTypeId};

    fn plan() -> AccountPlan {
        AccountPlan::new()
            .with_subscription_type(ItemTypeId::new(1), "3001")
            .with_extra_category("Eggs", "3010")
            .with_member(MemberId::new(4321), "4321")
    }

    #[test]
    fn test_credit_account_by_reference_kind() {
        let plan = plan();

        let subscription = BillItemRef::Billable {
            item_id: BillableItemId::new(1),
            item_type_id: ItemTypeId::new(1),
            kind: ItemKind::Subscription,
        };
        assert_eq!(plan.credit_account(&subscription), "3001");

        let extra = BillItemRef::Billable {
            item_id: BillableItemId::new(2),
            item_type_id: ItemTypeId::new(2),
            kind: ItemKind::ExtraSubscription { category: "Eggs".to_string() },
        };
        assert_eq!(plan.credit_account(&extra), "3010");

        let custom = BillItemRef::Custom(CustomItemType::new(CustomItemTypeId::new(1), "Donation", "2211"));
        assert_eq!(plan.credit_account(&custom), "2211");
    }

    #[test]
    fn test_missing_accounts_resolve_to_empty() {
        let plan = plan();

        let unknown_type = BillItemRef::Billable {
            item_id: BillableItemId::new(1),
            item_type_id: ItemTypeId::new(99),
            kind: ItemKind::Subscription,
        };
        assert_eq!(plan.credit_account(&unknown_type), "");
        assert_eq!(plan.credit_account(&BillItemRef::Unlinked), "");
        assert_eq!(plan.member_account(MemberId::new(1)), "");
        assert_eq!(plan.member_account(MemberId::new(4321)), "4321");
    }
}
