//! Strongly-typed identifiers for domain entities
//!
//! Identifiers are database sequence numbers. Bill and member ids are
//! embedded in payment reference numbers, so they stay plain integers;
//! the newtype wrappers only prevent mixing them up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(raw.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

// Membership
define_id!(MemberId, "MBR");
define_id!(SubscriptionId, "SUB");
define_id!(BillableItemId, "BIT");
define_id!(ItemTypeId, "TYP");

// Billing
define_id!(BusinessYearId, "BY");
define_id!(BillId, "BILL");
define_id!(BillItemId, "ITEM");
define_id!(CustomItemTypeId, "CIT");

// Payments
define_id!(PaymentId, "PAY");
define_id!(PaymentTypeId, "PTYP");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_id_display() {
        let id = BillId::new(42);
        assert_eq!(id.to_string(), "BILL-42");
    }

    #[test]
    fn test_id_parsing() {
        let original = MemberId::new(4321);
        let parsed: MemberId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);

        let bare: MemberId = "17".parse().unwrap();
        assert_eq!(bare.get(), 17);
    }

    #[test]
    fn test_raw_conversion() {
        let id = PaymentId::from(7);
        let back: i64 = id.into();
        assert_eq!(back, 7);
    }
}
