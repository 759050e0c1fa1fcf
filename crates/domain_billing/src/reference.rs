//! Payment reference numbers
//!
//! Bills are printed with a 27-digit numeric reference that the bank passes
//! back with each payment. The last digit is a modulo-10 recursive check
//! digit over all preceding digits.
//!
//! Two layouts exist:
//!
//! ```text
//! structured  MMMMMMMMMMMMMMMM BBBBBBBBBB C    member(16) bill(10) check
//! legacy      TT IIIIIIIIIIII BBBBBBBBBBBB C   type(2) billable(12) bill(12) check
//! ```
//!
//! Printed references are grouped with spaces; decoding strips them first.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{BillId, MemberId};

/// Total length of an encoded reference
pub const REFERENCE_LENGTH: usize = 27;

const MEMBER_WIDTH: usize = 16;
const BILL_WIDTH: usize = 10;
const LEGACY_ID_WIDTH: usize = 12;

const CHECK_TABLE: [u8; 10] = [0, 9, 4, 6, 8, 2, 7, 1, 3, 5];

/// Errors raised while encoding or decoding references
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("check digit does not match")]
    InvalidChecksum,

    #[error("reference has {actual} digits, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("reference contains non-numeric characters")]
    NonNumeric,

    #[error("{field} {value} does not fit into {width} digits")]
    IdTooWide {
        field: &'static str,
        value: i64,
        width: usize,
    },

    #[error("unknown reference type code {0}")]
    UnknownType(String),
}

/// Computes the modulo-10 recursive check digit of a digit string
///
/// # Errors
///
/// Returns `ReferenceError::NonNumeric` if `digits` contains anything but
/// ASCII digits.
pub fn check_digit(digits: &str) -> Result<u8, ReferenceError> {
    let mut carry = 0u8;
    for c in digits.chars() {
        let digit = c.to_digit(10).ok_or(ReferenceError::NonNumeric)? as u8;
        carry = CHECK_TABLE[((carry + digit) % 10) as usize];
    }
    Ok((10 - carry) % 10)
}

/// Removes the grouping spaces of a printed reference
pub fn compact(reference: &str) -> String {
    reference.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Groups a reference for printing: two digits, then blocks of five
pub fn format_grouped(reference: &str) -> String {
    let compact = compact(reference);
    let split = compact.len().min(2);
    let (head, tail) = compact.split_at(split);

    let mut out = head.to_string();
    for chunk in tail.as_bytes().chunks(5) {
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}

/// Validates digits and check digit, returning the payload without the check digit
fn verify(reference: &str) -> Result<String, ReferenceError> {
    let compact = compact(reference);
    if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReferenceError::NonNumeric);
    }
    let (payload, check) = compact.split_at(compact.len() - 1);
    if check_digit(payload)?.to_string() != check {
        return Err(ReferenceError::InvalidChecksum);
    }
    Ok(payload.to_string())
}

fn pad(field: &'static str, value: i64, width: usize) -> Result<String, ReferenceError> {
    let digits = value.to_string();
    if value < 0 || digits.len() > width {
        return Err(ReferenceError::IdTooWide { field, value, width });
    }
    Ok(format!("{value:0>width$}"))
}

fn parse_id(digits: &str) -> Result<i64, ReferenceError> {
    digits.parse().map_err(|_| ReferenceError::NonNumeric)
}

fn with_check_digit(payload: String) -> Result<String, ReferenceError> {
    let check = check_digit(&payload)?;
    Ok(format!("{payload}{check}"))
}

/// Reference identifying a member and one of their bills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuredReference {
    pub member_id: MemberId,
    pub bill_id: BillId,
}

impl StructuredReference {
    pub fn new(member_id: MemberId, bill_id: BillId) -> Self {
        Self { member_id, bill_id }
    }

    /// Encodes the reference as 27 digits
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::IdTooWide` if the member id needs more than
    /// 16 digits or the bill id more than 10, or if either is negative.
    pub fn encode(&self) -> Result<String, ReferenceError> {
        let member = pad("member id", self.member_id.get(), MEMBER_WIDTH)?;
        let bill = pad("bill id", self.bill_id.get(), BILL_WIDTH)?;
        with_check_digit(format!("{member}{bill}"))
    }

    /// Decodes a structured reference
    ///
    /// The check digit is validated first. The ten digits before it are the
    /// bill id; all digits preceding those are the member id.
    pub fn decode(reference: &str) -> Result<Self, ReferenceError> {
        let payload = verify(reference)?;
        let len = payload.len() + 1;
        if len <= BILL_WIDTH + 1 || len > REFERENCE_LENGTH {
            return Err(ReferenceError::InvalidLength {
                expected: REFERENCE_LENGTH,
                actual: len,
            });
        }
        let (member, bill) = payload.split_at(payload.len() - BILL_WIDTH);
        Ok(Self {
            member_id: MemberId::new(parse_id(member)?),
            bill_id: BillId::new(parse_id(bill)?),
        })
    }
}

/// Kind of item a legacy reference was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyKind {
    Other,
    Subscription,
    Share,
    ExtraSubscription,
}

impl LegacyKind {
    pub fn code(&self) -> &'static str {
        match self {
            LegacyKind::Other => "00",
            LegacyKind::Subscription => "01",
            LegacyKind::Share => "02",
            LegacyKind::ExtraSubscription => "03",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ReferenceError> {
        match code {
            "00" => Ok(LegacyKind::Other),
            "01" => Ok(LegacyKind::Subscription),
            "02" => Ok(LegacyKind::Share),
            "03" => Ok(LegacyKind::ExtraSubscription),
            other => Err(ReferenceError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for LegacyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Reference layout used before bills carried member ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegacyReference {
    pub kind: LegacyKind,
    pub billable_id: i64,
    pub bill_id: BillId,
}

impl LegacyReference {
    pub fn new(kind: LegacyKind, billable_id: i64, bill_id: BillId) -> Self {
        Self { kind, billable_id, bill_id }
    }

    pub fn encode(&self) -> Result<String, ReferenceError> {
        let billable = pad("billable id", self.billable_id, LEGACY_ID_WIDTH)?;
        let bill = pad("bill id", self.bill_id.get(), LEGACY_ID_WIDTH)?;
        with_check_digit(format!("{}{billable}{bill}", self.kind.code()))
    }

    pub fn decode(reference: &str) -> Result<Self, ReferenceError> {
        let payload = verify(reference)?;
        if payload.len() + 1 != REFERENCE_LENGTH {
            return Err(ReferenceError::InvalidLength {
                expected: REFERENCE_LENGTH,
                actual: payload.len() + 1,
            });
        }
        let (code, rest) = payload.split_at(2);
        let (billable, bill) = rest.split_at(LEGACY_ID_WIDTH);
        Ok(Self {
            kind: LegacyKind::from_code(code)?,
            billable_id: parse_id(billable)?,
            bill_id: BillId::new(parse_id(bill)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_digit() {
        assert_eq!(check_digit("00000000000043210000000001").unwrap(), 1);
        assert_eq!(check_digit("00000000000000010000000001").unwrap(), 0);
        assert_eq!(check_digit("00000000000000010000000005").unwrap(), 2);
        assert!(matches!(check_digit("12a"), Err(ReferenceError::NonNumeric)));
    }

    #[test]
    fn test_encode_structured() {
        let cases = [
            (4321, 1, "000000000000432100000000011"),
            (1, 1, "000000000000000100000000010"),
            (1, 5, "000000000000000100000000052"),
            (5678, 1234, "000000000000567800000012341"),
            (42, 7, "000000000000004200000000079"),
            (1, 2, "000000000000000100000000021"),
        ];
        for (member, bill, expected) in cases {
            let reference = StructuredReference::new(MemberId::new(member), BillId::new(bill));
            assert_eq!(reference.encode().unwrap(), expected);
            assert_eq!(StructuredReference::decode(expected).unwrap(), reference);
        }
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let result = StructuredReference::decode("000000000000432100000000012");
        assert_eq!(result, Err(ReferenceError::InvalidChecksum));
    }

    #[test]
    fn test_decode_grouped_reference() {
        let grouped = format_grouped("000000000000432100000000011");
        assert_eq!(grouped, "00 00000 00000 43210 00000 00011");
        let decoded = StructuredReference::decode(&grouped).unwrap();
        assert_eq!(decoded.member_id.get(), 4321);
        assert_eq!(decoded.bill_id.get(), 1);
    }

    #[test]
    fn test_decode_non_numeric() {
        assert_eq!(StructuredReference::decode("RF18 5390 0754 7034"), Err(ReferenceError::NonNumeric));
        assert_eq!(StructuredReference::decode(""), Err(ReferenceError::NonNumeric));
    }

    #[test]
    fn test_decode_too_short() {
        // valid check digit, but no room for a member id
        let short = with_check_digit("0000000001".to_string()).unwrap();
        assert!(matches!(
            StructuredReference::decode(&short),
            Err(ReferenceError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_ids_too_wide() {
        let reference = StructuredReference::new(MemberId::new(1), BillId::new(12_345_678_901));
        assert!(matches!(reference.encode(), Err(ReferenceError::IdTooWide { field: "bill id", .. })));

        let reference = StructuredReference::new(MemberId::new(-1), BillId::new(1));
        assert!(matches!(reference.encode(), Err(ReferenceError::IdTooWide { field: "member id", .. })));
    }

    #[test]
    fn test_legacy_reference() {
        let reference = LegacyReference::new(LegacyKind::Subscription, 17, BillId::new(3));
        let encoded = reference.encode().unwrap();
        assert_eq!(encoded, "010000000000170000000000035");
        assert_eq!(LegacyReference::decode(&encoded).unwrap(), reference);
    }

    #[test]
    fn test_legacy_unknown_type() {
        let encoded = with_check_digit(format!("09{}{}", "0".repeat(12), "0".repeat(12))).unwrap();
        assert_eq!(
            LegacyReference::decode(&encoded),
            Err(ReferenceError::UnknownType("09".to_string()))
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn structured_references_round_trip(
            member in 0i64..10_000_000_000_000_000,
            bill in 0i64..10_000_000_000,
        ) {
            let reference = StructuredReference::new(MemberId::new(member), BillId::new(bill));
            let encoded = reference.encode().unwrap();
            prop_assert_eq!(encoded.len(), REFERENCE_LENGTH);
            prop_assert_eq!(StructuredReference::decode(&encoded).unwrap(), reference);
        }

        #[test]
        fn single_digit_corruption_is_detected(
            member in 0i64..1_000_000,
            bill in 0i64..1_000_000,
            position in 0usize..REFERENCE_LENGTH,
            delta in 1u32..10,
        ) {
            let encoded = StructuredReference::new(MemberId::new(member), BillId::new(bill))
                .encode()
                .unwrap();
            let mut digits: Vec<u32> = encoded.chars().map(|c| c.to_digit(10).unwrap()).collect();
            digits[position] = (digits[position] + delta) % 10;
            let corrupted: String = digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();

            prop_assert_eq!(StructuredReference::decode(&corrupted), Err(ReferenceError::InvalidChecksum));
        }
    }
}
