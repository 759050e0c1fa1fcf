//! Ledger synchronization
//!
//! Exporting bookings must be repeatable: running the export twice over the
//! same data must not duplicate anything in the ledger. Instead of
//! remembering what was exported, every run compares the freshly generated
//! bookings with the bookings found in the ledger and only applies the
//! difference.
//!
//! Bookings are matched by document number, which the ledger keeps in the
//! entry description as `"<text> jb:<docnumber>"`.
//!
//! Document numbers that occur more than once among the generated bookings
//! cannot be matched reliably. They are reported as conflicts and their
//! ledger entries are left untouched until the collision is resolved.
//!
//! The ledger offers no transactions. A failing call stops the run; the
//! outcome reports how far it got so the next run can finish the job.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::booking::{Booking, BookingGenerator};
use crate::error::BillingError;
use crate::ports::LedgerPort;

static DESCRIPTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+) jb:(\d+)$").expect("hardcoded regex should be valid"));

/// Entry description carrying the booking text and its document number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerDescription {
    pub text: String,
    pub doc_number: String,
}

impl LedgerDescription {
    pub fn new(text: impl Into<String>, doc_number: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            doc_number: doc_number.into(),
        }
    }

    /// Description of a booking
    pub fn of(booking: &Booking) -> Self {
        Self::new(booking.text.clone(), booking.doc_number.clone())
    }

    /// Parses a description; `None` for entries not created by this system
    pub fn parse(description: &str) -> Option<Self> {
        let captures = DESCRIPTION_PATTERN.captures(description.trim_end())?;
        Some(Self::new(&captures[1], &captures[2]))
    }
}

impl std::fmt::Display for LedgerDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} jb:{}", self.text, self.doc_number)
    }
}

/// Options controlling how bookings are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Treat bookings differing only in their VAT amount as changed
    #[serde(default)]
    pub compare_vat: bool,
}

/// Number of ledger changes per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Changes needed to bring the ledger in line with the generated bookings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub creates: Vec<Booking>,
    /// Pairs of (existing, replacement)
    pub updates: Vec<(Booking, Booking)>,
    pub deletes: Vec<Booking>,
    /// Document numbers shared by several generated bookings
    pub conflicts: Vec<String>,
}

impl SyncPlan {
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            created: self.creates.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

/// Computes the ledger changes for a set of generated bookings
///
/// * A generated booking whose document number exists but whose content
///   differs replaces the existing one. If the new booking has the same
///   debit and credit account it cannot be stored, so the existing entry is
///   deleted instead.
/// * A generated booking without counterpart is created, unless debit and
///   credit are the same account.
/// * Existing bookings without generated counterpart are deleted.
/// * Document numbers generated more than once are only reported in
///   `conflicts`; neither side is created, updated or deleted for them.
pub fn plan_sync(existing: &[Booking], generated: &[Booking], options: SyncOptions) -> SyncPlan {
    let mut seen = HashMap::new();
    for booking in generated {
        *seen.entry(booking.doc_number.as_str()).or_insert(0usize) += 1;
    }
    let conflicts: BTreeSet<&str> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(doc, _)| doc)
        .collect();

    let mut by_doc: HashMap<&str, &Booking> = HashMap::new();
    let mut surplus = Vec::new();
    for booking in existing {
        if conflicts.contains(booking.doc_number.as_str()) {
            continue;
        }
        if by_doc.contains_key(booking.doc_number.as_str()) {
            surplus.push(booking.clone());
        } else {
            by_doc.insert(booking.doc_number.as_str(), booking);
        }
    }

    let mut plan = SyncPlan {
        conflicts: conflicts.iter().map(|doc| doc.to_string()).collect(),
        ..SyncPlan::default()
    };
    for new in generated.iter().filter(|b| !conflicts.contains(b.doc_number.as_str())) {
        match by_doc.remove(new.doc_number.as_str()) {
            Some(old) if old.same_content(new, options.compare_vat) => {}
            Some(old) if new.is_self_balancing() => plan.deletes.push(old.clone()),
            Some(old) => plan.updates.push((old.clone(), new.clone())),
            None if new.is_self_balancing() => {}
            None => plan.creates.push(new.clone()),
        }
    }

    // What remains has no generated counterpart
    let mut orphans: Vec<Booking> = by_doc.into_values().cloned().collect();
    orphans.sort_by(|a, b| a.doc_number.cmp(&b.doc_number));
    plan.deletes.extend(orphans);
    plan.deletes.extend(surplus);
    plan
}

/// A ledger call that failed during execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub operation: String,
    pub doc_number: String,
    pub message: String,
}

/// Result of a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Changes applied to the ledger
    pub achieved: SyncCounts,
    /// Changes the run intended to apply
    pub planned: SyncCounts,
    /// The call that stopped the run, if any
    pub failure: Option<SyncFailure>,
    /// Document numbers skipped because several bookings share them
    pub conflicts: Vec<String>,
}

impl SyncOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Synchronizes generated bookings into the external ledger
pub struct LedgerSync {
    generator: BookingGenerator,
    ledger: Arc<dyn LedgerPort>,
    options: SyncOptions,
}

impl LedgerSync {
    pub fn new(generator: BookingGenerator, ledger: Arc<dyn LedgerPort>, options: SyncOptions) -> Self {
        Self {
            generator,
            ledger,
            options,
        }
    }

    /// Brings the ledger in line with all bookings of `[from, till]`
    ///
    /// # Errors
    ///
    /// Failures while generating bookings or listing the ledger are returned
    /// as errors. Failures while applying changes end the run and are
    /// reported in the outcome.
    #[instrument(skip(self))]
    pub async fn sync(&self, from: NaiveDate, till: NaiveDate) -> Result<SyncOutcome, BillingError> {
        let generated = self.generator.bookings(from, till).await?;
        let existing = self.ledger.existing_bookings(from, till).await?;
        let plan = plan_sync(&existing, &generated, self.options);

        info!(
            existing = existing.len(),
            generated = generated.len(),
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            deletes = plan.deletes.len(),
            "Planned ledger sync"
        );

        Ok(self.execute(plan).await)
    }

    /// Applies a plan, stopping at the first failing call
    pub async fn execute(&self, plan: SyncPlan) -> SyncOutcome {
        let planned = plan.counts();
        if !plan.conflicts.is_empty() {
            warn!(
                doc_numbers = ?plan.conflicts,
                "Duplicate document numbers left out of the ledger sync"
            );
        }
        let mut achieved = SyncCounts::default();

        let failure = 'run: {
            for (old, new) in &plan.updates {
                if let Err(e) = self.ledger.update_booking(old, new).await {
                    break 'run Some(failed("update", new, e));
                }
                achieved.updated += 1;
            }
            for new in &plan.creates {
                if let Err(e) = self.ledger.create_booking(new).await {
                    break 'run Some(failed("create", new, e));
                }
                achieved.created += 1;
            }
            for old in &plan.deletes {
                if let Err(e) = self.ledger.delete_booking(old).await {
                    break 'run Some(failed("delete", old, e));
                }
                achieved.deleted += 1;
            }
            None
        };

        if let Some(f) = &failure {
            warn!(
                operation = %f.operation,
                doc_number = %f.doc_number,
                error = %f.message,
                done = achieved.total(),
                planned = planned.total(),
                "Ledger sync stopped"
            );
        } else {
            info!(
                created = achieved.created,
                updated = achieved.updated,
                deleted = achieved.deleted,
                "Ledger sync complete"
            );
        }

        SyncOutcome {
            achieved,
            planned,
            failure,
            conflicts: plan.conflicts,
        }
    }
}

fn failed(operation: &str, booking: &Booking, error: core_kernel::PortError) -> SyncFailure {
    SyncFailure {
        operation: operation.to_string(),
        doc_number: booking.doc_number.clone(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Money;
    use rust_decimal_macros::dec;

    fn booking(doc: &str, amount: rust_decimal::Decimal) -> Booking {
        Booking {
            date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            doc_number: doc.to_string(),
            text: format!("Bill {doc}"),
            debit_account: "1100".to_string(),
            credit_account: "3001".to_string(),
            amount: Money::new(amount),
            vat_amount: Money::zero(),
            member_account: String::new(),
            external_id: None,
        }
    }

    #[test]
    fn test_colliding_doc_numbers_are_reported_not_churned() {
        let first = booking("500021", dec!(100));
        let mut second = booking("500021", dec!(250));
        second.text = "Bill 2: Subscription".to_string();
        let other = booking("500031", dec!(50));
        let generated = vec![first, second, other];

        let fresh = plan_sync(&[], &generated, SyncOptions::default());
        assert_eq!(fresh.counts(), SyncCounts { created: 1, updated: 0, deleted: 0 });
        assert_eq!(fresh.conflicts, vec!["500021".to_string()]);

        let rerun = plan_sync(&generated, &generated, SyncOptions::default());
        assert!(rerun.is_empty());
        assert_eq!(rerun.conflicts, vec!["500021".to_string()]);
    }

    #[test]
    fn test_description_round_trip() {
        let description = LedgerDescription::new("Bill 1: Subscription Michael Test", "500011");
        let text = description.to_string();
        assert_eq!(text, "Bill 1: Subscription Michael Test jb:500011");
        assert_eq!(LedgerDescription::parse(&text), Some(description));
    }

    #[test]
    fn test_foreign_descriptions_are_ignored() {
        assert!(LedgerDescription::parse("Rent January").is_none());
        assert!(LedgerDescription::parse("jb:500011").is_none());
        assert!(LedgerDescription::parse("Bill jb:50a011").is_none());
    }

    #[test]
    fn test_plan_against_empty_ledger_creates_everything() {
        let generated = vec![booking("500011", dec!(100)), booking("600001", dec!(50))];
        let plan = plan_sync(&[], &generated, SyncOptions::default());
        assert_eq!(plan.counts(), SyncCounts { created: 2, updated: 0, deleted: 0 });
    }

    #[test]
    fn test_plan_is_empty_for_identical_sets() {
        let generated = vec![booking("500011", dec!(100)), booking("600001", dec!(50))];
        assert!(plan_sync(&generated, &generated, SyncOptions::default()).is_empty());
    }

    #[test]
    fn test_plan_updates_changed_and_deletes_orphans() {
        let existing = vec![booking("500011", dec!(100)), booking("500021", dec!(10))];
        let generated = vec![booking("500011", dec!(120))];

        let plan = plan_sync(&existing, &generated, SyncOptions::default());
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].1.amount.amount(), dec!(120));
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].doc_number, "500021");
        assert!(plan.creates.is_empty());
    }

    #[test]
    fn test_self_balancing_bookings() {
        let mut balanced = booking("500011", dec!(100));
        balanced.credit_account = balanced.debit_account.clone();

        // never created
        assert!(plan_sync(&[], &[balanced.clone()], SyncOptions::default()).is_empty());

        // existing entry is deleted rather than updated
        let plan = plan_sync(&[booking("500011", dec!(100))], &[balanced], SyncOptions::default());
        assert_eq!(plan.counts(), SyncCounts { created: 0, updated: 0, deleted: 1 });
    }

    #[test]
    fn test_vat_comparison_is_optional() {
        let existing = vec![booking("500011", dec!(100))];
        let mut changed = booking("500011", dec!(100));
        changed.vat_amount = Money::new(dec!(2.44));

        assert!(plan_sync(&existing, &[changed.clone()], SyncOptions::default()).is_empty());
        let plan = plan_sync(&existing, &[changed], SyncOptions { compare_vat: true });
        assert_eq!(plan.updates.len(), 1);
    }

    #[test]
    fn test_duplicate_ledger_entries_are_removed() {
        let existing = vec![booking("500011", dec!(100)), booking("500011", dec!(100))];
        let generated = vec![booking("500011", dec!(100))];
        let plan = plan_sync(&existing, &generated, SyncOptions::default());
        assert_eq!(plan.counts(), SyncCounts { created: 0, updated: 0, deleted: 1 });
    }
}
