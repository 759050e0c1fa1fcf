//! Booking generation and ledger synchronization

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{BillId, BillItemId, Money, Rate};
use domain_billing::ports::mock::InMemoryLedger;
use domain_billing::{
    Bill, BillAggregator, BillItem, BillItemRef, NewBillItem, BookingGenerator, LedgerPort, LedgerSync, PaymentProcessor, SyncCounts, SyncOptions,
};
use test_utils::*;

/// Bills for everyone plus one payment of Michael over 1500
async fn billed_and_paid_world() -> (BillingWorld, Vec<Bill>) {
    let world = BillingWorld::seeded().await;
    let aggregator = BillAggregator::new(world.port());
    let items = aggregator.billable_items(&world.year).await.unwrap();
    let bills = aggregator
        .create_bills_for_items(&items, &world.year, DateFixtures::bill_date())
        .await
        .unwrap();

    let michael = bills.iter().find(|b| b.member_id == IdFixtures::michael()).unwrap();
    let record = PaymentRecordBuilder::for_bill(IdFixtures::michael(), michael.id)
        .with_amount(dec!(1500))
        .build();
    PaymentProcessor::new(world.port()).process_payments(&[record]).await.unwrap();

    (world, bills)
}

fn sync_for(world: &BillingWorld, ledger: Arc<InMemoryLedger>) -> LedgerSync {
    LedgerSync::new(BookingGenerator::new(world.port()), ledger, SyncOptions::default())
}

// ============================================================================
// Booking Generation Tests
// ============================================================================

mod booking_tests {
    use super::*;

    #[tokio::test]
    async fn test_bookings_for_bills_and_payments() {
        let (world, bills) = billed_and_paid_world().await;
        let michael = bills.iter().find(|b| b.member_id == IdFixtures::michael()).unwrap();

        let bookings = BookingGenerator::new(world.port())
            .bookings(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        assert_eq!(bookings.len(), 4);
        assert_unique_doc_numbers(&bookings);

        let vegetables = &bookings[0];
        assert_eq!(vegetables.doc_number, (500_000 + michael.id.get() * 10 + 1).to_string());
        assert_eq!(vegetables.text, format!("Bill {}: Subscription Michael Test", michael.id.get()));
        assert_eq!(vegetables.debit_account, AccountFixtures::debtor());
        assert_eq!(vegetables.credit_account, AccountFixtures::vegetables_revenue());
        assert_eq!(vegetables.member_account, AccountFixtures::michael_cost_center());
        assert_eq!(vegetables.date, DateFixtures::bill_date());

        let eggs = &bookings[1];
        assert_eq!(eggs.credit_account, AccountFixtures::eggs_revenue());
        assert_money_eq(eggs.vat_amount, dec!(7.32));

        let payment = bookings.last().unwrap();
        assert!(payment.doc_number.starts_with('6'));
        assert_eq!(
            payment.text,
            format!("Payment Bill {}: Subscription, Extra subscription Michael Test", michael.id.get())
        );
        assert_eq!(payment.debit_account, AccountFixtures::bank());
        assert_eq!(payment.credit_account, AccountFixtures::debtor());
        assert_money_eq(payment.amount, dec!(1500));
    }

    #[tokio::test]
    async fn test_range_filters_by_booking_and_paid_date() {
        let (world, _) = billed_and_paid_world().await;
        let generator = BookingGenerator::new(world.port());

        let january = generator
            .bookings(DateFixtures::year_start(), NaiveDate::from_ymd_opt(2018, 1, 31).unwrap())
            .await
            .unwrap();
        assert_eq!(january.len(), 3);

        let march = generator
            .bookings(DateFixtures::payment_date(), DateFixtures::payment_date())
            .await
            .unwrap();
        assert_eq!(march.len(), 1);
    }
}

// ============================================================================
// Sync Tests
// ============================================================================

mod sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_colliding_doc_numbers_are_skipped_on_every_run() {
        let world = BillingWorld::seeded().await;

        // Bill 10000 numbers its first item 600001, like payment 1
        let mut bill = BillBuilder::new().with_id(10_000).with_amount(dec!(30)).build();
        for (id, fee) in [(1, dec!(20)), (2, dec!(10))] {
            let item = NewBillItem::new(BillItemRef::Unlinked, "Late fee", Money::new(fee), Rate::zero());
            bill.items.push(BillItem::from_new(BillItemId::new(id), bill.id, item));
        }
        world.repository.put_bill(bill).await;
        world
            .repository
            .put_payment(stored_payment(1, BillId::new(10_000), dec!(30), DateFixtures::payment_date()))
            .await;

        let ledger = Arc::new(InMemoryLedger::new());
        let sync = sync_for(&world, ledger.clone());

        let first = sync.sync(DateFixtures::year_start(), DateFixtures::year_end()).await.unwrap();
        assert!(first.is_complete());
        assert_eq!(first.achieved, SyncCounts { created: 1, updated: 0, deleted: 0 });
        assert_eq!(first.conflicts, vec!["600001".to_string()]);

        let second = sync.sync(DateFixtures::year_start(), DateFixtures::year_end()).await.unwrap();
        assert_eq!(second.planned.total(), 0);
        assert_eq!(second.conflicts, vec!["600001".to_string()]);
        assert_eq!(ledger.write_count(), 1);
        assert_eq!(ledger.bookings().await[0].doc_number, "600002");
    }

    #[tokio::test]
    async fn test_first_sync_creates_and_second_is_a_no_op() {
        let (world, _) = billed_and_paid_world().await;
        let ledger = Arc::new(InMemoryLedger::new());
        let sync = sync_for(&world, ledger.clone());

        let first = sync.sync(DateFixtures::year_start(), DateFixtures::year_end()).await.unwrap();
        assert!(first.is_complete());
        assert_eq!(first.achieved, SyncCounts { created: 4, updated: 0, deleted: 0 });

        let second = sync.sync(DateFixtures::year_start(), DateFixtures::year_end()).await.unwrap();
        assert_eq!(second.planned.total(), 0);
        assert_eq!(ledger.write_count(), 4);

        let expected = BookingGenerator::new(world.port())
            .bookings(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        assert_ledger_matches(&ledger.bookings().await, &expected);
    }

    #[tokio::test]
    async fn test_changed_bill_is_updated_in_place() {
        let (world, bills) = billed_and_paid_world().await;
        let ledger = Arc::new(InMemoryLedger::new());
        let sync = sync_for(&world, ledger.clone());
        sync.sync(DateFixtures::year_start(), DateFixtures::year_end()).await.unwrap();

        let eggs = BillingFixtures::billable_items()[1]
            .clone()
            .deactivated(NaiveDate::from_ymd_opt(2018, 6, 30).unwrap());
        world.repository.update_billable_item(eggs).await;
        let michael = bills.iter().find(|b| b.member_id == IdFixtures::michael()).unwrap();
        BillAggregator::new(world.port()).recalc_bill(michael.id).await.unwrap();

        let outcome = sync.sync(DateFixtures::year_start(), DateFixtures::year_end()).await.unwrap();
        // Item ids change on recalc, positions and document numbers do not
        assert_eq!(outcome.achieved, SyncCounts { created: 0, updated: 1, deleted: 0 });
        assert_eq!(ledger.bookings().await.len(), 4);
    }

    #[tokio::test]
    async fn test_orphans_are_deleted() {
        let (world, _) = billed_and_paid_world().await;
        let ledger = Arc::new(InMemoryLedger::new());
        let generated = BookingGenerator::new(world.port())
            .bookings(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();

        let mut orphan = generated[0].clone();
        orphan.doc_number = "599991".to_string();
        ledger.seed(orphan).await;

        let outcome = sync_for(&world, ledger.clone())
            .sync(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        assert_eq!(outcome.achieved, SyncCounts { created: 4, updated: 0, deleted: 1 });
        assert_ledger_matches(&ledger.bookings().await, &generated);
    }

    #[tokio::test]
    async fn test_changed_content_is_updated() {
        let (world, _) = billed_and_paid_world().await;
        let ledger = Arc::new(InMemoryLedger::new());
        let generated = BookingGenerator::new(world.port())
            .bookings(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();

        for booking in &generated {
            let mut stale = booking.clone();
            stale.text = format!("{} (old)", booking.text);
            ledger.seed(stale).await;
        }

        let outcome = sync_for(&world, ledger.clone())
            .sync(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        assert_eq!(outcome.achieved, SyncCounts { created: 0, updated: 4, deleted: 0 });
        assert_ledger_matches(&ledger.bookings().await, &generated);
    }

    #[tokio::test]
    async fn test_interrupted_sync_resumes() {
        let (world, _) = billed_and_paid_world().await;
        let failing = Arc::new(InMemoryLedger::failing_after(2));

        let interrupted = sync_for(&world, failing.clone())
            .sync(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        assert!(!interrupted.is_complete());
        assert_eq!(interrupted.achieved.total(), 2);
        assert_eq!(interrupted.planned.total(), 4);
        assert_eq!(interrupted.failure.as_ref().unwrap().operation, "create");

        // Same ledger content, now reachable again
        let recovered = Arc::new(InMemoryLedger::new());
        for booking in failing.bookings().await {
            recovered.seed(booking).await;
        }

        let resumed = sync_for(&world, recovered.clone())
            .sync(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        assert!(resumed.is_complete());
        assert_eq!(resumed.achieved, SyncCounts { created: 2, updated: 0, deleted: 0 });

        let expected = BookingGenerator::new(world.port())
            .bookings(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        let stored = recovered
            .existing_bookings(DateFixtures::year_start(), DateFixtures::year_end())
            .await
            .unwrap();
        assert_ledger_matches(&stored, &expected);
    }
}
