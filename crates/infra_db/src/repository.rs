//! PostgreSQL implementation of the billing repository
//!
//! Reads run on a pooled connection; a [`PgUnitOfWork`] wraps one database
//! transaction. Both share the query functions at the bottom of this module,
//! which take a plain `&mut PgConnection`.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PgBillingRepository};
//! use domain_billing::BillAggregator;
//! use std::sync::Arc;
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/billing")).await?;
//! let aggregator = BillAggregator::new(Arc::new(PgBillingRepository::new(pool)));
//! ```

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use core_kernel::{
    BillId, BillItemId, BusinessYearId, CustomItemTypeId, DateRange, DomainPort,
    HealthCheckResult, HealthCheckable, MemberId, PaymentId, PortError,
};
use domain_billing::{
    Bill, BillItem, BillableItem, BillingRepository, BillingSettings, BusinessYear, CustomItemType, Member,
    NewBill, NewBillItem, NewPayment, Payment, PaymentType, UnitOfWork,
};

use crate::error::DatabaseError;
use crate::pool::DatabasePool;
use crate::rows::{
    reference_columns, BillItemRow, BillRow, BillableItemRow, BusinessYearRow, CustomItemTypeRow, MemberRow,
    PaymentRow, PaymentTypeRow, SettingsRow,
};

/// PostgreSQL-backed [`BillingRepository`]
///
/// # Error Handling
///
/// Database errors are translated to `PortError` variants:
/// - missing rows -> `PortError::NotFound`
/// - unique violations -> `PortError::Duplicate`
/// - connection and pool failures -> transient errors
#[derive(Debug, Clone)]
pub struct PgBillingRepository {
    pool: DatabasePool,
}

impl PgBillingRepository {
    /// Creates the repository on top of an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, PortError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| PortError::from(DatabaseError::from(e)))
    }
}

impl DomainPort for PgBillingRepository {}

#[async_trait]
impl HealthCheckable for PgBillingRepository {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy("postgres-billing", latency_ms),
            Err(e) => HealthCheckResult::unhealthy("postgres-billing", latency_ms, format!("Database error: {e}")),
        }
    }
}

#[async_trait]
impl BillingRepository for PgBillingRepository {
    #[instrument(skip(self))]
    async fn settings(&self) -> Result<BillingSettings, PortError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT debtor_account, default_vat_rate, account_plan FROM billing_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?
        .ok_or_else(|| DatabaseError::not_found("BillingSettings", 1))?;
        Ok(row.into())
    }

    async fn member(&self, id: MemberId) -> Result<Member, PortError> {
        let row = sqlx::query_as::<_, MemberRow>("SELECT id, first_name, last_name FROM members WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?
            .ok_or_else(|| DatabaseError::not_found("Member", id))?;
        Ok(row.into())
    }

    async fn members(&self) -> Result<Vec<Member>, PortError> {
        let rows = sqlx::query_as::<_, MemberRow>("SELECT id, first_name, last_name FROM members ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    async fn business_year(&self, id: BusinessYearId) -> Result<BusinessYear, PortError> {
        let row = sqlx::query_as::<_, BusinessYearRow>(
            "SELECT id, name, start_date, end_date FROM business_years WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?
        .ok_or_else(|| DatabaseError::not_found("BusinessYear", id))?;
        Ok(BusinessYear::try_from(row)?)
    }

    async fn business_years(&self) -> Result<Vec<BusinessYear>, PortError> {
        let rows = sqlx::query_as::<_, BusinessYearRow>(
            "SELECT id, name, start_date, end_date FROM business_years ORDER BY start_date",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        rows.into_iter()
            .map(|row| BusinessYear::try_from(row).map_err(PortError::from))
            .collect()
    }

    async fn custom_item_type(&self, id: CustomItemTypeId) -> Result<CustomItemType, PortError> {
        let row = sqlx::query_as::<_, CustomItemTypeRow>(
            "SELECT id, name, account FROM custom_item_types WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?
        .ok_or_else(|| DatabaseError::not_found("CustomItemType", id))?;
        Ok(row.into())
    }

    async fn payment_types(&self) -> Result<Vec<PaymentType>, PortError> {
        let rows = sqlx::query_as::<_, PaymentTypeRow>(
            "SELECT id, name, iban, account FROM payment_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(rows.into_iter().map(PaymentType::from).collect())
    }

    #[instrument(skip(self))]
    async fn billable_items(&self, range: DateRange) -> Result<Vec<BillableItem>, PortError> {
        let mut conn = self.connection().await?;
        Ok(fetch_billable_items(&mut conn, None, range).await?)
    }

    async fn member_billable_items(
        &self,
        member: MemberId,
        range: DateRange,
    ) -> Result<Vec<BillableItem>, PortError> {
        let mut conn = self.connection().await?;
        Ok(fetch_billable_items(&mut conn, Some(member), range).await?)
    }

    async fn bill(&self, id: BillId) -> Result<Bill, PortError> {
        let mut conn = self.connection().await?;
        Ok(fetch_bill(&mut conn, id).await?)
    }

    async fn bills_for_year(&self, year: BusinessYearId) -> Result<Vec<Bill>, PortError> {
        let mut conn = self.connection().await?;
        Ok(fetch_bills(&mut conn, BillFilter::Year(year)).await?)
    }

    async fn bills_for_member(&self, member: MemberId) -> Result<Vec<Bill>, PortError> {
        let mut conn = self.connection().await?;
        Ok(fetch_bills(&mut conn, BillFilter::Member(member)).await?)
    }

    #[instrument(skip(self))]
    async fn bills_booked_between(&self, range: DateRange) -> Result<Vec<Bill>, PortError> {
        let mut conn = self.connection().await?;
        Ok(fetch_bills(&mut conn, BillFilter::BookedBetween(range)).await?)
    }

    async fn payments_between(&self, range: DateRange) -> Result<Vec<Payment>, PortError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "{SELECT_PAYMENTS} WHERE ($1::date IS NULL OR paid_date >= $1) \
             AND ($2::date IS NULL OR paid_date <= $2) ORDER BY id"
        ))
        .bind(bound(range.start))
        .bind(bound(range.end))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(rows.into_iter().map(Payment::from).collect())
    }

    async fn payments_for_bill(&self, bill: BillId) -> Result<Vec<Payment>, PortError> {
        let mut conn = self.connection().await?;
        Ok(fetch_payments_for_bill(&mut conn, bill).await?)
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        debug!("Transaction started");
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// A unit of work backed by one PostgreSQL transaction
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_bill(&mut self, bill: NewBill) -> Result<Bill, PortError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bills (member_id, business_year_id, bill_date, booking_date, vat_rate)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(bill.member_id.get())
        .bind(bill.business_year_id.get())
        .bind(bill.bill_date)
        .bind(bill.booking_date)
        .bind(bill.vat_rate.as_decimal())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        debug!(bill_id = id, member_id = %bill.member_id, "Bill inserted");
        Ok(Bill::from_new(BillId::new(id), bill))
    }

    async fn update_bill(&mut self, bill: &Bill) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE bills SET
                bill_date = $2, booking_date = $3, vat_rate = $4, amount = $5,
                published = $6, paid = $7, notification_sent = $8,
                public_notes = $9, private_notes = $10
            WHERE id = $1
            "#,
        )
        .bind(bill.id.get())
        .bind(bill.bill_date)
        .bind(bill.booking_date)
        .bind(bill.vat_rate.as_decimal())
        .bind(bill.amount.amount())
        .bind(bill.published)
        .bind(bill.paid)
        .bind(bill.notification_sent)
        .bind(bill.public_notes.as_deref())
        .bind(bill.private_notes.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Bill", bill.id).into());
        }
        Ok(())
    }

    async fn bill(&mut self, id: BillId) -> Result<Bill, PortError> {
        Ok(fetch_bill(&mut self.tx, id).await?)
    }

    async fn replace_billable_items(
        &mut self,
        bill: BillId,
        items: Vec<NewBillItem>,
    ) -> Result<Vec<BillItem>, PortError> {
        lock_bill(&mut self.tx, bill).await?;
        let removed = sqlx::query("DELETE FROM bill_items WHERE bill_id = $1 AND billable_item_id IS NOT NULL")
            .bind(bill.get())
            .execute(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?
            .rows_affected();

        let mut created = Vec::with_capacity(items.len());
        for item in items {
            created.push(insert_item(&mut self.tx, bill, item).await?);
        }
        debug!(bill_id = %bill, removed, created = created.len(), "Billable items replaced");
        Ok(created)
    }

    async fn insert_bill_item(&mut self, bill: BillId, item: NewBillItem) -> Result<BillItem, PortError> {
        lock_bill(&mut self.tx, bill).await?;
        Ok(insert_item(&mut self.tx, bill, item).await?)
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, PortError> {
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO payments (bill_id, payment_type_id, amount, paid_date, unique_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(payment.bill_id.get())
        .bind(payment.payment_type_id.get())
        .bind(payment.amount.amount())
        .bind(payment.paid_date)
        .bind(&payment.unique_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from);

        match result {
            Ok(id) => Ok(Payment::from_new(PaymentId::new(id), payment)),
            Err(DatabaseError::DuplicateEntry(_)) => Err(PortError::duplicate("Payment", &payment.unique_id)),
            Err(DatabaseError::ForeignKeyViolation(_)) => Err(PortError::not_found("Bill", payment.bill_id)),
            Err(other) => Err(other.into()),
        }
    }

    async fn payments_for_bill(&mut self, bill: BillId) -> Result<Vec<Payment>, PortError> {
        Ok(fetch_payments_for_bill(&mut self.tx, bill).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx.commit().await.map_err(DatabaseError::from)?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        self.tx.rollback().await.map_err(DatabaseError::from)?;
        debug!("Transaction rolled back");
        Ok(())
    }
}

// ============================================================================
// Queries
// ============================================================================

const SELECT_BILLS: &str = r#"
    SELECT id, member_id, business_year_id, bill_date, booking_date, vat_rate, amount,
           published, paid, notification_sent, public_notes, private_notes
    FROM bills
"#;

const SELECT_BILL_ITEMS: &str = r#"
    SELECT bi.id, bi.bill_id, bi.description, bi.amount, bi.vat_amount, bi.billable_item_id,
           it.id AS item_type_id, it.kind, it.category,
           ct.id AS custom_type_id, ct.name AS custom_type_name, ct.account AS custom_type_account
    FROM bill_items bi
    LEFT JOIN billable_items b ON b.id = bi.billable_item_id
    LEFT JOIN item_types it ON it.id = b.item_type_id
    LEFT JOIN custom_item_types ct ON ct.id = bi.custom_item_type_id
    WHERE bi.bill_id = ANY($1)
    ORDER BY bi.id
"#;

const SELECT_PAYMENTS: &str = "SELECT id, bill_id, payment_type_id, amount, paid_date, unique_id FROM payments";

/// Which bills to load
#[derive(Debug, Clone, Copy)]
enum BillFilter {
    Id(BillId),
    Year(BusinessYearId),
    Member(MemberId),
    BookedBetween(DateRange),
}

impl BillFilter {
    fn condition(&self) -> &'static str {
        match self {
            BillFilter::Id(_) => "id = $1",
            BillFilter::Year(_) => "business_year_id = $1",
            BillFilter::Member(_) => "member_id = $1",
            BillFilter::BookedBetween(_) => {
                "($1::date IS NULL OR booking_date >= $1) AND ($2::date IS NULL OR booking_date <= $2)"
            }
        }
    }
}

/// SQL bound for one end of a date range; open ends become NULL
fn bound(date: NaiveDate) -> Option<NaiveDate> {
    (date != NaiveDate::MIN && date != NaiveDate::MAX).then_some(date)
}

async fn fetch_bills(conn: &mut PgConnection, filter: BillFilter) -> Result<Vec<Bill>, DatabaseError> {
    let sql = format!("{SELECT_BILLS} WHERE {} ORDER BY id", filter.condition());
    let query = sqlx::query_as::<_, BillRow>(&sql);
    let query = match filter {
        BillFilter::Id(id) => query.bind(id.get()),
        BillFilter::Year(year) => query.bind(year.get()),
        BillFilter::Member(member) => query.bind(member.get()),
        BillFilter::BookedBetween(range) => query.bind(bound(range.start)).bind(bound(range.end)),
    };
    let rows = query.fetch_all(&mut *conn).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let mut items = fetch_items(conn, ids).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let bill_items = items.remove(&row.id).unwrap_or_default();
            row.into_bill(bill_items)
        })
        .collect())
}

async fn fetch_bill(conn: &mut PgConnection, id: BillId) -> Result<Bill, DatabaseError> {
    fetch_bills(conn, BillFilter::Id(id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DatabaseError::not_found("Bill", id))
}

/// Items of the given bills grouped by bill id
async fn fetch_items(
    conn: &mut PgConnection,
    bill_ids: Vec<i64>,
) -> Result<HashMap<i64, Vec<BillItem>>, DatabaseError> {
    let rows = sqlx::query_as::<_, BillItemRow>(SELECT_BILL_ITEMS)
        .bind(bill_ids)
        .fetch_all(&mut *conn)
        .await?;

    let mut grouped: HashMap<i64, Vec<BillItem>> = HashMap::new();
    for row in rows {
        let bill_id = row.bill_id;
        grouped.entry(bill_id).or_default().push(BillItem::try_from(row)?);
    }
    Ok(grouped)
}

async fn fetch_billable_items(
    conn: &mut PgConnection,
    member: Option<MemberId>,
    range: DateRange,
) -> Result<Vec<BillableItem>, DatabaseError> {
    let rows = sqlx::query_as::<_, BillableItemRow>(
        r#"
        SELECT bi.id, bi.subscription_id, bi.member_id, bi.activation_date, bi.deactivation_date,
               it.id AS item_type_id, it.name AS item_type_name, it.kind, it.category, it.pricing
        FROM billable_items bi
        JOIN item_types it ON it.id = bi.item_type_id
        WHERE bi.activation_date IS NOT NULL
          AND ($1::bigint IS NULL OR bi.member_id = $1)
          AND ($2::date IS NULL OR bi.deactivation_date IS NULL OR bi.deactivation_date >= $2)
          AND ($3::date IS NULL OR bi.activation_date <= $3)
        ORDER BY bi.id
        "#,
    )
    .bind(member.map(|m| m.get()))
    .bind(bound(range.start))
    .bind(bound(range.end))
    .fetch_all(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let item = BillableItem::try_from(row)?;
        if item.is_active_during(&range) {
            items.push(item);
        }
    }
    Ok(items)
}

async fn fetch_payments_for_bill(conn: &mut PgConnection, bill: BillId) -> Result<Vec<Payment>, DatabaseError> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!("{SELECT_PAYMENTS} WHERE bill_id = $1 ORDER BY id"))
        .bind(bill.get())
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(Payment::from).collect())
}

/// Locks the bill row for the rest of the transaction
async fn lock_bill(conn: &mut PgConnection, bill: BillId) -> Result<(), DatabaseError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM bills WHERE id = $1 FOR UPDATE")
        .bind(bill.get())
        .fetch_optional(&mut *conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| DatabaseError::not_found("Bill", bill))
}

async fn insert_item(conn: &mut PgConnection, bill: BillId, item: NewBillItem) -> Result<BillItem, DatabaseError> {
    let (billable_item_id, custom_item_type_id) = reference_columns(&item.reference);
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bill_items (bill_id, billable_item_id, custom_item_type_id, description, amount, vat_amount)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(bill.get())
    .bind(billable_item_id)
    .bind(custom_item_type_id)
    .bind(&item.description)
    .bind(item.amount.amount())
    .bind(item.vat_amount.amount())
    .fetch_one(&mut *conn)
    .await?;
    Ok(BillItem::from_new(BillItemId::new(id), bill, item))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_open_bounds_become_null() {
        let open = DateRange::open(None, Some(d(2018, 12, 31)));
        assert_eq!(bound(open.start), None);
        assert_eq!(bound(open.end), Some(d(2018, 12, 31)));
        assert_eq!(bound(DateRange::open(None, None).end), None);
    }

    #[test]
    fn test_filter_conditions_use_positional_parameters() {
        let range = DateRange::new(d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        assert_eq!(BillFilter::Id(BillId::new(1)).condition(), "id = $1");
        assert!(BillFilter::BookedBetween(range).condition().contains("$2"));
        assert!(BillFilter::Member(MemberId::new(1)).condition().starts_with("member_id"));
    }
}
