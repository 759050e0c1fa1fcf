//! Booking, ledger sync and balance handlers

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use domain_billing::{bookings_to_csv, LedgerSync, MemberBalance, SyncOptions};

use crate::auth::{permissions, require_role, Claims};
use crate::dto::ledger::*;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn check_range(from: chrono::NaiveDate, till: chrono::NaiveDate) -> ApiResult<()> {
    if from > till {
        return Err(ApiError::Validation(format!("from {from} is after till {till}")));
    }
    Ok(())
}

/// GET /api/v1/bookings?from=&till=
#[instrument(skip(state, claims))]
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<BookingsQuery>,
) -> ApiResult<Json<BookingsResponse>> {
    require_role(&claims, permissions::BILLING_READ)?;
    check_range(query.from, query.till)?;

    let bookings = state.bookings().bookings(query.from, query.till).await?;
    Ok(Json(BookingsResponse {
        from: query.from,
        till: query.till,
        bookings,
    }))
}

/// GET /api/v1/bookings/export?from=&till=
///
/// The bookings of the period as a CSV download.
#[instrument(skip(state, claims))]
pub async fn export_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<BookingsQuery>,
) -> ApiResult<impl IntoResponse> {
    require_role(&claims, permissions::BILLING_READ)?;
    check_range(query.from, query.till)?;

    let bookings = state.bookings().bookings(query.from, query.till).await?;
    let csv = bookings_to_csv(&bookings)?;
    let disposition = format!("attachment; filename=\"bookings_{}_{}.csv\"", query.from, query.till);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// POST /api/v1/ledger/sync
///
/// Brings the external ledger in line with the bookings of the period. A
/// failing ledger call does not fail the request; the response reports
/// how far the run got.
#[instrument(skip(state, claims, request), fields(from = %request.from, till = %request.till))]
pub async fn sync_ledger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<LedgerSyncRequest>,
) -> ApiResult<Json<LedgerSyncResponse>> {
    require_role(&claims, permissions::LEDGER_SYNC)?;
    check_range(request.from, request.till)?;
    let ledger = state
        .ledger
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("No ledger configured".to_string()))?;
    let _guard = state.mutations.lock().await;

    let options = SyncOptions {
        compare_vat: request.compare_vat,
    };
    let outcome = LedgerSync::new(state.bookings(), ledger, options)
        .sync(request.from, request.till)
        .await?;

    match &outcome.failure {
        None => info!(user = %claims.sub, achieved = ?outcome.achieved, "Ledger synced"),
        Some(failure) => warn!(
            user = %claims.sub,
            operation = %failure.operation,
            doc_number = %failure.doc_number,
            "Ledger sync stopped early"
        ),
    }

    Ok(Json(LedgerSyncResponse {
        complete: outcome.is_complete(),
        outcome,
    }))
}

/// GET /api/v1/balances?as_of=
#[instrument(skip(state, claims))]
pub async fn member_balances(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<BalancesQuery>,
) -> ApiResult<Json<Vec<MemberBalance>>> {
    require_role(&claims, permissions::BILLING_READ)?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let balances = state.balances().member_balances(as_of).await?;
    Ok(Json(balances))
}
