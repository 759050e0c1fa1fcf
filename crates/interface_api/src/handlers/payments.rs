//! Payment handlers

use axum::{extract::State, http::StatusCode, Extension, Json};
use tracing::{info, instrument};

use super::validate;
use crate::auth::{permissions, require_role, Claims};
use crate::dto::payments::*;
use crate::error::ApiResult;
use crate::AppState;

/// POST /api/v1/payments/check
///
/// Dry run of an import. Reports per record whether it can be booked and
/// on which bill, without storing anything.
#[instrument(skip(state, claims, request), fields(count = request.payments.len()))]
pub async fn check_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PaymentBatchRequest>,
) -> ApiResult<Json<PaymentCheckResponse>> {
    require_role(&claims, permissions::PAYMENTS_IMPORT)?;
    validate(&request)?;

    let checked = state.payments().check_payments(&request.payments).await?;
    let results: Vec<PaymentCheckResult> = request
        .payments
        .iter()
        .zip(checked)
        .map(|(record, result)| PaymentCheckResult::new(record, result))
        .collect();

    Ok(Json(PaymentCheckResponse {
        importable: results.iter().all(|r| r.importable),
        results,
    }))
}

/// POST /api/v1/payments/import
///
/// All or nothing: a single record that fails its check rejects the batch.
#[instrument(skip(state, claims, request), fields(count = request.payments.len()))]
pub async fn import_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PaymentBatchRequest>,
) -> ApiResult<(StatusCode, Json<PaymentImportResponse>)> {
    require_role(&claims, permissions::PAYMENTS_IMPORT)?;
    validate(&request)?;
    let _guard = state.mutations.lock().await;

    let payments = state.payments().process_payments(&request.payments).await?;
    info!(user = %claims.sub, imported = payments.len(), "Payments imported");
    Ok((
        StatusCode::CREATED,
        Json(PaymentImportResponse {
            imported: payments.len(),
            payments,
        }),
    ))
}
