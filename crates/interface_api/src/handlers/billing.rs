//! Billing handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use core_kernel::{BillId, CustomItemTypeId, Money};
use domain_billing::reference::format_grouped;
use domain_billing::{Bill, BillableItem, BillingError, StructuredReference};

use super::{business_year, validate};
use crate::auth::{permissions, require_role, Claims};
use crate::dto::billing::*;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn respond(bill: Bill) -> ApiResult<Json<BillResponse>> {
    let response = BillResponse::try_from(bill).map_err(BillingError::from)?;
    Ok(Json(response))
}

async fn load_bill(state: &AppState, id: BillId) -> ApiResult<Bill> {
    state.repository.bill(id).await.map_err(|e| {
        if e.is_not_found() {
            BillingError::BillNotFound(id).into()
        } else {
            ApiError::from(e)
        }
    })
}

/// GET /api/v1/business-years/:id/billable-items
///
/// Items active during the year that are not on any bill yet.
#[instrument(skip(state, claims))]
pub async fn list_billable_items(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(year_id): Path<i64>,
) -> ApiResult<Json<Vec<BillableItem>>> {
    require_role(&claims, permissions::BILLING_READ)?;
    let year = business_year(&state, year_id).await?;
    let items = state.aggregator().billable_items(&year).await?;
    Ok(Json(items))
}

/// POST /api/v1/business-years/:id/bills
///
/// Runs the billing for every unbilled item of the year, one bill per member.
#[instrument(skip(state, claims, request), fields(bill_date = %request.bill_date))]
pub async fn create_bills(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(year_id): Path<i64>,
    Json(request): Json<CreateBillsRequest>,
) -> ApiResult<(StatusCode, Json<CreateBillsResponse>)> {
    require_role(&claims, permissions::BILLING_WRITE)?;
    let _guard = state.mutations.lock().await;

    let year = business_year(&state, year_id).await?;
    let aggregator = state.aggregator();
    let items = aggregator.billable_items(&year).await?;
    let bills = aggregator
        .create_bills_for_items(&items, &year, request.bill_date)
        .await?
        .into_iter()
        .map(BillResponse::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(BillingError::from)?;

    info!(user = %claims.sub, year = %year.name, bills = bills.len(), "Billing run");
    Ok((
        StatusCode::CREATED,
        Json(CreateBillsResponse {
            created: bills.len(),
            bills,
        }),
    ))
}

/// GET /api/v1/business-years/:id/open-bills
#[instrument(skip(state, claims, query))]
pub async fn list_open_bills(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(year_id): Path<i64>,
    Query(query): Query<OpenBillsQuery>,
) -> ApiResult<Json<Vec<OpenBillResponse>>> {
    require_role(&claims, permissions::BILLING_READ)?;
    let percentage = query.max_paid_percentage.unwrap_or(Decimal::ONE_HUNDRED);
    if percentage.is_sign_negative() || percentage > Decimal::ONE_HUNDRED {
        return Err(ApiError::Validation(format!(
            "max_paid_percentage must be between 0 and 100, got {percentage}"
        )));
    }

    let year = business_year(&state, year_id).await?;
    let open = state
        .aggregator()
        .open_bills(&year, percentage)
        .await?
        .into_iter()
        .map(OpenBillResponse::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(BillingError::from)?;
    Ok(Json(open))
}

/// GET /api/v1/bills/:id
pub async fn get_bill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bill_id): Path<i64>,
) -> ApiResult<Json<BillResponse>> {
    require_role(&claims, permissions::BILLING_READ)?;
    respond(load_bill(&state, BillId::new(bill_id)).await?)
}

/// POST /api/v1/bills/:id/recalc
///
/// Re-reads the member's billable items and recomputes prices, VAT and
/// the paid flag. Running it twice yields the same bill.
#[instrument(skip(state, claims))]
pub async fn recalc_bill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bill_id): Path<i64>,
) -> ApiResult<Json<BillResponse>> {
    require_role(&claims, permissions::BILLING_WRITE)?;
    let _guard = state.mutations.lock().await;
    let bill = state.aggregator().recalc_bill(BillId::new(bill_id)).await?;
    respond(bill)
}

/// POST /api/v1/bills/:id/items
#[instrument(skip(state, claims, request))]
pub async fn add_custom_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bill_id): Path<i64>,
    Json(request): Json<AddCustomItemRequest>,
) -> ApiResult<(StatusCode, Json<BillResponse>)> {
    require_role(&claims, permissions::BILLING_WRITE)?;
    validate(&request)?;
    let _guard = state.mutations.lock().await;

    let bill = state
        .aggregator()
        .add_custom_item(
            BillId::new(bill_id),
            CustomItemTypeId::new(request.custom_item_type_id),
            &request.description,
            Money::new(request.amount),
        )
        .await?;
    let Json(response) = respond(bill)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/bills/publish
#[instrument(skip(state, claims, request), fields(count = request.bill_ids.len()))]
pub async fn publish_bills(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PublishBillsRequest>,
) -> ApiResult<Json<PublishBillsResponse>> {
    require_role(&claims, permissions::BILLING_WRITE)?;
    validate(&request)?;
    let _guard = state.mutations.lock().await;

    let ids: Vec<BillId> = request.bill_ids.iter().copied().map(BillId::new).collect();
    let published = state.aggregator().publish_bills(&ids).await?;
    Ok(Json(PublishBillsResponse {
        requested: ids.len(),
        published,
    }))
}

/// GET /api/v1/bills/:id/reference
pub async fn get_reference(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bill_id): Path<i64>,
) -> ApiResult<Json<ReferenceResponse>> {
    require_role(&claims, permissions::BILLING_READ)?;
    let bill = load_bill(&state, BillId::new(bill_id)).await?;
    let reference = StructuredReference::new(bill.member_id, bill.id)
        .encode()
        .map_err(BillingError::from)?;

    Ok(Json(ReferenceResponse {
        bill_id: bill.id,
        member_id: bill.member_id,
        formatted: format_grouped(&reference),
        reference,
    }))
}
