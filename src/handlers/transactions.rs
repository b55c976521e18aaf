use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, paginated_response, success_response, validate_input};
use super::BusinessContext;
use crate::entities::transaction;
use crate::errors::{ErrorResponse, ServiceError};
use crate::services::checkout::{
    CheckoutRequest, CompletedSale, TransactionDetails, TransactionFilters,
};
use crate::services::Page;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/transactions",
    summary = "List sales",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ListQuery,
        TransactionFilters
    ),
    responses(
        (status = 200, description = "Sales, newest first", body = ApiResponse<PaginatedResponse<transaction::Model>>),
    ),
    tag = "transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(query): Query<ListQuery>,
    Query(filters): Query<TransactionFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = Page::from(&query);
    let (transactions, total) = state
        .services
        .checkout
        .list_transactions(ctx.business_id, filters, page)
        .await?;
    Ok(paginated_response(transactions, total, page))
}

/// Checkout. Either every line is sold and stock decremented, or nothing is written.
#[utoipa::path(
    post,
    path = "/api/transactions",
    summary = "Checkout",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Sale recorded", body = ApiResponse<CompletedSale>),
        (status = 400, description = "Invalid cart, total mismatch or insufficient stock", body = ErrorResponse),
        (status = 404, description = "Unknown product or location", body = ErrorResponse),
        (status = 409, description = "Stock changed concurrently", body = ErrorResponse),
    ),
    tag = "transactions"
)]
pub async fn checkout(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let sale = state
        .services
        .checkout
        .checkout(ctx.business_id, payload)
        .await?;
    Ok(created_response(sale))
}

#[utoipa::path(
    get,
    path = "/api/transactions/{id}",
    summary = "Get sale",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Transaction id")
    ),
    responses(
        (status = 200, description = "Sale with its items", body = ApiResponse<TransactionDetails>),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
    ),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state
        .services
        .checkout
        .get_transaction(ctx.business_id, id)
        .await?;
    Ok(success_response(details))
}

#[utoipa::path(
    post,
    path = "/api/transactions/{id}/void",
    summary = "Void sale",
    description = "Marks a completed sale voided and returns its items to stock",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Transaction id")
    ),
    responses(
        (status = 200, description = "Sale voided", body = ApiResponse<TransactionDetails>),
        (status = 400, description = "Already voided", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
    ),
    tag = "transactions"
)]
pub async fn void_transaction(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state
        .services
        .checkout
        .void_transaction(ctx.business_id, id)
        .await?;
    Ok(success_response(details))
}

pub fn transactions_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions).post(checkout))
        .route("/:id", get(get_transaction))
        .route("/:id/void", post(void_transaction))
}
