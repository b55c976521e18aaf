use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::common::{paginated_response, success_response, validate_input};
use super::BusinessContext;
use crate::entities::stock_movement;
use crate::errors::{ErrorResponse, ServiceError};
use crate::services::inventory::{
    AdjustStockInput, InventoryFilters, InventoryRow, MovementFilters, SetStockInput,
    StockChange, StockTransfer, TransferStockInput,
};
use crate::services::Page;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/inventory",
    summary = "List stock rows",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ListQuery,
        InventoryFilters
    ),
    responses(
        (status = 200, description = "Stock rows with product and location names", body = ApiResponse<PaginatedResponse<InventoryRow>>),
    ),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(query): Query<ListQuery>,
    Query(filters): Query<InventoryFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = Page::from(&query);
    let (rows, total) = state
        .services
        .inventory
        .list_inventory(ctx.business_id, filters, page)
        .await?;
    Ok(paginated_response(rows, total, page))
}

/// Set the absolute quantity of one stock row.
#[utoipa::path(
    post,
    path = "/api/inventory",
    summary = "Set stock quantity",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    request_body = SetStockInput,
    responses(
        (status = 200, description = "Stock updated", body = ApiResponse<StockChange>),
        (status = 400, description = "Invalid quantity", body = ErrorResponse),
        (status = 404, description = "Stock row not found", body = ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn set_stock(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<SetStockInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let change = state
        .services
        .inventory
        .set_quantity(ctx.business_id, payload)
        .await?;
    Ok(success_response(change))
}

#[utoipa::path(
    post,
    path = "/api/inventory/adjust",
    summary = "Adjust stock by a delta",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    request_body = AdjustStockInput,
    responses(
        (status = 200, description = "Stock adjusted", body = ApiResponse<StockChange>),
        (status = 400, description = "Zero delta or insufficient stock", body = ErrorResponse),
        (status = 404, description = "Product or location not found", body = ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<AdjustStockInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let change = state
        .services
        .inventory
        .adjust_stock(ctx.business_id, payload)
        .await?;
    Ok(success_response(change))
}

#[utoipa::path(
    post,
    path = "/api/inventory/transfer",
    summary = "Transfer stock between locations",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    request_body = TransferStockInput,
    responses(
        (status = 200, description = "Stock transferred", body = ApiResponse<StockTransfer>),
        (status = 400, description = "Same location or insufficient stock", body = ErrorResponse),
        (status = 404, description = "Product or location not found", body = ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn transfer_stock(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<TransferStockInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let transfer = state
        .services
        .inventory
        .transfer_stock(ctx.business_id, payload)
        .await?;
    Ok(success_response(transfer))
}

#[utoipa::path(
    get,
    path = "/api/inventory/movements",
    summary = "List stock movements",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ListQuery,
        MovementFilters
    ),
    responses(
        (status = 200, description = "Movement ledger, newest first", body = ApiResponse<PaginatedResponse<stock_movement::Model>>),
    ),
    tag = "inventory"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(query): Query<ListQuery>,
    Query(filters): Query<MovementFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = Page::from(&query);
    let (movements, total) = state
        .services
        .inventory
        .list_movements(ctx.business_id, filters, page)
        .await?;
    Ok(paginated_response(movements, total, page))
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_inventory).post(set_stock))
        .route("/adjust", post(adjust_stock))
        .route("/transfer", post(transfer_stock))
        .route("/movements", get(list_movements))
}
