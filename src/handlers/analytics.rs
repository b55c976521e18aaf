use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};

use super::common::success_response;
use super::BusinessContext;
use crate::errors::{ErrorResponse, ServiceError};
use crate::services::analytics::{InventorySummary, SalesRange, SalesSummary};
use crate::{ApiResponse, AppState};

#[utoipa::path(
    get,
    path = "/api/analytics/sales",
    summary = "Sales summary",
    description = "Revenue, ticket size, payment mix and top sellers over completed sales",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        SalesRange
    ),
    responses(
        (status = 200, description = "Sales summary", body = ApiResponse<SalesSummary>),
        (status = 400, description = "Invalid range", body = ErrorResponse),
    ),
    tag = "analytics"
)]
pub async fn sales_summary(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(range): Query<SalesRange>,
) -> Result<impl IntoResponse, ServiceError> {
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(ServiceError::BadRequest(
                "from must not be after to".to_string(),
            ));
        }
    }
    let summary = state
        .services
        .analytics
        .sales_summary(ctx.business_id, range)
        .await?;
    Ok(success_response(summary))
}

#[utoipa::path(
    get,
    path = "/api/analytics/inventory",
    summary = "Inventory summary",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    responses(
        (status = 200, description = "Stock counts and valuation", body = ApiResponse<InventorySummary>),
    ),
    tag = "analytics"
)]
pub async fn inventory_summary(
    State(state): State<AppState>,
    ctx: BusinessContext,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state
        .services
        .analytics
        .inventory_summary(ctx.business_id)
        .await?;
    Ok(success_response(summary))
}

pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/sales", get(sales_summary))
        .route("/inventory", get(inventory_summary))
}
