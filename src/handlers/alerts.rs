use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{paginated_response, success_response};
use super::BusinessContext;
use crate::entities::stock_alert::{self, AlertStatus};
use crate::errors::{ErrorResponse, ServiceError};
use crate::services::alerts::MarkAlertsRead;
use crate::services::Page;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertsUpdated {
    pub updated: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: u64,
}

#[utoipa::path(
    get,
    path = "/api/alerts",
    summary = "List low-stock alerts",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ListQuery,
        AlertQuery
    ),
    responses(
        (status = 200, description = "Alerts, newest first", body = ApiResponse<PaginatedResponse<stock_alert::Model>>),
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(query): Query<ListQuery>,
    Query(filter): Query<AlertQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = Page::from(&query);
    let (alerts, total) = state
        .services
        .alerts
        .list_alerts(ctx.business_id, filter.status, page)
        .await?;
    Ok(paginated_response(alerts, total, page))
}

#[utoipa::path(
    post,
    path = "/api/alerts",
    summary = "Mark alerts read",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    request_body = MarkAlertsRead,
    responses(
        (status = 200, description = "Number of alerts changed", body = ApiResponse<AlertsUpdated>),
        (status = 400, description = "Neither ids nor all given", body = ErrorResponse),
    ),
    tag = "alerts"
)]
pub async fn mark_alerts_read(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<MarkAlertsRead>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .alerts
        .mark_read(ctx.business_id, payload)
        .await?;
    Ok(success_response(AlertsUpdated { updated }))
}

#[utoipa::path(
    post,
    path = "/api/alerts/{id}/read",
    summary = "Mark one alert read",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Alert id")
    ),
    responses(
        (status = 200, description = "Alert", body = ApiResponse<stock_alert::Model>),
        (status = 404, description = "Alert not found", body = ErrorResponse),
    ),
    tag = "alerts"
)]
pub async fn mark_alert_read(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let alert = state
        .services
        .alerts
        .mark_one_read(ctx.business_id, id)
        .await?;
    Ok(success_response(alert))
}

#[utoipa::path(
    get,
    path = "/api/alerts/unread-count",
    summary = "Count unread alerts",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    responses(
        (status = 200, description = "Unread alert count", body = ApiResponse<UnreadCount>),
    ),
    tag = "alerts"
)]
pub async fn unread_count(
    State(state): State<AppState>,
    ctx: BusinessContext,
) -> Result<impl IntoResponse, ServiceError> {
    let unread = state.services.alerts.unread_count(ctx.business_id).await?;
    Ok(success_response(UnreadCount { unread }))
}

pub fn alerts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alerts).post(mark_alerts_read))
        .route("/unread-count", get(unread_count))
        .route("/:id/read", post(mark_alert_read))
}
