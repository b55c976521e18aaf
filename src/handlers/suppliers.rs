use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

use super::common::{created_response, paginated_response, success_response, validate_input};
use super::BusinessContext;
use crate::entities::supplier;
use crate::errors::{ErrorResponse, ServiceError};
use crate::services::suppliers::{CreateSupplierInput, UpdateSupplierInput};
use crate::services::Page;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/suppliers",
    summary = "List suppliers",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ListQuery
    ),
    responses(
        (status = 200, description = "Suppliers ordered by name", body = ApiResponse<PaginatedResponse<supplier::Model>>),
    ),
    tag = "suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = Page::from(&query);
    let (suppliers, total) = state
        .services
        .suppliers
        .list_suppliers(ctx.business_id, query.search, page)
        .await?;
    Ok(paginated_response(suppliers, total, page))
}

#[utoipa::path(
    post,
    path = "/api/suppliers",
    summary = "Create supplier",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    request_body = CreateSupplierInput,
    responses(
        (status = 201, description = "Supplier created", body = ApiResponse<supplier::Model>),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
    ),
    tag = "suppliers"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<CreateSupplierInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .create_supplier(ctx.business_id, payload)
        .await?;
    Ok(created_response(supplier))
}

#[utoipa::path(
    get,
    path = "/api/suppliers/{id}",
    summary = "Get supplier",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Supplier id")
    ),
    responses(
        (status = 200, description = "Supplier", body = ApiResponse<supplier::Model>),
        (status = 404, description = "Supplier not found", body = ErrorResponse),
    ),
    tag = "suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state.services.suppliers.get_supplier(ctx.business_id, id).await?;
    Ok(success_response(supplier))
}

#[utoipa::path(
    put,
    path = "/api/suppliers/{id}",
    summary = "Update supplier",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Supplier id")
    ),
    request_body = UpdateSupplierInput,
    responses(
        (status = 200, description = "Supplier updated", body = ApiResponse<supplier::Model>),
        (status = 404, description = "Supplier not found", body = ErrorResponse),
    ),
    tag = "suppliers"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSupplierInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .update_supplier(ctx.business_id, id, payload)
        .await?;
    Ok(success_response(supplier))
}

pub fn suppliers_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route("/:id", get(get_supplier).put(update_supplier))
}
