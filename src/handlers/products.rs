use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, paginated_response, success_response, validate_input};
use super::BusinessContext;
use crate::errors::{ErrorResponse, ServiceError};
use crate::services::products::{
    CreateProductInput, ProductFilters, ProductView, UpdateProductInput,
};
use crate::services::Page;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExpiringQuery {
    /// Look-ahead window in days (default 30)
    pub days: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/products",
    summary = "List products",
    description = "Products with total stock and low-stock flag, newest first",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ListQuery,
        ProductFilters
    ),
    responses(
        (status = 200, description = "Products", body = ApiResponse<PaginatedResponse<ProductView>>),
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(query): Query<ListQuery>,
    Query(filters): Query<ProductFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = Page::from(&query);
    let (products, total) = state
        .services
        .products
        .list_products(ctx.business_id, filters, page)
        .await?;
    Ok(paginated_response(products, total, page))
}

#[utoipa::path(
    post,
    path = "/api/products",
    summary = "Create product",
    description = "Creates a product with optional opening stock per location",
    params(("X-Business-Id" = Uuid, Header, description = "Tenant business id")),
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductView>),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
        (status = 409, description = "SKU already in use", body = ErrorResponse),
    ),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let product = state
        .services
        .products
        .create_product(ctx.business_id, payload)
        .await?;
    Ok(created_response(product))
}

#[utoipa::path(
    get,
    path = "/api/products/expiring",
    summary = "List expiring products",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ExpiringQuery
    ),
    responses(
        (status = 200, description = "Products expiring within the window, soonest first", body = ApiResponse<Vec<ProductView>>),
        (status = 400, description = "Negative window", body = ErrorResponse),
    ),
    tag = "products"
)]
pub async fn expiring_products(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Query(query): Query<ExpiringQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let days = query.days.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);
    let products = state
        .services
        .products
        .expiring_products(ctx.business_id, days)
        .await?;
    Ok(success_response(products))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    summary = "Get product",
    description = "Product with its per-location stock breakdown",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Product id")
    ),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get_product(ctx.business_id, id).await?;
    Ok(success_response(product))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    summary = "Update product",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Product id")
    ),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 409, description = "SKU already in use", body = ErrorResponse),
    ),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let product = state
        .services
        .products
        .update_product(ctx.business_id, id, payload)
        .await?;
    Ok(success_response(product))
}

pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/expiring", get(expiring_products))
        .route("/:id", get(get_product).put(update_product))
}
