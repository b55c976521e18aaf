use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tracing::info;
use uuid::Uuid;

use super::common::{created_response, success_response, validate_input};
use super::BusinessContext;
use crate::entities::{business, location};
use crate::errors::{ErrorResponse, ServiceError};
use crate::services::business::{
    BusinessWithLocations, CreateBusinessInput, CreateLocationInput, UpdateBusinessInput,
    UpdateLocationInput,
};
use crate::{ApiResponse, AppState};

/// Onboard a business. Creates its first location in the same transaction.
#[utoipa::path(
    post,
    path = "/api/businesses",
    summary = "Create business",
    request_body = CreateBusinessInput,
    responses(
        (status = 201, description = "Business created", body = ApiResponse<BusinessWithLocations>),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
    ),
    tag = "businesses"
)]
pub async fn create_business(
    State(state): State<AppState>,
    Json(payload): Json<CreateBusinessInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let created = state.services.businesses.create_business(payload).await?;
    info!(business_id = %created.business.id, "Business onboarded");
    Ok(created_response(created))
}

#[utoipa::path(
    get,
    path = "/api/businesses/current",
    summary = "Get current business",
    params(("X-Business-Id" = uuid::Uuid, Header, description = "Tenant business id")),
    responses(
        (status = 200, description = "Business with its locations", body = ApiResponse<BusinessWithLocations>),
        (status = 404, description = "Unknown business", body = ErrorResponse),
    ),
    tag = "businesses"
)]
pub async fn get_current_business(
    State(state): State<AppState>,
    ctx: BusinessContext,
) -> Result<impl IntoResponse, ServiceError> {
    let business = state.services.businesses.get_business(ctx.business_id).await?;
    Ok(success_response(business))
}

#[utoipa::path(
    put,
    path = "/api/businesses/current",
    summary = "Update business settings",
    params(("X-Business-Id" = uuid::Uuid, Header, description = "Tenant business id")),
    request_body = UpdateBusinessInput,
    responses(
        (status = 200, description = "Business updated", body = ApiResponse<business::Model>),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
        (status = 404, description = "Unknown business", body = ErrorResponse),
    ),
    tag = "businesses"
)]
pub async fn update_current_business(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<UpdateBusinessInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let updated = state
        .services
        .businesses
        .update_business(ctx.business_id, payload)
        .await?;
    Ok(success_response(updated))
}

#[utoipa::path(
    get,
    path = "/api/locations",
    summary = "List locations",
    params(("X-Business-Id" = uuid::Uuid, Header, description = "Tenant business id")),
    responses(
        (status = 200, description = "Locations of the business", body = ApiResponse<Vec<location::Model>>),
    ),
    tag = "businesses"
)]
pub async fn list_locations(
    State(state): State<AppState>,
    ctx: BusinessContext,
) -> Result<impl IntoResponse, ServiceError> {
    let locations = state.services.businesses.list_locations(ctx.business_id).await?;
    Ok(success_response(locations))
}

#[utoipa::path(
    post,
    path = "/api/locations",
    summary = "Create location",
    params(("X-Business-Id" = uuid::Uuid, Header, description = "Tenant business id")),
    request_body = CreateLocationInput,
    responses(
        (status = 201, description = "Location created", body = ApiResponse<location::Model>),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
    ),
    tag = "businesses"
)]
pub async fn create_location(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Json(payload): Json<CreateLocationInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let location = state
        .services
        .businesses
        .create_location(ctx.business_id, payload)
        .await?;
    Ok(created_response(location))
}

/// Rename a location or toggle `is_active`. Inactive locations reject sales,
/// adjustments and transfers.
#[utoipa::path(
    put,
    path = "/api/locations/{id}",
    summary = "Update location",
    params(
        ("X-Business-Id" = Uuid, Header, description = "Tenant business id"),
        ("id" = Uuid, Path, description = "Location id")
    ),
    request_body = UpdateLocationInput,
    responses(
        (status = 200, description = "Location updated", body = ApiResponse<location::Model>),
        (status = 400, description = "Invalid request data", body = ErrorResponse),
        (status = 404, description = "Location not found", body = ErrorResponse),
    ),
    tag = "businesses"
)]
pub async fn update_location(
    State(state): State<AppState>,
    ctx: BusinessContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let location = state
        .services
        .businesses
        .update_location(ctx.business_id, id, payload)
        .await?;
    Ok(success_response(location))
}

pub fn businesses_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_business))
        .route(
            "/current",
            get(get_current_business).put(update_current_business),
        )
}

pub fn locations_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_locations).post(create_location))
        .route("/:id", put(update_location))
}
