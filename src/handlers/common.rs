use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::Page;
use crate::{ApiResponse, PaginatedResponse};

/// 200 with the standard envelope
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 201 with the standard envelope
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

pub fn paginated_response<T: Serialize>(items: Vec<T>, total: u64, page: Page) -> Response {
    success_response(PaginatedResponse::new(items, total, page.page, page.limit))
}

/// Validate request input before it reaches a service
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}
