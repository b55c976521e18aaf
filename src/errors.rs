use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, TransactionError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Insufficient stock for Espresso Beans (SKU BEAN-01): only 2 available, 5 requested",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp of the failure
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("{0}")]
    InsufficientStock(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(format_validation_errors(&errors))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            TransactionError::Transaction(service_err) => service_err,
        }
    }
}

/// Flattens validator output into `field: message` fragments joined by `; `.
pub fn format_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| match &err.message {
                Some(message) => format!("{}: {}", field, message),
                None => format!("{}: invalid value ({})", field, err.code),
            })
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

impl ServiceError {
    /// Maps each variant to its HTTP status. This is the only place the mapping lives.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_)
            | ServiceError::InvalidOperation(_)
            | ServiceError::InsufficientStock(_)
            | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ServiceError::DatabaseError(_)
            | ServiceError::SerializationError(_)
            | ServiceError::InternalError(_)
            | ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients; server faults are reported generically.
    pub fn response_message(&self) -> String {
        match self {
            ServiceError::NotFound(msg)
            | ServiceError::ValidationError(msg)
            | ServiceError::InvalidOperation(msg)
            | ServiceError::InsufficientStock(msg)
            | ServiceError::Conflict(msg)
            | ServiceError::BadRequest(msg) => msg.clone(),
            ServiceError::ExternalServiceError(_) => "Upstream service failure".to_string(),
            ServiceError::DatabaseError(_) => "Database error".to_string(),
            ServiceError::SerializationError(_)
            | ServiceError::InternalError(_)
            | ServiceError::Other(_) => "Internal server error".to_string(),
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: self.response_message(),
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
    }

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response =
            ServiceError::DatabaseError(DbErr::Custom("password=hunter2".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Database error"));
        assert!(!text.contains("hunter2"));
    }

    #[tokio::test]
    async fn business_errors_keep_their_message() {
        let response = ServiceError::InsufficientStock(
            "Insufficient stock for Tea (SKU T-1): only 2 available, 5 requested".into(),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Bad Request");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("only 2 available"));
    }

    #[test]
    fn validation_errors_are_flattened() {
        let err: ServiceError = Sample {
            name: String::new(),
        }
        .validate()
        .unwrap_err()
        .into();
        assert_eq!(
            err.to_string(),
            "Validation error: name: must not be empty"
        );
    }

    #[test]
    fn transaction_errors_unwrap_inner_service_error() {
        let err: ServiceError =
            TransactionError::Transaction(ServiceError::NotFound("gone".into())).into();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err: ServiceError =
            TransactionError::<ServiceError>::Connection(DbErr::Custom("lost".into())).into();
        assert!(matches!(err, ServiceError::DatabaseError(_)));
    }
}
