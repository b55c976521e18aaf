//! Health endpoints.
//!
//! - `/health` pings the database and reports the notification outbox backlog
//! - `/health/live` answers as long as the process is serving requests

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use tracing::error;
use utoipa::ToSchema;

use crate::entities::notification_outbox::{self, OutboxStatus};
use crate::AppState;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthDetail {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

#[derive(Clone)]
pub struct HealthState {
    pub start_time: SystemTime,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
        }
    }

    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }
}

/// Worst status wins.
pub fn overall_status<'a>(details: impl IntoIterator<Item = &'a HealthDetail>) -> HealthStatus {
    details
        .into_iter()
        .fold(HealthStatus::Up, |acc, detail| match (acc, detail.status) {
            (HealthStatus::Down, _) | (_, HealthStatus::Down) => HealthStatus::Down,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Up,
        })
}

async fn database_detail(db: &DatabaseConnection) -> HealthDetail {
    match db.ping().await {
        Ok(()) => HealthDetail {
            status: HealthStatus::Up,
            message: None,
        },
        Err(e) => {
            error!("Database health check failed: {}", e);
            HealthDetail {
                status: HealthStatus::Down,
                message: Some("database unreachable".to_string()),
            }
        }
    }
}

/// Dead-lettered notifications degrade health but never take it down.
async fn outbox_detail(db: &DatabaseConnection) -> HealthDetail {
    let count = |status: OutboxStatus| {
        notification_outbox::Entity::find()
            .filter(notification_outbox::Column::Status.eq(status))
            .count(db)
    };
    match (count(OutboxStatus::Pending).await, count(OutboxStatus::Failed).await) {
        (Ok(pending), Ok(failed)) => HealthDetail {
            status: if failed > 0 {
                HealthStatus::Degraded
            } else {
                HealthStatus::Up
            },
            message: Some(format!("{} pending, {} failed", pending, failed)),
        },
        (Err(e), _) | (_, Err(e)) => {
            error!("Outbox health check failed: {}", e);
            HealthDetail {
                status: HealthStatus::Degraded,
                message: Some("outbox backlog unavailable".to_string()),
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service healthy or degraded", body = HealthInfo),
        (status = 503, description = "Database unreachable", body = HealthInfo),
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut details = BTreeMap::new();
    details.insert("database".to_string(), database_detail(&state.db).await);
    details.insert("notification_outbox".to_string(), outbox_detail(&state.db).await);

    let status = overall_status(details.values());
    let info = HealthInfo {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.health.uptime(),
        details,
    };
    let code = if status == HealthStatus::Down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(info))
}

#[utoipa::path(
    get,
    path = "/health/live",
    summary = "Liveness probe",
    responses((status = 200, description = "Process is alive")),
    tag = "health"
)]
pub async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "up", "timestamp": Utc::now().to_rfc3339() })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(status: HealthStatus) -> HealthDetail {
        HealthDetail {
            status,
            message: None,
        }
    }

    #[test]
    fn worst_status_wins() {
        assert_eq!(overall_status(Vec::<HealthDetail>::new().iter()), HealthStatus::Up);
        assert_eq!(
            overall_status(&[detail(HealthStatus::Up), detail(HealthStatus::Degraded)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            overall_status(&[
                detail(HealthStatus::Down),
                detail(HealthStatus::Degraded),
                detail(HealthStatus::Up)
            ]),
            HealthStatus::Down
        );
    }
}
