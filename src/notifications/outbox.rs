use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{NotificationDispatcher, OutboundMessage};
use crate::entities::notification_outbox::{self, OutboxStatus};
use crate::entities::stock_alert::AlertChannel;
use crate::errors::ServiceError;

const MAX_BACKOFF_SECS: i64 = 300;
/// Rows stuck in `processing` longer than this are handed back to the queue.
const STALE_PROCESSING_SECS: i64 = 600;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub alert_id: Option<Uuid>,
    pub channel: AlertChannel,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Outcome of a single drain pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Inserts a pending row. Call with the transaction that writes the alert so the
/// two commit together.
pub async fn enqueue<C>(conn: &C, notification: NewNotification) -> Result<Uuid, ServiceError>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let id = Uuid::new_v4();
    notification_outbox::ActiveModel {
        id: Set(id),
        alert_id: Set(notification.alert_id),
        channel: Set(notification.channel),
        recipient: Set(notification.recipient),
        subject: Set(notification.subject),
        body: Set(notification.body),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(now),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        delivered_at: Set(None),
    }
    .insert(conn)
    .await?;

    debug!(outbox_id = %id, channel = %notification.channel, "Enqueued notification");
    Ok(id)
}

/// Retry delay after `attempts` failed deliveries: 2^attempts seconds, capped.
pub fn backoff_secs(attempts: i32) -> i64 {
    let exp = attempts.clamp(0, 16) as u32;
    2_i64.pow(exp).min(MAX_BACKOFF_SECS)
}

async fn release_stale(db: &DatabaseConnection) -> Result<u64, ServiceError> {
    let cutoff = Utc::now() - ChronoDuration::seconds(STALE_PROCESSING_SECS);
    let result = notification_outbox::Entity::update_many()
        .col_expr(
            notification_outbox::Column::Status,
            Expr::value(OutboxStatus::Pending),
        )
        .filter(notification_outbox::Column::Status.eq(OutboxStatus::Processing))
        .filter(notification_outbox::Column::UpdatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Claims a row by flipping it from pending to processing. Returns false when
/// another worker got there first.
async fn claim(db: &DatabaseConnection, id: Uuid) -> Result<bool, ServiceError> {
    let result = notification_outbox::Entity::update_many()
        .col_expr(
            notification_outbox::Column::Status,
            Expr::value(OutboxStatus::Processing),
        )
        .col_expr(
            notification_outbox::Column::Attempts,
            Expr::col(notification_outbox::Column::Attempts).add(1),
        )
        .col_expr(notification_outbox::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(notification_outbox::Column::Id.eq(id))
        .filter(notification_outbox::Column::Status.eq(OutboxStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Delivers up to `batch_size` due notifications.
pub async fn drain_once(
    db: &DatabaseConnection,
    dispatcher: &NotificationDispatcher,
    batch_size: u64,
    max_attempts: i32,
) -> Result<DrainReport, ServiceError> {
    let released = release_stale(db).await?;
    if released > 0 {
        warn!(released, "Returned stale outbox rows to the queue");
    }

    let due = notification_outbox::Entity::find()
        .filter(notification_outbox::Column::Status.eq(OutboxStatus::Pending))
        .filter(notification_outbox::Column::AvailableAt.lte(Utc::now()))
        .order_by_asc(notification_outbox::Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?;

    let mut report = DrainReport::default();
    for row in due {
        if !claim(db, row.id).await? {
            continue;
        }
        report.claimed += 1;

        let attempts = row.attempts + 1;
        let message = OutboundMessage {
            channel: row.channel,
            to: row.recipient.clone(),
            subject: row.subject.clone(),
            body: row.body.clone(),
        };
        let outcome = dispatcher.dispatch(&message).await;

        let now = Utc::now();
        let channel_label = row.channel.to_string();
        let mut active = row.into_active_model();
        active.attempts = Set(attempts);
        active.updated_at = Set(now);

        match outcome {
            Ok(()) => {
                active.status = Set(OutboxStatus::Delivered);
                active.delivered_at = Set(Some(now));
                active.last_error = Set(None);
                report.delivered += 1;
                metrics::counter!("retail_pos_notifications_delivered_total", 1, "channel" => channel_label);
            }
            Err(e) if attempts >= max_attempts => {
                error!(attempts, error = %e, "Notification permanently failed");
                active.status = Set(OutboxStatus::Failed);
                active.last_error = Set(Some(e.to_string()));
                report.failed += 1;
                metrics::counter!("retail_pos_notifications_failed_total", 1, "channel" => channel_label);
            }
            Err(e) => {
                let delay = backoff_secs(attempts);
                warn!(attempts, retry_in_secs = delay, error = %e, "Notification delivery failed");
                active.status = Set(OutboxStatus::Pending);
                active.available_at = Set(now + ChronoDuration::seconds(delay));
                active.last_error = Set(Some(e.to_string()));
                report.retried += 1;
                metrics::counter!("retail_pos_notifications_retried_total", 1, "channel" => channel_label);
            }
        }
        active.update(db).await?;
    }

    Ok(report)
}

/// Spawns the polling loop. The returned handle is aborted on shutdown.
pub fn start_worker(
    db: Arc<DatabaseConnection>,
    dispatcher: Arc<NotificationDispatcher>,
    poll_interval: Duration,
    batch_size: u64,
    max_attempts: i32,
) -> JoinHandle<()> {
    info!(
        poll_ms = poll_interval.as_millis() as u64,
        batch_size, max_attempts, "Starting notification outbox worker"
    );
    tokio::spawn(async move {
        loop {
            match drain_once(&db, &dispatcher, batch_size, max_attempts).await {
                Ok(report) if report.claimed > 0 => debug!(?report, "Outbox drain finished"),
                Ok(_) => {}
                Err(e) => error!("outbox worker error: {}", e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_secs(0), 1);
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(4), 16);
        assert_eq!(backoff_secs(8), 300);
        assert_eq!(backoff_secs(50), 300);
        assert_eq!(backoff_secs(-3), 1);
    }
}
