use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::stock::total_stock;
use super::Page;
use crate::entities::stock_alert::{self, AlertStatus};
use crate::entities::{business, product};
use crate::errors::ServiceError;
use crate::notifications::outbox::{self, NewNotification};
use crate::stock_rules;

/// Either an explicit list of ids or every unread alert of the business.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MarkAlertsRead {
    #[serde(default)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub all: bool,
}

/// Creates a low-stock alert when the product's total stock is at or below its
/// reorder level, and queues the notification for the business's channel.
///
/// Runs on the caller's connection; checkout and inventory adjustments pass their
/// open transaction so the alert commits or rolls back with the stock change.
pub(crate) async fn evaluate_reorder<C>(
    conn: &C,
    business: &business::Model,
    product: &product::Model,
    location_id: Option<Uuid>,
) -> Result<Option<stock_alert::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let total = total_stock(conn, product.id).await?;
    if !stock_rules::needs_reorder(total, product.reorder_level) {
        return Ok(None);
    }

    let message =
        stock_rules::low_stock_message(&product.name, &product.sku, total, product.reorder_level);
    let alert = stock_alert::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(business.id),
        product_id: Set(product.id),
        location_id: Set(location_id),
        message: Set(message.clone()),
        channel: Set(business.alert_channel),
        status: Set(AlertStatus::Unread),
        quantity: Set(i32::try_from(total).unwrap_or(i32::MAX)),
        reorder_level: Set(product.reorder_level),
        created_at: Set(Utc::now()),
        read_at: Set(None),
    }
    .insert(conn)
    .await?;

    metrics::counter!("retail_pos_low_stock_alerts_total", 1);

    match business.alert_recipient() {
        Some(recipient) => {
            outbox::enqueue(
                conn,
                NewNotification {
                    alert_id: Some(alert.id),
                    channel: business.alert_channel,
                    recipient: recipient.to_string(),
                    subject: format!("Low stock: {} ({})", product.name, product.sku),
                    body: message,
                },
            )
            .await?;
        }
        None => {
            warn!(
                business_id = %business.id,
                channel = %business.alert_channel,
                "No recipient on file; alert recorded without notification"
            );
        }
    }

    Ok(Some(alert))
}

#[derive(Clone)]
pub struct AlertService {
    db: Arc<DatabaseConnection>,
}

impl AlertService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Alerts newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_alerts(
        &self,
        business_id: Uuid,
        status: Option<AlertStatus>,
        page: Page,
    ) -> Result<(Vec<stock_alert::Model>, u64), ServiceError> {
        let mut query = stock_alert::Entity::find()
            .filter(stock_alert::Column::BusinessId.eq(business_id));
        if let Some(status) = status {
            query = query.filter(stock_alert::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(stock_alert::Column::CreatedAt)
            .paginate(&*self.db, page.limit);
        let total = paginator.num_items().await?;
        let alerts = paginator.fetch_page(page.index()).await?;
        Ok((alerts, total))
    }

    /// Marks alerts read and returns how many changed. Ids belonging to other
    /// businesses, or already read, are skipped.
    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        business_id: Uuid,
        request: MarkAlertsRead,
    ) -> Result<u64, ServiceError> {
        if !request.all && request.ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "Provide alert ids or set all to true".to_string(),
            ));
        }

        let mut update = stock_alert::Entity::update_many()
            .col_expr(stock_alert::Column::Status, Expr::value(AlertStatus::Read))
            .col_expr(stock_alert::Column::ReadAt, Expr::value(Some(Utc::now())))
            .filter(stock_alert::Column::BusinessId.eq(business_id))
            .filter(stock_alert::Column::Status.eq(AlertStatus::Unread));
        if !request.all {
            update = update.filter(stock_alert::Column::Id.is_in(request.ids));
        }

        let result = update.exec(&*self.db).await?;
        info!(updated = result.rows_affected, "Alerts marked read");
        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    pub async fn mark_one_read(
        &self,
        business_id: Uuid,
        alert_id: Uuid,
    ) -> Result<stock_alert::Model, ServiceError> {
        let alert = stock_alert::Entity::find_by_id(alert_id)
            .filter(stock_alert::Column::BusinessId.eq(business_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Alert", alert_id))?;

        if alert.status == AlertStatus::Read {
            return Ok(alert);
        }

        let mut active: stock_alert::ActiveModel = alert.into();
        active.status = Set(AlertStatus::Read);
        active.read_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn unread_count(&self, business_id: Uuid) -> Result<u64, ServiceError> {
        Ok(stock_alert::Entity::find()
            .filter(stock_alert::Column::BusinessId.eq(business_id))
            .filter(stock_alert::Column::Status.eq(AlertStatus::Unread))
            .count(&*self.db)
            .await?)
    }
}
