use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::alerts::evaluate_reorder;
use super::business::{ensure_active_location, load_business};
use super::stock::{load_product, put_stock, record_movement, take_stock, MovementRecord, StockDelta};
use super::Page;
use crate::db;
use crate::entities::stock_movement::MovementReason;
use crate::entities::transaction::{self, PaymentMethod, TransactionStatus};
use crate::entities::{stock_alert, transaction_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::stock_rules;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// A sale as submitted by the till.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub location_id: Uuid,
    #[validate(length(min = 1, message = "A sale needs at least one item"))]
    pub items: Vec<CheckoutLine>,
    pub payment_method: PaymentMethod,
    /// Total the till computed; must match the item total within one cent
    pub total: Decimal,
    /// Cash tendered; required for cash payments
    pub amount_received: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionDetails {
    #[serde(flatten)]
    pub transaction: transaction::Model,
    pub items: Vec<transaction_item::Model>,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletedSale {
    #[serde(flatten)]
    pub details: TransactionDetails,
    /// Low-stock alerts raised by this sale
    pub alerts: Vec<stock_alert::Model>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct TransactionFilters {
    pub location_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

struct SoldLine {
    product_id: Uuid,
    location_id: Uuid,
    delta: StockDelta,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CheckoutService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Records a sale. Stock for every line is decremented with a conditional
    /// update, and the sale, its items, movements and any low-stock alerts are
    /// written in the same database transaction. If any line is short the whole
    /// sale is rolled back.
    #[instrument(skip(self, request), fields(business_id = %business_id, location_id = %request.location_id))]
    pub async fn checkout(
        &self,
        business_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CompletedSale, ServiceError> {
        let result = self.checkout_inner(business_id, request).await;
        match &result {
            Ok(sale) => {
                metrics::counter!("retail_pos_checkouts_total", 1);
                info!(
                    transaction_id = %sale.details.transaction.id,
                    receipt = %sale.details.transaction.receipt_number,
                    total = %sale.details.transaction.total,
                    alerts = sale.alerts.len(),
                    "Checkout completed"
                );
            }
            Err(e) => {
                let reason = match e {
                    ServiceError::InsufficientStock(_) => "insufficient_stock",
                    ServiceError::ValidationError(_) => "validation",
                    ServiceError::NotFound(_) => "not_found",
                    _ => "error",
                };
                metrics::counter!("retail_pos_checkout_rejected_total", 1, "reason" => reason);
                warn!(reason, error = %e, "Checkout rejected");
            }
        }
        result
    }

    async fn checkout_inner(
        &self,
        business_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CompletedSale, ServiceError> {
        request.validate()?;
        if request.total.is_sign_negative() && !request.total.is_zero() {
            return Err(ServiceError::ValidationError(
                "total must not be negative".to_string(),
            ));
        }

        let lines = stock_rules::merge_lines(
            request
                .items
                .iter()
                .map(|line| (line.product_id, line.quantity, line.unit_price)),
        )?;
        let subtotal = stock_rules::subtotal(&lines);
        stock_rules::check_declared_total(subtotal, request.total)?;
        let change = stock_rules::change_due(
            request.payment_method,
            subtotal,
            request.amount_received,
        )?;

        let location_id = request.location_id;
        let payment_method = request.payment_method;
        let amount_received = request.amount_received;

        let (sale, sold) = db::with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let business = load_business(txn, business_id).await?;
                ensure_active_location(txn, business_id, location_id).await?;

                let mut products = Vec::with_capacity(lines.len());
                let mut sold = Vec::with_capacity(lines.len());
                for line in &lines {
                    let product = load_product(txn, business_id, line.product_id).await?;
                    let delta = take_stock(txn, &product, location_id, line.quantity).await?;
                    sold.push(SoldLine {
                        product_id: product.id,
                        location_id,
                        delta,
                    });
                    products.push(product);
                }

                let now = Utc::now();
                let transaction_id = Uuid::new_v4();
                let record = transaction::ActiveModel {
                    id: Set(transaction_id),
                    business_id: Set(business_id),
                    location_id: Set(location_id),
                    receipt_number: Set(transaction::receipt_number(transaction_id, now)),
                    payment_method: Set(payment_method),
                    subtotal: Set(subtotal),
                    total: Set(subtotal),
                    amount_received: Set(amount_received),
                    change_given: Set(change),
                    status: Set(TransactionStatus::Completed),
                    created_at: Set(now),
                    voided_at: Set(None),
                }
                .insert(txn)
                .await?;

                let mut items = Vec::with_capacity(lines.len());
                for ((line, product), sold_line) in lines.iter().zip(&products).zip(&sold) {
                    let item = transaction_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        transaction_id: Set(transaction_id),
                        product_id: Set(product.id),
                        product_name: Set(product.name.clone()),
                        sku: Set(product.sku.clone()),
                        quantity: Set(line.quantity),
                        unit_price: Set(line.unit_price),
                        line_total: Set(line.line_total()),
                    }
                    .insert(txn)
                    .await?;
                    items.push(item);

                    record_movement(
                        txn,
                        MovementRecord {
                            business_id,
                            product_id: product.id,
                            location_id,
                            delta: sold_line.delta,
                            reason: MovementReason::Sale,
                            reference_id: Some(transaction_id),
                            note: None,
                        },
                    )
                    .await?;
                }

                let mut alerts = Vec::new();
                for product in &products {
                    if let Some(alert) =
                        evaluate_reorder(txn, &business, product, Some(location_id)).await?
                    {
                        alerts.push(alert);
                    }
                }

                Ok((
                    CompletedSale {
                        details: TransactionDetails {
                            transaction: record,
                            items,
                        },
                        alerts,
                    },
                    sold,
                ))
            })
        })
        .await?;

        self.emit_after_commit(&sale, &sold).await;
        Ok(sale)
    }

    async fn emit_after_commit(&self, sale: &CompletedSale, sold: &[SoldLine]) {
        for line in sold {
            self.event_sender
                .send_or_log(Event::StockAdjusted {
                    product_id: line.product_id,
                    location_id: line.location_id,
                    old_quantity: line.delta.old_quantity,
                    new_quantity: line.delta.new_quantity,
                    reason: MovementReason::Sale,
                })
                .await;
        }

        let transaction = &sale.details.transaction;
        self.event_sender
            .send_or_log(Event::TransactionCompleted {
                transaction_id: transaction.id,
                business_id: transaction.business_id,
                total: transaction.total,
            })
            .await;

        for alert in &sale.alerts {
            self.event_sender
                .send_or_log(Event::LowStockAlertRaised {
                    alert_id: alert.id,
                    product_id: alert.product_id,
                    quantity: alert.quantity,
                    reorder_level: alert.reorder_level,
                })
                .await;
        }
    }

    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        business_id: Uuid,
        filters: TransactionFilters,
        page: Page,
    ) -> Result<(Vec<transaction::Model>, u64), ServiceError> {
        let mut query = transaction::Entity::find()
            .filter(transaction::Column::BusinessId.eq(business_id));
        if let Some(location_id) = filters.location_id {
            query = query.filter(transaction::Column::LocationId.eq(location_id));
        }
        if let Some(status) = filters.status {
            query = query.filter(transaction::Column::Status.eq(status));
        }
        if let Some(from) = filters.from {
            query = query.filter(transaction::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filters.to {
            query = query.filter(transaction::Column::CreatedAt.lte(to));
        }

        let paginator = query
            .order_by_desc(transaction::Column::CreatedAt)
            .paginate(&*self.db, page.limit);
        let total = paginator.num_items().await?;
        let transactions = paginator.fetch_page(page.index()).await?;
        Ok((transactions, total))
    }

    #[instrument(skip(self))]
    pub async fn get_transaction(
        &self,
        business_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<TransactionDetails, ServiceError> {
        let transaction = transaction::Entity::find_by_id(transaction_id)
            .filter(transaction::Column::BusinessId.eq(business_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Transaction", transaction_id))?;

        let items = transaction_item::Entity::find()
            .filter(transaction_item::Column::TransactionId.eq(transaction_id))
            .all(&*self.db)
            .await?;

        Ok(TransactionDetails { transaction, items })
    }

    /// Voids a completed sale and returns its items to stock at the sale's location.
    #[instrument(skip(self))]
    pub async fn void_transaction(
        &self,
        business_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<TransactionDetails, ServiceError> {
        let (details, restocked) = db::with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let existing = transaction::Entity::find_by_id(transaction_id)
                    .filter(transaction::Column::BusinessId.eq(business_id))
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Transaction", transaction_id))?;

                let now = Utc::now();
                // the status guard makes a concurrent second void a no-op
                let flipped = transaction::Entity::update_many()
                    .col_expr(
                        transaction::Column::Status,
                        Expr::value(TransactionStatus::Voided),
                    )
                    .col_expr(transaction::Column::VoidedAt, Expr::value(Some(now)))
                    .filter(transaction::Column::Id.eq(transaction_id))
                    .filter(transaction::Column::Status.eq(TransactionStatus::Completed))
                    .exec(txn)
                    .await?;
                if flipped.rows_affected == 0 {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Transaction {} is already voided",
                        existing.receipt_number
                    )));
                }

                let items = transaction_item::Entity::find()
                    .filter(transaction_item::Column::TransactionId.eq(transaction_id))
                    .all(txn)
                    .await?;

                let mut restocked = Vec::with_capacity(items.len());
                for item in &items {
                    let delta =
                        put_stock(txn, item.product_id, existing.location_id, item.quantity)
                            .await?;
                    record_movement(
                        txn,
                        MovementRecord {
                            business_id,
                            product_id: item.product_id,
                            location_id: existing.location_id,
                            delta,
                            reason: MovementReason::Void,
                            reference_id: Some(transaction_id),
                            note: Some(format!("Void of {}", existing.receipt_number)),
                        },
                    )
                    .await?;
                    restocked.push(SoldLine {
                        product_id: item.product_id,
                        location_id: existing.location_id,
                        delta,
                    });
                }

                let mut transaction = existing;
                transaction.status = TransactionStatus::Voided;
                transaction.voided_at = Some(now);
                Ok((TransactionDetails { transaction, items }, restocked))
            })
        })
        .await?;

        info!(receipt = %details.transaction.receipt_number, "Transaction voided");
        for line in &restocked {
            self.event_sender
                .send_or_log(Event::StockAdjusted {
                    product_id: line.product_id,
                    location_id: line.location_id,
                    old_quantity: line.delta.old_quantity,
                    new_quantity: line.delta.new_quantity,
                    reason: MovementReason::Void,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::TransactionVoided(transaction_id))
            .await;
        Ok(details)
    }
}
