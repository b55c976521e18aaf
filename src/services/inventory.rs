use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::alerts::evaluate_reorder;
use super::business::{ensure_active_location, load_business};
use super::stock::{
    find_stock, load_product, put_stock, record_movement, set_stock, take_stock, MovementRecord,
    StockDelta,
};
use super::Page;
use crate::db;
use crate::entities::stock_movement::{self, MovementReason};
use crate::entities::{location, product, product_stock, stock_alert};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::stock_rules;

/// Absolute stock level for one stock row.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SetStockInput {
    /// Stock row id
    pub id: Uuid,
    #[validate(range(min = 0, message = "quantity must not be negative"))]
    pub quantity: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustStockInput {
    pub product_id: Uuid,
    pub location_id: Uuid,
    /// Units to add (positive) or remove (negative)
    pub delta: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TransferStockInput {
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct InventoryFilters {
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub low_stock_only: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct MovementFilters {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

/// A stock row joined with its product and location.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InventoryRow {
    pub stock_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub location_id: Uuid,
    pub location_name: String,
    pub quantity: i32,
    pub reorder_level: i32,
    /// Product total across all locations
    pub total_stock: i64,
    pub low_stock: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockChange {
    pub stock: product_stock::Model,
    pub movement: stock_movement::Model,
    /// Alert raised by this change, if the product fell to its reorder level
    pub alert: Option<stock_alert::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockTransfer {
    pub from: product_stock::Model,
    pub to: product_stock::Model,
    pub movements: Vec<stock_movement::Model>,
}

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Stock rows of the business ordered by product then location name.
    #[instrument(skip(self))]
    pub async fn list_inventory(
        &self,
        business_id: Uuid,
        filters: InventoryFilters,
        page: Page,
    ) -> Result<(Vec<InventoryRow>, u64), ServiceError> {
        let rows = product_stock::Entity::find()
            .find_also_related(product::Entity)
            .filter(product::Column::BusinessId.eq(business_id))
            .all(&*self.db)
            .await?;

        let locations: HashMap<Uuid, String> = location::Entity::find()
            .filter(location::Column::BusinessId.eq(business_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|l| (l.id, l.name))
            .collect();

        let mut totals: HashMap<Uuid, i64> = HashMap::new();
        for (row, _) in &rows {
            *totals.entry(row.product_id).or_insert(0) += i64::from(row.quantity);
        }

        let mut inventory: Vec<InventoryRow> = rows
            .into_iter()
            .filter_map(|(row, product)| product.map(|p| (row, p)))
            .filter(|(row, _)| filters.location_id.map_or(true, |id| row.location_id == id))
            .map(|(row, product)| {
                let total_stock = totals.get(&row.product_id).copied().unwrap_or(0);
                InventoryRow {
                    stock_id: row.id,
                    product_id: product.id,
                    product_name: product.name,
                    sku: product.sku,
                    location_id: row.location_id,
                    location_name: locations.get(&row.location_id).cloned().unwrap_or_default(),
                    quantity: row.quantity,
                    reorder_level: product.reorder_level,
                    total_stock,
                    low_stock: stock_rules::needs_reorder(total_stock, product.reorder_level),
                    updated_at: row.updated_at,
                }
            })
            .filter(|row| !filters.low_stock_only || row.low_stock)
            .collect();

        inventory.sort_by(|a, b| {
            a.product_name
                .cmp(&b.product_name)
                .then_with(|| a.location_name.cmp(&b.location_name))
        });

        let total = inventory.len() as u64;
        Ok((page.slice(&inventory), total))
    }

    /// Sets the absolute quantity of a stock row.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        business_id: Uuid,
        input: SetStockInput,
    ) -> Result<StockChange, ServiceError> {
        input.validate()?;

        let change = db::with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let row = product_stock::Entity::find_by_id(input.id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Stock", input.id))?;
                // the product lookup scopes the row to the business
                let product = load_product(txn, business_id, row.product_id)
                    .await
                    .map_err(|_| ServiceError::not_found("Stock", input.id))?;
                let business = load_business(txn, business_id).await?;

                let location_id = row.location_id;
                let (stock, delta) = set_stock(txn, row, input.quantity).await?;
                let movement = record_movement(
                    txn,
                    MovementRecord {
                        business_id,
                        product_id: product.id,
                        location_id,
                        delta,
                        reason: MovementReason::Set,
                        reference_id: None,
                        note: input.note,
                    },
                )
                .await?;
                let alert = evaluate_reorder(txn, &business, &product, Some(location_id)).await?;

                Ok(StockChange {
                    stock,
                    movement,
                    alert,
                })
            })
        })
        .await?;

        self.emit_change(&change, MovementReason::Set).await;
        Ok(change)
    }

    /// Adds or removes units at one location. Removals use the same conditional
    /// decrement as checkout.
    #[instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        business_id: Uuid,
        input: AdjustStockInput,
    ) -> Result<StockChange, ServiceError> {
        if input.delta == 0 {
            return Err(ServiceError::ValidationError(
                "delta must not be zero".to_string(),
            ));
        }

        let change = db::with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let business = load_business(txn, business_id).await?;
                ensure_active_location(txn, business_id, input.location_id).await?;
                let product = load_product(txn, business_id, input.product_id).await?;

                let delta = if input.delta < 0 {
                    take_stock(txn, &product, input.location_id, input.delta.saturating_neg())
                        .await?
                } else {
                    put_stock(txn, product.id, input.location_id, input.delta).await?
                };

                let stock = find_stock(txn, product.id, input.location_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Stock", product.id))?;
                let movement = record_movement(
                    txn,
                    MovementRecord {
                        business_id,
                        product_id: product.id,
                        location_id: input.location_id,
                        delta,
                        reason: MovementReason::Adjustment,
                        reference_id: None,
                        note: input.note,
                    },
                )
                .await?;
                let alert =
                    evaluate_reorder(txn, &business, &product, Some(input.location_id)).await?;

                Ok(StockChange {
                    stock,
                    movement,
                    alert,
                })
            })
        })
        .await?;

        self.emit_change(&change, MovementReason::Adjustment).await;
        Ok(change)
    }

    /// Moves units between two locations of the business. The product total is
    /// unchanged, so no reorder check runs.
    #[instrument(skip(self))]
    pub async fn transfer_stock(
        &self,
        business_id: Uuid,
        input: TransferStockInput,
    ) -> Result<StockTransfer, ServiceError> {
        input.validate()?;
        if input.from_location_id == input.to_location_id {
            return Err(ServiceError::ValidationError(
                "Source and destination locations must differ".to_string(),
            ));
        }

        let quantity = input.quantity;
        let (transfer, deltas) = db::with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                ensure_active_location(txn, business_id, input.from_location_id).await?;
                ensure_active_location(txn, business_id, input.to_location_id).await?;
                let product = load_product(txn, business_id, input.product_id).await?;

                let out_delta =
                    take_stock(txn, &product, input.from_location_id, input.quantity).await?;
                let in_delta =
                    put_stock(txn, product.id, input.to_location_id, input.quantity).await?;

                let transfer_id = Uuid::new_v4();
                let mut movements = Vec::with_capacity(2);
                for (location_id, delta, reason) in [
                    (input.from_location_id, out_delta, MovementReason::TransferOut),
                    (input.to_location_id, in_delta, MovementReason::TransferIn),
                ] {
                    movements.push(
                        record_movement(
                            txn,
                            MovementRecord {
                                business_id,
                                product_id: product.id,
                                location_id,
                                delta,
                                reason,
                                reference_id: Some(transfer_id),
                                note: input.note.clone(),
                            },
                        )
                        .await?,
                    );
                }

                let from = find_stock(txn, product.id, input.from_location_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Stock", product.id))?;
                let to = find_stock(txn, product.id, input.to_location_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Stock", product.id))?;

                Ok((
                    StockTransfer {
                        from,
                        to,
                        movements,
                    },
                    [out_delta, in_delta],
                ))
            })
        })
        .await?;

        info!(
            product_id = %transfer.from.product_id,
            quantity,
            "Stock transferred"
        );
        let reasons = [MovementReason::TransferOut, MovementReason::TransferIn];
        for ((stock, delta), reason) in [&transfer.from, &transfer.to]
            .into_iter()
            .zip(deltas)
            .zip(reasons)
        {
            self.emit_delta(stock, delta, reason).await;
        }
        Ok(transfer)
    }

    /// Movement ledger, newest first.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        business_id: Uuid,
        filters: MovementFilters,
        page: Page,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let mut query = stock_movement::Entity::find()
            .filter(stock_movement::Column::BusinessId.eq(business_id));
        if let Some(product_id) = filters.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(location_id) = filters.location_id {
            query = query.filter(stock_movement::Column::LocationId.eq(location_id));
        }

        let paginator = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .paginate(&*self.db, page.limit);
        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page.index()).await?;
        Ok((movements, total))
    }

    async fn emit_change(&self, change: &StockChange, reason: MovementReason) {
        let delta = StockDelta {
            old_quantity: change.movement.quantity_after - change.movement.delta,
            new_quantity: change.movement.quantity_after,
        };
        self.emit_delta(&change.stock, delta, reason).await;

        if let Some(alert) = &change.alert {
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

    async fn emit_delta(&self, stock: &product_stock::Model, delta: StockDelta, reason: MovementReason) {
        self.event_sender
            .send_or_log(Event::StockAdjusted {
                product_id: stock.product_id,
                location_id: stock.location_id,
                old_quantity: delta.old_quantity,
                new_quantity: delta.new_quantity,
                reason,
            })
            .await;
    }
}
