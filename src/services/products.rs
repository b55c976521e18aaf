use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::business::ensure_location;
use super::stock::{insert_stock_row, record_movement, stock_totals, MovementRecord, StockDelta};
use super::Page;
use crate::db;
use crate::entities::stock_movement::MovementReason;
use crate::entities::{location, product, product_stock, supplier};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::stock_rules;

fn validate_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InitialStock {
    pub location_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "sku is required"))]
    pub sku: String,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_money")]
    pub price: Decimal,
    #[validate(custom = "validate_money")]
    pub cost_price: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 0, message = "reorder_level must not be negative"))]
    pub reorder_level: i32,
    pub supplier_id: Option<Uuid>,
    pub expiry_date: Option<NaiveDate>,
    /// Opening stock per location
    #[serde(default)]
    pub stock: Vec<InitialStock>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_money")]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_money")]
    pub cost_price: Option<Decimal>,
    #[validate(range(min = 0, message = "reorder_level must not be negative"))]
    pub reorder_level: Option<i32>,
    pub supplier_id: Option<Uuid>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ProductFilters {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationStock {
    pub stock_id: Uuid,
    pub location_id: Uuid,
    pub location_name: String,
    pub quantity: i32,
}

/// A product with its derived stock figures.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: product::Model,
    pub total_stock: i64,
    pub low_stock: bool,
    /// Per-location breakdown; empty in list responses
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stock: Vec<LocationStock>,
}

impl ProductView {
    fn new(product: product::Model, total_stock: i64, stock: Vec<LocationStock>) -> Self {
        let low_stock = stock_rules::needs_reorder(total_stock, product.reorder_level);
        Self {
            product,
            total_stock,
            low_stock,
            stock,
        }
    }
}

async fn ensure_supplier<C>(conn: &C, business_id: Uuid, supplier_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    supplier::Entity::find_by_id(supplier_id)
        .filter(supplier::Column::BusinessId.eq(business_id))
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))
}

async fn ensure_unique_sku<C>(
    conn: &C,
    business_id: Uuid,
    sku: &str,
    exclude: Option<Uuid>,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let mut query = product::Entity::find()
        .filter(product::Column::BusinessId.eq(business_id))
        .filter(product::Column::Sku.eq(sku));
    if let Some(id) = exclude {
        query = query.filter(product::Column::Id.ne(id));
    }
    if query.one(conn).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "Product with SKU '{}' already exists",
            sku
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a product and its opening stock in one transaction.
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        business_id: Uuid,
        input: CreateProductInput,
    ) -> Result<ProductView, ServiceError> {
        input.validate()?;
        let mut seen = HashSet::new();
        for level in &input.stock {
            stock_rules::check_stock_level(level.quantity)?;
            if !seen.insert(level.location_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Location {} appears more than once in stock",
                    level.location_id
                )));
            }
        }

        let product_id = db::with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let sku = input.sku.trim().to_string();
                ensure_unique_sku(txn, business_id, &sku, None).await?;
                if let Some(supplier_id) = input.supplier_id {
                    ensure_supplier(txn, business_id, supplier_id).await?;
                }

                let product = product::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    business_id: Set(business_id),
                    name: Set(input.name.trim().to_string()),
                    sku: Set(sku),
                    category: Set(input.category),
                    description: Set(input.description),
                    price: Set(input.price),
                    cost_price: Set(input.cost_price),
                    reorder_level: Set(input.reorder_level),
                    supplier_id: Set(input.supplier_id),
                    expiry_date: Set(input.expiry_date),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                for level in input.stock {
                    ensure_location(txn, business_id, level.location_id).await?;
                    insert_stock_row(txn, product.id, level.location_id, level.quantity).await?;
                    if level.quantity > 0 {
                        record_movement(
                            txn,
                            MovementRecord {
                                business_id,
                                product_id: product.id,
                                location_id: level.location_id,
                                delta: StockDelta {
                                    old_quantity: 0,
                                    new_quantity: level.quantity,
                                },
                                reason: MovementReason::Initial,
                                reference_id: None,
                                note: None,
                            },
                        )
                        .await?;
                    }
                }

                Ok(product.id)
            })
        })
        .await?;

        info!(product_id = %product_id, "Product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;
        self.get_product(business_id, product_id).await
    }

    /// Products with totals and low-stock flags, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        business_id: Uuid,
        filters: ProductFilters,
        page: Page,
    ) -> Result<(Vec<ProductView>, u64), ServiceError> {
        let mut query =
            product::Entity::find().filter(product::Column::BusinessId.eq(business_id));

        if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(search))
                    .add(product::Column::Sku.contains(search)),
            );
        }
        if let Some(category) = filters.category {
            query = query.filter(product::Column::Category.eq(category));
        }

        let paginator = query
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, page.limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.index()).await?;

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let totals = stock_totals(&*self.db, &ids).await?;
        let views = products
            .into_iter()
            .map(|product| {
                let total_stock = totals.get(&product.id).copied().unwrap_or(0);
                ProductView::new(product, total_stock, Vec::new())
            })
            .collect();
        Ok((views, total))
    }

    #[instrument(skip(self))]
    pub async fn get_product(
        &self,
        business_id: Uuid,
        product_id: Uuid,
    ) -> Result<ProductView, ServiceError> {
        let product = super::stock::load_product(&*self.db, business_id, product_id).await?;

        let rows = product_stock::Entity::find()
            .filter(product_stock::Column::ProductId.eq(product_id))
            .find_also_related(location::Entity)
            .all(&*self.db)
            .await?;

        let mut stock: Vec<LocationStock> = rows
            .into_iter()
            .map(|(row, location)| LocationStock {
                stock_id: row.id,
                location_id: row.location_id,
                location_name: location.map(|l| l.name).unwrap_or_default(),
                quantity: row.quantity,
            })
            .collect();
        stock.sort_by(|a, b| a.location_name.cmp(&b.location_name));

        let total: i64 = stock.iter().map(|s| i64::from(s.quantity)).sum();
        Ok(ProductView::new(product, total, stock))
    }

    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        business_id: Uuid,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductView, ServiceError> {
        input.validate()?;
        let existing = super::stock::load_product(&*self.db, business_id, product_id).await?;

        if let Some(sku) = input.sku.as_deref().map(str::trim) {
            if sku != existing.sku {
                ensure_unique_sku(&*self.db, business_id, sku, Some(product_id)).await?;
            }
        }
        if let Some(supplier_id) = input.supplier_id {
            ensure_supplier(&*self.db, business_id, supplier_id).await?;
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(sku) = input.sku {
            active.sku = Set(sku.trim().to_string());
        }
        if let Some(category) = input.category {
            active.category = Set(Some(category));
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(cost_price) = input.cost_price {
            active.cost_price = Set(Some(cost_price));
        }
        if let Some(reorder_level) = input.reorder_level {
            active.reorder_level = Set(reorder_level);
        }
        if let Some(supplier_id) = input.supplier_id {
            active.supplier_id = Set(Some(supplier_id));
        }
        if let Some(expiry_date) = input.expiry_date {
            active.expiry_date = Set(Some(expiry_date));
        }
        active.update(&*self.db).await?;

        info!(product_id = %product_id, "Product updated");
        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;
        self.get_product(business_id, product_id).await
    }

    /// Products expiring within `within_days` days (already expired included),
    /// soonest first.
    #[instrument(skip(self))]
    pub async fn expiring_products(
        &self,
        business_id: Uuid,
        within_days: i64,
    ) -> Result<Vec<ProductView>, ServiceError> {
        if within_days < 0 {
            return Err(ServiceError::ValidationError(
                "days must not be negative".to_string(),
            ));
        }
        let cutoff = Utc::now().date_naive() + Duration::days(within_days.min(3650));

        let products = product::Entity::find()
            .filter(product::Column::BusinessId.eq(business_id))
            .filter(product::Column::ExpiryDate.is_not_null())
            .filter(product::Column::ExpiryDate.lte(cutoff))
            .order_by_asc(product::Column::ExpiryDate)
            .all(&*self.db)
            .await?;

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let totals: HashMap<Uuid, i64> = stock_totals(&*self.db, &ids).await?;
        Ok(products
            .into_iter()
            .map(|product| {
                let total_stock = totals.get(&product.id).copied().unwrap_or(0);
                ProductView::new(product, total_stock, Vec::new())
            })
            .collect())
    }
}
