//! Stock primitives shared by checkout, inventory adjustments and voids.
//!
//! Every function takes a generic connection so callers can run it on the pool or
//! inside an open `DatabaseTransaction`. Decrements are conditional updates: the
//! `quantity >= n` guard is evaluated by the database, so concurrent callers can never
//! take the same units twice.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::stock_movement::MovementReason;
use crate::entities::{product, product_stock, stock_movement};
use crate::errors::ServiceError;
use crate::stock_rules;

/// Quantity before and after a single stock mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDelta {
    pub old_quantity: i32,
    pub new_quantity: i32,
}

pub(crate) async fn find_stock<C>(
    conn: &C,
    product_id: Uuid,
    location_id: Uuid,
) -> Result<Option<product_stock::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(product_stock::Entity::find()
        .filter(product_stock::Column::ProductId.eq(product_id))
        .filter(product_stock::Column::LocationId.eq(location_id))
        .one(conn)
        .await?)
}

/// Loads a product owned by `business_id`.
pub(crate) async fn load_product<C>(
    conn: &C,
    business_id: Uuid,
    product_id: Uuid,
) -> Result<product::Model, ServiceError>
where
    C: ConnectionTrait,
{
    product::Entity::find_by_id(product_id)
        .filter(product::Column::BusinessId.eq(business_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product", product_id))
}

/// Removes `quantity` units from one location, failing with `InsufficientStock`
/// when fewer are on hand.
pub(crate) async fn take_stock<C>(
    conn: &C,
    product: &product::Model,
    location_id: Uuid,
    quantity: i32,
) -> Result<StockDelta, ServiceError>
where
    C: ConnectionTrait,
{
    stock_rules::check_requested_quantity(quantity)?;

    let result = product_stock::Entity::update_many()
        .col_expr(
            product_stock::Column::Quantity,
            Expr::col(product_stock::Column::Quantity).sub(quantity),
        )
        .col_expr(product_stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product_stock::Column::ProductId.eq(product.id))
        .filter(product_stock::Column::LocationId.eq(location_id))
        .filter(product_stock::Column::Quantity.gte(quantity))
        .exec(conn)
        .await?;

    let current = find_stock(conn, product.id, location_id)
        .await?
        .map(|row| row.quantity)
        .unwrap_or(0);

    if result.rows_affected == 0 {
        stock_rules::check_sufficiency(&product.name, &product.sku, current, quantity)?;
        // the guard failed but a re-read shows enough: another writer moved it in between
        return Err(ServiceError::Conflict(format!(
            "Stock for {} changed while it was being updated; retry the request",
            product.sku
        )));
    }

    Ok(StockDelta {
        old_quantity: current + quantity,
        new_quantity: current,
    })
}

/// Adds `quantity` units at one location, creating the stock row when missing.
/// A single upsert, so two callers creating the same row both land.
pub(crate) async fn put_stock<C>(
    conn: &C,
    product_id: Uuid,
    location_id: Uuid,
    quantity: i32,
) -> Result<StockDelta, ServiceError>
where
    C: ConnectionTrait,
{
    stock_rules::check_requested_quantity(quantity)?;

    let now = Utc::now();
    let row = product_stock::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        location_id: Set(location_id),
        quantity: Set(quantity),
        updated_at: Set(now),
    };
    product_stock::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([
                product_stock::Column::ProductId,
                product_stock::Column::LocationId,
            ])
            .value(
                product_stock::Column::Quantity,
                Expr::col((product_stock::Entity, product_stock::Column::Quantity)).add(quantity),
            )
            .value(product_stock::Column::UpdatedAt, Expr::value(now))
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    let new_quantity = find_stock(conn, product_id, location_id)
        .await?
        .map(|row| row.quantity)
        .ok_or_else(|| ServiceError::InternalError("stock row missing after upsert".to_string()))?;
    Ok(StockDelta {
        old_quantity: new_quantity - quantity,
        new_quantity,
    })
}

pub(crate) async fn insert_stock_row<C>(
    conn: &C,
    product_id: Uuid,
    location_id: Uuid,
    quantity: i32,
) -> Result<product_stock::Model, ServiceError>
where
    C: ConnectionTrait,
{
    stock_rules::check_stock_level(quantity)?;
    let row = product_stock::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        location_id: Set(location_id),
        quantity: Set(quantity),
        updated_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(row)
}

/// Overwrites a stock row's quantity, provided it still holds the quantity the
/// caller read. A concurrent change in between yields `Conflict`.
pub(crate) async fn set_stock<C>(
    conn: &C,
    row: product_stock::Model,
    quantity: i32,
) -> Result<(product_stock::Model, StockDelta), ServiceError>
where
    C: ConnectionTrait,
{
    stock_rules::check_stock_level(quantity)?;
    let old_quantity = row.quantity;
    let now = Utc::now();

    let result = product_stock::Entity::update_many()
        .col_expr(product_stock::Column::Quantity, Expr::value(quantity))
        .col_expr(product_stock::Column::UpdatedAt, Expr::value(now))
        .filter(product_stock::Column::Id.eq(row.id))
        .filter(product_stock::Column::Quantity.eq(old_quantity))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Stock row {} changed while it was being updated; retry the request",
            row.id
        )));
    }

    Ok((
        product_stock::Model {
            quantity,
            updated_at: now,
            ..row
        },
        StockDelta {
            old_quantity,
            new_quantity: quantity,
        },
    ))
}

/// Ledger entry for a stock change.
#[derive(Debug, Clone)]
pub(crate) struct MovementRecord {
    pub business_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub delta: StockDelta,
    pub reason: MovementReason,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
}

pub(crate) async fn record_movement<C>(
    conn: &C,
    record: MovementRecord,
) -> Result<stock_movement::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(record.business_id),
        product_id: Set(record.product_id),
        location_id: Set(record.location_id),
        delta: Set(record.delta.new_quantity - record.delta.old_quantity),
        quantity_after: Set(record.delta.new_quantity),
        reason: Set(record.reason),
        reference_id: Set(record.reference_id),
        note: Set(record.note),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(movement)
}

/// Sum of a product's stock across all locations.
pub(crate) async fn total_stock<C>(conn: &C, product_id: Uuid) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let rows = product_stock::Entity::find()
        .filter(product_stock::Column::ProductId.eq(product_id))
        .all(conn)
        .await?;
    Ok(rows.iter().map(|row| i64::from(row.quantity)).sum())
}

/// Totals for many products at once; products without stock rows map to zero.
pub(crate) async fn stock_totals<C>(
    conn: &C,
    product_ids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut totals: HashMap<Uuid, i64> = product_ids.iter().map(|id| (*id, 0)).collect();
    if product_ids.is_empty() {
        return Ok(totals);
    }

    let rows = product_stock::Entity::find()
        .filter(product_stock::Column::ProductId.is_in(product_ids.iter().copied()))
        .all(conn)
        .await?;
    for row in rows {
        *totals.entry(row.product_id).or_insert(0) += i64::from(row.quantity);
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::{business, location};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};

    struct Fixture {
        db: DatabaseConnection,
        product: product::Model,
        location_id: Uuid,
    }

    async fn fixture(quantity: i32) -> Fixture {
        let db = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&db).await.unwrap();

        let shop = business::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Kiosk".into()),
            currency: Set("USD".into()),
            alert_channel: Set(crate::entities::stock_alert::AlertChannel::Email),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        let till = location::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(shop.id),
            name: Set("Front".into()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(shop.id),
            name: Set("Gum".into()),
            sku: Set("GUM".into()),
            price: Set(dec!(1.00)),
            reorder_level: Set(0),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        insert_stock_row(&db, product.id, till.id, quantity).await.unwrap();

        Fixture {
            db,
            product,
            location_id: till.id,
        }
    }

    async fn quantity(f: &Fixture) -> i32 {
        find_stock(&f.db, f.product.id, f.location_id)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn take_stock_reports_shortfall() {
        let f = fixture(2).await;
        let err = take_stock(&f.db, &f.product, f.location_id, 5).await.unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(msg) if msg.contains("only 2 available"));
        assert_eq!(quantity(&f).await, 2);
    }

    #[tokio::test]
    async fn take_stock_reports_conflict_when_guard_misses_with_stock_on_hand() {
        let f = fixture(5).await;
        // skip every update, the way a lost race leaves the guard unmatched
        f.db.execute(Statement::from_string(
            DbBackend::Sqlite,
            "CREATE TRIGGER hold_stock BEFORE UPDATE ON product_stock \
             BEGIN SELECT RAISE(IGNORE); END"
                .to_string(),
        ))
        .await
        .unwrap();

        let err = take_stock(&f.db, &f.product, f.location_id, 3).await.unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
        assert_eq!(quantity(&f).await, 5);
    }

    #[tokio::test]
    async fn set_stock_refuses_a_stale_row() {
        let f = fixture(5).await;
        let stale = find_stock(&f.db, f.product.id, f.location_id)
            .await
            .unwrap()
            .unwrap();
        // a sale lands between the read and the write
        take_stock(&f.db, &f.product, f.location_id, 3).await.unwrap();

        let err = set_stock(&f.db, stale, 10).await.unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
        assert_eq!(quantity(&f).await, 2);

        let fresh = find_stock(&f.db, f.product.id, f.location_id)
            .await
            .unwrap()
            .unwrap();
        let (row, delta) = set_stock(&f.db, fresh, 10).await.unwrap();
        assert_eq!(row.quantity, 10);
        assert_eq!(delta.new_quantity - delta.old_quantity, 8);
        assert_eq!(quantity(&f).await, 10);
    }

    #[tokio::test]
    async fn put_stock_upserts_missing_and_existing_rows() {
        let f = fixture(1).await;
        let delta = put_stock(&f.db, f.product.id, f.location_id, 4).await.unwrap();
        assert_eq!(delta, StockDelta { old_quantity: 1, new_quantity: 5 });

        let other = location::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(f.product.business_id),
            name: Set("Back".into()),
            ..Default::default()
        }
        .insert(&f.db)
        .await
        .unwrap();
        let delta = put_stock(&f.db, f.product.id, other.id, 3).await.unwrap();
        assert_eq!(delta, StockDelta { old_quantity: 0, new_quantity: 3 });

        // the same row again accumulates instead of tripping the unique index
        let delta = put_stock(&f.db, f.product.id, other.id, 2).await.unwrap();
        assert_eq!(delta, StockDelta { old_quantity: 3, new_quantity: 5 });
        assert_eq!(total_stock(&f.db, f.product.id).await.unwrap(), 10);
    }
}
