//! Concurrent sales against a file-backed SQLite pool with several connections.
//!
//! SQLite reports write-lock contention as a database error, so a losing sale may
//! fail with `DatabaseError` as well as `InsufficientStock` or `Conflict`. Whatever
//! the mix, stock must never go negative and must account for every successful sale.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use retail_pos_api::entities::transaction::PaymentMethod;
use retail_pos_api::errors::ServiceError;
use retail_pos_api::services::checkout::{CheckoutLine, CheckoutRequest};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Barrier;
use uuid::Uuid;

const POOL_CONNECTIONS: u32 = 4;

fn request(location_id: Uuid, product_id: Uuid, quantity: i32, unit_price: Decimal) -> CheckoutRequest {
    CheckoutRequest {
        location_id,
        items: vec![CheckoutLine {
            product_id,
            quantity,
            unit_price,
        }],
        payment_method: PaymentMethod::Card,
        total: unit_price * Decimal::from(quantity),
        amount_received: None,
    }
}

/// Starts `sales` checkouts at once and returns how many succeeded.
async fn race_sales(app: &TestApp, business_id: Uuid, template: CheckoutRequest, sales: usize) -> i64 {
    let barrier = Arc::new(Barrier::new(sales));
    let mut tasks = Vec::with_capacity(sales);
    for _ in 0..sales {
        let checkout = app.state.services.checkout.clone();
        let req = template.clone();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            checkout.checkout(business_id, req).await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_matches!(
                e,
                ServiceError::InsufficientStock(_)
                    | ServiceError::Conflict(_)
                    | ServiceError::DatabaseError(_)
            ),
        }
    }
    succeeded
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_sales_of_three_against_five_sell_at_most_once() {
    let app = TestApp::file_backed(POOL_CONNECTIONS).await;
    let shop = app.onboard("Busy Shop", None).await;
    let product = app.seed_product(&shop, "HOT", "2.00", 5, 0).await;

    let succeeded = race_sales(
        &app,
        shop.business_id,
        request(shop.location_id, product, 3, dec!(2.00)),
        2,
    )
    .await;

    assert!(succeeded <= 1, "{succeeded} sales of 3 went through against 5 units");
    let remaining = app.stock_at(&shop, product, shop.location_id).await;
    assert_eq!(remaining, 5 - 3 * succeeded);
    assert!(remaining >= 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_single_unit_sales_never_oversell() {
    let app = TestApp::file_backed(POOL_CONNECTIONS).await;
    let shop = app.onboard("Busy Shop", None).await;
    let product = app.seed_product(&shop, "LAST", "1.00", 5, 0).await;

    let succeeded = race_sales(
        &app,
        shop.business_id,
        request(shop.location_id, product, 1, dec!(1.00)),
        12,
    )
    .await;

    assert!(succeeded <= 5, "sold {succeeded} units with 5 on hand");
    assert_eq!(
        app.stock_at(&shop, product, shop.location_id).await,
        5 - succeeded
    );

    // every successful sale left exactly one transaction behind
    let (_, body) = app.get("/api/transactions", &shop).await;
    assert_eq!(body["data"]["total"].as_i64(), Some(succeeded));
}

#[tokio::test]
async fn serialized_sales_sell_exactly_the_units_on_hand() {
    let app = TestApp::new().await;
    let shop = app.onboard("Queue Shop", None).await;
    let product = app.seed_product(&shop, "ONE", "1.00", 5, 0).await;

    let succeeded = race_sales(
        &app,
        shop.business_id,
        request(shop.location_id, product, 1, dec!(1.00)),
        12,
    )
    .await;

    assert_eq!(succeeded, 5);
    assert_eq!(app.stock_at(&shop, product, shop.location_id).await, 0);
}
