mod common;

use axum::http::{Method, StatusCode};
use common::{decimal_at, uuid_at, TestApp, Tenant};
use retail_pos_api::events::Event;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn sale(tenant: &Tenant, lines: &[(Uuid, i32, &str)], total: &str) -> Value {
    json!({
        "location_id": tenant.location_id,
        "payment_method": "card",
        "total": total,
        "items": lines
            .iter()
            .map(|(id, qty, price)| json!({ "product_id": id, "quantity": qty, "unit_price": price }))
            .collect::<Vec<_>>(),
    })
}

async fn totals(app: &TestApp, tenant: &Tenant, uri: &str) -> u64 {
    let (status, body) = app.get(uri, tenant).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["total"].as_u64().unwrap()
}

#[tokio::test]
async fn sale_above_reorder_level_raises_no_alert() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", Some("owner@corner.test")).await;
    let tea = app.seed_product(&shop, "TEA-1", "3.00", 20, 5).await;

    let (status, body) = app
        .post("/api/transactions", sale(&shop, &[(tea, 2, "3.00")], "6.00"), &shop)
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["alerts"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(decimal_at(&body, "/data/total"), dec!(6.00));
    assert!(body["data"]["receipt_number"]
        .as_str()
        .unwrap()
        .starts_with("RCPT-"));
    assert_eq!(app.stock_at(&shop, tea, shop.location_id).await, 18);
    assert_eq!(totals(&app, &shop, "/api/alerts").await, 0);
}

#[tokio::test]
async fn sale_to_reorder_level_raises_exactly_one_alert() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", Some("owner@corner.test")).await;
    let p = app.seed_product(&shop, "P-100", "2.50", 5, 10).await;

    let (status, body) = app
        .post("/api/transactions", sale(&shop, &[(p, 1, "2.50")], "2.50"), &shop)
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(app.stock_at(&shop, p, shop.location_id).await, 4);

    let alerts = body["data"]["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    let message = alerts[0]["message"].as_str().unwrap();
    assert!(message.contains("Product P-100"), "{message}");
    assert!(message.contains("SKU P-100"), "{message}");
    assert_eq!(alerts[0]["quantity"], 4);
    assert_eq!(alerts[0]["status"], "unread");

    let (_, listed) = app.get("/api/alerts?status=unread", &shop).await;
    assert_eq!(listed["data"]["total"], 1);
    assert_eq!(uuid_at(&listed, "/data/items/0/product_id"), p);
}

#[tokio::test]
async fn one_short_line_rejects_the_whole_sale() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", Some("owner@corner.test")).await;
    let bread = app.seed_product(&shop, "BREAD", "1.20", 10, 0).await;
    let q = app.seed_product(&shop, "Q-2", "4.00", 2, 1).await;

    let (status, body) = app
        .post(
            "/api/transactions",
            sale(&shop, &[(bread, 1, "1.20"), (q, 5, "4.00")], "21.20"),
            &shop,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Product Q-2"), "{message}");
    assert!(message.contains("only 2 available"), "{message}");

    // nothing from the rejected sale survives
    assert_eq!(app.stock_at(&shop, bread, shop.location_id).await, 10);
    assert_eq!(app.stock_at(&shop, q, shop.location_id).await, 2);
    assert_eq!(totals(&app, &shop, "/api/transactions").await, 0);
    assert_eq!(totals(&app, &shop, "/api/alerts").await, 0);
    assert_eq!(
        totals(&app, &shop, "/api/inventory/movements").await,
        2,
        "only the opening movements remain"
    );
}

#[tokio::test]
async fn declared_total_must_match_items() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", None).await;
    let tea = app.seed_product(&shop, "TEA-1", "3.00", 20, 5).await;

    let (status, body) = app
        .post("/api/transactions", sale(&shop, &[(tea, 2, "3.00")], "5.00"), &shop)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("does not match item total"));
    assert_eq!(app.stock_at(&shop, tea, shop.location_id).await, 20);
}

#[tokio::test]
async fn cash_sale_records_change() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", None).await;
    let cake = app.seed_product(&shop, "CAKE", "2.50", 10, 0).await;

    let mut request = sale(&shop, &[(cake, 3, "2.50")], "7.50");
    request["payment_method"] = json!("cash");
    request["amount_received"] = json!("10.00");
    let (status, body) = app.post("/api/transactions", request, &shop).await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(decimal_at(&body, "/data/change_given"), dec!(2.50));

    let mut short = sale(&shop, &[(cake, 1, "2.50")], "2.50");
    short["payment_method"] = json!("cash");
    short["amount_received"] = json!("1.00");
    let (status, _) = app.post("/api/transactions", short, &shop).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_at(&shop, cake, shop.location_id).await, 7);
}

#[tokio::test]
async fn repeated_lines_are_merged() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", None).await;
    let milk = app.seed_product(&shop, "MILK", "1.00", 3, 0).await;

    // 2 + 2 exceeds the 3 on hand even though each line alone fits
    let (status, _) = app
        .post(
            "/api/transactions",
            sale(&shop, &[(milk, 2, "1.00"), (milk, 2, "1.00")], "4.00"),
            &shop,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_at(&shop, milk, shop.location_id).await, 3);

    let (status, body) = app
        .post(
            "/api/transactions",
            sale(&shop, &[(milk, 1, "1.00"), (milk, 2, "1.00")], "3.00"),
            &shop,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(app.stock_at(&shop, milk, shop.location_id).await, 0);
}

#[tokio::test]
async fn empty_sale_is_rejected() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", None).await;

    let (status, body) = app
        .post("/api/transactions", sale(&shop, &[], "0.00"), &shop)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("at least one item"));
}

#[tokio::test]
async fn products_of_other_businesses_cannot_be_sold() {
    let app = TestApp::new().await;
    let mine = app.onboard("Mine", None).await;
    let theirs = app.onboard("Theirs", None).await;
    let their_product = app.seed_product(&theirs, "THEIRS", "1.00", 5, 0).await;

    let (status, _) = app
        .post(
            "/api/transactions",
            sale(&mine, &[(their_product, 1, "1.00")], "1.00"),
            &mine,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // selling at a location of another business is also rejected
    let request = json!({
        "location_id": theirs.location_id,
        "payment_method": "card",
        "total": "1.00",
        "items": [{ "product_id": their_product, "quantity": 1, "unit_price": "1.00" }]
    });
    let (status, _) = app.post("/api/transactions", request, &mine).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.stock_at(&theirs, their_product, theirs.location_id).await, 5);
}

#[tokio::test]
async fn requests_need_a_known_business_header() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/transactions", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("X-Business-Id"));

    let (status, _) = app
        .call(Method::GET, "/api/transactions", None, Some(Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn void_restocks_and_cannot_repeat() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", None).await;
    let jam = app.seed_product(&shop, "JAM", "4.00", 6, 0).await;

    let (_, body) = app
        .post("/api/transactions", sale(&shop, &[(jam, 4, "4.00")], "16.00"), &shop)
        .await;
    let transaction_id = uuid_at(&body, "/data/id");
    assert_eq!(app.stock_at(&shop, jam, shop.location_id).await, 2);

    let uri = format!("/api/transactions/{transaction_id}/void");
    let (status, voided) = app.post(&uri, json!({}), &shop).await;
    assert_eq!(status, StatusCode::OK, "{voided}");
    assert_eq!(voided["data"]["status"], "voided");
    assert!(!voided["data"]["voided_at"].is_null());
    assert_eq!(app.stock_at(&shop, jam, shop.location_id).await, 6);

    let (status, body) = app.post(&uri, json!({}), &shop).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("already voided"));
    assert_eq!(app.stock_at(&shop, jam, shop.location_id).await, 6);

    let (_, listed) = app.get("/api/transactions?status=voided", &shop).await;
    assert_eq!(listed["data"]["total"], 1);
}

#[tokio::test]
async fn sale_is_recorded_in_the_movement_ledger_and_events() {
    let app = TestApp::new().await;
    let shop = app.onboard("Corner Shop", None).await;
    let soap = app.seed_product(&shop, "SOAP", "1.50", 4, 3).await;

    let (_, body) = app
        .post("/api/transactions", sale(&shop, &[(soap, 2, "1.50")], "3.00"), &shop)
        .await;
    let transaction_id = uuid_at(&body, "/data/id");

    let (_, movements) = app
        .get(&format!("/api/inventory/movements?product_id={soap}"), &shop)
        .await;
    let latest = &movements["data"]["items"][0];
    assert_eq!(latest["reason"], "sale");
    assert_eq!(latest["delta"], -2);
    assert_eq!(latest["quantity_after"], 2);
    assert_eq!(uuid_at(latest, "/reference_id"), transaction_id);

    app.settle_events().await;
    let events = app.events.snapshot();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::TransactionCompleted { transaction_id: id, .. } if *id == transaction_id
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::LowStockAlertRaised { product_id, quantity: 2, .. } if *product_id == soap
    )));
}
