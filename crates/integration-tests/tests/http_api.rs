//! End-to-end API flows over HTTP.
//!
//! Ignored by default: each test starts a container. Run with
//! `cargo test -p ec-space-integration-tests -- --ignored`.

use ec_space_integration_tests::{TEST_PASSWORD, TestDb, TestServer};
use reqwest::StatusCode;
use serde_json::{Value, json};
use testresult::TestResult;

async fn login(server: &TestServer, client: &reqwest::Client, username: &str) -> TestResult {
    let resp = client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": username, "password": TEST_PASSWORD }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_health_endpoints() -> TestResult {
    let db = TestDb::start().await?;
    let server = TestServer::spawn(&db).await?;
    let client = TestServer::client()?;

    let resp = client.get(server.url("/health")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));

    let resp = client.get(server.url("/health/ready")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_register_shop_and_checkout() -> TestResult {
    let db = TestDb::start().await?;
    let item = db.item("Plasma Rifle", "1200.00", 3).await?;
    let server = TestServer::spawn(&db).await?;
    let client = TestServer::client()?;

    // Register grants the signup credits
    let resp = client
        .post(server.url("/api/auth/register"))
        .json(&json!({
            "username": "nova",
            "email": "nova@station.test",
            "password": TEST_PASSWORD
        }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let profile: Value = resp.json().await?;
    assert_eq!(profile["credits"], "10000.00");

    // Cart requires a session
    let resp = client.get(server.url("/api/cart")).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    login(&server, &client, "nova").await?;

    let resp = client
        .post(server.url("/api/cart"))
        .json(&json!({ "item_id": item, "quantity": 2 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let cart: Value = resp.json().await?;
    assert_eq!(cart["total"], "2400.00");

    // Stale total is refused
    let resp = client
        .post(server.url("/api/orders"))
        .json(&json!({ "total": "2000.00", "items": [{ "item_id": item, "quantity": 2 }] }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "price_mismatch");
    assert_eq!(body["actual"], "2400.00");

    let resp = client
        .post(server.url("/api/orders"))
        .json(&json!({ "total": "2400.00", "items": [{ "item_id": item, "quantity": 2 }] }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let receipt: Value = resp.json().await?;
    assert_eq!(receipt["remaining_balance"], "7600.00");

    let cart: Value = client.get(server.url("/api/cart")).send().await?.json().await?;
    assert_eq!(cart["lines"], json!([]));

    let orders: Value = client.get(server.url("/api/orders")).send().await?.json().await?;
    assert_eq!(orders[0]["id"], receipt["order_id"]);
    assert_eq!(orders[0]["lines"][0]["unit_price_at_purchase"], "1200.00");

    // Only one unit left
    let resp = client
        .post(server.url("/api/orders"))
        .json(&json!({ "total": "2400.00", "items": [{ "item_id": item, "quantity": 2 }] }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 1);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insufficient_credits_and_topup() -> TestResult {
    let db = TestDb::start().await?;
    db.account("drifter", "5.00").await?;
    let item = db.item("Ion Thruster", "40.00", 5).await?;
    let server = TestServer::spawn(&db).await?;
    let client = TestServer::client()?;
    login(&server, &client, "drifter").await?;

    let checkout = json!({ "total": "40.00", "items": [{ "item_id": item, "quantity": 1 }] });
    let resp = client.post(server.url("/api/orders")).json(&checkout).send().await?;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "insufficient_credits");
    assert_eq!(body["balance"], "5.00");

    let resp = client
        .post(server.url("/api/topup"))
        .json(&json!({ "amount": "0" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(server.url("/api/topup"))
        .json(&json!({ "amount": "35.00" }))
        .send()
        .await?;
    let body: Value = resp.json().await?;
    assert_eq!(body["balance"], "40.00");

    let resp = client.post(server.url("/api/orders")).json(&checkout).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_admin_routes_require_admin_role() -> TestResult {
    let db = TestDb::start().await?;
    db.account("pilot", "100.00").await?;
    db.admin("quartermaster").await?;
    let item = db.item("Old Stock", "5.00", 1).await?;
    let server = TestServer::spawn(&db).await?;

    let customer = TestServer::client()?;
    login(&server, &customer, "pilot").await?;
    let resp = customer.get(server.url("/api/admin/orders")).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let admin = TestServer::client()?;
    login(&server, &admin, "quartermaster").await?;

    let resp = admin
        .post(server.url("/api/admin/items"))
        .json(&json!({ "name": "Star Chart", "kind": "navigation", "unit_price": "15.00", "stock_count": 4 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await?;

    let resp = admin
        .patch(server.url(&format!("/api/admin/items/{}", created["id"])))
        .json(&json!({ "stock_count": 10 }))
        .send()
        .await?;
    let updated: Value = resp.json().await?;
    assert_eq!(updated["stock_count"], 10);

    // Bought items cannot be deleted
    let resp = customer
        .post(server.url("/api/orders"))
        .json(&json!({ "total": "5.00", "items": [{ "item_id": item, "quantity": 1 }] }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = admin
        .delete(server.url(&format!("/api/admin/items/{item}")))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = admin
        .delete(server.url(&format!("/api/admin/items/{}", created["id"])))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let orders: Value = admin.get(server.url("/api/admin/orders")).send().await?.json().await?;
    assert_eq!(orders[0]["username"], "pilot");
    Ok(())
}
