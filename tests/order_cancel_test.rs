mod common;

use axum::http::{Method, StatusCode};
use common::{money, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn place_order(app: &TestApp, product_id: uuid::Uuid, quantity: i32) -> Value {
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "delivery_method": "shipping",
                "shipping_address": "12 Bark Lane",
                "shipping_phone": "9800000000",
                "payment_method": "cod",
                "items": [{ "product_id": product_id, "quantity": quantity }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await
}

#[tokio::test]
async fn cancelling_a_pending_order_restocks_it() {
    let app = TestApp::new().await;
    let product = app.seed_product("Aquarium Filter", dec!(40.00), 6).await;

    let order = place_order(&app, product.id, 4).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    assert_eq!(app.product_stock(product.id).await, 2);

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "cancelled");
    assert!(!body["cancelled_at"].is_null());

    // Every unit comes back
    assert_eq!(app.product_stock(product.id).await, 6);
}

#[tokio::test]
async fn cancelling_twice_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Parrot Perch", dec!(14.00), 5).await;

    let order = place_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "invalid_transition");

    // Restock happened exactly once
    assert_eq!(app.product_stock(product.id).await, 5);
}

#[tokio::test]
async fn users_cannot_see_or_cancel_foreign_orders() {
    let app = TestApp::new().await;
    let product = app.seed_product("Heat Lamp", dec!(22.00), 5).await;

    let order = place_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let other_token = app.token_for(uuid::Uuid::new_v4(), vec!["customer".to_string()]);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&other_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
            Some(&other_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(app.product_stock(product.id).await, 4);
}

#[tokio::test]
async fn fulfillment_walks_forward_and_locks_out_cancellation() {
    let app = TestApp::new().await;
    let product = app.seed_product("Dog Crate XL", dec!(80.00), 3).await;

    let order = place_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let status_uri = format!("/api/v1/orders/{}/status", order_id);

    for next in ["processing", "packed", "shipped"] {
        let response = app
            .request_authenticated(Method::PUT, &status_uri, Some(json!({ "status": next })))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["status"], next);
    }

    // Shipped orders can no longer be cancelled
    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "invalid_transition");
    assert_eq!(app.product_stock(product.id).await, 2);

    let response = app
        .request_authenticated(Method::PUT, &status_uri, Some(json!({ "status": "delivered" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "delivered");
    assert!(!body["delivered_at"].is_null());
}

#[tokio::test]
async fn skipping_fulfillment_steps_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Cat Tree", dec!(55.00), 2).await;

    let order = place_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn status_updates_require_the_admin_role() {
    let app = TestApp::new().await;
    let product = app.seed_product("Litter Scoop", dec!(3.00), 5).await;

    let order = place_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let customer_token = app.token_for(app.user_id, vec!["customer".to_string()]);
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "processing" })),
            Some(&customer_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn order_history_is_scoped_and_newest_first() {
    let app = TestApp::new().await;
    let product = app.seed_product("Treat Pouch", dec!(9.00), 20).await;

    let first = place_order(&app, product.id, 1).await;
    let second = place_order(&app, product.id, 2).await;

    // A stranger's order never shows up in this user's history
    let other_token = app.token_for(uuid::Uuid::new_v4(), vec!["customer".to_string()]);
    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(&other_token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["pagination"]["total"], 0);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/orders", None)
        .await;
    let body = response_json(response).await;
    let orders = body["data"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["order_number"], second["order_number"]);
    assert_eq!(orders[1]["order_number"], first["order_number"]);
    assert_eq!(body["pagination"]["total"], 2);
}

#[tokio::test]
async fn order_history_pages_through_results() {
    let app = TestApp::new().await;
    let product = app.seed_product("Clicker Trainer", dec!(4.00), 20).await;

    let first = place_order(&app, product.id, 1).await;
    let second = place_order(&app, product.id, 1).await;
    let third = place_order(&app, product.id, 1).await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/orders?page=1&per_page=2", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let page_one = body["data"].as_array().unwrap();
    assert_eq!(page_one.len(), 2);
    assert_eq!(page_one[0]["order_number"], third["order_number"]);
    assert_eq!(page_one[1]["order_number"], second["order_number"]);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["total_pages"], 2);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/orders?page=2&per_page=2", None)
        .await;
    let body = response_json(response).await;
    let page_two = body["data"].as_array().unwrap();
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0]["order_number"], first["order_number"]);
}

#[tokio::test]
async fn fetching_an_order_includes_its_items() {
    let app = TestApp::new().await;
    let product = app.seed_product("Slow Feeder Bowl", dec!(16.00), 5).await;

    let order = place_order(&app, product.id, 2).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_name"], "Slow Feeder Bowl");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(money(&items[0]["product_price"]), dec!(16.00));
}
