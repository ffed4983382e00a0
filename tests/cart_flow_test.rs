mod common;

use axum::http::{Method, StatusCode};
use common::{money, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn cart_requires_authentication() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_cart_is_created_on_first_access() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["total_items"], 0);
    assert_eq!(money(&body["subtotal"]), dec!(0));
}

#[tokio::test]
async fn adding_same_product_twice_merges_into_one_line() {
    let app = TestApp::new().await;
    let product = app.seed_product("Salmon Treats", dec!(10.00), 10).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 3 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(money(&items[0]["product_price"]), dec!(10.00));
    assert_eq!(money(&items[0]["subtotal"]), dec!(50.00));
    assert_eq!(body["total_items"], 5);
    assert_eq!(money(&body["subtotal"]), dec!(50.00));
}

#[tokio::test]
async fn cart_keeps_price_promised_at_add_time() {
    let app = TestApp::new().await;
    let product = app.seed_product("Catnip Mice", dec!(4.50), 20).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Reprice the catalog after the add
    {
        use sea_orm::{ActiveModelTrait, Set};
        let mut active: pawstore_api::entities::product::ActiveModel = product.clone().into();
        active.price = Set(dec!(9.99));
        active.update(&*app.state.db).await.unwrap();
    }

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(money(&body["items"][0]["product_price"]), dec!(4.50));
    assert_eq!(money(&body["subtotal"]), dec!(4.50));
}

#[tokio::test]
async fn adding_beyond_stock_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Small Batch Chews", dec!(6.00), 3).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Combined line quantity (2 + 2) exceeds stock of 3
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["code"], "insufficient_stock");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Small Batch Chews"));

    // Carts never touch stock
    assert_eq!(app.product_stock(product.id).await, 3);
}

#[tokio::test]
async fn adding_unknown_product_returns_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": uuid::Uuid::new_v4(), "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn update_item_sets_quantity_and_rejects_zero() {
    let app = TestApp::new().await;
    let product = app.seed_product("Rope Toy", dec!(12.00), 10).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        )
        .await;
    let body = response_json(response).await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", item_id),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["items"][0]["quantity"], 4);

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", item_id),
            Some(json!({ "quantity": 0 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn update_item_repairs_a_missing_price_snapshot() {
    let app = TestApp::new().await;
    let product = app.seed_product("Collar Tag", dec!(3.00), 10).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        )
        .await;
    let body = response_json(response).await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    // Simulate a legacy row written before snapshots existed
    {
        use sea_orm::{ActiveModelTrait, ActiveValue, Set};
        let item = pawstore_api::entities::cart_item::ActiveModel {
            id: ActiveValue::Unchanged(item_id.parse().unwrap()),
            product_price: Set(None),
            ..Default::default()
        };
        item.update(&*app.state.db).await.unwrap();
    }

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", item_id),
            Some(json!({ "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(money(&body["items"][0]["product_price"]), dec!(3.00));
    assert_eq!(money(&body["items"][0]["subtotal"]), dec!(6.00));
}

#[tokio::test]
async fn remove_and_clear_empty_the_cart() {
    let app = TestApp::new().await;
    let toy = app.seed_product("Squeaky Ball", dec!(5.00), 10).await;
    let food = app.seed_product("Kibble 2kg", dec!(20.00), 10).await;

    for product in [&toy, &food] {
        let response = app
            .request_authenticated(
                Method::POST,
                "/api/v1/cart/items",
                Some(json!({ "product_id": product.id, "quantity": 1 })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    let body = response_json(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let first_item_id = items[0]["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", first_item_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let response = app
        .request_authenticated(Method::POST, "/api/v1/cart/clear", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(money(&body["subtotal"]), dec!(0));
}

#[tokio::test]
async fn removing_foreign_item_returns_not_found() {
    let app = TestApp::new().await;
    let product = app.seed_product("Feather Wand", dec!(8.00), 10).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        )
        .await;
    let body = response_json(response).await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    // Another user cannot touch this cart line
    let other_token = app.token_for(uuid::Uuid::new_v4(), vec!["customer".to_string()]);
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", item_id),
            None,
            Some(&other_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
