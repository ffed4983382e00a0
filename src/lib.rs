pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod migrator;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Builds the application state and its service graph.
pub fn build_state(
    db: Arc<DatabaseConnection>,
    config: config::AppConfig,
    event_sender: events::EventSender,
) -> Arc<AppState> {
    let event_sender_arc = Arc::new(event_sender.clone());

    let cart = services::CartService::new(db.clone(), event_sender_arc.clone());
    let checkout = services::CheckoutService::new(
        db.clone(),
        event_sender_arc.clone(),
        cart.clone(),
        &config,
    );
    let orders = services::OrderService::new(db.clone(), event_sender_arc.clone());
    let catalog = services::CatalogService::new(db.clone());

    Arc::new(AppState {
        db,
        config,
        event_sender,
        services: handlers::AppServices {
            cart,
            checkout,
            orders,
            catalog,
        },
    })
}

/// API v1 routes
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/cart", handlers::carts::carts_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/products", handlers::products::products_routes())
}

/// Top-level application router
pub fn app_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
}

/// Liveness and database connectivity check
async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_ok = db::check_connection(&state.db).await.is_ok();

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": if db_ok { "up" } else { "down" },
    }))
}
