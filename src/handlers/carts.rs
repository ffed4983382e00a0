use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::carts::{AddItemInput, UpdateItemInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for cart endpoints. All routes operate on the
/// authenticated user's own cart.
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item))
        .route("/items/:item_id", delete(remove_item))
        .route("/clear", post(clear_cart))
}

/// Get the current user's cart with items and totals
async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Add a product to the cart
async fn add_item(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<AddItemInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .add_item(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Change a cart line's quantity
async fn update_item(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateItemInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .update_item(user.user_id, item_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Remove a line from the cart
async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .remove_item(user.user_id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Empty the cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .clear_cart(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}
