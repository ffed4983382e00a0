use crate::handlers::common::{
    created_response, map_service_error, success_response, PaginatedResponse, PaginationParams,
};
use crate::{
    auth::AuthUser, entities::order::OrderStatus, errors::ApiError,
    services::checkout::CheckoutRequest, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(checkout))
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", put(update_status))
}

/// Place an order, from the cart or from an explicit buy-now payload
async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .checkout
        .checkout(&user, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

/// List the current user's orders, newest first, one page at a time
async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(user.user_id, pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        orders,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Get one of the current user's orders with items
async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(user.user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Cancel one of the current user's orders, returning its stock
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .cancel_order(user.user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
}

/// Move an order along the fulfillment path. Admin only.
async fn update_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Unauthorized);
    }

    let order = state
        .services
        .orders
        .update_status(id, payload.status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}
