use crate::handlers::common::{map_service_error, success_response};
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for catalog endpoints. Browsing requires no auth.
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

#[derive(Debug, Deserialize)]
struct ListProductsQuery {
    category: Option<String>,
}

/// List active products
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_products(query.category)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(products))
}

/// Get a single active product
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}
