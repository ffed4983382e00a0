pub mod carts;
pub mod common;
pub mod orders;
pub mod products;

use crate::services::{CartService, CatalogService, CheckoutService, OrderService};

/// Container for all application services, shared through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub catalog: CatalogService,
}
