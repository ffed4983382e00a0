pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod notifications;
pub mod orders;

pub use carts::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
