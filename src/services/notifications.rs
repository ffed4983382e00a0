use async_trait::async_trait;
use tracing::info;

use crate::entities::{OrderItemModel, OrderModel};
use crate::errors::ServiceError;

/// Post-commit notification hook for order lifecycle changes. Implementations
/// run on the event loop, never inside the checkout transaction, so a failing
/// notifier cannot roll back an order.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn order_placed(
        &self,
        order: &OrderModel,
        items: &[OrderItemModel],
    ) -> Result<(), ServiceError>;

    async fn order_cancelled(&self, order: &OrderModel) -> Result<(), ServiceError>;
}

/// Default notifier that writes order confirmations to the log. Stands in for
/// the email gateway in development and tests.
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn order_placed(
        &self,
        order: &OrderModel,
        items: &[OrderItemModel],
    ) -> Result<(), ServiceError> {
        info!(
            order_number = %order.order_number,
            user_id = %order.user_id,
            total = %order.total,
            item_count = items.len(),
            "Order confirmation"
        );
        Ok(())
    }

    async fn order_cancelled(&self, order: &OrderModel) -> Result<(), ServiceError> {
        info!(
            order_number = %order.order_number,
            user_id = %order.user_id,
            "Order cancellation notice"
        );
        Ok(())
    }
}
