use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::entities::{order, order_item, product, Order, OrderItem, OrderModel, Product};
use crate::entities::OrderItemModel;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// An order with its line items, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Order lookup, listing, cancellation, and fulfillment transitions.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches one of the user's orders with its items.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderDetail { order, items })
    }

    /// Lists a page of the user's orders, newest first. Returns the page
    /// along with the user's total order count.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    /// Cancels one of the user's orders and returns its stock.
    ///
    /// Allowed only before the parcel ships. Restock and the status flip
    /// commit together; a failure on either leaves the order untouched.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_cancel() {
            return Err(ServiceError::InvalidTransition(format!(
                "Order in status '{}' cannot be cancelled",
                order.status.as_str()
            )));
        }

        let old_status = order.status;
        let items = self.restock_items(&txn, order_id).await?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.cancelled_at = Set(Some(Utc::now()));
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: OrderStatus::Cancelled.as_str().to_string(),
            })
            .await;

        info!("Cancelled order {}", order.order_number);
        Ok(OrderDetail { order, items })
    }

    /// Moves an order along the fulfillment path. Stamps `delivered_at` on
    /// delivery; a transition to cancelled restocks like a user cancel.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot move order from '{}' to '{}'",
                order.status.as_str(),
                new_status.as_str()
            )));
        }

        let old_status = order.status;

        if new_status == OrderStatus::Cancelled {
            self.restock_items(&txn, order_id).await?;
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        match new_status {
            OrderStatus::Delivered => active.delivered_at = Set(Some(Utc::now())),
            OrderStatus::Cancelled => active.cancelled_at = Set(Some(Utc::now())),
            _ => {}
        }
        let order = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        Ok(order)
    }

    /// Returns every line's quantity to its product. Lines whose product was
    /// deleted since purchase are skipped; the rest still restock.
    async fn restock_items(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await?;

        for item in &items {
            if let Some(product_id) = item.product_id {
                Product::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).add(item.quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(product_id))
                    .exec(txn)
                    .await?;
            }
        }

        Ok(items)
    }
}
