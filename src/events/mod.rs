use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{Order, OrderItem};
use crate::services::notifications::OrderNotifier;

/// Events emitted after a state change has committed. Consumers run outside
/// the request path; a lost event never affects the stored data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderPlaced(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Cart events
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartCleared(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing the caller when the
    /// channel is closed or full. Used after commit where the write has
    /// already succeeded.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropping event {:?}: {}", event, e);
        }
    }
}

/// Consumes events from the channel and dispatches side effects. Runs as a
/// background task for the lifetime of the server.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    db: Arc<DbPool>,
    notifier: Option<Arc<dyn OrderNotifier>>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced(order_id) => {
                if let Some(notifier) = &notifier {
                    if let Err(e) = notify_order_placed(&db, notifier.as_ref(), *order_id).await {
                        error!(
                            "Failed to handle order placed event: order_id={}, error={}",
                            order_id, e
                        );
                    }
                }
            }
            Event::OrderCancelled(order_id) => {
                if let Some(notifier) = &notifier {
                    if let Err(e) = notify_order_cancelled(&db, notifier.as_ref(), *order_id).await
                    {
                        error!(
                            "Failed to handle order cancelled event: order_id={}, error={}",
                            order_id, e
                        );
                    }
                }
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
            }
            Event::CartItemAdded {
                cart_id,
                product_id,
            } => {
                info!(cart_id = %cart_id, product_id = %product_id, "Cart item added");
            }
            Event::CartCleared(cart_id) => {
                info!(cart_id = %cart_id, "Cart cleared");
            }
        }
    }

    info!("Event channel closed, stopping event processing loop");
}

async fn notify_order_placed(
    db: &DbPool,
    notifier: &dyn OrderNotifier,
    order_id: Uuid,
) -> Result<(), String> {
    let order = Order::find_by_id(order_id)
        .one(db)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Order {} not found", order_id))?;

    let items = OrderItem::find()
        .filter(crate::entities::order_item::Column::OrderId.eq(order_id))
        .all(db)
        .await
        .map_err(|e| e.to_string())?;

    notifier
        .order_placed(&order, &items)
        .await
        .map_err(|e| e.to_string())
}

async fn notify_order_cancelled(
    db: &DbPool,
    notifier: &dyn OrderNotifier,
    order_id: Uuid,
) -> Result<(), String> {
    let order = Order::find_by_id(order_id)
        .one(db)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Order {} not found", order_id))?;

    notifier
        .order_cancelled(&order)
        .await
        .map_err(|e| e.to_string())
}
