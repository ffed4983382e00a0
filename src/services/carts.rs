use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{cart, cart_item, Cart, CartItem, CartModel, Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Input for adding a product to the cart
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// Input for changing a cart line's quantity
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateItemInput {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// A cart line as returned to clients. `product_price` is the price promised
/// at add time, not the current catalog price.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Materialized view of a cart. Totals are computed per request from the
/// lines; nothing here is stored.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart_id: Uuid,
    pub items: Vec<CartItemView>,
    pub total_items: i32,
    pub subtotal: Decimal,
}

/// Shopping cart service.
///
/// Carts hold a soft reservation only: adding to the cart checks stock but
/// never decrements it. Stock is decremented atomically during checkout.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches the user's cart, creating an empty one on first access.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<CartModel, ServiceError> {
        if let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            return Ok(cart);
        }

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        let cart = cart.insert(&*self.db).await?;
        info!("Created cart {} for user {}", cart.id, user_id);
        Ok(cart)
    }

    /// Returns the user's cart with lines and computed totals.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        self.build_view(&cart).await
    }

    /// Adds a product to the cart, merging into the existing line when the
    /// product is already present. The price snapshot is stamped on first
    /// add and kept on merges.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let cart = self.get_or_create_cart(user_id).await?;
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let existing_item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        // Soft reservation: the whole requested line must fit current stock
        let requested = existing_item
            .as_ref()
            .map(|item| item.quantity)
            .unwrap_or(0)
            + input.quantity;

        if requested > product.stock {
            return Err(ServiceError::InsufficientStock {
                name: product.name,
                remaining: product.stock,
            });
        }

        if let Some(item) = existing_item {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(requested);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                product_price: Set(Some(product.final_price())),
                quantity: Set(input.quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        self.touch_cart(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added item to cart {}: product {} x{}",
            cart.id, input.product_id, input.quantity
        );
        self.build_view(&cart).await
    }

    /// Sets the quantity on an existing cart line. Removal goes through
    /// `remove_item`; a quantity below one is rejected. Missing snapshot
    /// fields are repaired from the live product; present snapshots are
    /// never overwritten.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        input: UpdateItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let cart = self.get_or_create_cart(user_id).await?;
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        let product = Product::find_by_id(item.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if input.quantity > product.stock {
            return Err(ServiceError::InsufficientStock {
                name: product.name,
                remaining: product.stock,
            });
        }

        let needs_price = item.product_price.is_none();
        let needs_name = item.product_name.is_empty();

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(input.quantity);
        item.updated_at = Set(Utc::now());
        if needs_price {
            item.product_price = Set(Some(product.final_price()));
        }
        if needs_name {
            item.product_name = Set(product.name.clone());
        }
        item.update(&txn).await?;

        self.touch_cart(&txn, &cart).await?;
        txn.commit().await?;

        self.build_view(&cart).await
    }

    /// Removes a single line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;

        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        item.delete(&*self.db).await?;

        info!("Removed item {} from cart {}", item_id, cart.id);
        self.build_view(&cart).await
    }

    /// Empties the cart without touching stock.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;

        info!("Cleared cart {}", cart.id);
        self.build_view(&cart).await
    }

    async fn touch_cart(
        &self,
        txn: &DatabaseTransaction,
        cart: &CartModel,
    ) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.clone().into();
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;
        Ok(())
    }

    async fn build_view(&self, cart: &CartModel) -> Result<CartView, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut total_items = 0;
        let mut subtotal = Decimal::ZERO;

        for (item, product) in rows {
            // Legacy rows without a snapshot fall back to the live price
            let unit_price = item.product_price.unwrap_or_else(|| {
                product
                    .as_ref()
                    .map(|p| p.final_price())
                    .unwrap_or(Decimal::ZERO)
            });
            let line_subtotal = unit_price * Decimal::from(item.quantity);

            total_items += item.quantity;
            subtotal += line_subtotal;

            items.push(CartItemView {
                id: item.id,
                product_id: item.product_id,
                product_name: item.product_name,
                product_price: unit_price,
                quantity: item.quantity,
                subtotal: line_subtotal,
            });
        }

        Ok(CartView {
            cart_id: cart.id,
            items,
            total_items,
            subtotal,
        })
    }
}
