use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entities::{
    cart_item, order, order_item, product, CartItem, Order, Product,
};
use crate::entities::order::{DeliveryMethod, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::CartService;
use crate::services::orders::OrderDetail;

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// A buy-now line supplied directly in the checkout request. `product_price`
/// lets the storefront honor the price it displayed; when absent the current
/// catalog price is charged.
#[derive(Debug, Clone, Deserialize)]
pub struct BuyNowItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product_price: Option<Decimal>,
    pub product_name: Option<String>,
}

/// Checkout request body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub delivery_method: DeliveryMethod,

    /// Shipping fee for this order. Falls back to the configured flat fee
    /// for shipped orders; pickup orders default to zero.
    #[serde(default)]
    pub shipping_cost: Option<Decimal>,
    #[serde(default)]
    pub tax: Option<Decimal>,

    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub shipping_city: String,
    #[serde(default)]
    pub shipping_state: String,
    #[serde(default)]
    pub shipping_zip: String,

    #[validate(length(min = 1))]
    pub shipping_phone: String,

    #[validate(length(min = 1))]
    pub payment_method: String,

    #[serde(default)]
    pub coupon_code: String,
    #[serde(default)]
    pub delivery_instructions: String,
    #[serde(default)]
    #[validate(email)]
    pub billing_email: Option<String>,
    #[serde(default)]
    pub notes: String,

    /// Buy-now lines. When present and non-empty the user's cart is ignored
    /// and left untouched; otherwise the order is built from the cart.
    #[serde(default)]
    pub items: Option<Vec<BuyNowItem>>,
}

/// Where the order lines come from, decided once per checkout.
enum CheckoutSource {
    BuyNow(Vec<BuyNowItem>),
    Cart,
}

/// A fully priced order line, ready to decrement stock and write out.
/// `product` is `None` for buy-now lines whose product could not be
/// resolved; such lines carry the client-supplied snapshot and skip the
/// stock decrement.
struct ResolvedLine {
    product: Option<crate::entities::ProductModel>,
    quantity: i32,
    unit_price: Decimal,
    product_name: String,
}

/// Turns a cart or a buy-now payload into a placed order.
///
/// The whole conversion runs in one transaction: every line's stock is
/// decremented with a conditional update, and any failure rolls the entire
/// order back. Stock is never left partially taken.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    cart_service: CartService,
    shipping_cost: Decimal,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        cart_service: CartService,
        config: &AppConfig,
    ) -> Self {
        let shipping_cost = config.shipping_cost.parse().unwrap_or_else(|_| {
            warn!(
                "Invalid shipping_cost {:?}, falling back to 0.00",
                config.shipping_cost
            );
            Decimal::ZERO
        });

        Self {
            db,
            event_sender,
            cart_service,
            shipping_cost,
            currency: config.default_currency.clone(),
        }
    }

    /// Places an order for the authenticated user.
    #[instrument(skip(self, request), fields(user_id = %user.user_id))]
    pub async fn checkout(
        &self,
        user: &AuthUser,
        request: CheckoutRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;

        if request.delivery_method == DeliveryMethod::Shipping
            && request.shipping_address.trim().is_empty()
        {
            return Err(ServiceError::ValidationError(
                "shipping_address is required for shipping orders".to_string(),
            ));
        }

        let source = match &request.items {
            Some(items) if !items.is_empty() => CheckoutSource::BuyNow(items.clone()),
            _ => CheckoutSource::Cart,
        };

        let cart = self.cart_service.get_or_create_cart(user.user_id).await?;

        let txn = self.db.begin().await?;

        let lines = match &source {
            CheckoutSource::BuyNow(items) => self.resolve_buy_now_lines(&txn, items).await?,
            CheckoutSource::Cart => self.resolve_cart_lines(&txn, cart.id).await?,
        };

        // Hard validation: take stock atomically, line by line. A failed line
        // aborts the transaction and releases everything taken so far. Lines
        // without a resolved product have nothing to decrement.
        for line in &lines {
            if let Some(product) = &line.product {
                self.take_stock(&txn, product, line.quantity).await?;
            }
        }

        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let shipping_cost = request.shipping_cost.unwrap_or(match request.delivery_method {
            DeliveryMethod::Shipping => self.shipping_cost,
            DeliveryMethod::Pickup => Decimal::ZERO,
        });
        let tax = request.tax.unwrap_or(Decimal::ZERO);
        let total = subtotal + shipping_cost + tax;

        let order_number = self.generate_order_number(&txn).await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let billing_email = request
            .billing_email
            .clone()
            .or_else(|| user.email.clone())
            .unwrap_or_default();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(user.user_id),
            delivery_method: Set(request.delivery_method),
            shipping_address: Set(request.shipping_address.clone()),
            shipping_city: Set(request.shipping_city.clone()),
            shipping_state: Set(request.shipping_state.clone()),
            shipping_zip: Set(request.shipping_zip.clone()),
            shipping_phone: Set(request.shipping_phone.clone()),
            subtotal: Set(subtotal),
            shipping_cost: Set(shipping_cost),
            tax: Set(tax),
            total: Set(total),
            coupon_code: Set(request.coupon_code.clone()),
            discount_amount: Set(Decimal::ZERO),
            currency: Set(self.currency.clone()),
            payment_method: Set(request.payment_method.clone()),
            payment_status: Set(PaymentStatus::Pending),
            transaction_id: Set(String::new()),
            payment_gateway: Set(String::new()),
            status: Set(OrderStatus::Pending),
            tracking_number: Set(String::new()),
            delivery_instructions: Set(request.delivery_instructions.clone()),
            billing_email: Set(billing_email),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order_row = order_model.insert(&txn).await?;

        let mut item_rows = Vec::with_capacity(lines.len());
        for line in &lines {
            let meta = line.product.as_ref().map(|p| {
                serde_json::json!({
                    "category": p.category,
                    "brand": p.brand,
                    "pet_type": p.pet_type,
                })
            });

            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product.as_ref().map(|p| p.id)),
                product_name: Set(line.product_name.clone()),
                product_sku: Set(line
                    .product
                    .as_ref()
                    .map(|p| p.sku.clone())
                    .unwrap_or_default()),
                product_meta: Set(meta),
                product_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                created_at: Set(now),
            };
            item_rows.push(item.insert(&txn).await?);
        }

        // Cart-sourced orders consume the cart; buy-now leaves it untouched
        if matches!(source, CheckoutSource::Cart) {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderPlaced(order_id))
            .await;

        info!(
            "Placed order {} for user {}: {} line(s), total {}",
            order_number,
            user.user_id,
            item_rows.len(),
            total
        );

        Ok(OrderDetail {
            order: order_row,
            items: item_rows,
        })
    }

    /// Builds lines from the user's cart. Snapshot prices are honored;
    /// products deleted or deactivated since the add abort the checkout.
    async fn resolve_cart_lines(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<Vec<ResolvedLine>, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(txn)
            .await?;

        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = Product::find_by_id(item.product_id)
                .one(txn)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Product {} is no longer available",
                        item.product_name
                    ))
                })?;

            let unit_price = item.product_price.unwrap_or_else(|| product.final_price());

            lines.push(ResolvedLine {
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price,
                product: Some(product),
            });
        }

        Ok(lines)
    }

    /// Builds lines from an explicit buy-now payload. A resolvable product
    /// supplies the snapshot name/sku/meta; the client-supplied name is used
    /// only when the product cannot be resolved, and such lines must carry a
    /// client-supplied price.
    async fn resolve_buy_now_lines(
        &self,
        txn: &DatabaseTransaction,
        items: &[BuyNowItem],
    ) -> Result<Vec<ResolvedLine>, ServiceError> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            if item.quantity < 1 {
                return Err(ServiceError::InvalidProductReference(format!(
                    "Invalid quantity {} for product {}",
                    item.quantity, item.product_id
                )));
            }

            let product = Product::find_by_id(item.product_id)
                .one(txn)
                .await?
                .filter(|p| p.is_active);

            let unit_price = match (item.product_price, &product) {
                (Some(price), _) => price,
                (None, Some(product)) => product.final_price(),
                (None, None) => {
                    return Err(ServiceError::InvalidProductReference(format!(
                        "Product {} cannot be resolved or priced",
                        item.product_id
                    )))
                }
            };

            let product_name = product
                .as_ref()
                .map(|p| p.name.clone())
                .or_else(|| item.product_name.clone())
                .unwrap_or_default();

            lines.push(ResolvedLine {
                product_name,
                quantity: item.quantity,
                unit_price,
                product,
            });
        }

        Ok(lines)
    }

    /// Conditional decrement: succeeds only if enough stock remains at the
    /// moment the statement runs. Zero rows affected means a concurrent
    /// checkout won the race. The `stock >= q` guard lives in the UPDATE
    /// statement itself, so two transactions racing over the last units
    /// cannot both succeed regardless of isolation level or interleaving.
    async fn take_stock(
        &self,
        txn: &DatabaseTransaction,
        product: &crate::entities::ProductModel,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product.id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            let remaining = Product::find_by_id(product.id)
                .one(txn)
                .await?
                .map(|p| p.stock)
                .unwrap_or(0);

            return Err(ServiceError::InsufficientStock {
                name: product.name.clone(),
                remaining,
            });
        }

        Ok(())
    }

    /// Generates a unique external order number of the form ORD-XXXXXXXX.
    async fn generate_order_number(
        &self,
        txn: &DatabaseTransaction,
    ) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = format!(
                "ORD-{}",
                &Uuid::new_v4().simple().to_string()[..8].to_uppercase()
            );

            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .count(txn)
                .await?;

            if taken == 0 {
                return Ok(candidate);
            }
        }

        Err(ServiceError::InternalError(
            "Could not generate a unique order number".to_string(),
        ))
    }
}
