use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer order. Immutable after checkout except `status`,
/// `payment_status`, `tracking_number`, and the transition timestamps.
/// `order_number` is the external-facing identifier for receipts and
/// support lookups; the internal UUID never leaves the API surface alone.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub user_id: Uuid,

    pub delivery_method: DeliveryMethod,
    #[sea_orm(column_type = "Text")]
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_zip: String,
    pub shipping_phone: String,

    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub shipping_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total: Decimal,

    pub coupon_code: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub discount_amount: Decimal,
    pub currency: String,

    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub transaction_id: String,
    pub payment_gateway: String,

    pub status: OrderStatus,

    pub tracking_number: String,
    #[sea_orm(column_type = "Text")]
    pub delivery_instructions: String,
    pub billing_email: String,
    #[sea_orm(nullable)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Text")]
    pub notes: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order fulfillment status.
///
/// Forward path: pending -> processing -> packed -> shipped -> delivered.
/// Cancellation is allowed from pending/processing/packed only; refunded is
/// reachable administratively from any non-terminal state. delivered,
/// cancelled, and refunded are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "packed")]
    Packed,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// Cancellation cuts off once the parcel has left the warehouse.
    pub fn can_cancel(self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Packed)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Processing)
            | (Processing, Packed)
            | (Packed, Shipped)
            | (Shipped, Delivered) => true,
            (from, Cancelled) => from.can_cancel(),
            (from, Refunded) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Packed => "packed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    #[sea_orm(string_value = "shipping")]
    Shipping,
    #[sea_orm(string_value = "pickup")]
    Pickup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn cancellation_allowed_before_shipping() {
        assert!(Pending.can_cancel());
        assert!(Processing.can_cancel());
        assert!(Packed.can_cancel());
    }

    #[test]
    fn cancellation_blocked_after_shipping() {
        assert!(!Shipped.can_cancel());
        assert!(!Delivered.can_cancel());
        assert!(!Cancelled.can_cancel());
        assert!(!Refunded.can_cancel());
    }

    #[test]
    fn forward_path_is_linear() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Packed));
        assert!(Packed.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Delivered.can_transition_to(Pending));
    }

    #[test]
    fn refund_reachable_from_non_terminal_only() {
        assert!(Shipped.can_transition_to(Refunded));
        assert!(!Cancelled.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Refunded));
    }
}
