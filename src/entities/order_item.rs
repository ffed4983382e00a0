use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order line item: a point-in-time snapshot of what was bought and at what
/// price. `product_id` is a weak reference kept for restock on cancellation;
/// it goes null if the product is later deleted, and the snapshot columns
/// stay authoritative for the receipt. Monetary fields never change after
/// insert.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    #[sea_orm(nullable)]
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_sku: String,
    #[sea_orm(column_type = "Json", nullable)]
    pub product_meta: Option<Json>,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub product_price: Decimal,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn subtotal(&self) -> Decimal {
        self.product_price * Decimal::from(self.quantity)
    }
}
