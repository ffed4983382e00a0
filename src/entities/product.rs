use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog product. The checkout engine reads everything here and mutates
/// only `stock`; all other columns belong to the catalog service.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(nullable)]
    pub category: Option<String>,
    #[sea_orm(nullable)]
    pub brand: Option<String>,
    #[sea_orm(nullable)]
    pub pet_type: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub discount_price: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Discount price when set, regular price otherwise.
    pub fn final_price(&self) -> Decimal {
        self.discount_price.unwrap_or(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(price: Decimal, discount: Option<Decimal>) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Chew Toy".to_string(),
            sku: "CHEW-01".to_string(),
            description: String::new(),
            category: None,
            brand: None,
            pet_type: Some("dog".to_string()),
            price,
            discount_price: discount,
            stock: 10,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn final_price_prefers_discount() {
        assert_eq!(
            product(dec!(25.00), Some(dec!(19.99))).final_price(),
            dec!(19.99)
        );
    }

    #[test]
    fn final_price_falls_back_to_regular() {
        assert_eq!(product(dec!(25.00), None).final_price(), dec!(25.00));
    }
}
