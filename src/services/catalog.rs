use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{product, Product, ProductModel};
use crate::errors::ServiceError;

/// Read-side access to the product catalog. Writes to products happen through
/// checkout (stock) and are owned by `CheckoutService` and `OrderService`.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches a single active product.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", product_id))
            })?;

        Ok(product)
    }

    /// Lists active products, optionally narrowed to a category.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        category: Option<String>,
    ) -> Result<Vec<ProductModel>, ServiceError> {
        let mut query = Product::find().filter(product::Column::IsActive.eq(true));

        if let Some(category) = category {
            query = query.filter(product::Column::Category.eq(category));
        }

        let products = query
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;

        Ok(products)
    }
}
