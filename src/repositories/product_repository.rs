use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;

use super::{ProductRepository, RepositoryError};
use crate::entities::product::{Column, Entity as ProductEntity, Model as ProductModel};
use crate::models::Product;

impl From<ProductModel> for Product {
    fn from(model: ProductModel) -> Self {
        let images = model
            .images
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|u| u.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Product {
            id: model.id,
            name: model.name,
            price: model.price,
            in_stock: model.in_stock,
            images,
        }
    }
}

/// Catalog backed by the `products` table
#[derive(Debug, Clone)]
pub struct SeaOrmProductRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductRepository for SeaOrmProductRepository {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = ProductEntity::find()
            .filter(Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Product::from).collect())
    }
}

/// Catalog held in memory, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductRepository {
    products: Arc<DashMap<String, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let repo = Self::new();
        for product in products {
            repo.upsert(product);
        }
        repo
    }

    pub fn upsert(&self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|p| p.value().clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_conversion_keeps_string_images_only() {
        let product = Product::from(ProductModel {
            id: "tea-01".into(),
            name: "Oolong".into(),
            price: 350_000,
            in_stock: true,
            images: json!(["/img/a.jpg", 42, "/img/b.jpg"]),
        });
        assert_eq!(product.images, vec!["/img/a.jpg", "/img/b.jpg"]);
        assert_eq!(product.primary_image(), Some("/img/a.jpg"));
    }

    #[tokio::test]
    async fn in_memory_lookup_skips_unknown_ids() {
        let repo = InMemoryProductRepository::with_products([Product {
            id: "tea-01".into(),
            name: "Oolong".into(),
            price: 350_000,
            in_stock: true,
            images: vec![],
        }]);

        let found = repo
            .find_by_ids(&["tea-01".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "tea-01");
    }
}
