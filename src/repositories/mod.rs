use async_trait::async_trait;
use sea_orm::DbErr;
use uuid::Uuid;

use crate::models::{Order, Product};

pub mod order_repository;
pub mod product_repository;

pub use order_repository::{InMemoryOrderRepository, SeaOrmOrderRepository};
pub use product_repository::{InMemoryProductRepository, SeaOrmProductRepository};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("order code {0} is already taken")]
    DuplicateOrderCode(i64),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("stored record is malformed: {0}")]
    Corrupt(String),
}

/// Read-only catalog lookups.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Fetches every product whose id is in `ids` in one round trip. Missing ids are simply absent.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError>;
}

/// Order persistence with a compare-and-set payment transition.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order. Fails with `DuplicateOrderCode` when the code is already used.
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_order_code(&self, order_code: i64) -> Result<Option<Order>, RepositoryError>;

    /// Moves the order to paid/processing unless it is already paid, as one guarded write.
    ///
    /// Returns `true` only for the call that performed the transition.
    async fn mark_paid(&self, order_code: i64) -> Result<bool, RepositoryError>;
}
