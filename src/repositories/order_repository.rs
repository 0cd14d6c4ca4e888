use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use super::{OrderRepository, RepositoryError};
use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as OrderEntity, Model as OrderModel,
};
use crate::models::{Order, OrderStatus, PaymentStatus};

impl TryFrom<OrderModel> for Order {
    type Error = RepositoryError;

    fn try_from(model: OrderModel) -> Result<Self, Self::Error> {
        let items = serde_json::from_value(model.items)
            .map_err(|e| RepositoryError::Corrupt(format!("order {} items: {}", model.id, e)))?;
        let customer_info = serde_json::from_value(model.customer_info).map_err(|e| {
            RepositoryError::Corrupt(format!("order {} customer_info: {}", model.id, e))
        })?;

        Ok(Order {
            id: model.id,
            order_code: model.order_code,
            status: model.status,
            payment_status: model.payment_status,
            total: model.total,
            items,
            customer_info,
            payment_method: model.payment_method,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

fn to_active_model(order: &Order) -> Result<OrderActiveModel, RepositoryError> {
    let items = serde_json::to_value(&order.items)
        .map_err(|e| RepositoryError::Corrupt(format!("items: {}", e)))?;
    let customer_info = serde_json::to_value(&order.customer_info)
        .map_err(|e| RepositoryError::Corrupt(format!("customer_info: {}", e)))?;

    Ok(OrderActiveModel {
        id: Set(order.id),
        order_code: Set(order.order_code),
        status: Set(order.status),
        payment_status: Set(order.payment_status),
        total: Set(order.total),
        items: Set(items),
        customer_info: Set(customer_info),
        payment_method: Set(order.payment_method.clone()),
        created_at: Set(order.created_at),
        updated_at: Set(order.updated_at),
    })
}

/// Repository for order operations backed by the `orders` table
#[derive(Debug, Clone)]
pub struct SeaOrmOrderRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderRepository for SeaOrmOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let active = to_active_model(order)?;
        match OrderEntity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    debug!(order_code = order.order_code, "order code collision");
                    Err(RepositoryError::DuplicateOrderCode(order.order_code))
                }
                _ => {
                    error!(error = %err, order_id = %order.id, "failed to insert order");
                    Err(RepositoryError::Database(err))
                }
            },
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        OrderEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_order_code(&self, order_code: i64) -> Result<Option<Order>, RepositoryError> {
        OrderEntity::find()
            .filter(Column::OrderCode.eq(order_code))
            .one(self.db.as_ref())
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn mark_paid(&self, order_code: i64) -> Result<bool, RepositoryError> {
        let result = OrderEntity::update_many()
            .col_expr(Column::PaymentStatus, Expr::value(PaymentStatus::Paid))
            .col_expr(Column::Status, Expr::value(OrderStatus::Processing))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::OrderCode.eq(order_code))
            .filter(Column::PaymentStatus.ne(PaymentStatus::Paid))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

/// Orders held in memory, keyed by order code.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<DashMap<i64, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let repo = Self::default();
        for order in orders {
            repo.orders.insert(order.order_code, order);
        }
        repo
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        match self.orders.entry(order.order_code) {
            Entry::Occupied(_) => Err(RepositoryError::DuplicateOrderCode(order.order_code)),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_order_code(&self, order_code: i64) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.get(&order_code).map(|o| o.value().clone()))
    }

    async fn mark_paid(&self, order_code: i64) -> Result<bool, RepositoryError> {
        // The shard write lock makes check-and-set atomic per order code.
        match self.orders.get_mut(&order_code) {
            Some(mut order) if order.payment_status != PaymentStatus::Paid => {
                order.payment_status = PaymentStatus::Paid;
                order.status = OrderStatus::Processing;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
