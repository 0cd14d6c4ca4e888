use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OrderStatus, PaymentStatus};

/// The `orders` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Gateway-facing numeric code, unique across orders.
    #[sea_orm(unique)]
    pub order_code: i64,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    /// Server-computed total in minor units
    pub total: i64,

    /// Snapshot of the priced cart lines
    pub items: Json,

    pub customer_info: Json,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
