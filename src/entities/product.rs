use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog entity (read-only for checkout)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    /// Unit price in minor units
    pub price: i64,

    pub in_stock: bool,

    /// JSON array of image URLs; the first one is shown in the cart.
    pub images: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
