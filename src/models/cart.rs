use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// A cart line as submitted by the browser. Nothing here is trusted beyond the product id
/// and quantity; `client_price` is only used for validation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    #[serde(alias = "id")]
    #[validate(length(min = 1, max = 64, message = "Product id is required"))]
    pub product_id: String,

    #[validate(range(min = 1, max = 99, message = "Quantity must be between 1 and 99"))]
    pub quantity: i64,

    #[serde(alias = "price")]
    #[validate(range(min = 1, message = "Price must be positive"))]
    pub client_price: i64,
}

/// A cart line priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedLine {
    pub product_id: String,
    pub name: String,
    /// Unit price in minor units
    pub price: i64,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ValidatedLine {
    pub fn line_total(&self) -> Option<i64> {
        self.price.checked_mul(self.quantity)
    }
}
