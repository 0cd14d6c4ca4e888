use serde::{Deserialize, Serialize};

/// Catalog entry as seen by the pricer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Unit price in minor units
    pub price: i64,
    pub in_stock: bool,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Product {
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}
