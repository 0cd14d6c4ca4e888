use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use validator::Validate;

use crate::errors::{FieldError, ServiceError};
use crate::models::{field_errors, CartLineRequest, Product, ValidatedLine};
use crate::repositories::ProductRepository;

/// Most lines a single cart may carry.
pub const MAX_CART_LINES: usize = 50;

/// Re-prices carts against the catalog. The only source of truth for what a cart costs.
#[derive(Clone)]
pub struct CartPricer {
    products: Arc<dyn ProductRepository>,
}

impl CartPricer {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    /// Resolves every line against the catalog with a single batched lookup.
    ///
    /// Lines are checked in submission order, so the first missing or unavailable
    /// product is the one reported. Client prices never leave this function.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn validate_cart_items(
        &self,
        lines: &[CartLineRequest],
    ) -> Result<Vec<ValidatedLine>, ServiceError> {
        let mut ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
        ids.sort();
        ids.dedup();

        let catalog: HashMap<String, Product> = self
            .products
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut validated = Vec::with_capacity(lines.len());
        for line in lines {
            let product = catalog.get(&line.product_id).ok_or_else(|| {
                warn!(product_id = %line.product_id, "cart references unknown product");
                ServiceError::ProductNotFound(line.product_id.clone())
            })?;

            if !product.in_stock {
                warn!(product_id = %product.id, "cart references out-of-stock product");
                return Err(ServiceError::OutOfStock(product.id.clone()));
            }

            if product.price != line.client_price {
                debug!(
                    product_id = %product.id,
                    catalog_price = product.price,
                    client_price = line.client_price,
                    "client price differs from catalog"
                );
            }

            validated.push(ValidatedLine {
                product_id: product.id.clone(),
                name: product.name.clone(),
                price: product.price,
                quantity: line.quantity,
                image: product.primary_image().map(str::to_string),
            });
        }

        Ok(validated)
    }

    /// Validates the cart and computes its authoritative, strictly positive total.
    pub async fn price_cart(&self, lines: &[CartLineRequest]) -> Result<PricedCart, ServiceError> {
        let lines = self.validate_cart_items(lines).await?;
        let total = calculate_order_total(&lines)?;
        if total <= 0 {
            return Err(ServiceError::invalid_field("items", "Order total must be positive"));
        }
        Ok(PricedCart { lines, total })
    }
}

/// Catalog-priced lines and their total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    pub lines: Vec<ValidatedLine>,
    pub total: i64,
}

/// Sum of `price * quantity` over the lines; zero for an empty cart.
pub fn calculate_order_total(lines: &[ValidatedLine]) -> Result<i64, ServiceError> {
    lines.iter().try_fold(0i64, |acc, line| {
        line.line_total()
            .and_then(|subtotal| acc.checked_add(subtotal))
            .ok_or_else(|| ServiceError::invalid_field("items", "Order total is too large"))
    })
}

/// True when the claimed total is within `tolerance` of the server total.
pub fn check_price_tolerance(server_total: i64, claimed_total: i64, tolerance: i64) -> bool {
    let diff = (i128::from(server_total) - i128::from(claimed_total)).abs();
    diff <= i128::from(tolerance)
}

/// Structural errors for a submitted cart, with indexed paths (`items[2].quantity`).
pub fn cart_line_errors(lines: &[CartLineRequest]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if lines.is_empty() || lines.len() > MAX_CART_LINES {
        errors.push(FieldError::new(
            "items",
            format!("Cart must contain between 1 and {} items", MAX_CART_LINES),
        ));
    }
    for (index, line) in lines.iter().enumerate() {
        if let Err(e) = line.validate() {
            errors.extend(field_errors(&format!("items[{}]", index), &e));
        }
    }
    errors
}
