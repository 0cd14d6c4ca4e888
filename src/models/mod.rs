pub mod cart;
pub mod order;
pub mod product;

pub use cart::{CartLineRequest, ValidatedLine};
pub use order::{CustomerInfo, Order, OrderStatus, PaymentStatus};
pub use product::Product;

use crate::errors::FieldError;
use validator::ValidationErrors;

/// Largest integer a JSON/JavaScript client can represent exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Flattens derive-level validation errors into `{field, message}` pairs under `prefix`.
pub fn field_errors(prefix: &str, errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let path = if prefix.is_empty() {
                camel_case(field)
            } else {
                format!("{}.{}", prefix, camel_case(field))
            };
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({})", e.code));
                FieldError::new(path.clone(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
