use chrono::Utc;
use rand::Rng;
use std::sync::Arc;

use crate::models::MAX_SAFE_INTEGER;

/// Source of candidate order codes. Swappable so collisions can be forced.
pub type OrderCodeGenerator = Arc<dyn Fn() -> i64 + Send + Sync>;

const TIMESTAMP_MODULUS: i64 = 1_000_000_000;
const RANDOM_SPAN: i64 = 999;

/// Numeric order code accepted by the payment gateway.
///
/// `(now_ms mod 1e9) * 1000 + random[0, 999)`. Always in `1..=MAX_SAFE_INTEGER`.
/// Not unique by construction; the `orders.order_code` unique index arbitrates.
pub fn generate_numeric_order_code() -> i64 {
    let random = rand::thread_rng().gen_range(0..RANDOM_SPAN);
    order_code_from_parts(Utc::now().timestamp_millis(), random)
}

pub fn order_code_from_parts(now_millis: i64, random: i64) -> i64 {
    let code = now_millis.rem_euclid(TIMESTAMP_MODULUS) * 1000 + random.rem_euclid(RANDOM_SPAN);
    code.clamp(1, MAX_SAFE_INTEGER)
}

pub fn default_generator() -> OrderCodeGenerator {
    Arc::new(generate_numeric_order_code)
}
