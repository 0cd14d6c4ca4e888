pub mod order;
pub mod payment_log;
pub mod product;
