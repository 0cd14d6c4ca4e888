pub mod cart_pricing;
pub mod order_code;
pub mod orders;
pub mod payment_links;
pub mod payment_webhooks;

pub use cart_pricing::{calculate_order_total, check_price_tolerance, CartPricer, PricedCart};
pub use order_code::{generate_numeric_order_code, OrderCodeGenerator};
pub use orders::{CreateOrderRequest, OrderDetails, OrderLookupQuery, OrderService, OrderSummary};
pub use payment_links::{CreatePaymentLinkRequest, PaymentLinkResponse, PaymentLinkService};
pub use payment_webhooks::{PaymentWebhookService, WebhookAck, WebhookEvent, WebhookOutcome};
