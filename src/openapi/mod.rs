use axum::{routing::get, Json, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::errors::{ErrorResponse, FieldError};
use crate::handlers::{health, orders, payment_webhooks, payments};
use crate::models::{CartLineRequest, CustomerInfo, OrderStatus, PaymentStatus, ValidatedLine};
use crate::services::{
    CreateOrderRequest, CreatePaymentLinkRequest, OrderDetails, OrderSummary,
    PaymentLinkResponse, WebhookAck, WebhookEvent,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Checkout API",
        version = "1.0.0",
        description = r#"
Order creation, payment-link issuance and payment-webhook confirmation.

Every money-moving call re-prices the cart against the catalog; client prices are
never trusted. Amounts are integers in minor units.

## Rate Limiting

Order creation and link issuance share a strict tier; order lookup uses a lenient
tier. Rejected requests get `429` with a `Retry-After` header.
"#
    ),
    paths(
        orders::create_order,
        orders::get_order,
        payments::create_payment_link,
        payment_webhooks::payment_webhook,
        health::health,
    ),
    components(schemas(
        ErrorResponse,
        FieldError,
        CartLineRequest,
        CustomerInfo,
        ValidatedLine,
        OrderStatus,
        PaymentStatus,
        CreateOrderRequest,
        OrderSummary,
        OrderDetails,
        orders::CreateOrderResponse,
        orders::OrderLookupResponse,
        CreatePaymentLinkRequest,
        PaymentLinkResponse,
        WebhookEvent,
        WebhookAck,
        health::HealthResponse,
        health::ComponentStatus,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Order creation and lookup"),
        (name = "payments", description = "Payment links and gateway webhooks"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
