use axum::{extract::State, Json};

use super::JsonBody;
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::{CreatePaymentLinkRequest, PaymentLinkResponse};
use crate::AppState;

/// Issue a gateway checkout link for an order
#[utoipa::path(
    post,
    path = "/api/payment/create-link",
    summary = "Create payment link",
    description = "Re-prices the cart and requests a checkout URL for the server-computed amount",
    request_body = CreatePaymentLinkRequest,
    responses(
        (status = 200, description = "Checkout link issued", body = PaymentLinkResponse),
        (status = 400, description = "Validation, cart or price error", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment gateway failure", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
pub async fn create_payment_link(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<CreatePaymentLinkRequest>,
) -> Result<Json<PaymentLinkResponse>, ServiceError> {
    let link = state
        .services
        .payment_links
        .create_payment_link(&user.user_id, request)
        .await?;
    Ok(Json(link))
}
