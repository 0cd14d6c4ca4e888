use axum::{body::Bytes, extract::State, Json};

use crate::errors::ServiceError;
use crate::services::{WebhookAck, WebhookEvent};
use crate::AppState;

// POST /api/payment/webhook
#[utoipa::path(
    post,
    path = "/api/payment/webhook",
    request_body = WebhookEvent,
    responses(
        (status = 200, description = "Webhook acknowledged", body = WebhookAck),
        (status = 400, description = "Invalid payload or signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Referenced order does not exist", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let outcome = state.services.webhooks.process(&body).await?;
    Ok(Json(WebhookAck::from(outcome)))
}
