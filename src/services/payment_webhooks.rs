use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::audit::{PaymentAuditor, PaymentEvent};
use crate::errors::ServiceError;
use crate::payment_gateway::payos::PAYOS_SUCCESS_CODE;
use crate::payment_gateway::PaymentGateway;
use crate::repositories::OrderRepository;

/// Gateway payment notification, as delivered.
///
/// Only `code` and the signed `data` decide the outcome; unsigned envelope fields such as
/// `success` are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub code: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[schema(value_type = Object)]
    pub data: Value,
    pub signature: String,
}

/// The `data` fields this processor acts on. Anything else in `data` is only signed over.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookData {
    order_code: i64,
    amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    AlreadyProcessed,
}

impl WebhookOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Processed => "Webhook processed",
            Self::AlreadyProcessed => "Already processed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub success: bool,
    #[schema(example = "Webhook processed")]
    pub message: String,
}

impl From<WebhookOutcome> for WebhookAck {
    fn from(outcome: WebhookOutcome) -> Self {
        Self {
            success: true,
            message: outcome.message().to_string(),
        }
    }
}

fn parse_event(body: &[u8]) -> Result<(WebhookEvent, WebhookData), ServiceError> {
    let event: WebhookEvent = serde_json::from_slice(body)
        .map_err(|e| ServiceError::InvalidPayload(e.to_string()))?;

    if event.signature.trim().is_empty() {
        return Err(ServiceError::InvalidPayload("signature is empty".into()));
    }
    if !event.data.is_object() {
        return Err(ServiceError::InvalidPayload("data must be an object".into()));
    }

    let data: WebhookData = serde_json::from_value(event.data.clone())
        .map_err(|e| ServiceError::InvalidPayload(format!("data: {}", e)))?;
    if data.order_code <= 0 {
        return Err(ServiceError::InvalidPayload("orderCode must be positive".into()));
    }

    Ok((event, data))
}

/// Applies verified gateway notifications to orders, at most once per order.
#[derive(Clone)]
pub struct PaymentWebhookService {
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    auditor: PaymentAuditor,
}

impl PaymentWebhookService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        auditor: PaymentAuditor,
    ) -> Self {
        Self {
            orders,
            gateway,
            auditor,
        }
    }

    /// Runs one delivery through parse, verify, dedupe, apply.
    ///
    /// Only a verified success event for an unpaid order performs a write, and that
    /// write is the guarded `mark_paid`.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn process(&self, body: &[u8]) -> Result<WebhookOutcome, ServiceError> {
        let (event, data) = parse_event(body).map_err(|err| {
            warn!(error = %err, "rejected malformed webhook");
            counter!("checkout.webhooks", 1, "outcome" => "invalid_payload");
            err
        })?;

        if !self
            .gateway
            .verify_webhook_signature(&event.data, &event.signature)
        {
            warn!(order_code = data.order_code, "webhook signature verification failed");
            counter!("checkout.webhooks", 1, "outcome" => "invalid_signature");
            return Err(ServiceError::SignatureInvalid);
        }

        let order = match self.orders.find_by_order_code(data.order_code).await? {
            Some(order) => order,
            None => {
                error!(order_code = data.order_code, "verified webhook for unknown order");
                counter!("checkout.webhooks", 1, "outcome" => "order_not_found");
                return Err(ServiceError::OrderNotFound(data.order_code.to_string()));
            }
        };

        let is_success = event.code == PAYOS_SUCCESS_CODE;

        if is_success && order.is_paid() {
            return Ok(self.duplicate(&event, data).await);
        }

        if !is_success {
            info!(
                order_code = data.order_code,
                code = %event.code,
                desc = event.desc.as_deref().unwrap_or_default(),
                "non-success payment notification, order left unchanged"
            );
            self.received(&event, data, "not_success").await;
            return Ok(WebhookOutcome::Processed);
        }

        if !self.orders.mark_paid(data.order_code).await? {
            // Another delivery won the guarded update.
            return Ok(self.duplicate(&event, data).await);
        }

        let outcome = if data.amount == order.total {
            "paid"
        } else {
            error!(
                order_code = data.order_code,
                paid_amount = data.amount,
                order_total = order.total,
                "order marked paid with an amount different from its total"
            );
            "paid_amount_mismatch"
        };

        info!(order_code = data.order_code, order_id = %order.id, "order marked paid");
        self.received(&event, data, outcome).await;
        Ok(WebhookOutcome::Processed)
    }

    async fn received(&self, event: &WebhookEvent, data: WebhookData, outcome: &'static str) {
        counter!("checkout.webhooks", 1, "outcome" => outcome);
        self.auditor
            .record(
                PaymentEvent::WebhookReceived,
                json!({
                    "orderCode": data.order_code,
                    "code": event.code,
                    "amount": data.amount,
                    "outcome": outcome,
                }),
            )
            .await;
    }

    async fn duplicate(&self, event: &WebhookEvent, data: WebhookData) -> WebhookOutcome {
        info!(order_code = data.order_code, "duplicate webhook delivery ignored");
        counter!("checkout.webhooks", 1, "outcome" => "duplicate");
        self.auditor
            .record(
                PaymentEvent::WebhookDuplicate,
                json!({
                    "orderCode": data.order_code,
                    "code": event.code,
                    "amount": data.amount,
                }),
            )
            .await;
        WebhookOutcome::AlreadyProcessed
    }
}
