use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::cart_pricing::{cart_line_errors, CartPricer};
use crate::audit::{mask_email, mask_phone, PaymentAuditor, PaymentEvent};
use crate::errors::{FieldError, ServiceError};
use crate::models::{field_errors, CartLineRequest};
use crate::payment_gateway::{GatewayError, PaymentGateway, PaymentLinkItem, PaymentLinkParams};
use crate::rate_limiter::{key_for_user, RateLimitTier, RateLimiters};
use crate::repositories::OrderRepository;

/// Request to open a gateway checkout session for an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentLinkRequest {
    #[validate(range(
        min = 1,
        max = 9007199254740991,
        message = "Order code must be a positive safe integer"
    ))]
    pub order_code: i64,

    /// Optional expected amount; must equal the recomputed cart total when present
    #[serde(default)]
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: Option<i64>,

    #[validate(length(min = 1, max = 255, message = "Description must be 1-255 characters"))]
    pub description: String,

    #[validate(url(message = "Return URL must be a valid URL"))]
    pub return_url: String,

    #[validate(url(message = "Cancel URL must be a valid URL"))]
    pub cancel_url: String,

    pub items: Vec<CartLineRequest>,

    #[serde(default)]
    #[validate(length(max = 100, message = "Buyer name must be at most 100 characters"))]
    pub buyer_name: Option<String>,

    #[serde(default)]
    #[validate(length(max = 20, message = "Buyer phone must be at most 20 characters"))]
    pub buyer_phone: Option<String>,

    #[serde(default)]
    #[validate(email(message = "Invalid buyer email"))]
    pub buyer_email: Option<String>,

    #[serde(default)]
    #[validate(length(max = 255, message = "Buyer address must be at most 255 characters"))]
    pub buyer_address: Option<String>,
}

impl CreatePaymentLinkRequest {
    pub fn validation_errors(&self) -> Vec<FieldError> {
        let mut errors = cart_line_errors(&self.items);
        if let Err(e) = self.validate() {
            errors.extend(field_errors("", &e));
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkResponse {
    pub checkout_url: String,
    pub order_code: i64,
}

/// Issues gateway checkout links for authenticated callers.
#[derive(Clone)]
pub struct PaymentLinkService {
    pricer: CartPricer,
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    limiters: RateLimiters,
    auditor: PaymentAuditor,
    gateway_timeout: Duration,
}

impl PaymentLinkService {
    pub fn new(
        pricer: CartPricer,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        limiters: RateLimiters,
        auditor: PaymentAuditor,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            pricer,
            orders,
            gateway,
            limiters,
            auditor,
            gateway_timeout,
        }
    }

    /// Re-prices the cart and asks the gateway for a checkout URL at the server total.
    /// Only issued for an unpaid order whose stored total equals the re-priced cart.
    #[instrument(skip(self, request), fields(order_code = request.order_code))]
    pub async fn create_payment_link(
        &self,
        user_id: &str,
        request: CreatePaymentLinkRequest,
    ) -> Result<PaymentLinkResponse, ServiceError> {
        self.limiters
            .enforce(RateLimitTier::Strict, &key_for_user(user_id))
            .await?;

        let errors = request.validation_errors();
        if !errors.is_empty() {
            return Err(ServiceError::ValidationFailed(errors));
        }

        let order = self
            .orders
            .find_by_order_code(request.order_code)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(request.order_code.to_string()))?;
        if order.is_paid() {
            return Err(ServiceError::invalid_field(
                "orderCode",
                "Order is already paid",
            ));
        }

        let priced = self.pricer.price_cart(&request.items).await?;

        if let Some(claimed) = request.amount {
            if claimed != priced.total {
                warn!(
                    server_total = priced.total,
                    claimed_amount = claimed,
                    "payment link amount does not match catalog prices"
                );
                self.audit_failure(user_id, &request, priced.total, "price_mismatch")
                    .await;
                return Err(ServiceError::PriceMismatch {
                    expected: priced.total,
                    claimed,
                });
            }
        }

        if priced.total != order.total {
            warn!(
                server_total = priced.total,
                order_total = order.total,
                "cart no longer prices to the stored order total"
            );
            self.audit_failure(user_id, &request, priced.total, "order_total_changed")
                .await;
            return Err(ServiceError::PriceMismatch {
                expected: priced.total,
                claimed: order.total,
            });
        }

        let params = PaymentLinkParams {
            order_code: request.order_code,
            amount: priced.total,
            description: request.description.clone(),
            return_url: request.return_url.clone(),
            cancel_url: request.cancel_url.clone(),
            items: priced
                .lines
                .iter()
                .map(|line| PaymentLinkItem {
                    name: line.name.clone(),
                    quantity: line.quantity,
                    price: line.price,
                })
                .collect(),
            buyer_name: request.buyer_name.clone(),
            buyer_email: request.buyer_email.clone(),
            buyer_phone: request.buyer_phone.clone(),
            buyer_address: request.buyer_address.clone(),
        };

        let outcome = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.create_payment_link(&params),
        )
        .await
        .unwrap_or_else(|_| Err(GatewayError::Timeout(self.gateway_timeout)));

        match outcome {
            Ok(link) => {
                counter!("checkout.payment_links.created", 1);
                info!(order_code = request.order_code, amount = priced.total, "payment link created");
                self.auditor
                    .record(
                        PaymentEvent::PaymentCreated,
                        json!({
                            "orderCode": request.order_code,
                            "amount": priced.total,
                            "userId": user_id,
                            "paymentLinkId": link.payment_link_id,
                            "buyerEmail": request.buyer_email.as_deref().map(mask_email),
                            "buyerPhone": request.buyer_phone.as_deref().map(mask_phone),
                        }),
                    )
                    .await;
                Ok(PaymentLinkResponse {
                    checkout_url: link.checkout_url,
                    order_code: request.order_code,
                })
            }
            Err(err) => {
                error!(error = %err, order_code = request.order_code, "payment link creation failed");
                counter!("checkout.payment_links.failed", 1);
                self.audit_failure(user_id, &request, priced.total, &err.to_string())
                    .await;
                Err(err.into())
            }
        }
    }

    async fn audit_failure(
        &self,
        user_id: &str,
        request: &CreatePaymentLinkRequest,
        amount: i64,
        reason: &str,
    ) {
        self.auditor
            .record(
                PaymentEvent::PaymentFailed,
                json!({
                    "orderCode": request.order_code,
                    "amount": amount,
                    "userId": user_id,
                    "reason": reason,
                    "buyerEmail": request.buyer_email.as_deref().map(mask_email),
                    "buyerPhone": request.buyer_phone.as_deref().map(mask_phone),
                }),
            )
            .await;
    }
}
