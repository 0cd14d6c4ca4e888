use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{PaymentAuditLog, PaymentAuditor};
use crate::config::OrderSettings;
use crate::errors::{FieldError, ServiceError};
use crate::payment_gateway::PaymentGateway;
use crate::rate_limiter::RateLimiters;
use crate::repositories::{OrderRepository, ProductRepository};
use crate::services::{CartPricer, OrderService, PaymentLinkService, PaymentWebhookService};

pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

/// Service container shared by all handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payment_links: Arc<PaymentLinkService>,
    pub webhooks: Arc<PaymentWebhookService>,
}

impl AppServices {
    /// Wires the checkout services over the given collaborators.
    pub fn new(
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        audit_log: Arc<dyn PaymentAuditLog>,
        rate_limiters: RateLimiters,
        order_settings: OrderSettings,
        gateway_timeout: Duration,
    ) -> Self {
        let pricer = CartPricer::new(products);
        let auditor = PaymentAuditor::new(audit_log);

        Self {
            orders: Arc::new(OrderService::new(
                orders.clone(),
                pricer.clone(),
                rate_limiters.clone(),
                order_settings,
            )),
            payment_links: Arc::new(PaymentLinkService::new(
                pricer,
                orders.clone(),
                gateway.clone(),
                rate_limiters,
                auditor.clone(),
                gateway_timeout,
            )),
            webhooks: Arc::new(PaymentWebhookService::new(orders, gateway, auditor)),
        }
    }

    pub fn with_order_service(mut self, orders: OrderService) -> Self {
        self.orders = Arc::new(orders);
        self
    }
}

/// `Json<T>` whose rejections come back as a 400 validation failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServiceError::ValidationFailed(vec![FieldError::new(
                "body",
                rejection.body_text(),
            )])),
        }
    }
}
