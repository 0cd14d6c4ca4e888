use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::cart_pricing::{cart_line_errors, check_price_tolerance, CartPricer};
use super::order_code::{default_generator, OrderCodeGenerator};
use crate::config::OrderSettings;
use crate::errors::{FieldError, ServiceError};
use crate::models::{
    field_errors, CartLineRequest, CustomerInfo, Order, OrderStatus, PaymentStatus, ValidatedLine,
};
use crate::rate_limiter::{key_for_ip, RateLimitTier, RateLimiters};
use crate::repositories::{OrderRepository, RepositoryError};

/// Checkout submission from the storefront
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<CartLineRequest>,

    /// Total the client believes it owes, in minor units
    #[validate(range(min = 1, message = "Total must be positive"))]
    pub total: i64,

    pub customer_info: CustomerInfo,

    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "Payment method must be 1-32 characters"))]
    pub payment_method: Option<String>,
}

impl CreateOrderRequest {
    /// Every structural problem with the submission, in one pass.
    pub fn validation_errors(&self) -> Vec<FieldError> {
        let mut errors = cart_line_errors(&self.items);
        if let Err(e) = self.validate() {
            errors.extend(field_errors("", &e));
        }
        if let Err(e) = self.customer_info.validate() {
            errors.extend(field_errors("customerInfo", &e));
        }
        errors
    }
}

/// Query string accepted by the order lookup endpoint
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrderLookupQuery {
    /// Opaque order id (UUID)
    pub id: Option<String>,
    /// Lookup by order code is disabled and always answers 403
    pub order_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_code: i64,
    pub status: OrderStatus,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            order_code: order.order_code,
            status: order.status,
            total: order.total,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub id: Uuid,
    pub order_code: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: i64,
    pub items: Vec<ValidatedLine>,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderDetails {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_code: order.order_code,
            status: order.status,
            payment_status: order.payment_status,
            total: order.total,
            items: order.items,
            created_at: order.created_at,
        }
    }
}

/// Creates pending orders from re-priced carts and serves id lookups.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    pricer: CartPricer,
    limiters: RateLimiters,
    settings: OrderSettings,
    code_generator: OrderCodeGenerator,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        pricer: CartPricer,
        limiters: RateLimiters,
        settings: OrderSettings,
    ) -> Self {
        Self {
            orders,
            pricer,
            limiters,
            settings,
            code_generator: default_generator(),
        }
    }

    pub fn with_code_generator(mut self, generator: OrderCodeGenerator) -> Self {
        self.code_generator = generator;
        self
    }

    /// Creates a pending order for `caller_ip`.
    ///
    /// Checks run in a fixed order: rate limit, structure, catalog, price tolerance.
    /// Nothing is written until all of them pass.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(
        &self,
        caller_ip: &str,
        request: CreateOrderRequest,
    ) -> Result<OrderSummary, ServiceError> {
        self.limiters
            .enforce(RateLimitTier::Strict, &key_for_ip(caller_ip))
            .await?;

        let errors = request.validation_errors();
        if !errors.is_empty() {
            return Err(ServiceError::ValidationFailed(errors));
        }

        let priced = self.pricer.price_cart(&request.items).await?;

        if !check_price_tolerance(priced.total, request.total, self.settings.price_tolerance) {
            warn!(
                server_total = priced.total,
                claimed_total = request.total,
                "order total does not match catalog prices"
            );
            counter!("checkout.orders.price_mismatch", 1);
            return Err(ServiceError::PriceMismatch {
                expected: priced.total,
                claimed: request.total,
            });
        }

        let now = Utc::now();
        let mut order = Order {
            id: Uuid::new_v4(),
            order_code: 0,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total: priced.total,
            items: priced.lines,
            customer_info: request.customer_info,
            payment_method: request
                .payment_method
                .unwrap_or_else(|| self.settings.default_payment_method.clone()),
            created_at: now,
            updated_at: now,
        };

        self.insert_with_fresh_code(&mut order).await?;

        counter!("checkout.orders.created", 1);
        info!(
            order_id = %order.id,
            order_code = order.order_code,
            total = order.total,
            "order created"
        );

        Ok(OrderSummary::from(&order))
    }

    async fn insert_with_fresh_code(&self, order: &mut Order) -> Result<(), ServiceError> {
        let attempts = self.settings.order_code_max_attempts.max(1);
        for attempt in 1..=attempts {
            order.order_code = (self.code_generator)();
            match self.orders.insert(order).await {
                Ok(()) => return Ok(()),
                Err(RepositoryError::DuplicateOrderCode(code)) => {
                    warn!(order_code = code, attempt, "order code collision, regenerating");
                    counter!("checkout.orders.code_collisions", 1);
                }
                Err(err) => {
                    error!(error = %err, order_id = %order.id, "failed to persist order");
                    return Err(err.into());
                }
            }
        }

        error!(attempts, "no unique order code after retries");
        Err(ServiceError::PersistenceFailed(format!(
            "no unique order code after {} attempts",
            attempts
        )))
    }

    /// Looks an order up by its opaque id. Order-code lookups are refused.
    #[instrument(skip(self, query))]
    pub async fn lookup_order(
        &self,
        caller_ip: &str,
        query: OrderLookupQuery,
    ) -> Result<OrderDetails, ServiceError> {
        if query.order_code.is_some() {
            warn!("order lookup by order code refused");
            return Err(ServiceError::Forbidden(
                "Order lookup by order code is not allowed".into(),
            ));
        }

        self.limiters
            .enforce(RateLimitTier::Lenient, &key_for_ip(caller_ip))
            .await?;

        let raw_id = query
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::invalid_field("id", "Order id is required"))?;

        let id = Uuid::parse_str(raw_id)
            .map_err(|_| ServiceError::invalid_field("id", "Order id must be a valid UUID"))?;

        self.get_order(id).await
    }

    pub async fn get_order(&self, id: Uuid) -> Result<OrderDetails, ServiceError> {
        self.orders
            .find_by_id(id)
            .await?
            .map(OrderDetails::from)
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))
    }
}
