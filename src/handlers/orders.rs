use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::JsonBody;
use crate::errors::ServiceError;
use crate::rate_limiter::client_ip;
use crate::services::{CreateOrderRequest, OrderDetails, OrderLookupQuery, OrderSummary};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order: OrderSummary,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderLookupResponse {
    pub success: bool,
    pub order: OrderDetails,
}

/// Create a pending order from a storefront cart
#[utoipa::path(
    post,
    path = "/api/orders",
    summary = "Create order",
    description = "Re-prices the cart against the catalog and persists a pending order",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created", body = CreateOrderResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Validation, cart or price error", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ServiceError> {
    let caller_ip = client_ip(&headers);
    let order = state.services.orders.create_order(&caller_ip, request).await?;
    Ok(Json(CreateOrderResponse {
        success: true,
        order,
    }))
}

/// Look an order up by its opaque id
#[utoipa::path(
    get,
    path = "/api/orders",
    summary = "Get order",
    params(OrderLookupQuery),
    responses(
        (status = 200, description = "Order found", body = OrderLookupResponse),
        (status = 400, description = "Missing or malformed id", body = crate::errors::ErrorResponse),
        (status = 403, description = "Lookup by order code is disabled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OrderLookupQuery>,
) -> Result<Json<OrderLookupResponse>, ServiceError> {
    let caller_ip = client_ip(&headers);
    let order = state.services.orders.lookup_order(&caller_ip, query).await?;
    Ok(Json(OrderLookupResponse {
        success: true,
        order,
    }))
}
