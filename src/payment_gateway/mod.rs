use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use utoipa::ToSchema;

pub mod payos;

pub use payos::{PayosClient, PayosSigner};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request timed out after {0:?}")]
    Timeout(Duration),

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway rejected request: code={code} desc={desc}")]
    Rejected { code: String, desc: String },

    #[error("malformed gateway response: {0}")]
    InvalidResponse(String),

    #[error("gateway is not configured: {0}")]
    NotConfigured(String),
}

/// Line shown on the gateway's checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentLinkItem {
    pub name: String,
    pub quantity: i64,
    pub price: i64,
}

/// Everything the gateway needs to open a checkout session. `amount` is always server-computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLinkParams {
    pub order_code: i64,
    pub amount: i64,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
    pub items: Vec<PaymentLinkItem>,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub buyer_phone: Option<String>,
    pub buyer_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    pub checkout_url: String,
    #[serde(default)]
    pub payment_link_id: Option<String>,
    pub order_code: i64,
    pub amount: i64,
}

/// External payment gateway: link creation plus webhook authentication.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_link(
        &self,
        params: &PaymentLinkParams,
    ) -> Result<PaymentLink, GatewayError>;

    /// Checks `signature` against the webhook's `data` object.
    fn verify_webhook_signature(&self, data: &Value, signature: &str) -> bool;
}
