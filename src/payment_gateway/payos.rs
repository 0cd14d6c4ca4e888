use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use super::{GatewayError, PaymentGateway, PaymentLink, PaymentLinkItem, PaymentLinkParams};
use crate::config::PayosSettings;

type HmacSha256 = Hmac<Sha256>;

/// Gateway response code for success.
pub const PAYOS_SUCCESS_CODE: &str = "00";

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// HMAC-SHA256 signer keyed with the merchant checksum key.
#[derive(Clone)]
pub struct PayosSigner {
    checksum_key: String,
}

impl PayosSigner {
    pub fn new(checksum_key: impl Into<String>) -> Self {
        Self {
            checksum_key: checksum_key.into(),
        }
    }

    fn hmac_hex(&self, message: &str) -> String {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.checksum_key.as_bytes()) else {
            return String::new();
        };
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signature for a payment request: the five signed fields in alphabetical order.
    pub fn sign_payment_request(&self, params: &PaymentLinkParams) -> String {
        let message = format!(
            "amount={}&cancelUrl={}&description={}&orderCode={}&returnUrl={}",
            params.amount, params.cancel_url, params.description, params.order_code, params.return_url
        );
        self.hmac_hex(&message)
    }

    /// Signature over a webhook or response `data` object.
    pub fn sign_data(&self, data: &Value) -> Option<String> {
        canonical_data(data).map(|message| self.hmac_hex(&message))
    }

    pub fn verify_data(&self, data: &Value, signature: &str) -> bool {
        if self.checksum_key.is_empty() {
            warn!("webhook signature check attempted without a checksum key");
            return false;
        }
        match self.sign_data(data) {
            Some(expected) => constant_time_eq(&expected, &signature.trim().to_ascii_lowercase()),
            None => false,
        }
    }
}

/// `key=value` pairs joined by `&`, keys sorted; null becomes empty and nested values become JSON.
pub fn canonical_data(data: &Value) -> Option<String> {
    let object = data.as_object()?;
    let mut keys: Vec<&String> = object.keys().collect();
    keys.sort();

    let parts: Vec<String> = keys
        .into_iter()
        .map(|key| {
            let value = match &object[key.as_str()] {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
            };
            format!("{}={}", key, value)
        })
        .collect();

    Some(parts.join("&"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentRequestBody<'a> {
    order_code: i64,
    amount: i64,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_address: Option<&'a str>,
    items: &'a [PaymentLinkItem],
    cancel_url: &'a str,
    return_url: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct PayosEnvelope {
    code: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    signature: Option<String>,
}

/// HTTP client for the PayOS merchant API
#[derive(Clone)]
pub struct PayosClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    api_key: String,
    signer: PayosSigner,
    timeout: Duration,
}

impl PayosClient {
    pub fn new(settings: &PayosSettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| GatewayError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client_id: settings.client_id.clone(),
            api_key: settings.api_key.clone(),
            signer: PayosSigner::new(settings.checksum_key.clone()),
            timeout: settings.timeout(),
        })
    }

    pub fn signer(&self) -> &PayosSigner {
        &self.signer
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl PaymentGateway for PayosClient {
    #[instrument(skip(self, params), fields(order_code = params.order_code, amount = params.amount))]
    async fn create_payment_link(
        &self,
        params: &PaymentLinkParams,
    ) -> Result<PaymentLink, GatewayError> {
        if self.client_id.is_empty() || self.api_key.is_empty() {
            return Err(GatewayError::NotConfigured(
                "payos client_id/api_key missing".into(),
            ));
        }

        let body = CreatePaymentRequestBody {
            order_code: params.order_code,
            amount: params.amount,
            description: &params.description,
            buyer_name: params.buyer_name.as_deref(),
            buyer_email: params.buyer_email.as_deref(),
            buyer_phone: params.buyer_phone.as_deref(),
            buyer_address: params.buyer_address.as_deref(),
            items: &params.items,
            cancel_url: &params.cancel_url,
            return_url: &params.return_url,
            signature: self.signer.sign_payment_request(params),
        };

        let url = format!("{}/v2/payment-requests", self.base_url);
        debug!(%url, "requesting payment link");

        let response = self
            .client
            .post(&url)
            .header("x-client-id", &self.client_id)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "payment gateway returned HTTP error");
            return Err(GatewayError::Transport(format!("HTTP {}", status)));
        }

        let envelope: PayosEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if envelope.code != PAYOS_SUCCESS_CODE {
            warn!(code = %envelope.code, desc = %envelope.desc, "payment gateway rejected request");
            return Err(GatewayError::Rejected {
                code: envelope.code,
                desc: envelope.desc,
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data".into()))?;

        let signature = envelope
            .signature
            .as_deref()
            .filter(|signature| !signature.trim().is_empty())
            .ok_or_else(|| {
                error!("payment gateway response is unsigned");
                GatewayError::InvalidResponse("missing response signature".into())
            })?;
        if !self.signer.verify_data(&data, signature) {
            error!("payment gateway response signature mismatch");
            return Err(GatewayError::InvalidResponse(
                "response signature mismatch".into(),
            ));
        }

        let link: PaymentLink = serde_json::from_value(data)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(link)
    }

    fn verify_webhook_signature(&self, data: &Value, signature: &str) -> bool {
        self.signer.verify_data(data, signature)
    }
}
