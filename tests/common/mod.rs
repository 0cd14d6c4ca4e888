#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use storefront_checkout::{
    audit::InMemoryPaymentAuditLog,
    auth::{AuthConfig, AuthService, Claims},
    build_router,
    config::{AppConfig, OrderSettings, PayosSettings, RateLimitSettings},
    handlers::AppServices,
    models::{Order, Product},
    payment_gateway::{GatewayError, PaymentGateway, PaymentLink, PaymentLinkParams, PayosSigner},
    rate_limiter::RateLimiters,
    repositories::{InMemoryOrderRepository, InMemoryProductRepository, OrderRepository},
    services::{CartPricer, OrderCodeGenerator, OrderService},
    AppState,
};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "k9Qz3vR7xW1pL5mN8bT2yH6jF4dS0aGc-test-only";
pub const CHECKSUM_KEY: &str = "1a2b3c4d5e6f-test-checksum";

pub const TEA_ID: &str = "tea-oolong";
pub const TEA_PRICE: i64 = 350_000;
pub const CUP_ID: &str = "cup-ceramic";
pub const CUP_PRICE: i64 = 50_000;
pub const POT_ID: &str = "pot-clay";

/// How the fake gateway answers link requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Succeed,
    Reject,
    Hang,
}

/// Stand-in for the PayOS client: real webhook verification, scripted link creation.
pub struct FakeGateway {
    signer: PayosSigner,
    mode: Mutex<GatewayMode>,
    calls: Mutex<Vec<PaymentLinkParams>>,
}

impl FakeGateway {
    pub fn new(checksum_key: &str) -> Self {
        Self {
            signer: PayosSigner::new(checksum_key),
            mode: Mutex::new(GatewayMode::Succeed),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: GatewayMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> Vec<PaymentLinkParams> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_link(
        &self,
        params: &PaymentLinkParams,
    ) -> Result<PaymentLink, GatewayError> {
        self.calls.lock().unwrap().push(params.clone());
        let mode = *self.mode.lock().unwrap();
        match mode {
            GatewayMode::Succeed => Ok(PaymentLink {
                checkout_url: format!("https://pay.payos.vn/web/{}", params.order_code),
                payment_link_id: Some(format!("plink-{}", params.order_code)),
                order_code: params.order_code,
                amount: params.amount,
            }),
            GatewayMode::Reject => Err(GatewayError::Rejected {
                code: "20".into(),
                desc: "Invalid order data".into(),
            }),
            GatewayMode::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(GatewayError::Transport("unreachable".into()))
            }
        }
    }

    fn verify_webhook_signature(&self, data: &Value, signature: &str) -> bool {
        self.signer.verify_data(data, signature)
    }
}

pub struct TestAppBuilder {
    strict_requests: u32,
    lenient_requests: u32,
    gateway_timeout: Duration,
    order_repository: Option<Arc<dyn OrderRepository>>,
    code_generator: Option<OrderCodeGenerator>,
}

impl TestAppBuilder {
    pub fn strict_limit(mut self, requests: u32) -> Self {
        self.strict_requests = requests;
        self
    }

    pub fn lenient_limit(mut self, requests: u32) -> Self {
        self.lenient_requests = requests;
        self
    }

    pub fn gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn order_repository(mut self, repo: Arc<dyn OrderRepository>) -> Self {
        self.order_repository = Some(repo);
        self
    }

    pub fn order_code_generator(mut self, generator: OrderCodeGenerator) -> Self {
        self.code_generator = Some(generator);
        self
    }

    pub fn build(self) -> TestApp {
        let config = test_config(self.strict_requests, self.lenient_requests);

        let products = InMemoryProductRepository::with_products([
            product(TEA_ID, "Oolong Tea", TEA_PRICE, true),
            product(CUP_ID, "Ceramic Cup", CUP_PRICE, true),
            product(POT_ID, "Clay Teapot", 900_000, false),
        ]);
        let order_store = InMemoryOrderRepository::new();
        let orders: Arc<dyn OrderRepository> = self
            .order_repository
            .unwrap_or_else(|| Arc::new(order_store.clone()));
        let audit = Arc::new(InMemoryPaymentAuditLog::new());
        let gateway = Arc::new(FakeGateway::new(CHECKSUM_KEY));
        let rate_limiters = RateLimiters::from_settings(&config.rate_limit, None);

        let mut services = AppServices::new(
            Arc::new(products.clone()),
            orders.clone(),
            gateway.clone(),
            audit.clone(),
            rate_limiters.clone(),
            config.orders.clone(),
            self.gateway_timeout,
        );
        if let Some(generator) = self.code_generator {
            services = services.with_order_service(
                OrderService::new(
                    orders,
                    CartPricer::new(Arc::new(products.clone())),
                    rate_limiters,
                    config.orders.clone(),
                )
                .with_code_generator(generator),
            );
        }

        let state = AppState {
            db: None,
            auth: Arc::new(AuthService::new(AuthConfig::from(&config))),
            config: Arc::new(config),
            services,
        };

        TestApp {
            router: build_router(state),
            products,
            order_store,
            audit,
            gateway,
            signer: PayosSigner::new(CHECKSUM_KEY),
        }
    }
}

/// Router over in-memory stores and a fake gateway.
pub struct TestApp {
    router: Router,
    pub products: InMemoryProductRepository,
    /// Backing store unless the builder swapped in another repository
    pub order_store: InMemoryOrderRepository,
    pub audit: Arc<InMemoryPaymentAuditLog>,
    pub gateway: Arc<FakeGateway>,
    pub signer: PayosSigner,
}

impl TestApp {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            strict_requests: 10,
            lenient_requests: 60,
            gateway_timeout: Duration::from_secs(2),
            order_repository: None,
            code_generator: None,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Send a request against the router with optional JSON body and extra headers.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let request = build_request(method, uri, body, headers);
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None, &[]).await
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn create_payment_link(&self, user_id: &str, body: Value) -> Response {
        let auth = format!("Bearer {}", token_for(user_id));
        self.request(
            Method::POST,
            "/api/payment/create-link",
            Some(body),
            &[("authorization", auth.as_str())],
        )
        .await
    }

    /// Creates a two-tea order (700,000) and returns the `order` object from the response.
    pub async fn create_tea_order(&self) -> Value {
        self.create_tea_order_from("unknown").await
    }

    /// Same as [`TestApp::create_tea_order`], sent as caller `ip`.
    pub async fn create_tea_order_from(&self, ip: &str) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/orders",
                Some(order_payload(700_000)),
                &[("x-forwarded-for", ip)],
            )
            .await;
        assert_eq!(response.status(), 200);
        response_json(response).await["order"].clone()
    }

    /// Creates an order for `items`, claiming `total`, and returns its order code.
    pub async fn create_order_with(&self, items: Value, total: i64) -> i64 {
        let mut payload = order_payload(total);
        payload["items"] = items;
        let response = self.post_json("/api/orders", payload).await;
        assert_eq!(response.status(), 200);
        response_json(response).await["order"]["orderCode"]
            .as_i64()
            .expect("order code")
    }

    /// Order code of a freshly created two-tea order.
    pub async fn tea_order_code(&self) -> i64 {
        self.create_tea_order().await["orderCode"]
            .as_i64()
            .expect("order code")
    }

    pub async fn stored_order(&self, order_code: i64) -> Order {
        self.order_store
            .find_by_order_code(order_code)
            .await
            .expect("order lookup")
            .expect("order exists")
    }

    /// Webhook body signed with the shared checksum key.
    pub fn signed_webhook(&self, code: &str, order_code: i64, amount: i64) -> Value {
        let data = webhook_data(code, order_code, amount);
        let signature = self.signer.sign_data(&data).expect("data is an object");
        json!({
            "code": code,
            "desc": if code == "00" { "success" } else { "failed" },
            "success": code == "00",
            "data": data,
            "signature": signature,
        })
    }
}

pub fn build_request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = if let Some(json) = body {
        builder = builder.header("content-type", "application/json");
        Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
    } else {
        Body::empty()
    };

    builder.body(body).expect("failed to build request")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn token_for(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: Some(chrono::Utc::now().timestamp()),
        email: None,
        name: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token encoding")
}

pub fn order_payload(total: i64) -> Value {
    json!({
        "items": [
            { "id": TEA_ID, "quantity": 2, "price": TEA_PRICE }
        ],
        "total": total,
        "customerInfo": {
            "name": "Nguyen Van A",
            "phone": "0912345678",
            "email": "nguyen.a@example.com",
            "address": "12 Hang Bac",
            "city": "Hanoi"
        },
        "paymentMethod": "payos"
    })
}

pub fn link_payload(order_code: i64, amount: Option<i64>) -> Value {
    let mut body = json!({
        "orderCode": order_code,
        "description": format!("DH{}", order_code),
        "returnUrl": "https://shop.example.com/checkout/success",
        "cancelUrl": "https://shop.example.com/checkout/cancel",
        "items": [
            { "id": TEA_ID, "quantity": 2, "price": TEA_PRICE }
        ],
        "buyerName": "Nguyen Van A",
        "buyerPhone": "0912345678",
        "buyerEmail": "nguyen.a@example.com",
        "buyerAddress": "12 Hang Bac, Hanoi"
    });
    if let Some(amount) = amount {
        body["amount"] = json!(amount);
    }
    body
}

pub fn webhook_data(code: &str, order_code: i64, amount: i64) -> Value {
    json!({
        "orderCode": order_code,
        "amount": amount,
        "description": format!("DH{}", order_code),
        "accountNumber": "12345678",
        "reference": "FT24123456789",
        "transactionDateTime": "2024-12-09 10:30:00",
        "currency": "VND",
        "paymentLinkId": format!("plink-{}", order_code),
        "code": code,
        "desc": if code == "00" { "success" } else { "failed" },
        "counterAccountBankId": "",
        "counterAccountName": null,
        "virtualAccountName": null
    })
}

fn product(id: &str, name: &str, price: i64, in_stock: bool) -> Product {
    Product {
        id: id.into(),
        name: name.into(),
        price,
        in_stock,
        images: vec![format!("/images/{}.jpg", id)],
    }
}

fn test_config(strict_requests: u32, lenient_requests: u32) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        redis_url: "redis://127.0.0.1:6379".into(),
        jwt_secret: JWT_SECRET.into(),
        jwt_issuer: None,
        jwt_audience: None,
        host: "127.0.0.1".into(),
        port: 18_080,
        environment: "test".into(),
        log_level: "info".into(),
        log_json: false,
        auto_migrate: false,
        cors_allowed_origins: None,
        request_timeout_secs: 30,
        rate_limit: RateLimitSettings {
            strict_requests,
            lenient_requests,
            ..RateLimitSettings::default()
        },
        orders: OrderSettings::default(),
        payos: PayosSettings {
            checksum_key: CHECKSUM_KEY.into(),
            ..PayosSettings::default()
        },
    }
}
