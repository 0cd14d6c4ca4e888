mod common;

use std::time::Duration;

use axum::http::Method;
use common::{link_payload, response_json, GatewayMode, TestApp, CUP_ID, CUP_PRICE};
use serde_json::json;
use storefront_checkout::audit::PaymentEvent;
use storefront_checkout::models::PaymentStatus;

#[tokio::test]
async fn missing_or_invalid_token_is_unauthorized() {
    let app = TestApp::new();

    let response = app
        .post_json("/api/payment/create-link", link_payload(1001, Some(700_000)))
        .await;
    assert_eq!(response.status(), 401);

    let response = app
        .request(
            Method::POST,
            "/api/payment/create-link",
            Some(link_payload(1001, Some(700_000))),
            &[("authorization", "Bearer not.a.jwt")],
        )
        .await;
    assert_eq!(response.status(), 401);

    let response = app
        .request(
            Method::POST,
            "/api/payment/create-link",
            Some(link_payload(1001, Some(700_000))),
            &[("authorization", "Basic dXNlcjpwYXNz")],
        )
        .await;
    assert_eq!(response.status(), 401);
    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn link_is_issued_at_server_total() {
    let app = TestApp::new();
    let items = json!([
        { "id": common::TEA_ID, "quantity": 1, "price": 1 },
        { "id": CUP_ID, "quantity": 3, "price": 1 }
    ]);
    let order_code = app
        .create_order_with(items.clone(), common::TEA_PRICE + 3 * CUP_PRICE)
        .await;
    let mut payload = link_payload(order_code, None);
    payload["items"] = items;

    let response = app.create_payment_link("user-1", payload).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["orderCode"], order_code);
    assert_eq!(
        body["checkoutUrl"],
        format!("https://pay.payos.vn/web/{}", order_code)
    );

    let calls = app.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].amount, common::TEA_PRICE + 3 * CUP_PRICE);
    assert_eq!(calls[0].items[1].name, "Ceramic Cup");
    assert_eq!(calls[0].items[1].price, CUP_PRICE);
}

#[tokio::test]
async fn malformed_request_fields_are_rejected() {
    let app = TestApp::new();
    let mut payload = link_payload(0, Some(700_000));
    payload["returnUrl"] = json!("not a url");
    payload["buyerEmail"] = json!("nobody");

    let response = app.create_payment_link("user-1", payload).await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"orderCode"));
    assert!(fields.contains(&"returnUrl"));
    assert!(fields.contains(&"buyerEmail"));
    assert!(app.gateway.calls().is_empty());
    assert!(app.audit.entries().await.is_empty());
}

#[tokio::test]
async fn amount_mismatch_never_reaches_gateway() {
    let app = TestApp::new();
    let order_code = app.tea_order_code().await;
    let response = app
        .create_payment_link("user-1", link_payload(order_code, Some(1_000)))
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["details"]["serverTotal"], 700_000);
    assert_eq!(body["details"]["claimedTotal"], 1_000);

    assert!(app.gateway.calls().is_empty());
    let failures = app.audit.events(PaymentEvent::PaymentFailed).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].data["reason"], "price_mismatch");
}

#[tokio::test]
async fn gateway_rejection_is_generic_500_and_audited() {
    let app = TestApp::new();
    let order_code = app.tea_order_code().await;
    app.gateway.set_mode(GatewayMode::Reject);

    let response = app
        .create_payment_link("user-1", link_payload(order_code, Some(700_000)))
        .await;
    assert_eq!(response.status(), 500);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Payment link creation failed");
    assert!(!body.to_string().contains("Invalid order data"));

    let failures = app.audit.events(PaymentEvent::PaymentFailed).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].data["orderCode"], order_code);
    assert!(app.audit.events(PaymentEvent::PaymentCreated).await.is_empty());
}

#[tokio::test]
async fn gateway_timeout_leaves_order_unpaid() {
    let app = TestApp::builder()
        .gateway_timeout(Duration::from_millis(50))
        .build();
    let order = app.create_tea_order().await;
    let order_code = order["orderCode"].as_i64().unwrap();
    app.gateway.set_mode(GatewayMode::Hang);

    let response = app
        .create_payment_link("user-1", link_payload(order_code, Some(700_000)))
        .await;
    assert_eq!(response.status(), 500);
    assert_eq!(
        response_json(response).await["message"],
        "Payment link creation failed"
    );

    let failures = app.audit.events(PaymentEvent::PaymentFailed).await;
    assert_eq!(failures.len(), 1);
    assert!(failures[0].data["reason"]
        .as_str()
        .unwrap()
        .contains("timed out"));
    assert_eq!(
        app.stored_order(order_code).await.payment_status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn audit_trail_masks_buyer_contact_details() {
    let app = TestApp::new();
    let order_code = app.tea_order_code().await;
    let response = app
        .create_payment_link("user-1", link_payload(order_code, Some(700_000)))
        .await;
    assert_eq!(response.status(), 200);

    let created = app.audit.events(PaymentEvent::PaymentCreated).await;
    assert_eq!(created.len(), 1);
    let data = &created[0].data;
    assert_eq!(data["buyerEmail"], "n***@example.com");
    assert_eq!(data["buyerPhone"], "******5678");
    assert_eq!(data["amount"], 700_000);

    let serialized = data.to_string();
    assert!(!serialized.contains("nguyen.a@example.com"));
    assert!(!serialized.contains("0912345678"));
}

#[tokio::test]
async fn strict_tier_is_keyed_by_user() {
    let app = TestApp::builder().strict_limit(1).build();
    let first = app.create_tea_order_from("203.0.113.10").await["orderCode"]
        .as_i64()
        .unwrap();
    let second = app.create_tea_order_from("203.0.113.11").await["orderCode"]
        .as_i64()
        .unwrap();

    let response = app
        .create_payment_link("user-a", link_payload(first, Some(700_000)))
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .create_payment_link("user-a", link_payload(second, Some(700_000)))
        .await;
    assert_eq!(response.status(), 429);
    assert!(response.headers().contains_key("retry-after"));

    let response = app
        .create_payment_link("user-b", link_payload(second, Some(700_000)))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(app.gateway.calls().len(), 2);
}

#[tokio::test]
async fn unknown_or_already_paid_order_gets_no_link() {
    let app = TestApp::new();
    let response = app
        .create_payment_link("user-1", link_payload(424_242, Some(700_000)))
        .await;
    assert_eq!(response.status(), 404);

    let order_code = app.tea_order_code().await;
    let response = app
        .post_json(
            "/api/payment/webhook",
            app.signed_webhook("00", order_code, 700_000),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .create_payment_link("user-1", link_payload(order_code, Some(700_000)))
        .await;
    assert_eq!(response.status(), 400);
    assert!(app.gateway.calls().is_empty());
}
