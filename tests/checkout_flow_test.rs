//! End-to-end checkout: order creation, link issuance, webhook confirmation.

mod common;

use common::{link_payload, order_payload, response_json, TestApp};
use storefront_checkout::audit::PaymentEvent;
use storefront_checkout::models::{OrderStatus, PaymentStatus};

#[tokio::test]
async fn order_link_and_webhook_settle_exactly_once() {
    let app = TestApp::new();

    // Step 1: create the order
    let order = app.create_tea_order().await;
    assert_eq!(order["total"], 700_000);
    assert_eq!(order["status"], "pending");
    let order_code = order["orderCode"].as_i64().unwrap();
    let order_id = order["id"].as_str().unwrap().to_string();

    // Step 2: issue the payment link
    let response = app
        .create_payment_link("user-42", link_payload(order_code, Some(700_000)))
        .await;
    assert_eq!(response.status(), 200);
    let link = response_json(response).await;
    assert_eq!(link["orderCode"], order_code);
    assert!(link["checkoutUrl"].as_str().unwrap().starts_with("https://"));
    assert_eq!(app.gateway.calls()[0].amount, 700_000);

    // Step 3: gateway confirms payment
    let webhook = app.signed_webhook("00", order_code, 700_000);
    let response = app.post_json("/api/payment/webhook", webhook.clone()).await;
    assert_eq!(response.status(), 200);
    let ack = response_json(response).await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["message"], "Webhook processed");

    let stored = app.stored_order(order_code).await;
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Processing);
    let paid_at = stored.updated_at;

    // Step 4: redelivery is acknowledged without another write
    let response = app.post_json("/api/payment/webhook", webhook).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response_json(response).await["message"], "Already processed");

    let stored = app.stored_order(order_code).await;
    assert_eq!(stored.updated_at, paid_at);
    assert_eq!(app.audit.events(PaymentEvent::WebhookDuplicate).await.len(), 1);
    assert_eq!(app.audit.events(PaymentEvent::PaymentCreated).await.len(), 1);

    // Lookup by id reflects the paid state
    let response = app.get(&format!("/api/orders?id={}", order_id)).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["order"]["paymentStatus"], "paid");
    assert_eq!(body["order"]["items"][0]["name"], "Oolong Tea");
}

#[tokio::test]
async fn tampered_total_is_rejected_and_nothing_persisted() {
    let app = TestApp::new();

    let response = app.post_json("/api/orders", order_payload(100_000)).await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Price mismatch"));
    assert_eq!(body["details"]["serverTotal"], 700_000);
    assert_eq!(body["details"]["claimedTotal"], 100_000);

    assert!(app.order_store.is_empty());
}

#[tokio::test]
async fn cart_repriced_between_order_and_link() {
    let app = TestApp::new();
    let order = app.create_tea_order().await;
    let order_code = order["orderCode"].as_i64().unwrap();

    // Catalog price changes after the order was placed.
    let mut tea = storefront_checkout::models::Product {
        id: common::TEA_ID.into(),
        name: "Oolong Tea".into(),
        price: 400_000,
        in_stock: true,
        images: vec![],
    };
    app.products.upsert(tea.clone());

    let response = app
        .create_payment_link("user-42", link_payload(order_code, Some(700_000)))
        .await;
    assert_eq!(response.status(), 400);
    assert!(app.gateway.calls().is_empty());

    tea.in_stock = false;
    app.products.upsert(tea);
    let response = app
        .create_payment_link("user-42", link_payload(order_code, None))
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("invalid or unavailable"));
}

#[tokio::test]
async fn repriced_catalog_cannot_strand_a_paid_customer() {
    let app = TestApp::new();
    let order_code = app.tea_order_code().await;

    app.products.upsert(storefront_checkout::models::Product {
        id: common::TEA_ID.into(),
        name: "Oolong Tea".into(),
        price: 360_000,
        in_stock: true,
        images: vec![],
    });

    // The link would charge 720000 against a 700000 order.
    let response = app
        .create_payment_link("user-42", link_payload(order_code, None))
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["details"]["serverTotal"], 720_000);
    assert_eq!(body["details"]["claimedTotal"], 700_000);
    assert!(app.gateway.calls().is_empty());
    let failures = app.audit.events(PaymentEvent::PaymentFailed).await;
    assert_eq!(failures[0].data["reason"], "order_total_changed");

    // A verified payment at any amount still settles the order.
    let response = app
        .post_json(
            "/api/payment/webhook",
            app.signed_webhook("00", order_code, 720_000),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response_json(response).await["message"], "Webhook processed");

    let stored = app.stored_order(order_code).await;
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Processing);
    let received = app.audit.events(PaymentEvent::WebhookReceived).await;
    assert_eq!(received[0].data["outcome"], "paid_amount_mismatch");
}
