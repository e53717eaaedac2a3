//! Reconciliation sweep: stale pending orders are cancelled out-of-band,
//! and paid invoices with unfulfilled prescriptions are repaired.

mod common;

use axum::http::Method;
use chrono::{Duration, Utc};
use common::{response_json, TestApp, TEST_GATEWAY_SECRET};
use pharmacart_api::entities::order::{self, OrderStatus, PaymentStatus};
use pharmacart_api::entities::prescription::{self, PrescriptionStatus};
use pharmacart_api::services::payments::compute_signature;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;

async fn place_online_order(app: &TestApp) -> (String, String) {
    let body = response_json(
        app.request_authenticated(Method::POST, "/api/v1/checkout", Some(json!({})))
            .await,
    )
    .await;
    (
        body["data"]["order"]["id"].as_str().unwrap().to_string(),
        body["data"]["session"]["gateway_session_id"]
            .as_str()
            .unwrap()
            .to_string(),
    )
}

async fn backdate_order(app: &TestApp, order_id: &str, hours: i64) {
    let id = uuid::Uuid::parse_str(order_id).unwrap();
    let model = order::Entity::find_by_id(id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut update: order::ActiveModel = model.into();
    update.created_at = Set(Utc::now() - Duration::hours(hours));
    update.update(&*app.state.db).await.unwrap();
}

#[tokio::test]
async fn stale_pending_orders_are_cancelled() {
    let app = TestApp::new().await;
    app.seed_default_address().await;
    let product = app.seed_product("Paracetamol 500mg", dec!(300), dec!(300)).await;
    app.seed_cart_item(product.id, 1).await;

    let (stale_id, _) = place_online_order(&app).await;
    backdate_order(&app, &stale_id, 48).await;

    app.state
        .services
        .reconciliation
        .run_once(Utc::now())
        .await
        .unwrap();

    let stale = order::Entity::find_by_id(uuid::Uuid::parse_str(&stale_id).unwrap())
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stale.status, OrderStatus::Cancelled);
    assert_eq!(stale.payment_status, PaymentStatus::Failed);
    assert!(stale.notes.unwrap().contains("abandoned"));
}

#[tokio::test]
async fn fresh_and_paid_orders_survive_the_sweep() {
    let app = TestApp::new().await;
    app.seed_default_address().await;
    let product = app.seed_product("Paracetamol 500mg", dec!(300), dec!(300)).await;

    // A paid order, backdated past the threshold.
    app.seed_cart_item(product.id, 1).await;
    let (paid_id, session_id) = place_online_order(&app).await;
    let verify = app
        .request_authenticated(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({
                "order_id": paid_id,
                "payment_id": "pay_sweep",
                "gateway_order_id": session_id,
                "signature": compute_signature(TEST_GATEWAY_SECRET, &session_id, "pay_sweep"),
            })),
        )
        .await;
    assert_eq!(verify.status(), 200);
    backdate_order(&app, &paid_id, 48).await;

    // A fresh pending order.
    app.seed_cart_item(product.id, 2).await;
    let (fresh_id, _) = place_online_order(&app).await;

    app.state
        .services
        .reconciliation
        .run_once(Utc::now())
        .await
        .unwrap();

    let paid = order::Entity::find_by_id(uuid::Uuid::parse_str(&paid_id).unwrap())
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_ne!(paid.status, OrderStatus::Cancelled);

    let fresh = order::Entity::find_by_id(uuid::Uuid::parse_str(&fresh_id).unwrap())
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.status, OrderStatus::Pending);
}

#[tokio::test]
async fn cod_orders_are_never_swept() {
    let app = TestApp::new().await;
    app.seed_default_address().await;
    let product = app.seed_product("Paracetamol 500mg", dec!(300), dec!(300)).await;
    app.seed_cart_item(product.id, 1).await;

    let body = response_json(
        app.request_authenticated(Method::POST, "/api/v1/checkout/cod", Some(json!({})))
            .await,
    )
    .await;
    let cod_id = body["data"]["id"].as_str().unwrap().to_string();
    backdate_order(&app, &cod_id, 48).await;

    app.state
        .services
        .reconciliation
        .run_once(Utc::now())
        .await
        .unwrap();

    let cod = order::Entity::find_by_id(uuid::Uuid::parse_str(&cod_id).unwrap())
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cod.status, OrderStatus::Pending);
    assert_eq!(cod.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn paid_invoice_with_unfulfilled_prescription_is_repaired() {
    let app = TestApp::new().await;
    let (rx, invoice) = app.seed_invoice(dec!(450)).await;

    // Simulate the partial-failure window: invoice paid, prescription left
    // behind (the second write never landed).
    let mut update: pharmacart_api::entities::prescription_invoice::ActiveModel =
        invoice.clone().into();
    update.status = Set(pharmacart_api::entities::prescription_invoice::InvoiceStatus::Paid);
    update.paid_at = Set(Some(Utc::now()));
    update.update(&*app.state.db).await.unwrap();

    app.state
        .services
        .reconciliation
        .run_once(Utc::now())
        .await
        .unwrap();

    let rx = prescription::Entity::find_by_id(rx.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.status, PrescriptionStatus::Fulfilled);
}
