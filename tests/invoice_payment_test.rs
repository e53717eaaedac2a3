//! Prescription invoice payment flow: structurally the cart checkout with
//! the order replaced by a pharmacist-issued invoice amount, reusing the
//! same session and verification contracts.

mod common;

use axum::http::Method;
use common::{response_json, TestApp, TEST_GATEWAY_SECRET};
use pharmacart_api::entities::prescription::{self, PrescriptionStatus};
use pharmacart_api::entities::prescription_invoice::{self, InvoiceStatus};
use pharmacart_api::services::payments::compute_signature;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};

fn verify_body(invoice_id: &str, gateway_session_id: &str, payment_id: &str) -> Value {
    json!({
        "invoice_id": invoice_id,
        "payment_id": payment_id,
        "gateway_order_id": gateway_session_id,
        "signature": compute_signature(TEST_GATEWAY_SECRET, gateway_session_id, payment_id),
    })
}

#[tokio::test]
async fn invoice_payment_marks_invoice_paid_and_prescription_fulfilled() {
    let app = TestApp::new().await;
    let (rx, invoice) = app.seed_invoice(dec!(450)).await;

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/payments/invoices/{}/session", invoice.id),
            None,
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;

    // Amount in minor units, receipt correlates to the invoice.
    assert_eq!(body["data"]["amount_minor"], 45000);
    assert_eq!(
        body["data"]["receipt"].as_str().unwrap(),
        invoice.invoice_number
    );
    let session_id = body["data"]["gateway_session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let verify = app
        .request_authenticated(
            Method::POST,
            "/api/v1/payments/invoices/verify",
            Some(verify_body(&invoice.id.to_string(), &session_id, "pay_inv_1")),
        )
        .await;
    assert_eq!(verify.status(), 200);
    let verified = response_json(verify).await;
    assert_eq!(verified["data"]["verified"], true);
    assert_eq!(verified["data"]["status"], "paid");
    assert_eq!(verified["data"]["already_paid"], false);

    let invoice = prescription_invoice::Entity::find_by_id(invoice.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    assert!(invoice.paid_at.is_some());

    let rx = prescription::Entity::find_by_id(rx.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.status, PrescriptionStatus::Fulfilled);
}

#[tokio::test]
async fn invoice_verification_replay_is_a_no_op_success() {
    let app = TestApp::new().await;
    let (_rx, invoice) = app.seed_invoice(dec!(450)).await;

    let body = response_json(
        app.request_authenticated(
            Method::POST,
            &format!("/api/v1/payments/invoices/{}/session", invoice.id),
            None,
        )
        .await,
    )
    .await;
    let session_id = body["data"]["gateway_session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let payload = verify_body(&invoice.id.to_string(), &session_id, "pay_inv_2");
    let first = app
        .request_authenticated(Method::POST, "/api/v1/payments/invoices/verify", Some(payload.clone()))
        .await;
    assert_eq!(first.status(), 200);

    let second = app
        .request_authenticated(Method::POST, "/api/v1/payments/invoices/verify", Some(payload))
        .await;
    assert_eq!(second.status(), 200);
    let replayed = response_json(second).await;
    assert_eq!(replayed["data"]["already_paid"], true);
}

#[tokio::test]
async fn invalid_invoice_signature_leaves_invoice_unpaid() {
    let app = TestApp::new().await;
    let (rx, invoice) = app.seed_invoice(dec!(450)).await;

    let body = response_json(
        app.request_authenticated(
            Method::POST,
            &format!("/api/v1/payments/invoices/{}/session", invoice.id),
            None,
        )
        .await,
    )
    .await;
    let session_id = body["data"]["gateway_session_id"].as_str().unwrap();

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/payments/invoices/verify",
            Some(json!({
                "invoice_id": invoice.id,
                "payment_id": "pay_forged",
                "gateway_order_id": session_id,
                "signature": "00".repeat(32),
            })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let invoice = prescription_invoice::Entity::find_by_id(invoice.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Sent);

    let rx = prescription::Entity::find_by_id(rx.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.status, PrescriptionStatus::Invoiced);
}

#[tokio::test]
async fn paying_a_paid_invoice_session_is_rejected() {
    let app = TestApp::new().await;
    let (_rx, invoice) = app.seed_invoice(dec!(450)).await;

    let mut update: prescription_invoice::ActiveModel = invoice.clone().into();
    update.status = Set(InvoiceStatus::Paid);
    update.update(&*app.state.db).await.unwrap();

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/payments/invoices/{}/session", invoice.id),
            None,
        )
        .await;
    assert_eq!(response.status(), 422);
}
