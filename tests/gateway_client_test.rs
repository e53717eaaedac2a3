//! HTTP gateway client against a stub server.

use pharmacart_api::config::GatewayConfig;
use pharmacart_api::errors::ServiceError;
use pharmacart_api::services::gateway::{HttpPaymentGateway, PaymentGateway, SessionRequest};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        base_url: server.uri(),
        key_id: "key_test".to_string(),
        key_secret: "secret_test".to_string(),
        timeout_secs: 5,
    }
}

fn session_request() -> SessionRequest {
    SessionRequest {
        amount_minor: 34900,
        currency: "INR".to_string(),
        receipt: "PC-240101120000-AB12CD".to_string(),
        notes: json!({ "order_id": "11111111-2222-3333-4444-555555555555" }),
    }
}

#[tokio::test]
async fn open_session_maps_the_gateway_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .and(body_partial_json(json!({
            "amount": 34900,
            "currency": "INR",
            "receipt": "PC-240101120000-AB12CD",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sess_wm_1",
            "amount": 34900,
            "currency": "INR",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&config_for(&server)).unwrap();
    let session = gateway.open_session(session_request()).await.unwrap();

    assert_eq!(session.gateway_session_id, "sess_wm_1");
    assert_eq!(session.amount_minor, 34900);
    assert_eq!(session.currency, "INR");
}

#[tokio::test]
async fn rejected_session_surfaces_as_retryable_gateway_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&config_for(&server)).unwrap();
    let err = gateway.open_session(session_request()).await.unwrap_err();

    match err {
        ServiceError::GatewayError(msg) => {
            assert!(msg.contains("401"));
            assert!(ServiceError::GatewayError(msg).is_retryable());
        }
        other => panic!("expected GatewayError, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_session_response_is_a_gateway_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&config_for(&server)).unwrap();
    let err = gateway.open_session(session_request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::GatewayError(_)));
}

#[tokio::test]
async fn script_fetch_follows_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/checkout.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("// widget"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&config_for(&server)).unwrap();
    assert!(gateway.fetch_checkout_script().await.is_ok());

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout.js"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    assert!(gateway.fetch_checkout_script().await.is_err());
}

#[tokio::test]
async fn invalid_base_url_is_rejected_at_construction() {
    let cfg = GatewayConfig {
        base_url: "not a url".to_string(),
        key_id: String::new(),
        key_secret: String::new(),
        timeout_secs: 5,
    };
    assert!(HttpPaymentGateway::new(&cfg).is_err());
}
