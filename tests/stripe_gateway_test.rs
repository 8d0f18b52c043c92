use std::collections::BTreeMap;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use storefront_api::services::payment_gateway::{
    CreateIntentRequest, GatewayError, PaymentGateway, StripeConfig, StripeGateway,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET_KEY: &str = "sk_test_wiremock";
// base64("sk_test_wiremock:")
const BASIC_AUTH: &str = "Basic c2tfdGVzdF93aXJlbW9jazo=";

fn gateway(server: &MockServer) -> StripeGateway {
    StripeGateway::new(StripeConfig {
        secret_key: SECRET_KEY.to_string(),
        api_base: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .expect("client")
}

fn intent_request() -> CreateIntentRequest {
    CreateIntentRequest {
        amount: 1999,
        currency: "usd".to_string(),
        receipt_email: "jane@example.com".to_string(),
        metadata: BTreeMap::from([
            ("productId".to_string(), "prod-1".to_string()),
            ("userId".to_string(), "user-1".to_string()),
        ]),
    }
}

#[tokio::test]
async fn creates_intent_with_form_body_and_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_string_contains("amount=1999"))
        .and(body_string_contains("currency=usd"))
        .and(body_string_contains("receipt_email=jane%40example.com"))
        .and(body_string_contains("metadata%5BuserId%5D=user-1"))
        .and(body_string_contains("metadata%5BproductId%5D=prod-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "object": "payment_intent",
            "amount": 1999,
            "currency": "usd",
            "status": "requires_payment_method",
            "client_secret": "pi_123_secret_456",
            "metadata": { "productId": "prod-1", "userId": "user-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let intent = gateway(&server)
        .create_payment_intent(intent_request())
        .await
        .expect("intent");

    assert_eq!(intent.id, "pi_123");
    assert_eq!(intent.amount, 1999);
    assert_eq!(intent.client_secret.as_deref(), Some("pi_123_secret_456"));
    assert_eq!(intent.metadata["userId"], "user-1");
}

#[tokio::test]
async fn stripe_error_envelope_becomes_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": "Invalid API Key provided: sk_test_****mock",
                "type": "invalid_request_error"
            }
        })))
        .mount(&server)
        .await;

    let result = gateway(&server).create_payment_intent(intent_request()).await;

    assert_matches!(
        result,
        Err(GatewayError::Rejected { status: 401, ref message })
            if message.contains("Invalid API Key") && message.contains("invalid_request_error")
    );
}

#[tokio::test]
async fn non_json_error_body_is_kept_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let result = gateway(&server).create_payment_intent(intent_request()).await;

    assert_matches!(
        result,
        Err(GatewayError::Rejected { status: 502, ref message }) if message == "bad gateway"
    );
}

#[tokio::test]
async fn retrieves_intent_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_789"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_789",
            "amount": 4500,
            "currency": "usd",
            "status": "succeeded"
        })))
        .mount(&server)
        .await;

    let intent = gateway(&server)
        .retrieve_payment_intent("pi_789")
        .await
        .expect("intent");

    assert!(intent.is_succeeded());
    assert_eq!(intent.amount, 4500);
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_bad"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let result = gateway(&server).retrieve_payment_intent("pi_bad").await;
    assert_matches!(result, Err(GatewayError::Decode(_)));
}

#[tokio::test]
async fn path_like_intent_ids_never_reach_stripe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cus_1" })))
        .expect(0)
        .mount(&server)
        .await;

    let result = gateway(&server)
        .retrieve_payment_intent("pi_x/../../customers")
        .await;

    assert_matches!(result, Err(GatewayError::InvalidIntentId(_)));
}
