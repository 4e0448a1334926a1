use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;

use super::*;
use crate::config::{HttpSettings, Settings};
use crate::integrity::{IntegrityCodec, IntegrityError};
use crate::order::{OrderTransform, PizzaOrder};

const SECRET: &str = "shared_secret_key";

fn codec() -> IntegrityCodec {
    IntegrityCodec::new(SECRET).unwrap()
}

fn settings() -> HttpSettings {
    Settings::default().http
}

fn state() -> ReceiverState {
    ReceiverState::from_settings(&settings(), codec())
}

fn signed_headers(payload: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mac = codec().sign(payload).unwrap();
    headers.insert("hmac", HeaderValue::from_str(&mac).unwrap());
    headers
}

/// Flips the last character of a base64 MAC to another valid one.
fn tamper(mac: &str) -> String {
    let mut chars: Vec<char> = mac.chars().collect();
    let idx = chars.iter().rposition(|c| *c != '=').unwrap();
    chars[idx] = if chars[idx] == 'A' { 'E' } else { 'A' };
    chars.into_iter().collect()
}

#[test]
fn test_valid_order_is_accepted_and_replaced() {
    let state = state();
    let payload = PizzaOrder::pepperoni().to_json().unwrap();

    let outcome = handle_request(
        &state,
        &Method::POST,
        &signed_headers(payload.as_bytes()),
        payload.as_bytes(),
    );

    match &outcome {
        Outcome::Accepted(processed) => {
            assert_eq!(processed.received, PizzaOrder::pepperoni());
            assert_eq!(processed.updated.name, "Hawaiian");
            assert_eq!(processed.updated.size, "Large");
            assert_eq!(processed.updated.price, 16.99);
            assert_eq!(
                processed.updated.toppings,
                vec!["Pineapple", "Ham", "Bacon"]
            );
        }
        other => panic!("expected Accepted, got {other:?}"),
    }
    assert_eq!(outcome.status(), StatusCode::OK);
    assert_eq!(outcome.body(), "Pizza order received!");
}

#[test]
fn test_tampered_mac_is_forbidden() {
    let payload = PizzaOrder::pepperoni().to_json().unwrap();
    let mac = codec().sign(payload.as_bytes()).unwrap();
    let mut headers = HeaderMap::new();
    headers.insert("hmac", HeaderValue::from_str(&tamper(&mac)).unwrap());

    let outcome = handle_request(&state(), &Method::POST, &headers, payload.as_bytes());
    assert_eq!(outcome, Outcome::Rejected(IntegrityError::Mismatch));
    assert_eq!(outcome.status(), StatusCode::FORBIDDEN);
    assert_eq!(outcome.body(), "HMAC verification failed.");
}

#[test]
fn test_tampered_body_is_forbidden() {
    let payload = PizzaOrder::pepperoni().to_json().unwrap();
    let headers = signed_headers(payload.as_bytes());
    let altered = payload.replace("14.99", "1.99");

    let outcome = handle_request(&state(), &Method::POST, &headers, altered.as_bytes());
    assert_eq!(outcome, Outcome::Rejected(IntegrityError::Mismatch));
}

#[test]
fn test_missing_header_is_forbidden() {
    let payload = PizzaOrder::pepperoni().to_json().unwrap();
    let outcome = handle_request(
        &state(),
        &Method::POST,
        &HeaderMap::new(),
        payload.as_bytes(),
    );
    assert_eq!(outcome, Outcome::Rejected(IntegrityError::Missing));
    assert_eq!(outcome.status(), StatusCode::FORBIDDEN);
}

#[test]
fn test_malformed_header_is_forbidden() {
    let payload = PizzaOrder::pepperoni().to_json().unwrap();
    let mut headers = HeaderMap::new();
    headers.insert("hmac", HeaderValue::from_static("not base64!"));

    let outcome = handle_request(&state(), &Method::POST, &headers, payload.as_bytes());
    assert!(matches!(
        outcome,
        Outcome::Rejected(IntegrityError::Malformed(_))
    ));
}

#[test]
fn test_get_is_method_not_allowed() {
    let outcome = handle_request(&state(), &Method::GET, &HeaderMap::new(), b"");
    assert_eq!(outcome, Outcome::MethodNotAllowed(Method::GET));
    assert_eq!(outcome.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(outcome.body(), "Handle POST.");
}

#[test]
fn test_signed_garbage_is_bad_request() {
    let payload = b"definitely not a pizza";
    let outcome = handle_request(&state(), &Method::POST, &signed_headers(payload), payload);
    assert!(matches!(outcome, Outcome::InvalidOrder(_)));
    assert_eq!(outcome.status(), StatusCode::BAD_REQUEST);
    assert_eq!(outcome.body(), "Invalid pizza order.");
}

#[test]
fn test_mac_unavailable_maps_to_500() {
    let outcome = Outcome::MacUnavailable;
    assert_eq!(outcome.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(outcome.body(), "Error computing HMAC.");
}

#[test]
fn test_identity_transform_keeps_order() {
    let state = ReceiverState::new(codec(), OrderTransform::Identity);
    let order = PizzaOrder::new("Margherita", "Small", 9.5, ["Basil", "Mozzarella"]).unwrap();
    let payload = order.to_json().unwrap();

    let outcome = handle_request(
        &state,
        &Method::POST,
        &signed_headers(payload.as_bytes()),
        payload.as_bytes(),
    );
    match outcome {
        Outcome::Accepted(processed) => assert_eq!(processed.updated, order),
        other => panic!("expected Accepted, got {other:?}"),
    }
}

#[test]
fn test_accepted_orders_are_broadcast() {
    let state = state();
    let mut events = state.subscribe();
    let payload = PizzaOrder::pepperoni().to_json().unwrap();

    handle_request(
        &state,
        &Method::POST,
        &signed_headers(payload.as_bytes()),
        payload.as_bytes(),
    );
    // Rejected requests publish nothing.
    handle_request(&state, &Method::POST, &HeaderMap::new(), payload.as_bytes());

    let processed = events.try_recv().unwrap();
    assert_eq!(processed.received, PizzaOrder::pepperoni());
    assert!(events.try_recv().is_err());
}

async fn call(request: Request<Body>) -> (StatusCode, String) {
    let app = router(state(), &settings());
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_router_accepts_signed_post() {
    let payload = PizzaOrder::pepperoni().to_json().unwrap();
    let mac = codec().sign(payload.as_bytes()).unwrap();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/pizza")
        .header("content-type", "application/json")
        .header("hmac", mac)
        .body(Body::from(payload))
        .unwrap();

    let (status, body) = call(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Pizza order received!");
}

#[tokio::test]
async fn test_router_put_is_plain_405() {
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/pizza")
        .body(Body::empty())
        .unwrap();

    let (status, body) = call(request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, "Handle POST.");
}

#[tokio::test]
async fn test_router_unknown_path_is_404() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/burger")
        .body(Body::empty())
        .unwrap();

    let (status, _) = call(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sender_round_trip_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut http = settings();
    http.port = port;

    let state = state();
    let mut events = state.subscribe();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, router(state, &http), async {
        let _ = stop_rx.await;
    }));

    let sender = HttpSender::new(&http, codec()).unwrap();
    assert_eq!(sender.url(), format!("http://127.0.0.1:{port}/pizza"));

    let outcome = sender.send(&PizzaOrder::pepperoni()).await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome {
            status: 200,
            body: "Pizza order received!".to_string()
        }
    );
    assert!(outcome.is_success());
    assert_eq!(events.recv().await.unwrap().updated.name, "Hawaiian");

    let wrong_key = HttpSender::new(&http, IntegrityCodec::new("another_key").unwrap()).unwrap();
    let outcome = wrong_key.send(&PizzaOrder::pepperoni()).await.unwrap();
    assert_eq!(outcome.status, 403);
    assert_eq!(outcome.body, "HMAC verification failed.");
    assert!(!outcome.is_success());

    let outcome = sender.send_payload(b"[1, 2, 3]".to_vec()).await.unwrap();
    assert_eq!(outcome.status, 400);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_router_get_with_oversized_body_is_still_405() {
    let oversized = vec![b'x'; settings().max_body_bytes + 6 * 1024];
    let request = Request::builder()
        .method(Method::GET)
        .uri("/pizza")
        .body(Body::from(oversized))
        .unwrap();

    let (status, body) = call(request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, "Handle POST.");
}

#[tokio::test]
async fn test_router_post_over_body_limit_is_413() {
    let state = state().with_max_body_bytes(16);
    let mut events = state.subscribe();
    let payload = PizzaOrder::pepperoni().to_json().unwrap();
    let mac = codec().sign(payload.as_bytes()).unwrap();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/pizza")
        .header("hmac", mac)
        .body(Body::from(payload))
        .unwrap();

    let response = router(state, &settings()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"Pizza order too large.");
    assert!(events.try_recv().is_err());
}
