//! HTTP receiver
//!
//! Each request runs the same fixed sequence and ends in exactly one
//! response:
//!
//! ```text
//! MethodCheck --other--> 405
//!     | POST
//! ReadBody --over limit--> 413
//!     | ok
//! ComputeExpectedMAC --fail--> 500
//!     | ok
//! CompareMAC --mismatch--> 403
//!     | match
//! Deserialize --invalid--> 400
//!     | ok
//! Mutate --> 200
//! ```
//!
//! The body is only read once the method is known to be POST, so other
//! methods get the 405 whatever they carry. The MAC is checked against the
//! body bytes exactly as read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::HttpSettings;
use crate::integrity::{HMAC_HEADER, IntegrityCodec, IntegrityError};
use crate::order::{OrderTransform, PizzaOrder, ProcessedOrder, process};
use crate::utils::Result;

pub const RESPONSE_OK: &str = "Pizza order received!";
pub const RESPONSE_BAD_REQUEST: &str = "Invalid pizza order.";
pub const RESPONSE_FORBIDDEN: &str = "HMAC verification failed.";
pub const RESPONSE_METHOD_NOT_ALLOWED: &str = "Handle POST.";
pub const RESPONSE_SERVER_ERROR: &str = "Error computing HMAC.";
pub const RESPONSE_TOO_LARGE: &str = "Pizza order too large.";

/// Body cap used when none is configured.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

const EVENT_CAPACITY: usize = 64;

/// Shared, read-only state handed to every request.
#[derive(Debug, Clone)]
pub struct ReceiverState {
    codec: Arc<IntegrityCodec>,
    transform: Arc<OrderTransform>,
    events: broadcast::Sender<ProcessedOrder>,
    max_body_bytes: usize,
}

impl ReceiverState {
    pub fn new(codec: IntegrityCodec, transform: OrderTransform) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            codec: Arc::new(codec),
            transform: Arc::new(transform),
            events,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn from_settings(settings: &HttpSettings, codec: IntegrityCodec) -> Self {
        Self::new(
            codec,
            OrderTransform::from_flag(settings.demo_replacement, OrderTransform::http_demo),
        )
        .with_max_body_bytes(settings.max_body_bytes)
    }

    /// Largest POST body read; anything longer is answered with 413.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Orders accepted from now on, after their transform.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessedOrder> {
        self.events.subscribe()
    }
}

/// The terminal state a request ended in.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(ProcessedOrder),
    InvalidOrder(String),
    Rejected(IntegrityError),
    MethodNotAllowed(Method),
    BodyTooLarge,
    MacUnavailable,
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Accepted(_) => StatusCode::OK,
            Outcome::InvalidOrder(_) => StatusCode::BAD_REQUEST,
            Outcome::Rejected(_) => StatusCode::FORBIDDEN,
            Outcome::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Outcome::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Outcome::MacUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            Outcome::Accepted(_) => RESPONSE_OK,
            Outcome::InvalidOrder(_) => RESPONSE_BAD_REQUEST,
            Outcome::Rejected(_) => RESPONSE_FORBIDDEN,
            Outcome::MethodNotAllowed(_) => RESPONSE_METHOD_NOT_ALLOWED,
            Outcome::BodyTooLarge => RESPONSE_TOO_LARGE,
            Outcome::MacUnavailable => RESPONSE_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}

/// Runs one request through the receiver's state machine.
pub fn handle_request(
    state: &ReceiverState,
    method: &Method,
    headers: &HeaderMap,
    body: &[u8],
) -> Outcome {
    if method != Method::POST {
        warn!(%method, "Rejected non-POST request");
        return Outcome::MethodNotAllowed(method.clone());
    }

    let expected = match state.codec.expected_mac(body) {
        Ok(expected) => expected,
        Err(e) => {
            error!(error = %e, "Failed to compute expected HMAC");
            return Outcome::MacUnavailable;
        }
    };

    let header = match headers.get(HMAC_HEADER).map(|v| v.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            let err = IntegrityError::Malformed("header is not visible ASCII".to_string());
            warn!(error = %err, "HMAC verification failed");
            return Outcome::Rejected(err);
        }
    };
    if let Err(e) = expected.check_header(header) {
        warn!(error = %e, "HMAC verification failed");
        return Outcome::Rejected(e);
    }

    let order = match PizzaOrder::from_json(body) {
        Ok(order) => order,
        Err(e) => {
            warn!(error = %e, "Verified payload is not a pizza order");
            return Outcome::InvalidOrder(e.to_string());
        }
    };

    let processed = process(order, &state.transform);
    // No subscribers is fine.
    let _ = state.events.send(processed.clone());
    Outcome::Accepted(processed)
}

async fn receive_order(State(state): State<ReceiverState>, request: Request) -> Outcome {
    let (parts, body) = request.into_parts();
    if parts.method != Method::POST {
        return handle_request(&state, &parts.method, &parts.headers, &[]);
    }

    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, limit = state.max_body_bytes, "Rejected request body");
            return Outcome::BodyTooLarge;
        }
    };
    handle_request(&state, &parts.method, &parts.headers, &body)
}

/// Builds the receiver's router: one route accepting every method so that
/// non-POST requests get the plain-text 405, behind a bounded concurrency
/// limit and a per-request timeout. The body cap comes from `state`.
pub fn router(state: ReceiverState, settings: &HttpSettings) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(
            settings.request_timeout_ms,
        )))
        .layer(ConcurrencyLimitLayer::new(
            settings.max_concurrent_requests.max(1),
        ));

    Router::new()
        .route(&settings.path, any(receive_order))
        .layer(middleware)
        .with_state(state)
}

/// Serves `router` on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Binds the configured address and serves until Ctrl-C.
///
/// A bind failure is returned; it is fatal to the receiver process.
pub async fn start_http_receiver(settings: &HttpSettings, state: ReceiverState) -> Result<()> {
    let listener = TcpListener::bind(settings.addr()).await?;
    info!(
        "HTTP receiver listening on http://{}{}",
        listener.local_addr()?,
        settings.path
    );
    serve(listener, router(state, settings), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await
}
