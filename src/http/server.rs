//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum Router with the bridge handler as fallback
//! - Wire up middleware (request id, tracing, CORS header, basic auth)
//! - Map every request under the home route onto one correlated send

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::broker::{ConnectionGate, ReceiptId};
use crate::config::RestConfig;
use crate::correlation::CorrelationEngine;
use crate::http::auth::{basic_auth_middleware, BasicCredentials};
use crate::http::request::{parse_send_request, strip_home_route};
use crate::http::{BridgeError, BridgeResponse};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CorrelationEngine>,
    pub gate: ConnectionGate,
    pub home_route: Arc<str>,
    pub max_body_bytes: usize,
}

/// The bridge's HTTP surface. One router is shared by every listener.
pub struct BridgeServer {
    router: Router,
}

impl BridgeServer {
    pub fn new(rest: &RestConfig, engine: Arc<CorrelationEngine>, gate: ConnectionGate) -> Self {
        let state = AppState {
            engine,
            gate,
            home_route: Arc::from(rest.normalized_home_route()),
            max_body_bytes: rest.max_body_bytes,
        };
        let credentials = rest
            .basic_auth
            .as_ref()
            .map(|auth| Arc::new(BasicCredentials::new(auth)));

        Self {
            router: Self::build_router(state, credentials),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, credentials: Option<Arc<BasicCredentials>>) -> Router {
        let mut router = Router::new().fallback(bridge_handler).with_state(state);

        if let Some(credentials) = credentials {
            router = router.layer(middleware::from_fn_with_state(
                credentials,
                basic_auth_middleware,
            ));
        }

        router
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

fn request_span(request: &Request) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

/// Bridge handler: one HTTP request, one broker send, one JSON answer.
async fn bridge_handler(State(state): State<AppState>, request: Request) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some(destination) = strip_home_route(&path, &state.home_route) else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            "Request outside home route"
        );
        return (StatusCode::NOT_FOUND, BridgeResponse::exception("not found")).into_response();
    };

    let result = bridge(&state, &method, destination, request.into_body()).await;

    match &result {
        Ok(receipt) => tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            receipt_id = %receipt,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Message acknowledged"
        ),
        Err(e) => {
            if matches!(e, BridgeError::BadRequest(_) | BridgeError::NotConnected) {
                metrics::record_request(e.label());
            }
            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                outcome = e.label(),
                error = %e,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "Message not acknowledged"
            );
        }
    }

    BridgeResponse::from(result).into_response()
}

async fn bridge(
    state: &AppState,
    method: &Method,
    destination: &str,
    body: Body,
) -> Result<ReceiptId, BridgeError> {
    if *method != Method::POST {
        return Err(BridgeError::BadRequest(format!("method {} not allowed", method)));
    }

    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| BridgeError::BadRequest("body too large or unreadable".into()))?;
    let request = parse_send_request(destination, &bytes)?;

    if !state.gate.is_connected() {
        return Err(BridgeError::NotConnected);
    }

    state.engine.send(request).await.into()
}
