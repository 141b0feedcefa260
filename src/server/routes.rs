//! Control-plane routes: forced sends, health, and capability listing.

use std::any::Any;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing::{debug, error, info};

use crate::channels::shared::SharedAdapter;

const SERVICE_NAME: &str = "receipt-agent";

#[derive(Clone)]
pub struct ServerState {
    pub adapter: SharedAdapter,
}

/// Build the control-plane router.
pub fn control_routes(adapter: SharedAdapter) -> Router {
    let state = ServerState { adapter };

    let router = Router::new()
        .route("/", get(index))
        .route("/send", post(send_message))
        .route("/api/send", post(send_message))
        .route("/health", get(health))
        .route("/api/health", get(health))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .with_state(state);

    with_layers(router)
}

/// Panic guard innermost, then CORS, then the preflight short-circuit.
fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer())
        .layer(middleware::from_fn(preflight))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Answer every `OPTIONS` request with an empty 204.
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    let mut resp = StatusCode::NO_CONTENT.into_response();
    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    resp
}

fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
    error!("Control-plane handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Server error"})),
    )
        .into_response()
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn index() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "endpoints": ["/send", "/health"],
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    #[serde(default, alias = "recipient")]
    phone_number: Option<String>,
    #[serde(default, alias = "text")]
    message: Option<String>,
}

fn send_error(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({"success": false, "error": error.into()})),
    )
}

async fn send_message(
    State(state): State<ServerState>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let req: SendRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SendRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "Rejected /send body");
                return send_error(StatusCode::BAD_REQUEST, "Invalid JSON");
            }
        }
    };

    let Some(phone_number) = req.phone_number.filter(|p| !p.trim().is_empty()) else {
        return send_error(StatusCode::BAD_REQUEST, "phoneNumber required");
    };
    let Some(message) = req.message.filter(|m| !m.is_empty()) else {
        return send_error(StatusCode::BAD_REQUEST, "message required");
    };

    match state.adapter.send(&phone_number, &message).await {
        Ok(ack) => {
            info!(recipient = %phone_number, "Control-plane send delivered");
            (
                StatusCode::OK,
                Json(json!({"success": true, "sentAt": ack.sent_at.to_rfc3339()})),
            )
        }
        Err(e) => {
            error!(error = %e, "Control-plane send failed");
            send_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
