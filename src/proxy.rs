// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// HTTP proxy surface -- M1.3
//
// Responsibilities:
// - Path normalization into the /v1beta namespace
// - Request forwarding via injected UpstreamClient trait
// - Hop-by-hop response header stripping
// - Heartbeat endpoint
// - Permissive CORS

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Largest inbound request body accepted.
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Inbound request data forwarded to the upstream client.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path already normalized into /v1beta, query preserved.
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response handed back to the client.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Errors that can occur during upstream forwarding.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("invalid request URI: {0}")]
    InvalidUri(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, public_message) = match &self {
            ProxyError::UpstreamFailure(_) => {
                (StatusCode::BAD_GATEWAY, "upstream request failed")
            }
            ProxyError::UpstreamTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream request timed out")
            }
            ProxyError::MalformedJson(_) => {
                (StatusCode::BAD_REQUEST, "request body is not valid JSON")
            }
            ProxyError::InvalidUri(_) => (StatusCode::BAD_REQUEST, "invalid request URI"),
        };
        (status, public_message).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the component that forwards requests to the upstream API.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Path normalization
// ---------------------------------------------------------------------------

/// Map any inbound path into the `/v1beta` API namespace.
///
/// `/models/x` becomes `/v1beta/models/x`; paths already under `/v1beta`
/// are left alone.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed == "v1beta" || trimmed.starts_with("v1beta/") {
        format!("/{trimmed}")
    } else {
        format!("/v1beta/{trimmed}")
    }
}

fn normalize_uri(uri: &Uri) -> Result<Uri, ProxyError> {
    let path = normalize_path(uri.path());
    let path_and_query = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    path_and_query
        .parse::<Uri>()
        .map_err(|e| ProxyError::InvalidUri(e.to_string()))
}

// ---------------------------------------------------------------------------
// Header stripping
// ---------------------------------------------------------------------------

/// Connection-scoped headers that must not be copied between hops.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers from an upstream response.
///
/// All other headers are preserved unchanged.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /healthz -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Proxy handler for every non-heartbeat path.
///
/// Normalizes the path, validates JSON bodies, forwards via the injected
/// upstream client, and strips hop-by-hop headers from the response.
pub async fn proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let method = request.method().clone();
    let headers = request.headers().clone();
    let uri = match normalize_uri(request.uri()) {
        Ok(uri) => uri,
        Err(e) => return e.into_response(),
    };

    let body = match axum::body::to_bytes(request.into_body(), MAX_REQUEST_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {e}"),
            )
                .into_response()
        }
    };

    if !body.is_empty()
        && is_json_content(&headers)
        && serde_json::from_slice::<serde_json::Value>(&body).is_err()
    {
        return ProxyError::MalformedJson("request body is not valid JSON".into())
            .into_response();
    }

    let proxy_req = ProxyRequest {
        method,
        uri,
        headers,
        body,
    };

    match state.upstream.forward(proxy_req).await {
        Ok(mut resp) => {
            strip_hop_by_hop_headers(&mut resp.headers);

            let mut response = Response::new(resp.body);
            *response.status_mut() = resp.status;
            *response.headers_mut() = resp.headers;
            response.into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "upstream forward failed");
            e.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the heartbeat and the catch-all proxy route.
///
/// The upstream client is injected; the router holds no hard-coded client.
pub fn build_router(upstream: Arc<dyn UpstreamClient>) -> Router {
    let state = AppState { upstream };

    Router::new()
        .route("/healthz", get(heartbeat))
        .fallback(proxy_handler)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
