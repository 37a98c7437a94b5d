// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Engine integration -- defined in M1.6
//
// Wires the relay together for every proxied request:
// - Credential selection for generation endpoints
// - Upstream URL construction and header hygiene
// - Forward to upstream
// - Streaming: SSE re-framing via StreamOrchestrator, cancelled on disconnect
// - Non-streaming: stateless pass-through

use crate::config::{Config, SelectionPolicy};
use crate::credential::{caller_keys, replace_key_param, CredentialSelector, RandomSelector, RoundRobinSelector};
use crate::proxy::{ProxyError, ProxyRequest, ProxyResponse, UpstreamClient};
use crate::stream::StreamOrchestrator;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use futures_util::TryStreamExt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Path fragment of the endpoints that consume a credential.
const MODELS_PATH: &str = "/v1beta/models/";

/// Path suffix of the streaming generation endpoint.
const STREAM_METHOD: &str = ":streamGenerateContent";

// ---------------------------------------------------------------------------
// Request context for structured logging
// ---------------------------------------------------------------------------

struct RequestContext {
    request_id: String,
    path: String,
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// Sends HTTP requests upstream.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout_ms: Option<u64>,
    pub stream: bool,
}

pub type HttpByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

pub enum HttpBody {
    Full(Bytes),
    Stream(HttpByteStream),
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: HttpBody,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

// ---------------------------------------------------------------------------
// Engine dependencies
// ---------------------------------------------------------------------------

pub struct EngineDeps {
    pub config: Arc<Config>,
    pub http: Arc<dyn HttpSender>,
    pub selector: Arc<dyn CredentialSelector>,
}

// ---------------------------------------------------------------------------
// EngineUpstreamClient
// ---------------------------------------------------------------------------

/// Upstream client that runs the full relay pipeline.
pub struct EngineUpstreamClient {
    deps: EngineDeps,
}

impl EngineUpstreamClient {
    pub fn new_with(deps: EngineDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl UpstreamClient for EngineUpstreamClient {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let ctx = RequestContext {
            request_id: Uuid::new_v4().to_string(),
            path: request.uri.path().to_string(),
        };
        let stream = is_streaming_request(&request);

        tracing::debug!(
            request_id = %ctx.request_id,
            method = %request.method,
            path = %ctx.path,
            stream,
            "processing request"
        );

        let query = self.select_credential(&request, &ctx);
        let url = build_upstream_url(&self.deps.config.upstream.base_url, &ctx.path, query.as_deref());

        // Reverse proxy header hygiene:
        // - Host: reqwest sets the correct Host from the upstream URL.
        // - Accept-Encoding: the SSE body must arrive uncompressed to be re-framed.
        let mut fwd_headers = request.headers.clone();
        fwd_headers.remove(header::HOST);
        fwd_headers.remove(header::ACCEPT_ENCODING);

        let http_req = HttpRequest {
            method: request.method.clone(),
            url,
            headers: fwd_headers,
            body: request.body.clone(),
            timeout_ms: self.deps.config.upstream.timeout_ms,
            stream,
        };

        let upstream = self
            .deps
            .http
            .send(http_req)
            .await
            .map_err(|e| {
                tracing::warn!(request_id = %ctx.request_id, error = %e, "upstream send failed");
                match e {
                    HttpError::Timeout(msg) => ProxyError::UpstreamTimeout(msg),
                    HttpError::Transport(msg) => ProxyError::UpstreamFailure(msg),
                }
            })?;

        tracing::debug!(
            request_id = %ctx.request_id,
            status = upstream.status.as_u16(),
            "upstream responded"
        );

        // Only an SSE body can be re-framed. `:streamGenerateContent` without
        // `alt=sse` answers with a chunked JSON array, which passes through.
        if upstream.status.is_success() && is_event_stream(&upstream.headers) {
            return Ok(self.handle_streaming_response(upstream, &ctx));
        }

        Ok(passthrough_response(upstream))
    }
}

impl EngineUpstreamClient {
    /// Pick one credential for generation requests and return the rewritten
    /// query string. Other requests keep their query untouched.
    fn select_credential(&self, request: &ProxyRequest, ctx: &RequestContext) -> Option<String> {
        let query = request.uri.query();
        if request.method != Method::POST || !ctx.path.contains(MODELS_PATH) {
            return query.map(String::from);
        }

        let supplied = caller_keys(query);
        let (pool, source) = if supplied.is_empty() {
            (self.deps.config.credentials.keys.as_slice(), "configured")
        } else {
            (supplied.as_slice(), "caller")
        };

        match self.deps.selector.select(pool) {
            Some(index) => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    source,
                    pool_size = pool.len(),
                    index,
                    "credential selected"
                );
                Some(replace_key_param(query, &pool[index]))
            }
            None => {
                tracing::debug!(request_id = %ctx.request_id, "no credential available, forwarding as-is");
                query.map(String::from)
            }
        }
    }

    fn handle_streaming_response(&self, upstream: HttpResponse, ctx: &RequestContext) -> ProxyResponse {
        let stream_config = &self.deps.config.stream;
        let (tx, rx) = mpsc::channel::<Bytes>(stream_config.channel_capacity);

        // The response body owns the drop guard: when the client goes away the
        // body is dropped, the token fires, and the upstream read is cancelled.
        let disconnect = CancellationToken::new();
        let guard = disconnect.clone().drop_guard();

        let upstream_body: HttpByteStream = match upstream.body {
            HttpBody::Full(bytes) => Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
            HttpBody::Stream(s) => s,
        };

        let orchestrator = StreamOrchestrator::new(stream_config.idle_timeout)
            .with_max_line_bytes(stream_config.max_line_bytes);
        let span = tracing::info_span!("stream", request_id = %ctx.request_id, path = %ctx.path);
        tokio::spawn(
            async move {
                orchestrator.run(upstream_body, tx, disconnect).await;
            }
            .instrument(span),
        );

        let body_stream = ReceiverStream::new(rx).map(move |event| {
            let _ = &guard;
            Ok::<Bytes, std::io::Error>(event)
        });

        let mut headers = upstream.headers;
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::CONTENT_ENCODING);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        ProxyResponse {
            status: upstream.status,
            headers,
            body: Body::from_stream(body_stream),
        }
    }
}

// ---------------------------------------------------------------------------
// Reqwest HTTP sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        // A whole-request timeout would cut long streams short; streams are
        // bounded by the orchestrator's idle timeout instead.
        if let (Some(timeout_ms), false) = (request.timeout_ms, request.stream) {
            req = req.timeout(std::time::Duration::from_millis(timeout_ms));
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(e.to_string())
            } else {
                HttpError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();

        if request.stream || is_event_stream(&headers) {
            let stream = resp
                .bytes_stream()
                .map_err(|e| HttpError::Transport(e.to_string()));
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Stream(Box::pin(stream)),
            })
        } else {
            let body = resp.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::Timeout(e.to_string())
                } else {
                    HttpError::Transport(e.to_string())
                }
            })?;
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Full(body),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Public factory for default engine client
// ---------------------------------------------------------------------------

pub fn build_engine_client(config: Arc<Config>) -> EngineUpstreamClient {
    let selector: Arc<dyn CredentialSelector> = match config.credentials.selection {
        SelectionPolicy::Random => Arc::new(RandomSelector),
        SelectionPolicy::RoundRobin => Arc::new(RoundRobinSelector::default()),
    };

    let deps = EngineDeps {
        config,
        http: Arc::new(ReqwestHttpSender::new(reqwest::Client::new())),
        selector,
    };

    EngineUpstreamClient::new_with(deps)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Streaming is requested either by endpoint or by `alt=sse`. This only picks
/// the transport mode (no whole-request timeout, body read incrementally);
/// re-framing is decided by the upstream content type.
fn is_streaming_request(request: &ProxyRequest) -> bool {
    if request.uri.path().contains(STREAM_METHOD) {
        return true;
    }
    request
        .uri
        .query()
        .map(|q| q.split('&').any(|pair| pair == "alt=sse"))
        .unwrap_or(false)
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}

fn build_upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match query {
        Some(q) if !q.is_empty() => format!("{base}{path}?{q}"),
        _ => format!("{base}{path}"),
    }
}

fn passthrough_response(upstream: HttpResponse) -> ProxyResponse {
    let body = match upstream.body {
        HttpBody::Full(bytes) => Body::from(bytes),
        HttpBody::Stream(s) => Body::from_stream(
            s.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
        ),
    };
    ProxyResponse {
        status: upstream.status,
        headers: upstream.headers,
        body,
    }
}
