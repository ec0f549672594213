//! The service-spawning middleware adapter.
//!
//! Bridges an incoming axum request to the lifecycle coordinator: the
//! request is normalized into a [`ServiceRequest`], execution runs on its
//! own task, and the response body streams from the coordinator's sink.
//! Headers set through the stderr control channel apply until the first
//! body byte is released, after which they are frozen.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use runlet_core::envelope::{BodyStream, ServiceRequest};
use runlet_core::runner::{LogStderr, ResponseSink};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Per-request service code override, injected by embedder middleware as a
/// request extension.
#[derive(Debug, Clone)]
pub struct CodeOverride(pub String);

/// Per-request environment map, merged over the service and config maps.
#[derive(Debug, Clone)]
pub struct EnvOverride(pub Map<String, Value>);

/// Per-request resource carrying `instance` / `params`.
#[derive(Debug, Clone)]
pub struct ResourceOverride(pub Value);

/// Any-method, any-path entrypoint: runs the configured service against the
/// incoming request and streams the child's stdout back.
pub async fn run_service(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> AppResult<Response> {
    let service_request = normalize_request(&query, request)?;

    let (sink, preamble, body_rx) = ChannelSink::new();
    let handler = Arc::clone(&state.handler);
    tokio::spawn(async move {
        let completion = handler
            .execute(service_request, sink, Box::new(LogStderr::default()))
            .await;
        // Default continuation: surface the outcome pair in the log.
        tracing::warn!(
            outcome = completion.outcome,
            erroring = completion.status.erroring,
            vm_error = completion.status.vm_error,
            timed_out = completion.status.service_ended && !completion.status.vm_closed,
            "service invocation completed"
        );
    });

    // Headers are final once the coordinator releases its first body byte
    // (or ends with none).
    let headers = preamble
        .await
        .map_err(|_| AppError::InternalError("service task ended without responding".into()))?;

    let stream = UnboundedReceiverStream::new(body_rx).map(Ok::<_, Infallible>);
    let mut response = Response::new(Body::from_stream(stream));
    *response.headers_mut() = headers;
    Ok(response)
}

/// Normalize the axum request into the runner's request shape.
fn normalize_request(
    query: &HashMap<String, String>,
    request: Request,
) -> AppResult<ServiceRequest> {
    let (parts, body) = request.into_parts();

    let mut headers = Map::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), Value::String(value.to_string()));
        }
    }

    let host = parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut params = Map::new();
    for (key, value) in query {
        params.insert(key.clone(), Value::String(value.clone()));
    }

    let remote_address = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_default();

    let code = parts
        .extensions
        .get::<CodeOverride>()
        .map(|c| c.0.clone());
    if let Some(code) = &code {
        if code.is_empty() {
            return Err(AppError::BadRequest(
                "code override must not be empty".into(),
            ));
        }
    }

    let env = parts.extensions.get::<EnvOverride>().map(|e| e.0.clone());
    let resource = parts
        .extensions
        .get::<ResourceOverride>()
        .map(|r| r.0.clone());

    let streaming = body_pending(&parts.headers);
    let body_stream: BodyStream = body
        .into_data_stream()
        .map_err(std::io::Error::other)
        .boxed();

    Ok(ServiceRequest {
        method: parts.method.to_string(),
        headers,
        host,
        path: parts.uri.path().to_string(),
        params,
        url: parts.uri.to_string(),
        remote_address,
        streaming,
        body: Some(body_stream),
        code,
        env,
        resource,
        hook_access_key: None,
    })
}

/// A body is pending when its end has not been observed: a declared
/// non-zero length or chunked transfer encoding.
fn body_pending(headers: &HeaderMap) -> bool {
    if let Some(length) = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
    {
        return length > 0;
    }
    headers.get(TRANSFER_ENCODING).is_some()
}

/// Sink feeding the streaming response: header snapshot through a oneshot
/// at the first body byte, chunks through an unbounded channel after that.
struct ChannelSink {
    headers: HeaderMap,
    preamble: Option<oneshot::Sender<HeaderMap>>,
    body: Option<mpsc::UnboundedSender<Bytes>>,
}

impl ChannelSink {
    fn new() -> (
        ChannelSink,
        oneshot::Receiver<HeaderMap>,
        mpsc::UnboundedReceiver<Bytes>,
    ) {
        let (preamble_tx, preamble_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        (
            ChannelSink {
                headers: HeaderMap::new(),
                preamble: Some(preamble_tx),
                body: Some(body_tx),
            },
            preamble_rx,
            body_rx,
        )
    }

    fn flush_preamble(&mut self) {
        if let Some(tx) = self.preamble.take() {
            let _ = tx.send(self.headers.clone());
        }
    }
}

impl ResponseSink for ChannelSink {
    fn write(&mut self, chunk: Bytes) {
        self.flush_preamble();
        if let Some(tx) = &self.body {
            let _ = tx.send(chunk);
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        // Frozen once the preamble has been released.
        if self.preamble.is_none() {
            return;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        } else {
            tracing::warn!(header = name, "discarding invalid control header");
        }
    }

    fn end(&mut self) {
        self.flush_preamble();
        // Dropping the sender closes the response stream.
        self.body = None;
    }

    fn finished(&self) -> bool {
        self.body.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
