//! Request envelope assembly.
//!
//! The envelope (`__env`) is the serializable payload handed to the
//! executor: request metadata, the merged environment map, and the service's
//! own serializable view. Assembly is a pure function of the service, the
//! normalized request, and the runner configuration.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::RunnerConfig;
use crate::language::Language;
use crate::service::ServiceConfig;

/// Request body bytes as an async stream, piped verbatim into child stdin.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Host-normalized view of the incoming HTTP request.
///
/// The HTTP adapter fills this in; the coordinator and envelope assembly
/// never touch server types directly.
#[derive(Default)]
pub struct ServiceRequest {
    pub method: String,
    /// Header map with lowercased names.
    pub headers: Map<String, Value>,
    pub host: String,
    pub path: String,
    /// Query/route parameters.
    pub params: Map<String, Value>,
    pub url: String,
    /// Socket peer address; `x-forwarded-for` takes precedence in the
    /// envelope.
    pub remote_address: String,
    /// Whether the body's end has not yet been observed.
    pub streaming: bool,
    pub body: Option<BodyStream>,
    /// Per-request override of the service code.
    pub code: Option<String>,
    /// Per-request environment entries, merged over service and config maps.
    pub env: Option<Map<String, Value>>,
    /// Caller-supplied resource carrying `instance` / `params`.
    pub resource: Option<Value>,
    pub hook_access_key: Option<String>,
}

/// The serializable payload handed to the executor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub params: Value,
    pub is_streaming: bool,
    /// Effective timeout for this invocation, in milliseconds.
    pub custom_timeout: u64,
    pub env: Map<String, Value>,
    pub resource: Value,
    pub input: RequestInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hookio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_access_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInput {
    pub method: String,
    pub headers: Map<String, Value>,
    pub host: String,
    pub path: String,
    pub params: Map<String, Value>,
    pub url: String,
    pub connection: Connection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub remote_address: String,
}

/// Assemble the envelope for one invocation.
pub fn assemble(
    service: &ServiceConfig,
    request: &ServiceRequest,
    config: &RunnerConfig,
) -> RequestEnvelope {
    // `instance` wins over `params`; both live on the caller resource.
    let params = request
        .resource
        .as_ref()
        .and_then(|resource| {
            resource
                .get("instance")
                .cloned()
                .or_else(|| resource.get("params").cloned())
        })
        .unwrap_or_else(|| Value::Object(Map::new()));

    // Merge order: config defaults < service env < per-request env.
    let mut env = config.env.clone();
    for (key, value) in &service.env {
        env.insert(key.clone(), value.clone());
    }
    if let Some(extra) = &request.env {
        for (key, value) in extra {
            env.insert(key.clone(), value.clone());
        }
    }

    let resource = if service.language == Language::Lua {
        Value::Object(Map::new())
    } else {
        service.resource_value()
    };

    let remote_address = request
        .headers
        .get("x-forwarded-for")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| request.remote_address.clone());

    let custom_timeout = service
        .custom_timeout
        .unwrap_or(config.service_max_timeout)
        .as_millis() as u64;

    RequestEnvelope {
        params,
        is_streaming: request.streaming,
        custom_timeout,
        env,
        resource,
        input: RequestInput {
            method: request.method.clone(),
            headers: request.headers.clone(),
            host: request.host.clone(),
            path: request.path.clone(),
            params: request.params.clone(),
            url: request.url.clone(),
            connection: Connection { remote_address },
        },
        is_hookio: service.is_hookio.then_some(true),
        hook_access_key: request.hook_access_key.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
