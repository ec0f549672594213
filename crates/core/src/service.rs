//! Service descriptors.
//!
//! [`ServiceSpec`] is the wire-facing definition with every legacy field
//! alias still accepted. It is normalized exactly once, at handler
//! construction, into the immutable [`ServiceConfig`] the rest of the
//! system sees.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::RunnerError;
use crate::language::Language;

/// Raw service definition as supplied by an embedder or a descriptor file.
///
/// Legacy aliases: `source` for `code`, `themeSource` for `view`,
/// `presenterSource` for `presenter`, `lang` for `language`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(alias = "source")]
    pub code: Option<String>,
    #[serde(alias = "lang")]
    pub language: Option<String>,
    #[serde(alias = "themeSource")]
    pub view: Option<String>,
    #[serde(alias = "presenterSource")]
    pub presenter: Option<String>,
    /// Per-request timeout override in milliseconds.
    pub custom_timeout: Option<u64>,
    /// Per-service configuration overrides.
    pub config: Option<Map<String, Value>>,
    pub is_hookio: Option<bool>,
    /// Environment map merged into the request envelope's `env`.
    pub env: Option<Map<String, Value>>,
}

/// Immutable, canonical service descriptor built once per handler.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub code: String,
    pub language: Language,
    pub view: Option<String>,
    pub presenter: Option<String>,
    pub custom_timeout: Option<Duration>,
    pub is_hookio: bool,
    pub env: Map<String, Value>,
    pub config: Map<String, Value>,
}

impl ServiceConfig {
    /// Normalize a raw spec. Missing code and unknown languages are
    /// configuration errors surfaced to the embedder, never to a client.
    pub fn from_spec(spec: ServiceSpec) -> Result<ServiceConfig, RunnerError> {
        let code = match spec.code {
            Some(code) if !code.is_empty() => code,
            _ => {
                return Err(RunnerError::Configuration(
                    "service has no code".to_string(),
                ))
            }
        };

        let tag = spec.language.unwrap_or_default();
        let language = Language::canonical(&tag)
            .ok_or_else(|| RunnerError::Configuration(format!("unknown language: {tag:?}")))?;

        Ok(ServiceConfig {
            code,
            language,
            view: spec.view,
            presenter: spec.presenter,
            custom_timeout: spec.custom_timeout.map(Duration::from_millis),
            is_hookio: spec.is_hookio.unwrap_or(false),
            env: spec.env.unwrap_or_default(),
            config: spec.config.unwrap_or_default(),
        })
    }

    /// Serializable view of this service, handed to executors as the
    /// envelope's `resource`. Only serializable fields enter: log sinks and
    /// other host handles never do.
    pub fn resource_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".to_string(), Value::String(self.code.clone()));
        map.insert(
            "language".to_string(),
            Value::String(self.language.as_str().to_string()),
        );
        if let Some(view) = &self.view {
            map.insert("view".to_string(), Value::String(view.clone()));
        }
        if let Some(presenter) = &self.presenter {
            map.insert("presenter".to_string(), Value::String(presenter.clone()));
        }
        if let Some(timeout) = self.custom_timeout {
            map.insert(
                "customTimeout".to_string(),
                Value::from(timeout.as_millis() as u64),
            );
        }
        if self.is_hookio {
            map.insert("isHookio".to_string(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
