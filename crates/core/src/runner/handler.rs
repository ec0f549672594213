//! Service handlers.
//!
//! A handler is built once per service: the raw spec is normalized, the
//! transpiler registry and compile cache are attached, and per-service
//! configuration overrides are folded in. Each request then gets a fresh
//! envelope, argv, child, and coordinator.

use std::sync::Arc;
use std::time::Duration;

use crate::argv;
use crate::cache::{CompileCache, InMemoryCache};
use crate::config::RunnerConfig;
use crate::envelope::{self, ServiceRequest};
use crate::error::RunnerError;
use crate::language::Language;
use crate::service::{ServiceConfig, ServiceSpec};
use crate::transpile::{self, Transpiler, TranspilerRegistry};

use super::lifecycle::{Completion, Coordinator, ResponseSink};
use super::spawn;
use super::stderr::StderrHandler;

/// A reusable, immutable service handler. Construction-time state is shared
/// across concurrent requests; per-request state lives in [`execute`].
///
/// [`execute`]: ServiceHandler::execute
pub struct ServiceHandler {
    service: ServiceConfig,
    config: RunnerConfig,
    transpilers: TranspilerRegistry,
    cache: Arc<dyn CompileCache>,
}

impl ServiceHandler {
    /// Normalize the raw service definition and build a handler. Missing
    /// code or an unknown language fails here, at construction, and never
    /// reaches a client.
    pub fn new(spec: ServiceSpec, config: RunnerConfig) -> Result<ServiceHandler, RunnerError> {
        let service = ServiceConfig::from_spec(spec)?;
        let config = apply_service_overrides(config, &service);
        Ok(ServiceHandler {
            service,
            config,
            transpilers: TranspilerRegistry::new(),
            cache: Arc::new(InMemoryCache::default()),
        })
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Register a transpiler for a language slot (`babel`, `coffee-script`).
    pub fn register_transpiler(&mut self, language: Language, transpiler: Arc<dyn Transpiler>) {
        self.transpilers.register(language, transpiler);
    }

    /// Substitute the compile cache, e.g. with an external store shared
    /// across processes.
    pub fn set_cache(&mut self, cache: Arc<dyn CompileCache>) {
        self.cache = cache;
    }

    /// Run one request through the service, streaming the outcome into
    /// `sink`. The sink is terminated exactly once on every path; pre-spawn
    /// failures (transpile, argv, spawn) surface their diagnostic as the
    /// response body.
    pub async fn execute<S: ResponseSink>(
        &self,
        mut request: ServiceRequest,
        sink: S,
        stderr_handler: Box<dyn StderrHandler>,
    ) -> Completion {
        let body = request.body.take();

        let envelope = envelope::assemble(&self.service, &request, &self.config);
        let timeout = Duration::from_millis(envelope.custom_timeout);
        let timeout_body = self
            .config
            .messages
            .timeout_body(envelope.custom_timeout as f64 / 1000.0);
        let coordinator = Coordinator::new(sink, stderr_handler, timeout, timeout_body);

        let mut code = request
            .code
            .clone()
            .unwrap_or_else(|| self.service.code.clone());

        if let Some(transpiler) = self.transpilers.get(self.service.language) {
            match transpile::transpile_with_cache(transpiler.as_ref(), self.cache.as_ref(), &code)
            {
                Ok(compiled) => code = compiled,
                Err(err) => {
                    tracing::warn!(language = %self.service.language, error = %err, "transpile failed");
                    return coordinator.fail(&err.to_string(), false);
                }
            }
        }

        let argv = match argv::generate(&self.service, &code, &envelope, self.config.argv_limit) {
            Ok(argv) => argv,
            Err(err) => {
                tracing::warn!(language = %self.service.language, error = %err, "argv generation failed");
                return coordinator.fail(&err.to_string(), false);
            }
        };

        let binary = spawn::resolve_binary(&self.config.binaries_root, self.service.language);
        let child = match spawn::spawn(&binary, &argv) {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(binary = %binary.display(), error = %err, "executor spawn failed");
                return coordinator.fail(&err.to_string(), true);
            }
        };

        tracing::debug!(
            language = %self.service.language,
            binary = %binary.display(),
            timeout_ms = envelope.custom_timeout,
            "executor spawned"
        );
        coordinator.run(child, body).await
    }
}

/// Fold recognized per-service `config` overrides into the handler-wide
/// runner configuration.
fn apply_service_overrides(mut config: RunnerConfig, service: &ServiceConfig) -> RunnerConfig {
    if let Some(timeout) = service
        .config
        .get("SERVICE_MAX_TIMEOUT")
        .and_then(serde_json::Value::as_u64)
    {
        config.service_max_timeout = Duration::from_millis(timeout);
    }
    if let Some(root) = service
        .config
        .get("binariesRoot")
        .and_then(serde_json::Value::as_str)
    {
        config.binaries_root = root.into();
    }
    config
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::runner::lifecycle::RESPONSE_ENDED;
    use crate::runner::stderr::LogStderr;

    #[derive(Default)]
    struct SinkState {
        body: Vec<u8>,
        ends: usize,
    }

    #[derive(Clone, Default)]
    struct TestSink(Arc<Mutex<SinkState>>);

    impl TestSink {
        fn body_string(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("sink lock").body).into_owned()
        }
        fn ends(&self) -> usize {
            self.0.lock().expect("sink lock").ends
        }
    }

    impl ResponseSink for TestSink {
        fn write(&mut self, chunk: Bytes) {
            self.0.lock().expect("sink lock").body.extend_from_slice(&chunk);
        }
        fn set_header(&mut self, _name: &str, _value: &str) {}
        fn end(&mut self) {
            self.0.lock().expect("sink lock").ends += 1;
        }
        fn finished(&self) -> bool {
            self.0.lock().expect("sink lock").ends > 0
        }
    }

    /// Write a `bash` executor into `root` that hands the code argument to
    /// the real shell, passing the envelope JSON along as `$1`.
    fn install_bash_executor(root: &Path) {
        let path = root.join("bash");
        let mut file = std::fs::File::create(&path).expect("create executor");
        writeln!(file, "#!/bin/bash").expect("write shebang");
        writeln!(file, r#"exec /bin/bash -c "$2" bash "$4""#).expect("write body");
        drop(file);
        let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
    }

    fn bash_handler(code: &str, root: PathBuf) -> ServiceHandler {
        let spec = ServiceSpec {
            code: Some(code.to_string()),
            language: Some("bash".to_string()),
            ..ServiceSpec::default()
        };
        let config = RunnerConfig {
            binaries_root: root,
            ..RunnerConfig::default()
        };
        ServiceHandler::new(spec, config).expect("build handler")
    }

    #[tokio::test]
    async fn bash_service_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_bash_executor(dir.path());
        let handler = bash_handler(r#"echo "hello world""#, dir.path().to_path_buf());

        let sink = TestSink::default();
        let completion = handler
            .execute(
                ServiceRequest::default(),
                sink.clone(),
                Box::new(LogStderr::default()),
            )
            .await;

        assert_eq!(sink.body_string(), "hello world\n");
        assert_eq!(sink.ends(), 1);
        assert_eq!(completion.outcome, RESPONSE_ENDED);
    }

    #[tokio::test]
    async fn per_request_code_override_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_bash_executor(dir.path());
        let handler = bash_handler("echo base", dir.path().to_path_buf());

        let sink = TestSink::default();
        handler
            .execute(
                ServiceRequest {
                    code: Some("echo override".to_string()),
                    ..ServiceRequest::default()
                },
                sink.clone(),
                Box::new(LogStderr::default()),
            )
            .await;

        assert_eq!(sink.body_string(), "override\n");
    }

    #[tokio::test]
    async fn missing_executor_surfaces_the_spawn_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        // No executor installed.
        let handler = bash_handler("echo hi", dir.path().to_path_buf());

        let sink = TestSink::default();
        let completion = handler
            .execute(
                ServiceRequest::default(),
                sink.clone(),
                Box::new(LogStderr::default()),
            )
            .await;

        assert!(sink.body_string().contains("Failed to spawn executor"));
        assert_eq!(sink.ends(), 1);
        assert!(completion.status.vm_error);
        assert!(completion.status.ended);
    }

    struct CountingTranspiler {
        calls: AtomicUsize,
    }

    impl Transpiler for CountingTranspiler {
        fn compile(&self, source: &str) -> Result<String, RunnerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo transpiled; {source}"))
        }
    }

    #[tokio::test]
    async fn transpile_error_surfaces_to_the_client() {
        struct Failing;
        impl Transpiler for Failing {
            fn compile(&self, _source: &str) -> Result<String, RunnerError> {
                Err(RunnerError::Transpile("unexpected token".to_string()))
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let spec = ServiceSpec {
            code: Some("x = 1".to_string()),
            language: Some("coffee-script".to_string()),
            ..ServiceSpec::default()
        };
        let config = RunnerConfig {
            binaries_root: dir.path().to_path_buf(),
            ..RunnerConfig::default()
        };
        let mut handler = ServiceHandler::new(spec, config).expect("build handler");
        handler.register_transpiler(Language::CoffeeScript, Arc::new(Failing));

        let sink = TestSink::default();
        let completion = handler
            .execute(
                ServiceRequest::default(),
                sink.clone(),
                Box::new(LogStderr::default()),
            )
            .await;

        assert!(sink.body_string().contains("unexpected token"));
        assert_eq!(sink.ends(), 1);
        assert!(!completion.status.vm_error);
    }

    #[tokio::test]
    async fn argv_over_limit_surfaces_before_spawn() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_bash_executor(dir.path());
        let spec = ServiceSpec {
            code: Some("echo hi".to_string()),
            language: Some("bash".to_string()),
            ..ServiceSpec::default()
        };
        let config = RunnerConfig {
            binaries_root: dir.path().to_path_buf(),
            argv_limit: 64,
            ..RunnerConfig::default()
        };
        let handler = ServiceHandler::new(spec, config).expect("build handler");

        let sink = TestSink::default();
        handler
            .execute(
                ServiceRequest::default(),
                sink.clone(),
                Box::new(LogStderr::default()),
            )
            .await;

        assert!(sink.body_string().contains("Argument list too large"));
        assert_eq!(sink.ends(), 1);
    }

    #[tokio::test]
    async fn service_config_override_shrinks_the_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_bash_executor(dir.path());
        let spec = ServiceSpec {
            code: Some("sleep 30".to_string()),
            language: Some("bash".to_string()),
            config: Some(
                json!({"SERVICE_MAX_TIMEOUT": 150})
                    .as_object()
                    .cloned()
                    .expect("map"),
            ),
            ..ServiceSpec::default()
        };
        let config = RunnerConfig {
            binaries_root: dir.path().to_path_buf(),
            ..RunnerConfig::default()
        };
        let handler = ServiceHandler::new(spec, config).expect("build handler");

        let started = std::time::Instant::now();
        let sink = TestSink::default();
        handler
            .execute(
                ServiceRequest::default(),
                sink.clone(),
                Box::new(LogStderr::default()),
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(sink.body_string().contains("seconds"));
    }

    #[tokio::test]
    async fn transpiler_runs_once_across_requests() {
        let dir = tempfile::tempdir().expect("tempdir");
        // coffee-script rides the shared `javascript` executor; this stub
        // prints the code argument it was handed.
        let path = dir.path().join("javascript");
        let mut file = std::fs::File::create(&path).expect("create executor");
        writeln!(file, "#!/bin/bash").expect("write shebang");
        writeln!(file, r#"printf '%s' "$2""#).expect("write body");
        drop(file);
        let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");

        let spec = ServiceSpec {
            code: Some("square = (x) -> x * x".to_string()),
            language: Some("coffee-script".to_string()),
            ..ServiceSpec::default()
        };
        let config = RunnerConfig {
            binaries_root: dir.path().to_path_buf(),
            ..RunnerConfig::default()
        };
        let mut handler = ServiceHandler::new(spec, config).expect("build handler");
        let transpiler = Arc::new(CountingTranspiler {
            calls: AtomicUsize::new(0),
        });
        let dyn_transpiler: Arc<dyn Transpiler> = Arc::clone(&transpiler) as Arc<dyn Transpiler>;
        handler.register_transpiler(Language::CoffeeScript, dyn_transpiler);

        let first = TestSink::default();
        handler
            .execute(
                ServiceRequest::default(),
                first.clone(),
                Box::new(LogStderr::default()),
            )
            .await;
        let second = TestSink::default();
        handler
            .execute(
                ServiceRequest::default(),
                second.clone(),
                Box::new(LogStderr::default()),
            )
            .await;

        assert_eq!(first.body_string(), second.body_string());
        assert!(first.body_string().starts_with("echo transpiled;"));
        assert_eq!(transpiler.calls.load(Ordering::SeqCst), 1);
    }
}
