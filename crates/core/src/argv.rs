//! Executor argv generation.
//!
//! Executors receive the service code and the serialized envelope on their
//! command line. The node family additionally receives the serialized
//! service (`-s`). Serialized envelopes can grow large, so the total size is
//! checked against the platform limit and oversized argv fails loudly,
//! never truncates.

use crate::envelope::RequestEnvelope;
use crate::error::RunnerError;
use crate::service::ServiceConfig;

/// Generate the argv for one invocation. `code` is the effective source
/// after any per-request override and transpilation.
pub fn generate(
    service: &ServiceConfig,
    code: &str,
    envelope: &RequestEnvelope,
    limit: usize,
) -> Result<Vec<String>, RunnerError> {
    let env_json = serde_json::to_string(envelope).map_err(|err| {
        RunnerError::Configuration(format!("request envelope is not serializable: {err}"))
    })?;

    let mut argv = vec![
        "-c".to_string(),
        code.to_string(),
        "-e".to_string(),
        env_json,
    ];

    if service.language.uses_default_argv() {
        let resource_json = serde_json::to_string(&envelope.resource).map_err(|err| {
            RunnerError::Configuration(format!("service resource is not serializable: {err}"))
        })?;
        argv.push("-s".to_string());
        argv.push(resource_json);
    }

    // The kernel counts each argument plus its terminating NUL.
    let size: usize = argv.iter().map(|arg| arg.len() + 1).sum();
    if size > limit {
        return Err(RunnerError::ArgvTooLarge { size, limit });
    }

    Ok(argv)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use crate::envelope::{assemble, ServiceRequest};
    use crate::service::ServiceSpec;

    fn service(language: &str) -> ServiceConfig {
        ServiceConfig::from_spec(ServiceSpec {
            code: Some("echo hi".to_string()),
            language: Some(language.to_string()),
            ..ServiceSpec::default()
        })
        .expect("normalize")
    }

    fn envelope_for(service: &ServiceConfig) -> RequestEnvelope {
        assemble(service, &ServiceRequest::default(), &RunnerConfig::default())
    }

    #[test]
    fn default_shape_includes_the_serialized_service() {
        let service = service("javascript");
        let envelope = envelope_for(&service);
        let argv = generate(&service, &service.code, &envelope, 1 << 20).expect("generate");

        assert_eq!(argv.len(), 6);
        assert_eq!(argv[0], "-c");
        assert_eq!(argv[1], "echo hi");
        assert_eq!(argv[2], "-e");
        assert_eq!(argv[4], "-s");
        let resource: serde_json::Value = serde_json::from_str(&argv[5]).expect("valid JSON");
        assert_eq!(resource["language"], "javascript");
    }

    #[test]
    fn reduced_shape_for_languages_with_dedicated_generators() {
        for tag in ["bash", "lua", "perl", "scheme", "smalltalk", "tcl"] {
            let service = service(tag);
            let envelope = envelope_for(&service);
            let argv = generate(&service, &service.code, &envelope, 1 << 20).expect("generate");
            assert_eq!(argv.len(), 4, "language {tag} takes the reduced shape");
            assert_eq!(argv[0], "-c");
            assert_eq!(argv[2], "-e");
        }
    }

    #[test]
    fn envelope_argument_is_valid_json() {
        let service = service("bash");
        let envelope = envelope_for(&service);
        let argv = generate(&service, &service.code, &envelope, 1 << 20).expect("generate");
        let env: serde_json::Value = serde_json::from_str(&argv[3]).expect("valid JSON");
        assert!(env.get("input").is_some());
    }

    #[test]
    fn oversized_argv_is_rejected_not_truncated() {
        let service = service("bash");
        let envelope = envelope_for(&service);
        let big_code = "x".repeat(4096);

        let result = generate(&service, &big_code, &envelope, 1024);
        match result {
            Err(RunnerError::ArgvTooLarge { size, limit }) => {
                assert!(size > limit);
                assert_eq!(limit, 1024);
            }
            other => panic!("expected ArgvTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn code_override_is_what_ships() {
        let service = service("bash");
        let envelope = envelope_for(&service);
        let argv =
            generate(&service, "echo override", &envelope, 1 << 20).expect("generate");
        assert_eq!(argv[1], "echo override");
    }
}
