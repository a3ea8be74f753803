use std::path::Path;

use heapwise_advisor::PolicyError;

use crate::diagnostics::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};
use crate::{HeapwiseConfig, LoggingConfig};

/// Context for semantic config validation.
///
/// Relative paths in the config (currently only `logging.file`) are checked against
/// `config_dir`. Configs returned by the loaders already carry resolved paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigValidationContext<'a> {
    pub config_dir: Option<&'a Path>,
}

impl HeapwiseConfig {
    /// Validate semantic invariants for a configuration.
    ///
    /// Reports as many problems as possible in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        self.validate_with_context(ConfigValidationContext::default())
    }

    #[must_use]
    pub fn validate_with_context(&self, ctx: ConfigValidationContext<'_>) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_policy(self, &mut out);
        validate_advisor(self, &mut out);
        validate_memory(self, &mut out);
        validate_logging(self, ctx, &mut out);

        out
    }
}

fn validate_policy(config: &HeapwiseConfig, out: &mut ValidationDiagnostics) {
    let policy = &config.policy;
    match policy.limits() {
        Ok(_) => {}
        Err(PolicyError::ZeroDefault) => out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "policy.default_xmx_mb".to_owned(),
            message: "must be >= 1".to_owned(),
        }),
        Err(PolicyError::InvariantViolation {
            default_xmx_mb,
            maximum_suggested_xmx_mb,
        }) => out.errors.push(ConfigValidationError::PolicyInvariant {
            default_xmx_mb,
            maximum_suggested_xmx_mb,
        }),
    }

    if policy.default_xmx_mb > 0 && policy.legacy_default_mb > policy.default_xmx_mb {
        out.warnings.push(ConfigWarning::LegacyDefaultAboveDefault {
            legacy_default_mb: policy.legacy_default_mb,
            default_xmx_mb: policy.default_xmx_mb,
        });
    }
}

fn validate_advisor(config: &HeapwiseConfig, out: &mut ValidationDiagnostics) {
    if config.advisor.gate_key.trim().is_empty() {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "advisor.gate_key".to_owned(),
            message: "must not be empty".to_owned(),
        });
    }
}

fn validate_memory(config: &HeapwiseConfig, out: &mut ValidationDiagnostics) {
    if matches!(config.memory.total_override, Some(size) if size.0 == 0) {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "memory.total_override".to_owned(),
            message: "0 means \"unknown\"; suggestions will fall back to the smallest heap"
                .to_owned(),
        });
    }
}

fn validate_logging(
    config: &HeapwiseConfig,
    ctx: ConfigValidationContext<'_>,
    out: &mut ValidationDiagnostics,
) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }

    if config.logging.buffer_lines == 0 {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "logging.buffer_lines".to_owned(),
            message: "must be >= 1; a single line will be kept".to_owned(),
        });
    }

    let Some(file) = config.logging.file.as_deref() else {
        return;
    };
    let resolved = match ctx.config_dir {
        Some(config_dir) if file.is_relative() => config_dir.join(file),
        _ => file.to_path_buf(),
    };
    if let Some(parent) = resolved.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            out.warnings.push(ConfigWarning::LoggingFileDirMissing {
                resolved: parent.to_path_buf(),
            });
        }
    }
}
