use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Combined diagnostics produced while loading and validating a Heapwise config.
///
/// Callers always get a `HeapwiseConfig` when deserialization succeeds, plus whatever was found
/// wrong with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDiagnostics {
    /// Keys present in the input TOML that the schema does not know, as dotted paths
    /// (`policy.default_xmx`).
    pub unknown_keys: Vec<String>,
    /// Non-fatal issues; the config still works but probably not as intended.
    pub warnings: Vec<ConfigWarning>,
    /// Fatal semantic validation failures.
    pub errors: Vec<ConfigValidationError>,
}

impl ConfigDiagnostics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unknown_keys.is_empty() && self.warnings.is_empty() && self.errors.is_empty()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn extend_validation(&mut self, validation: ValidationDiagnostics) {
        self.warnings.extend(validation.warnings);
        self.errors.extend(validation.errors);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDiagnostics {
    pub warnings: Vec<ConfigWarning>,
    pub errors: Vec<ConfigValidationError>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigWarning {
    #[error("{toml_path}: {message}")]
    InvalidValue { toml_path: String, message: String },
    #[error(
        "policy.legacy_default_mb ({legacy_default_mb}) exceeds policy.default_xmx_mb \
         ({default_xmx_mb}); low-memory suggestions will be capped by physical memory only"
    )]
    LegacyDefaultAboveDefault {
        legacy_default_mb: u64,
        default_xmx_mb: u64,
    },
    #[error("logging.level {value:?} is not a valid filter (normalized to {normalized:?})")]
    LoggingLevelInvalid { value: String, normalized: String },
    #[error("logging.file directory {} does not exist", .resolved.display())]
    LoggingFileDirMissing { resolved: PathBuf },
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigValidationError {
    #[error("{toml_path}: {message}")]
    InvalidValue { toml_path: String, message: String },
    #[error(
        "policy.maximum_suggested_xmx_mb ({maximum_suggested_xmx_mb}) must be at least twice \
         policy.default_xmx_mb ({default_xmx_mb})"
    )]
    PolicyInvariant {
        default_xmx_mb: u64,
        maximum_suggested_xmx_mb: u64,
    },
}

pub(crate) fn deserialize_toml_with_unknown_keys<T: DeserializeOwned>(
    text: &str,
) -> Result<(T, Vec<String>), toml::de::Error> {
    let mut unknown = Vec::<String>::new();
    let deserializer = toml::de::Deserializer::new(text);
    let value = serde_ignored::deserialize(deserializer, |path| {
        unknown.push(normalize_serde_ignored_path(path));
    })?;
    unknown.sort();
    unknown.dedup();
    Ok((value, unknown))
}

fn normalize_serde_ignored_path(path: serde_ignored::Path) -> String {
    // `serde_ignored::Path` renders root paths with a leading `.`.
    path.to_string().trim_start_matches('.').to_owned()
}
