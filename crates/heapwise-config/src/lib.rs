use schemars::r#gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, OnceLock};

use heapwise_advisor::{
    HeapSizeAdvisor, PolicyError, PolicyLimits, PolicyRegistry, PropertiesStore,
    SystemMemoryProbe, VmOptions, DEFAULT_XMX_MB, LEGACY_DEFAULT_XMX_MB, MAXIMUM_SUGGESTED_XMX_MB,
    MEMORY_ADJUSTED_KEY,
};
use parking_lot::{Mutex, MutexGuard, ReentrantMutex};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

mod diagnostics;
mod schema;
mod validation;

pub use diagnostics::{
    ConfigDiagnostics, ConfigValidationError, ConfigWarning, ValidationDiagnostics,
};
pub use schema::json_schema;
pub use validation::ConfigValidationContext;

/// A byte size which supports both raw byte counts and human-friendly suffixes (`"16GiB"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bytes(u64),
            Human(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bytes(value) => Ok(ByteSize(value)),
            Repr::Human(value) => heapwise_memory::parse_byte_size(&value)
                .map(ByteSize)
                .map_err(serde::de::Error::custom),
        }
    }
}

impl JsonSchema for ByteSize {
    fn schema_name() -> String {
        "ByteSize".to_owned()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        let mut schema = SchemaObject::default();
        schema.subschemas().any_of = Some(vec![
            <u64 as JsonSchema>::json_schema(generator),
            <String as JsonSchema>::json_schema(generator),
        ]);
        schema.into()
    }
}

/// Environment variable forcing ephemeral mode (tests, throwaway sandboxes).
pub const HEAPWISE_EPHEMERAL_ENV_VAR: &str = "HEAPWISE_EPHEMERAL";

/// Settings for the one-shot heap adjustment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct AdvisorConfig {
    /// Skip the adjustment entirely without touching the adjustment flag.
    #[serde(default)]
    pub ephemeral: bool,

    /// Property key recording that the adjustment has concluded for this installation.
    #[serde(default = "AdvisorConfig::default_gate_key")]
    #[schemars(length(min = 1))]
    pub gate_key: String,
}

impl AdvisorConfig {
    fn default_gate_key() -> String {
        MEMORY_ADJUSTED_KEY.to_owned()
    }

    /// `ephemeral`, or a truthy `HEAPWISE_EPHEMERAL` (`1`, `true`, `yes`).
    pub fn is_ephemeral(&self) -> bool {
        if self.ephemeral {
            return true;
        }
        std::env::var(HEAPWISE_EPHEMERAL_ENV_VAR)
            .map(|value| {
                let value = value.trim();
                value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
            })
            .unwrap_or(false)
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            ephemeral: false,
            gate_key: Self::default_gate_key(),
        }
    }
}

/// Bounds for the built-in heap suggestion policy (all values in MB).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Heap size the product ships with; configured heaps above this are left alone.
    #[serde(default = "PolicyConfig::default_xmx_mb")]
    #[schemars(range(min = 1))]
    pub default_xmx_mb: u64,

    /// Upper bound for suggestions. Must be at least twice `default_xmx_mb`.
    #[serde(default = "PolicyConfig::maximum_suggested_xmx_mb")]
    pub maximum_suggested_xmx_mb: u64,

    /// Ceiling for machines with less memory than `default_xmx_mb`.
    #[serde(default = "PolicyConfig::legacy_default_mb")]
    pub legacy_default_mb: u64,
}

impl PolicyConfig {
    fn default_xmx_mb() -> u64 {
        DEFAULT_XMX_MB
    }

    fn maximum_suggested_xmx_mb() -> u64 {
        MAXIMUM_SUGGESTED_XMX_MB
    }

    fn legacy_default_mb() -> u64 {
        LEGACY_DEFAULT_XMX_MB
    }

    pub fn limits(&self) -> Result<PolicyLimits, PolicyError> {
        PolicyLimits::new(
            self.default_xmx_mb,
            self.maximum_suggested_xmx_mb,
            self.legacy_default_mb,
        )
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_xmx_mb: Self::default_xmx_mb(),
            maximum_suggested_xmx_mb: Self::maximum_suggested_xmx_mb(),
            legacy_default_mb: Self::legacy_default_mb(),
        }
    }
}

/// How physical memory is probed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Treat a cgroup (container) memory limit below physical RAM as the machine's total.
    #[serde(default = "MemoryConfig::default_respect_cgroup_limit")]
    pub respect_cgroup_limit: bool,

    /// Report this total instead of probing (bytes or a size such as `"16GiB"`).
    #[serde(default)]
    pub total_override: Option<ByteSize>,
}

impl MemoryConfig {
    fn default_respect_cgroup_limit() -> bool {
        true
    }

    pub fn probe(&self) -> SystemMemoryProbe {
        SystemMemoryProbe::new()
            .respect_cgroup_limit(self.respect_cgroup_limit)
            .with_override(self.total_override.map(|size| size.0))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            respect_cgroup_limit: Self::default_respect_cgroup_limit(),
            total_override: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level for all Heapwise crates, or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr (in addition to the in-memory buffer).
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path (in addition to the in-memory buffer).
    ///
    /// If the file cannot be opened, file logging is disabled while other sinks
    /// remain active.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub file: Option<PathBuf>,

    /// Number of log lines kept in memory.
    #[serde(default = "LoggingConfig::default_buffer_lines")]
    #[schemars(range(min = 1))]
    pub buffer_lines: usize,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    fn default_buffer_lines() -> usize {
        2_000
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Create the effective `EnvFilter`.
    ///
    /// If `RUST_LOG` is set, it is merged into the configured directives.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
            buffer_lines: Self::default_buffer_lines(),
        }
    }
}

/// Top-level Heapwise configuration loaded from TOML.
///
/// ```toml
/// [advisor]
/// ephemeral = false
///
/// [policy]
/// default_xmx_mb = 2048
/// maximum_suggested_xmx_mb = 4096
///
/// [memory]
/// total_override = "16GiB"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct HeapwiseConfig {
    #[serde(default)]
    pub advisor: AdvisorConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    // `toml::de::Error`'s `Display` embeds a source snippet; keep only the message.
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

/// Why a config could not be turned into a [`HeapSizeAdvisor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvisorSetupError {
    #[error("invalid [policy] section: {0}")]
    Policy(#[from] PolicyError),
    #[error("advisor.gate_key must not be empty")]
    EmptyGateKey,
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_owned())
    }
}

impl HeapwiseConfig {
    /// Load a config file from TOML.
    ///
    /// A relative `logging.file` is resolved against the directory containing `path`.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_config(path)?;
        let mut config: Self = toml::from_str(&text)?;
        config.resolve_relative_paths(path.parent());
        Ok(config)
    }

    /// Load a config file from TOML and return diagnostics (unknown keys and semantic
    /// validation failures).
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let path = path.as_ref();
        let text = read_config(path)?;
        Self::load_from_str_with_diagnostics_inner(&text, path.parent())
    }

    /// Make a relative `logging.file` relative to `config_dir` instead of the working directory.
    pub fn resolve_relative_paths(&mut self, config_dir: Option<&Path>) {
        let Some(config_dir) = config_dir.filter(|dir| !dir.as_os_str().is_empty()) else {
            return;
        };
        if let Some(file) = self.logging.file.as_mut() {
            if file.is_relative() {
                *file = config_dir.join(&*file);
            }
        }
    }

    /// Load a config from a TOML string and return diagnostics.
    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        Self::load_from_str_with_diagnostics_inner(text, None)
    }

    fn load_from_str_with_diagnostics_inner(
        text: &str,
        config_dir: Option<&Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (mut config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<HeapwiseConfig>(text)?;
        config.resolve_relative_paths(config_dir);

        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.extend_validation(config.validate());

        Ok((config, diagnostics))
    }

    /// Policy registry seeded with the configured limits.
    ///
    /// Hosts register product-specific policies on the returned registry before handing it to
    /// [`HeapSizeAdvisor::with_registry`].
    pub fn policy_registry(&self) -> Result<PolicyRegistry, PolicyError> {
        Ok(PolicyRegistry::new(self.policy.limits()?))
    }

    /// Build an advisor wired to the system memory probe and configured policy.
    ///
    /// Fails on the same conditions [`HeapwiseConfig::validate`] reports as errors.
    pub fn build_advisor(
        &self,
        vm_options: Arc<dyn VmOptions>,
        properties: Arc<dyn PropertiesStore>,
    ) -> Result<HeapSizeAdvisor, AdvisorSetupError> {
        if self.advisor.gate_key.trim().is_empty() {
            return Err(AdvisorSetupError::EmptyGateKey);
        }
        let registry = self.policy_registry()?;
        Ok(
            HeapSizeAdvisor::new(vm_options, Arc::new(self.memory.probe()), properties)
                .with_registry(&registry)
                .with_gate_key(self.advisor.gate_key.clone())
                .ephemeral(self.advisor.is_ephemeral()),
        )
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub const HEAPWISE_CONFIG_ENV_VAR: &str = "HEAPWISE_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Environment variables are process-global; tests that set [`HEAPWISE_CONFIG_ENV_VAR`] or
/// [`HEAPWISE_EPHEMERAL_ENV_VAR`] wrap the mutation and the lookup in this helper.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the Heapwise configuration file in `config_dir`.
///
/// Search order:
/// 1) `HEAPWISE_CONFIG_PATH` (absolute or relative to `config_dir`)
/// 2) `heapwise.toml`
/// 3) `.heapwise.toml`
pub fn discover_config_path(config_dir: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(HEAPWISE_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            config_dir.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["heapwise.toml", ".heapwise.toml"]
        .into_iter()
        .map(|name| config_dir.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for `config_dir`.
///
/// If no config is present, returns [`HeapwiseConfig::default`] and `None`.
pub fn load_from_dir(config_dir: &Path) -> Result<(HeapwiseConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(config_dir) else {
        return Ok((HeapwiseConfig::default(), None));
    };

    let config = HeapwiseConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}

/// Like [`load_from_dir`] but with diagnostics.
pub fn load_from_dir_with_diagnostics(
    config_dir: &Path,
) -> Result<(HeapwiseConfig, Option<PathBuf>, ConfigDiagnostics), ConfigError> {
    let Some(path) = discover_config_path(config_dir) else {
        return Ok((HeapwiseConfig::default(), None, ConfigDiagnostics::default()));
    };

    let (config, diagnostics) = HeapwiseConfig::load_from_path_with_diagnostics(&path)?;
    Ok((config, Some(path), diagnostics))
}

/// Ring buffer of formatted log lines.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(8_192))),
        }
    }

    pub fn push_line(&self, line: String) {
        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(line);
    }

    pub fn last_lines(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock();
        inner.iter().rev().take(n).cloned().rev().collect()
    }
}

struct LogBufferMakeWriter {
    buffer: Arc<LogBuffer>,
}

impl<'a> MakeWriter<'a> for LogBufferMakeWriter {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.buffer.clone(),
            bytes: Vec::new(),
        }
    }
}

struct LogBufferWriter {
    buffer: Arc<LogBuffer>,
    bytes: Vec<u8>,
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogBufferWriter {
    fn drop(&mut self) {
        if self.bytes.is_empty() {
            return;
        }

        let text = String::from_utf8_lossy(&self.bytes);
        for line in text.split_terminator('\n') {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.buffer.push_line(line.to_owned());
            }
        }
    }
}

struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            guard: self.file.lock(),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: MutexGuard<'a, std::fs::File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();
static GLOBAL_LOG_BUFFER: OnceLock<Arc<LogBuffer>> = OnceLock::new();

/// Initializes structured `tracing` logging.
///
/// Safe to call multiple times; only the first call installs a global subscriber. Subsequent
/// calls return the global in-memory log buffer.
pub fn init_tracing(logging: &LoggingConfig) -> Arc<LogBuffer> {
    let buffer = GLOBAL_LOG_BUFFER
        .get_or_init(|| Arc::new(LogBuffer::new(logging.buffer_lines)))
        .clone();

    TRACING_INIT.call_once(|| {
        let file_sink = logging.file.as_ref().map(|path| {
            (
                path,
                std::fs::OpenOptions::new().create(true).append(true).open(path),
            )
        });

        let mut make_writer = BoxMakeWriter::new(LogBufferMakeWriter {
            buffer: buffer.clone(),
        });
        if logging.stderr {
            // Test output capture only sees `eprint!`; `TestWriter` keeps unit tests quiet.
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(std::io::stderr));
            }
        }
        let mut file_error = None;
        match file_sink {
            Some((_, Ok(file))) => {
                let file = Arc::new(Mutex::new(file));
                make_writer = BoxMakeWriter::new(make_writer.and(MutexFileMakeWriter { file }));
            }
            Some((path, Err(err))) => file_error = Some((path, err)),
            None => {}
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry()
            .with(logging.env_filter())
            .with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            if let Some((path, err)) = file_error {
                tracing::warn!(
                    target: "heapwise.config",
                    path = %path.display(),
                    error = %err,
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });

    buffer
}
