use std::sync::Arc;

use heapwise_advisor::{
    AdjustmentOutcome, InMemoryProperties, MemoryKind, PhysicalMemoryProbe, SuggestionPolicy,
    VmOptions, VmOptionsError, MEMORY_ADJUSTED_KEY,
};
use heapwise_config::{
    with_config_env_lock, AdvisorSetupError, ByteSize, ConfigError, HeapwiseConfig,
    HEAPWISE_EPHEMERAL_ENV_VAR,
};
use heapwise_memory::GB;

#[test]
fn empty_file_yields_defaults() {
    let config: HeapwiseConfig = toml::from_str("").unwrap();
    assert_eq!(config, HeapwiseConfig::default());
    assert_eq!(config.advisor.gate_key, MEMORY_ADJUSTED_KEY);
    assert_eq!(config.policy.default_xmx_mb, 2048);
    assert_eq!(config.policy.maximum_suggested_xmx_mb, 4096);
    assert_eq!(config.policy.legacy_default_mb, 750);
    assert!(config.memory.respect_cgroup_limit);
    assert_eq!(config.memory.total_override, None);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn total_override_accepts_bytes_and_human_sizes() {
    let config: HeapwiseConfig = toml::from_str("[memory]\ntotal_override = \"16GiB\"\n").unwrap();
    assert_eq!(config.memory.total_override, Some(ByteSize(16 * GB)));

    let config: HeapwiseConfig = toml::from_str("[memory]\ntotal_override = 1024\n").unwrap();
    assert_eq!(config.memory.total_override, Some(ByteSize(1024)));
}

#[test]
fn bad_byte_size_is_a_parse_error() {
    let err = toml::from_str::<HeapwiseConfig>("[memory]\ntotal_override = \"16 lightyears\"\n")
        .unwrap_err();
    assert!(err.to_string().contains("lightyears"), "{err}");
}

#[test]
fn load_from_path_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = HeapwiseConfig::load_from_path(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err:?}");
}

#[test]
fn load_from_path_reports_malformed_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heapwise.toml");
    std::fs::write(&path, "[policy\n").unwrap();

    let err = HeapwiseConfig::load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}

#[test]
fn diagnostics_collect_unknown_keys() {
    let text = r#"
[policy]
default_xmx = 1024

[advisor]
ephemeral = true
"#;
    let (config, diagnostics) = HeapwiseConfig::load_from_str_with_diagnostics(text).unwrap();
    assert!(config.advisor.ephemeral);
    assert_eq!(diagnostics.unknown_keys, vec!["policy.default_xmx".to_owned()]);
    assert!(diagnostics.is_ok());
}

#[test]
fn policy_limits_follow_config() {
    let config: HeapwiseConfig = toml::from_str(
        "[policy]\ndefault_xmx_mb = 1024\nmaximum_suggested_xmx_mb = 8192\nlegacy_default_mb = 512\n",
    )
    .unwrap();
    let limits = config.policy.limits().unwrap();
    assert_eq!(limits.default_xmx_mb(), 1024);
    assert_eq!(limits.maximum_suggested_xmx_mb(), 8192);
    assert_eq!(limits.legacy_default_mb(), 512);

    let registry = config.policy_registry().unwrap();
    assert_eq!(registry.limits(), limits);
    assert_eq!(registry.active().suggest(32_768), 4096);
}

#[test]
fn inconsistent_policy_cannot_build_a_registry() {
    let config: HeapwiseConfig =
        toml::from_str("[policy]\ndefault_xmx_mb = 4096\nmaximum_suggested_xmx_mb = 4096\n")
            .unwrap();
    assert!(config.policy_registry().is_err());
}

#[test]
fn memory_probe_honours_override() {
    let config: HeapwiseConfig =
        toml::from_str("[memory]\ntotal_override = \"8GiB\"\n").unwrap();
    assert_eq!(config.memory.probe().total_physical_memory_bytes(), 8 * GB);
}

#[test]
fn ephemeral_env_var_enables_ephemeral_mode() {
    with_config_env_lock(|| {
        let prev = std::env::var_os(HEAPWISE_EPHEMERAL_ENV_VAR);

        let config = HeapwiseConfig::default();
        std::env::remove_var(HEAPWISE_EPHEMERAL_ENV_VAR);
        assert!(!config.advisor.is_ephemeral());

        std::env::set_var(HEAPWISE_EPHEMERAL_ENV_VAR, "TRUE");
        assert!(config.advisor.is_ephemeral());

        std::env::set_var(HEAPWISE_EPHEMERAL_ENV_VAR, "0");
        assert!(!config.advisor.is_ephemeral());

        match prev {
            Some(value) => std::env::set_var(HEAPWISE_EPHEMERAL_ENV_VAR, value),
            None => std::env::remove_var(HEAPWISE_EPHEMERAL_ENV_VAR),
        }
    });
}

#[derive(Default)]
struct RecordingVmOptions {
    writes: parking_lot::Mutex<Vec<(MemoryKind, u64)>>,
}

impl VmOptions for RecordingVmOptions {
    fn read_option(&self, kind: MemoryKind, override_only: bool) -> Option<u64> {
        match (kind, override_only) {
            (MemoryKind::Heap, false) => Some(750),
            (MemoryKind::MinHeap, false) => Some(128),
            _ => None,
        }
    }

    fn set_option(&self, kind: MemoryKind, value_mb: u64) -> Result<(), VmOptionsError> {
        self.writes.lock().push((kind, value_mb));
        Ok(())
    }
}

#[test]
fn build_advisor_wires_probe_policy_and_gate_key() {
    let config: HeapwiseConfig = toml::from_str(
        r#"
[advisor]
gate_key = "test.memory.adjusted"

[memory]
total_override = "16GiB"
"#,
    )
    .unwrap();

    let vm_options = Arc::new(RecordingVmOptions::default());
    let properties = Arc::new(InMemoryProperties::new());

    let outcome = with_config_env_lock(|| {
        let prev = std::env::var_os(HEAPWISE_EPHEMERAL_ENV_VAR);
        std::env::remove_var(HEAPWISE_EPHEMERAL_ENV_VAR);
        let advisor = config
            .build_advisor(vm_options.clone(), properties.clone())
            .unwrap();
        if let Some(value) = prev {
            std::env::set_var(HEAPWISE_EPHEMERAL_ENV_VAR, value);
        }
        advisor.maybe_adjust_heap()
    });

    assert_eq!(
        outcome,
        AdjustmentOutcome::Adjusted {
            physical_memory_mb: 16_384,
            previous_xmx_mb: 750,
            new_xmx_mb: 2048,
        }
    );
    assert_eq!(*vm_options.writes.lock(), vec![(MemoryKind::Heap, 2048)]);
    assert_eq!(properties.get("test.memory.adjusted"), Some(true));
    assert_eq!(properties.get(MEMORY_ADJUSTED_KEY), None);
}

#[test]
fn build_advisor_rejects_blank_gate_key() {
    let config: HeapwiseConfig = toml::from_str("[advisor]\ngate_key = \" \"\n").unwrap();

    let err = config
        .build_advisor(
            Arc::new(RecordingVmOptions::default()),
            Arc::new(InMemoryProperties::new()),
        )
        .unwrap_err();
    assert_eq!(err, AdvisorSetupError::EmptyGateKey);
}

#[test]
fn build_advisor_rejects_inconsistent_policy() {
    let config: HeapwiseConfig = toml::from_str("[policy]\ndefault_xmx_mb = 3000\n").unwrap();

    let err = config
        .build_advisor(
            Arc::new(RecordingVmOptions::default()),
            Arc::new(InMemoryProperties::new()),
        )
        .unwrap_err();
    assert!(matches!(err, AdvisorSetupError::Policy(_)), "{err:?}");
}
