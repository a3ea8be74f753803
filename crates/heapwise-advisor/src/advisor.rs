use std::fmt;
use std::sync::Arc;

use heapwise_memory::bytes_to_mb;
use parking_lot::Mutex;

use crate::outcome::AdjustmentOutcome;
use crate::policy::{PolicyLimits, SuggestionPolicy};
use crate::probe::PhysicalMemoryProbe;
use crate::properties::PropertiesStore;
use crate::registry::PolicyRegistry;
use crate::vm_options::{read_effective, MemoryKind, VmOptions};

/// Property recording that the one-shot heap adjustment has concluded.
pub const MEMORY_ADJUSTED_KEY: &str = "ide.memory.adjusted";

// Several advisors (one per opened project) may race on the same installation-wide flag.
static GATE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Raises `-Xmx` once per installation based on physical memory.
#[derive(Clone)]
pub struct HeapSizeAdvisor {
    vm_options: Arc<dyn VmOptions>,
    probe: Arc<dyn PhysicalMemoryProbe>,
    properties: Arc<dyn PropertiesStore>,
    policy: Arc<dyn SuggestionPolicy>,
    limits: PolicyLimits,
    gate_key: String,
    ephemeral: bool,
}

impl fmt::Debug for HeapSizeAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapSizeAdvisor")
            .field("limits", &self.limits)
            .field("gate_key", &self.gate_key)
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

impl HeapSizeAdvisor {
    pub fn new(
        vm_options: Arc<dyn VmOptions>,
        probe: Arc<dyn PhysicalMemoryProbe>,
        properties: Arc<dyn PropertiesStore>,
    ) -> Self {
        let registry = PolicyRegistry::default();
        Self {
            vm_options,
            probe,
            properties,
            policy: registry.active(),
            limits: registry.limits(),
            gate_key: MEMORY_ADJUSTED_KEY.to_owned(),
            ephemeral: false,
        }
    }

    /// Use the registry's active policy and its limits.
    pub fn with_registry(mut self, registry: &PolicyRegistry) -> Self {
        self.policy = registry.active();
        self.limits = registry.limits();
        self
    }

    /// Replace the policy while keeping the current limits.
    pub fn with_policy(mut self, policy: Arc<dyn SuggestionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_gate_key(mut self, key: impl Into<String>) -> Self {
        self.gate_key = key.into();
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    pub fn limits(&self) -> PolicyLimits {
        self.limits
    }

    /// Run the one-shot adjustment unless it already concluded for this installation.
    ///
    /// Never fails: every problem is logged and reflected in the returned outcome. The flag is
    /// left unset only in ephemeral mode and when the current `-Xmx` is unknown, so the latter is
    /// retried on the next start.
    pub fn maybe_adjust_heap(&self) -> AdjustmentOutcome {
        if self.ephemeral {
            tracing::debug!(target: "heapwise.advisor", "ephemeral mode, heap size adjustment skipped");
            return AdjustmentOutcome::Ephemeral;
        }

        let _gate = GATE_LOCK.lock();
        if self.properties.is_true_value(&self.gate_key) {
            return AdjustmentOutcome::AlreadyAdjusted;
        }

        let outcome = self.adjust();
        if outcome.gate_set() {
            self.properties.set_value(&self.gate_key, true);
        }
        outcome
    }

    fn adjust(&self) -> AdjustmentOutcome {
        let vm_options = self.vm_options.as_ref();

        let Some(current_xmx_mb) = read_effective(vm_options, MemoryKind::Heap) else {
            let location = vm_options
                .location()
                .map(|path| path.display().to_string());
            tracing::info!(
                target: "heapwise.advisor",
                vm_options_file = location.as_deref().unwrap_or("<unknown>"),
                "heap size adjustment skipped: unable to determine current -Xmx"
            );
            return AdjustmentOutcome::UnknownCurrentHeap;
        };

        if current_xmx_mb > self.limits.default_xmx_mb() {
            tracing::debug!(
                target: "heapwise.advisor",
                current_xmx_mb,
                default_xmx_mb = self.limits.default_xmx_mb(),
                "-Xmx already raised above the default, leaving it alone"
            );
            return AdjustmentOutcome::AlreadyLarge { current_xmx_mb };
        }

        let physical_memory_mb = bytes_to_mb(self.probe.total_physical_memory_bytes());
        let suggested_xmx_mb = self.policy.suggest(physical_memory_mb);
        let current_xms_mb = read_effective(vm_options, MemoryKind::MinHeap);

        let fits_min_heap = current_xms_mb.is_some_and(|xms| suggested_xmx_mb >= xms);
        if !fits_min_heap {
            tracing::info!(
                target: "heapwise.advisor",
                current_xms_mb = ?current_xms_mb,
                suggested_xmx_mb,
                "heap size adjustment skipped: suggested -Xmx would be invalid with the configured -Xms"
            );
            return AdjustmentOutcome::InvalidTarget {
                current_xms_mb,
                suggested_xmx_mb,
            };
        }

        match vm_options.set_option(MemoryKind::Heap, suggested_xmx_mb) {
            Ok(()) => {
                tracing::info!(
                    target: "heapwise.advisor",
                    physical_memory_mb,
                    current_xms_mb = ?current_xms_mb,
                    "-Xmx adjusted from {current_xmx_mb}M to {suggested_xmx_mb}M"
                );
                AdjustmentOutcome::Adjusted {
                    physical_memory_mb,
                    previous_xmx_mb: current_xmx_mb,
                    new_xmx_mb: suggested_xmx_mb,
                }
            }
            Err(err) => {
                tracing::warn!(
                    target: "heapwise.advisor",
                    error = %err,
                    suggested_xmx_mb,
                    "failed to write adjusted -Xmx"
                );
                AdjustmentOutcome::WriteFailed {
                    suggested_xmx_mb,
                    error: err.to_string(),
                }
            }
        }
    }
}
