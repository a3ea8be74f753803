use serde::{Deserialize, Serialize};

/// How a call to [`HeapSizeAdvisor::maybe_adjust_heap`](crate::HeapSizeAdvisor::maybe_adjust_heap)
/// concluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdjustmentOutcome {
    /// Test/throwaway environment; nothing was read or written.
    Ephemeral,
    /// The adjustment already ran for this installation.
    AlreadyAdjusted,
    /// The current `-Xmx` could not be determined; retried on a later start.
    UnknownCurrentHeap,
    /// The user already configured a heap above the default.
    AlreadyLarge { current_xmx_mb: u64 },
    /// The suggestion would undercut `-Xms` (or `-Xms` is unknown); nothing was written.
    InvalidTarget {
        current_xms_mb: Option<u64>,
        suggested_xmx_mb: u64,
    },
    Adjusted {
        physical_memory_mb: u64,
        previous_xmx_mb: u64,
        new_xmx_mb: u64,
    },
    /// The write was attempted and failed; not retried.
    WriteFailed { suggested_xmx_mb: u64, error: String },
}

impl AdjustmentOutcome {
    /// Whether the adjustment flag is set once this outcome is reached.
    ///
    /// Only [`AdjustmentOutcome::UnknownCurrentHeap`] is transient; [`AdjustmentOutcome::Ephemeral`]
    /// never touches the flag at all.
    pub fn gate_set(&self) -> bool {
        !matches!(
            self,
            AdjustmentOutcome::Ephemeral | AdjustmentOutcome::UnknownCurrentHeap
        )
    }
}
