use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Heap-related VM options the advisor reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Maximum heap size (`-Xmx`).
    Heap,
    /// Minimum/initial heap size (`-Xms`).
    MinHeap,
}

impl MemoryKind {
    pub fn option_name(self) -> &'static str {
        match self {
            MemoryKind::Heap => "-Xmx",
            MemoryKind::MinHeap => "-Xms",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_name())
    }
}

#[derive(Debug, Error)]
pub enum VmOptionsError {
    #[error("failed to write VM options: {0}")]
    Io(#[from] io::Error),
    #[error("VM options at {location} are read-only")]
    ReadOnly { location: String },
    #[error("{kind} cannot be set to {value_mb}MB: {reason}")]
    Rejected {
        kind: MemoryKind,
        value_mb: u64,
        reason: String,
    },
}

/// Access to the VM options the host application is launched with.
///
/// Each option has two sources: the value shipped with the product and an explicit user
/// override. `override_only` selects which one is read. Sizes are in MB; `None` means the
/// option is absent or could not be determined.
pub trait VmOptions: Send + Sync {
    fn read_option(&self, kind: MemoryKind, override_only: bool) -> Option<u64>;

    fn set_option(&self, kind: MemoryKind, value_mb: u64) -> Result<(), VmOptionsError>;

    /// Where the options live, for log messages.
    fn location(&self) -> Option<PathBuf> {
        None
    }
}

/// The effective value of `kind`: the larger of the override and the shipped value.
///
/// `None` only when neither source knows the value, since `None` orders below every `Some`.
pub fn read_effective(vm_options: &dyn VmOptions, kind: MemoryKind) -> Option<u64> {
    let user = vm_options.read_option(kind, true);
    let shipped = vm_options.read_option(kind, false);
    user.max(shipped)
}
