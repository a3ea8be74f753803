//! One-shot `-Xmx` tuning for JVM-hosted applications.
//!
//! On first start of an installation the [`HeapSizeAdvisor`] looks at the configured heap size,
//! probes physical memory and, if the user has not already raised the heap themselves, writes a
//! larger `-Xmx` suggested by the active [`SuggestionPolicy`]. A persisted flag in the
//! [`PropertiesStore`] makes the whole procedure run at most once.
//!
//! The advisor owns no I/O of its own: VM options, physical memory and the flag store are all
//! collaborators behind traits, so hosts plug in whatever storage they already have.

mod advisor;
mod outcome;
mod policy;
mod probe;
mod properties;
mod registry;
mod vm_options;

pub use advisor::{HeapSizeAdvisor, MEMORY_ADJUSTED_KEY};
pub use outcome::AdjustmentOutcome;
pub use policy::{
    DefaultSuggestionPolicy, PolicyError, PolicyLimits, SuggestionPolicy, DEFAULT_XMX_MB,
    LEGACY_DEFAULT_XMX_MB, MAXIMUM_SUGGESTED_XMX_MB,
};
pub use probe::{FixedMemoryProbe, PhysicalMemoryProbe, SystemMemoryProbe};
pub use properties::{InMemoryProperties, PropertiesStore};
pub use registry::PolicyRegistry;
pub use vm_options::{read_effective, MemoryKind, VmOptions, VmOptionsError};
