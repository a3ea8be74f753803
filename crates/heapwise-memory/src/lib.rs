//! Physical memory probing for Heapwise.
//!
//! Probing is "best-effort":
//! - Platforms or sandboxes that hide memory information report zero / `None` instead of failing.
//! - Inside a container the cgroup memory limit is usually what the JVM will see, so callers can
//!   ask for the effective total (`min(physical, cgroup limit)`) rather than the host's RAM.

mod cgroup;
mod probe;
mod size;

pub use cgroup::{
    cgroup_memory_limit_bytes, parse_cgroup_memory_limit_bytes, parse_proc_self_cgroup,
    CgroupRoots, ProcSelfCgroup,
};
pub use probe::{effective_total_memory_bytes, total_physical_memory_bytes, MemorySnapshot};
pub use size::{bytes_to_mb, parse_byte_size, ByteSizeParseError, GB, KB, MB};
