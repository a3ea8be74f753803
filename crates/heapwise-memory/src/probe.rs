use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::cgroup::cgroup_memory_limit_bytes;

/// Installed physical memory in bytes, or `0` when the platform does not report it.
pub fn total_physical_memory_bytes() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory()
}

/// Memory the process can use: physical RAM, optionally clamped by the cgroup limit.
pub fn effective_total_memory_bytes(respect_cgroup: bool) -> u64 {
    MemorySnapshot::capture().effective_bytes(respect_cgroup)
}

/// Point-in-time view of the memory available to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub physical_bytes: u64,
    pub cgroup_limit_bytes: Option<u64>,
}

impl MemorySnapshot {
    pub fn capture() -> Self {
        let snapshot = Self {
            physical_bytes: total_physical_memory_bytes(),
            cgroup_limit_bytes: cgroup_memory_limit_bytes(),
        };
        tracing::debug!(
            target: "heapwise.memory",
            physical_bytes = snapshot.physical_bytes,
            cgroup_limit_bytes = ?snapshot.cgroup_limit_bytes,
            "captured memory snapshot"
        );
        snapshot
    }

    /// Total memory the process can actually use.
    ///
    /// With `respect_cgroup`, a cgroup limit below physical RAM wins. A zero physical reading
    /// (unknown) falls back to the cgroup limit when there is one.
    pub fn effective_bytes(self, respect_cgroup: bool) -> u64 {
        match (respect_cgroup, self.cgroup_limit_bytes) {
            (true, Some(limit)) if self.physical_bytes == 0 => limit,
            (true, Some(limit)) => self.physical_bytes.min(limit),
            _ => self.physical_bytes,
        }
    }
}
