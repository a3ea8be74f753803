use heapwise_memory::effective_total_memory_bytes;

/// Source of the machine's total memory.
pub trait PhysicalMemoryProbe: Send + Sync {
    fn total_physical_memory_bytes(&self) -> u64;
}

/// Probes the running system, honouring container limits unless told otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemMemoryProbe {
    respect_cgroup_limit: bool,
    override_bytes: Option<u64>,
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self {
            respect_cgroup_limit: true,
            override_bytes: None,
        }
    }
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respect_cgroup_limit(mut self, respect: bool) -> Self {
        self.respect_cgroup_limit = respect;
        self
    }

    /// Report `bytes` instead of probing.
    pub fn with_override(mut self, bytes: Option<u64>) -> Self {
        self.override_bytes = bytes;
        self
    }
}

impl PhysicalMemoryProbe for SystemMemoryProbe {
    fn total_physical_memory_bytes(&self) -> u64 {
        if let Some(bytes) = self.override_bytes {
            return bytes;
        }
        effective_total_memory_bytes(self.respect_cgroup_limit)
    }
}

/// Always reports the same amount of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMemoryProbe(pub u64);

impl PhysicalMemoryProbe for FixedMemoryProbe {
    fn total_physical_memory_bytes(&self) -> u64 {
        self.0
    }
}
