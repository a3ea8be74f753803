use serde::Serialize;
use thiserror::Error;

/// Heap size the product ships with, in MB.
pub const DEFAULT_XMX_MB: u64 = 2048;
/// Upper bound for any suggestion made by the default policy, in MB.
pub const MAXIMUM_SUGGESTED_XMX_MB: u64 = 4096;
/// Heap size shipped by older releases; the ceiling for machines below [`DEFAULT_XMX_MB`].
pub const LEGACY_DEFAULT_XMX_MB: u64 = 750;

const _: () = assert!(MAXIMUM_SUGGESTED_XMX_MB >= 2 * DEFAULT_XMX_MB);

/// Maps total physical memory to a suggested maximum heap size (both in MB).
///
/// Implementations must be pure: the advisor may call `suggest` from any thread and expects the
/// same answer for the same input.
pub trait SuggestionPolicy: Send + Sync {
    fn suggest(&self, total_physical_memory_mb: u64) -> u64;
}

impl<F> SuggestionPolicy for F
where
    F: Fn(u64) -> u64 + Send + Sync,
{
    fn suggest(&self, total_physical_memory_mb: u64) -> u64 {
        self(total_physical_memory_mb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error(
        "maximum suggested heap ({maximum_suggested_xmx_mb}MB) must be at least twice the default heap ({default_xmx_mb}MB)"
    )]
    InvariantViolation {
        default_xmx_mb: u64,
        maximum_suggested_xmx_mb: u64,
    },
    #[error("default heap size must be greater than zero")]
    ZeroDefault,
}

/// Bounds used by [`DefaultSuggestionPolicy`] and by the advisor's "already large" check.
///
/// Only constructible through [`PolicyLimits::new`] (or [`PolicyLimits::DEFAULT`]), so every
/// value upholds `maximum >= 2 * default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyLimits {
    default_xmx_mb: u64,
    maximum_suggested_xmx_mb: u64,
    legacy_default_mb: u64,
}

impl PolicyLimits {
    pub const DEFAULT: Self = Self {
        default_xmx_mb: DEFAULT_XMX_MB,
        maximum_suggested_xmx_mb: MAXIMUM_SUGGESTED_XMX_MB,
        legacy_default_mb: LEGACY_DEFAULT_XMX_MB,
    };

    pub fn new(
        default_xmx_mb: u64,
        maximum_suggested_xmx_mb: u64,
        legacy_default_mb: u64,
    ) -> Result<Self, PolicyError> {
        if default_xmx_mb == 0 {
            return Err(PolicyError::ZeroDefault);
        }
        let doubled = default_xmx_mb.checked_mul(2);
        if doubled.map_or(true, |doubled| maximum_suggested_xmx_mb < doubled) {
            return Err(PolicyError::InvariantViolation {
                default_xmx_mb,
                maximum_suggested_xmx_mb,
            });
        }

        Ok(Self {
            default_xmx_mb,
            maximum_suggested_xmx_mb,
            legacy_default_mb,
        })
    }

    pub fn default_xmx_mb(self) -> u64 {
        self.default_xmx_mb
    }

    pub fn maximum_suggested_xmx_mb(self) -> u64 {
        self.maximum_suggested_xmx_mb
    }

    pub fn legacy_default_mb(self) -> u64 {
        self.legacy_default_mb
    }
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One eighth of physical memory, clamped to `[default, maximum]`.
///
/// Machines with less RAM than the default heap get `min(legacy default, RAM)` instead, so the
/// suggestion never exceeds what is physically installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultSuggestionPolicy {
    limits: PolicyLimits,
}

impl DefaultSuggestionPolicy {
    pub fn new(limits: PolicyLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PolicyLimits {
        self.limits
    }
}

impl SuggestionPolicy for DefaultSuggestionPolicy {
    fn suggest(&self, total_physical_memory_mb: u64) -> u64 {
        let limits = self.limits;
        if total_physical_memory_mb < limits.default_xmx_mb {
            return limits.legacy_default_mb.min(total_physical_memory_mb);
        }
        (total_physical_memory_mb / 8).clamp(limits.default_xmx_mb, limits.maximum_suggested_xmx_mb)
    }
}
