use std::fmt;
use std::sync::Arc;

use crate::policy::{DefaultSuggestionPolicy, PolicyLimits, SuggestionPolicy};

const DEFAULT_POLICY_NAME: &str = "default";

/// Single-slot registry for the heap suggestion policy.
///
/// Products built on the same platform can replace the built-in heuristic by registering their
/// own [`SuggestionPolicy`]. At most one override is active; registering again replaces it.
#[derive(Clone)]
pub struct PolicyRegistry {
    limits: PolicyLimits,
    default_policy: Arc<dyn SuggestionPolicy>,
    override_policy: Option<(String, Arc<dyn SuggestionPolicy>)>,
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("limits", &self.limits)
            .field("active", &self.active_name())
            .finish()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(PolicyLimits::DEFAULT)
    }
}

impl PolicyRegistry {
    pub fn new(limits: PolicyLimits) -> Self {
        Self {
            limits,
            default_policy: Arc::new(DefaultSuggestionPolicy::new(limits)),
            override_policy: None,
        }
    }

    pub fn limits(&self) -> PolicyLimits {
        self.limits
    }

    pub fn register(&mut self, name: impl Into<String>, policy: Arc<dyn SuggestionPolicy>) {
        let name = name.into();
        if let Some((previous, _)) = &self.override_policy {
            tracing::debug!(
                target: "heapwise.advisor",
                previous = %previous,
                replacement = %name,
                "replacing registered heap suggestion policy"
            );
        }
        self.override_policy = Some((name, policy));
    }

    /// Drop the override, falling back to the built-in policy.
    pub fn unregister(&mut self) -> Option<String> {
        self.override_policy.take().map(|(name, _)| name)
    }

    pub fn active(&self) -> Arc<dyn SuggestionPolicy> {
        match &self.override_policy {
            Some((_, policy)) => Arc::clone(policy),
            None => Arc::clone(&self.default_policy),
        }
    }

    pub fn active_name(&self) -> &str {
        self.override_policy
            .as_ref()
            .map_or(DEFAULT_POLICY_NAME, |(name, _)| name.as_str())
    }
}
