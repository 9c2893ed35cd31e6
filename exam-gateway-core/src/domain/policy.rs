use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoreError, Result};

/// Name of the entry used for endpoints with no policy of their own.
pub const DEFAULT_POLICY: &str = "default";

/// Longest accepted window: 366 days.
pub const MAX_WINDOW_MS: u64 = 366 * 24 * 60 * 60 * 1000;

/// Fixed-window limit applied to one endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointPolicy {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests allowed per identifier within one window
    pub max_requests: u32,
}

impl EndpointPolicy {
    pub const fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    fn validate(&self, endpoint: &str) -> Result<()> {
        if self.window_ms == 0 {
            return Err(CoreError::Validation(format!(
                "policy '{}' must have a non-zero window_ms",
                endpoint
            )));
        }
        if self.window_ms > MAX_WINDOW_MS {
            return Err(CoreError::Validation(format!(
                "policy '{}' window_ms {} exceeds the maximum of {}",
                endpoint, self.window_ms, MAX_WINDOW_MS
            )));
        }
        if self.max_requests == 0 {
            return Err(CoreError::Validation(format!(
                "policy '{}' must allow at least one request",
                endpoint
            )));
        }
        Ok(())
    }
}

/// Immutable endpoint → policy map with a mandatory default entry.
///
/// Built once and handed to the rate limiter; there is no mutation API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: HashMap<String, EndpointPolicy>,
    default: EndpointPolicy,
}

impl PolicyTable {
    /// Build a table from a map that must contain a `default` entry.
    pub fn from_map(mut policies: HashMap<String, EndpointPolicy>) -> Result<Self> {
        let default = policies.remove(DEFAULT_POLICY).ok_or_else(|| {
            CoreError::Validation(format!(
                "policy table must contain a '{}' entry",
                DEFAULT_POLICY
            ))
        })?;
        default.validate(DEFAULT_POLICY)?;

        for (endpoint, policy) in &policies {
            policy.validate(endpoint)?;
        }

        Ok(Self { policies, default })
    }

    /// Table with only a default policy.
    pub fn with_default(default: EndpointPolicy) -> Self {
        Self {
            policies: HashMap::new(),
            default,
        }
    }

    /// Builder-style addition used when assembling a table in code.
    pub fn with_policy(mut self, endpoint: impl Into<String>, policy: EndpointPolicy) -> Self {
        self.policies.insert(endpoint.into(), policy);
        self
    }

    /// Built-in limits for the platform's API surface.
    pub fn standard() -> Self {
        Self::with_default(EndpointPolicy::new(60_000, 100))
            .with_policy("auth/login", EndpointPolicy::new(300_000, 10))
            .with_policy("auth/signup", EndpointPolicy::new(3_600_000, 5))
            .with_policy("auth/reset-password", EndpointPolicy::new(3_600_000, 3))
            .with_policy("ai/generate", EndpointPolicy::new(60_000, 10))
            .with_policy("ai/explain", EndpointPolicy::new(60_000, 20))
            .with_policy("feedback", EndpointPolicy::new(60_000, 10))
            .with_policy("questions/submit", EndpointPolicy::new(60_000, 60))
    }

    /// Policy for `endpoint`, falling back to the default entry.
    pub fn lookup(&self, endpoint: &str) -> EndpointPolicy {
        self.policies
            .get(endpoint)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_policy(&self) -> EndpointPolicy {
        self.default
    }

    /// Number of explicit (non-default) entries
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}
