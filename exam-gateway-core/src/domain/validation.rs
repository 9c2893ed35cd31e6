use serde::{Deserialize, Serialize};

/// Outcome of a single field validator. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Normalized value, present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized: Option<String>,
    /// Set when the failure came from an adversarial signature rather than
    /// from a malformed value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub adversarial: bool,
}

impl ValidationResult {
    pub fn ok(sanitized: impl Into<String>) -> Self {
        Self {
            valid: true,
            error: None,
            sanitized: Some(sanitized.into()),
            adversarial: false,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            sanitized: None,
            adversarial: false,
        }
    }

    pub fn adversarial(error: impl Into<String>) -> Self {
        Self {
            adversarial: true,
            ..Self::invalid(error)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Chain another check on the normalized value when this one passed.
    pub fn and_then<F>(self, next: F) -> Self
    where
        F: FnOnce(&str) -> ValidationResult,
    {
        match (&self.valid, &self.sanitized) {
            (true, Some(value)) => next(value),
            _ => self,
        }
    }
}
