use thiserror::Error;

use crate::navigation::NavigationState;
use crate::queue::ValidationError;

#[derive(Error, Debug)]
pub enum AutomationError {
    /// Missing template asset, unusable directory, bad config file. Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Template unmatched within timeout, or target window absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every activation strategy was exhausted.
    #[error("Activation failed: {0}")]
    Activation(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// An OS automation call failed mid-operation.
    #[error("Platform-specific error: {0}")]
    Platform(String),

    #[error("Fail-safe triggered: {0}")]
    FailSafe(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid navigation transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: NavigationState,
        to: NavigationState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl AutomationError {
    /// Whether a caller may reasonably try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::NotFound(_)
                | AutomationError::Activation(_)
                | AutomationError::Platform(_)
        )
    }

    /// Errors that must stop the whole session rather than a single step or document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::Configuration(_)
                | AutomationError::FailSafe(_)
                | AutomationError::UnsupportedPlatform(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AutomationError::NotFound("x".into()).is_retryable());
        assert!(AutomationError::Platform("x".into()).is_retryable());
        assert!(AutomationError::Activation("x".into()).is_retryable());
        assert!(!AutomationError::Configuration("x".into()).is_retryable());
        assert!(!AutomationError::FailSafe("corner".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AutomationError::Configuration("missing".into()).is_fatal());
        assert!(AutomationError::FailSafe("corner".into()).is_fatal());
        assert!(!AutomationError::NotFound("x".into()).is_fatal());
    }
}
