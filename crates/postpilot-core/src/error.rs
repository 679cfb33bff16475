//! PostPilot error types.

use thiserror::Error;

/// All errors produced by the PostPilot core.
#[derive(Debug, Error)]
pub enum PostPilotError {
    /// Configuration load/parse failures.
    #[error("Config error: {0}")]
    Config(String),

    /// A capability invocation failed.
    #[error("Capability error: {0}")]
    Capability(String),

    /// No capability registered under the requested name.
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    /// Input rejected before any external call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The content provider's API rejected or throttled a request.
    #[error("API error: {0}")]
    Api(String),

    /// Connectivity failure talking to an external service.
    #[error("Network error: {0}")]
    Network(String),

    /// An external call exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Scheduler store failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Scheduler bookkeeping failure.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Plan construction or execution bookkeeping failure.
    #[error("Plan error: {0}")]
    Plan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, PostPilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_message() {
        let e = PostPilotError::CapabilityNotFound("generate_posts".into());
        assert_eq!(e.to_string(), "Capability not found: generate_posts");
    }

    #[test]
    fn test_io_error_converts() {
        fn read_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/definitely/not/a/real/path")?)
        }
        assert!(matches!(read_missing(), Err(PostPilotError::Io(_))));
    }
}
