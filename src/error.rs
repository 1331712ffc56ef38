use thiserror::Error;

/// Unified error type for release-gate operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version parsing error: {0}")]
    Version(String),

    #[error("Tag error: {0}")]
    Tag(String),

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Coverage upload failed: {0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in release-gate
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ReleaseError::Config(msg.into())
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        ReleaseError::Version(msg.into())
    }

    /// Create a tag error with context
    pub fn tag(msg: impl Into<String>) -> Self {
        ReleaseError::Tag(msg.into())
    }

    /// Create a remote error with context
    pub fn remote(msg: impl Into<String>) -> Self {
        ReleaseError::Remote(msg.into())
    }

    /// Create a manifest error with context
    pub fn manifest(msg: impl Into<String>) -> Self {
        ReleaseError::Manifest(msg.into())
    }

    /// Create a stage failure attributed to `stage`
    pub fn stage(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        ReleaseError::Stage {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Create a coverage upload error with context
    pub fn upload(msg: impl Into<String>) -> Self {
        ReleaseError::Upload(msg.into())
    }

    /// Whether a command was stopped for exceeding its time limit
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReleaseError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut)
    }
}

impl From<reqwest::Error> for ReleaseError {
    fn from(err: reqwest::Error) -> Self {
        ReleaseError::Upload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReleaseError::config("test config issue");
        assert_eq!(err.to_string(), "Configuration error: test config issue");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ReleaseError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_stage_error_names_stage() {
        let err = ReleaseError::stage("coverage", "timed out after 600 seconds");
        assert_eq!(
            err.to_string(),
            "Stage 'coverage' failed: timed out after 600 seconds"
        );
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let error_pairs = vec![
            (ReleaseError::config("x"), "Configuration error"),
            (ReleaseError::version("x"), "Version parsing error"),
            (ReleaseError::tag("x"), "Tag error"),
            (ReleaseError::remote("x"), "Remote operation failed"),
            (ReleaseError::manifest("x"), "Manifest error"),
            (ReleaseError::upload("x"), "Coverage upload failed"),
        ];

        for (err, expected_prefix) in error_pairs {
            let msg = err.to_string();
            assert!(
                msg.starts_with(expected_prefix),
                "Error message should start with '{}', but got '{}'",
                expected_prefix,
                msg
            );
        }
    }

    #[test]
    fn test_is_timeout() {
        let timed_out: ReleaseError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(timed_out.is_timeout());
        assert!(!ReleaseError::stage("coverage", "timed out").is_timeout());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_errors = vec![
            std::io::Error::new(std::io::ErrorKind::NotFound, "Not found"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied"),
        ];

        for io_err in io_errors {
            let err: ReleaseError = io_err.into();
            assert!(err.to_string().contains("I/O error"));
        }
    }
}
