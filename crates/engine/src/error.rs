//! Engine error types.

use logflow_core::error::LogflowError;

/// Errors surfaced by [`Engine`](crate::Engine) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The named pipeline is not loaded.
    #[error("pipeline not found: {name}")]
    NotFound { name: String },

    /// A pipeline with this name is already loaded and `replace` was not set.
    #[error("pipeline already exists: {name}")]
    AlreadyExists { name: String },

    /// An underlying pipeline operation failed (config, start, stop, ...).
    #[error(transparent)]
    Pipeline(#[from] LogflowError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflow_core::error::ConfigError;

    #[test]
    fn not_found_display() {
        let err = EngineError::NotFound {
            name: "web-logs".to_owned(),
        };
        assert_eq!(err.to_string(), "pipeline not found: web-logs");
    }

    #[test]
    fn already_exists_display() {
        let err = EngineError::AlreadyExists {
            name: "web-logs".to_owned(),
        };
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn wraps_logflow_errors_transparently() {
        let inner: LogflowError = ConfigError::MissingField {
            field: "path".to_owned(),
        }
        .into();
        let expected = inner.to_string();
        let err: EngineError = inner.into();
        assert_eq!(err.to_string(), expected);
    }
}
