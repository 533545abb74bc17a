//! Error types shared across the mirror index.

use thiserror::Error;

/// Errors raised while loading and resolving configuration.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Configuration error (missing backend location, bad URL, unreadable file)
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MirrorError::Config("missing index".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing index");
    }
}
