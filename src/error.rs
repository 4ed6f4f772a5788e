//! Error types for the advanced cache
//!
//! The cache is a best-effort layer: only configuration errors are meant to
//! reach callers. Serialization and compression failures are logged and
//! degraded to "not cached" by the cache itself; health probe failures are
//! reported inside the health report.

use thiserror::Error;

/// Unified error type for the cache
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Unknown cache type: {name}")]
    UnknownTier { name: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid invalidation pattern: {0}")]
    InvalidPattern(String),

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // Compression Errors
    // =========================================================================
    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    // =========================================================================
    // Health Errors
    // =========================================================================
    #[error("Health probe failed for tier {tier}: {reason}")]
    HealthProbe { tier: String, reason: String },

    // =========================================================================
    // IO / Internal Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller bug: unknown tier, bad config, malformed pattern
    Configuration,
    /// Value could not be serialized or parsed
    Serialization,
    /// Compression, decompression or filesystem failure
    Io,
    /// Tier self-test failure
    HealthProbe,
    /// Anything else
    Internal,
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::UnknownTier { .. } | Error::Configuration(_) | Error::InvalidPattern(_) => {
                ErrorClass::Configuration
            }
            Error::Serialization(_) | Error::Yaml(_) => ErrorClass::Serialization,
            Error::Compression(_) | Error::Decompression(_) | Error::Io(_) => ErrorClass::Io,
            Error::HealthProbe { .. } => ErrorClass::HealthProbe,
            Error::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Check if this error is a programming/integration mistake that should
    /// surface to the caller instead of degrading to a cache miss
    pub fn is_caller_bug(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }
}

/// Result type alias for the cache
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let err = Error::UnknownTier {
            name: "hot".into(),
        };
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.is_caller_bug());
        assert_eq!(err.to_string(), "Unknown cache type: hot");

        let err = Error::Decompression("truncated".into());
        assert_eq!(err.class(), ErrorClass::Io);
        assert!(!err.is_caller_bug());

        let err = Error::HealthProbe {
            tier: "critical".into(),
            reason: "mismatch".into(),
        };
        assert_eq!(err.class(), ErrorClass::HealthProbe);
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = parse_err.into();
        assert_eq!(err.class(), ErrorClass::Serialization);
        assert!(!err.is_caller_bug());
    }
}
