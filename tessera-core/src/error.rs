//! Error types for Tessera operations

use std::time::Duration;
use thiserror::Error;

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Couldn't get a lock in {timeout:?} for the key {key} at the cache {cache_id}")]
    LockTimeout {
        cache_id: String,
        key: String,
        timeout: Duration,
    },

    #[error("Value of type {type_name} stored in cache {cache_id} is not serializable")]
    NotSerializable {
        cache_id: String,
        type_name: String,
    },

    #[error("Serialization failed in cache {cache_id}: {reason}")]
    Serialization { cache_id: String, reason: String },

    #[error("Deserialization failed in cache {cache_id}: {reason}")]
    Deserialization { cache_id: String, reason: String },

    #[error("Not allowed to update a null cache key instance")]
    NullKeyUpdate,

    #[error("Unexpected value in cache {cache_id}: expected {expected}")]
    UnexpectedValue {
        cache_id: String,
        expected: &'static str,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },

    #[error("Unknown eviction policy: {name}")]
    UnknownEviction { name: String },

    #[error("Cache already registered for namespace {namespace}")]
    DuplicateNamespace { namespace: String },

    #[error("No cache for namespace '{namespace}' could be found")]
    UnknownNamespace { namespace: String },

    #[error(
        "Caching stored procedures with OUT params is not supported. \
         Please configure use_cache=false in {statement_id} statement"
    )]
    OutputParametersNotCacheable { statement_id: String },
}

/// Executor errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Executor was closed")]
    Closed,

    #[error("Statement {statement_id} failed: {reason}")]
    StatementFailed {
        statement_id: String,
        reason: String,
    },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_display_names_key_and_cache() {
        let err = CacheError::LockTimeout {
            cache_id: "users".to_string(),
            key: "17:42:users.find".to_string(),
            timeout: Duration::from_millis(250),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("users.find"));
        assert!(msg.contains("at the cache users"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn test_serialization_error_display() {
        let err = CacheError::Serialization {
            cache_id: "orders".to_string(),
            reason: "key must be a string".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("orders"));
        assert!(msg.contains("key must be a string"));
    }

    #[test]
    fn test_output_params_error_names_statement() {
        let err = ConfigError::OutputParametersNotCacheable {
            statement_id: "accounts.callBalance".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("accounts.callBalance"));
        assert!(msg.contains("OUT params"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "size".to_string(),
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("size"));
        assert!(msg.contains("0"));
        assert!(msg.contains("must be greater than zero"));
    }

    #[test]
    fn test_tessera_error_from_conversions() {
        let cache_err: TesseraError = CacheError::NullKeyUpdate.into();
        assert!(matches!(cache_err, TesseraError::Cache(_)));

        let config_err: TesseraError = ConfigError::MissingRequired {
            field: "id".to_string(),
        }
        .into();
        assert!(matches!(config_err, TesseraError::Config(_)));

        let exec_err: TesseraError = ExecutorError::Closed.into();
        assert_eq!(format!("{}", exec_err), "Executor error: Executor was closed");
    }
}
