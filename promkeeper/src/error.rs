//! Application-wide error types.

use std::path::Path;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown notification driver: {0}")]
    UnknownDriver(String),

    #[error("Delivery via {driver} failed: {message}")]
    Delivery { driver: String, message: String },

    #[error("Remote object not found: {kind} {name}")]
    RemoteNotFound { kind: String, name: String },

    #[error("Remote API error (status {status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn delivery(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            driver: driver.into(),
            message: message.into(),
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether this error is the remote store's not-found condition.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Self::RemoteNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_not_found_is_distinguished() {
        let err = Error::RemoteNotFound {
            kind: "PrometheusRule".to_string(),
            name: "promkeeper-rules-web".to_string(),
        };
        assert!(err.is_remote_not_found());

        let err = Error::RemoteApi {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!err.is_remote_not_found());
    }

    #[test]
    fn test_delivery_message() {
        let err = Error::delivery("webhook", "connection refused");
        assert_eq!(
            err.to_string(),
            "Delivery via webhook failed: connection refused"
        );
    }
}
