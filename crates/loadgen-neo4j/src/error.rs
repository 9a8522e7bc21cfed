//! Error types for the Neo4j backend.

use loadgen_core::DriverError;
use thiserror::Error;

/// Errors raised while talking to Neo4j.
#[derive(Error, Debug)]
pub enum Neo4jDriverError {
    /// Neo4j database error
    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    /// Driver configuration could not be built
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be established or verified
    #[error("Connection error: {0}")]
    Connection(String),

    /// A column could not be read from a result row
    #[error("Column '{column}' could not be read: {message}")]
    Column { column: String, message: String },

    /// A parameter value has no Bolt representation
    #[error("Unsupported parameter '{name}': {message}")]
    Param { name: String, message: String },
}

impl From<Neo4jDriverError> for DriverError {
    fn from(err: Neo4jDriverError) -> Self {
        match err {
            Neo4jDriverError::Config(_) | Neo4jDriverError::Connection(_) => {
                DriverError::Connect(err.to_string())
            }
            other => DriverError::Query(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_mapping() {
        let err: DriverError = Neo4jDriverError::Connection("refused".into()).into();
        assert!(matches!(err, DriverError::Connect(_)));

        let err: DriverError = Neo4jDriverError::Param {
            name: "x".into(),
            message: "NaN".into(),
        }
        .into();
        assert!(matches!(err, DriverError::Query(m) if m.contains("'x'")));
    }
}
