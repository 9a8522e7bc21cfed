//! Error types shared by the pool, the client and the actor lifecycle.
//!
//! Transaction failures never leave the client as `Err`; they become
//! [`crate::Outcome`] values instead.

use crate::pool::PoolKey;
use thiserror::Error;

/// Invalid or missing endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The endpoint URI is empty.
    #[error("Endpoint URI cannot be empty")]
    MissingUri,

    /// The endpoint URI does not use a supported scheme.
    #[error("Unsupported endpoint URI '{uri}' (expected bolt://, neo4j:// or a +s/+ssc variant)")]
    UnsupportedScheme { uri: String },

    /// The endpoint URI has no host part.
    #[error("Endpoint URI '{uri}' is missing a host")]
    MissingHost { uri: String },

    /// The principal (username) is empty.
    #[error("Principal cannot be empty")]
    MissingPrincipal,

    /// A required secret (password) was not supplied.
    #[error("Missing password for principal '{principal}'")]
    MissingSecret { principal: String },

    /// Any other invalid setting.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by a driver backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Opening the connection failed (bad address, authentication, ...).
    #[error("Connection error: {0}")]
    Connect(String),

    /// The statement failed (syntax, constraint, connectivity loss).
    #[error("Query error: {0}")]
    Query(String),

    /// The connection was already closed.
    #[error("Connection is closed")]
    Closed,
}

/// Errors returned by [`crate::Pool::acquire`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The driver could not open a connection for the key.
    #[error("Failed to open connection for {key}: {source}")]
    Open {
        key: PoolKey,
        #[source]
        source: DriverError,
    },

    /// The pool has been shut down.
    #[error("Pool has been shut down")]
    ShutDown,
}

/// Errors that prevent an actor from starting or running.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Endpoint configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The pool could not hand out a client.
    #[error(transparent)]
    Acquire(#[from] PoolError),

    /// The workload's setup step failed.
    #[error("Workload setup failed: {0}")]
    Setup(String),

    /// `start` was called on an actor that already holds a client.
    #[error("Actor {0} already holds a client")]
    AlreadyStarted(String),

    /// The workload panicked inside a task. The actor was stopped and its
    /// client released.
    #[error("Actor {actor} task panicked: {message}")]
    TaskPanicked { actor: String, message: String },

    /// A step was requested on an actor that is not running.
    #[error("Actor {0} is not running")]
    NotRunning(String),
}

impl From<DriverError> for ActorError {
    fn from(err: DriverError) -> Self {
        ActorError::Setup(err.to_string())
    }
}
