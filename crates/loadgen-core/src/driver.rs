//! Driver abstraction the client executes against.
//!
//! A backend provides three layers: a [`Driver`] that opens connections, a
//! [`Connection`] that hands out call-scoped sessions and can be closed, and a
//! [`Session`] that runs one statement inside a transaction of a given mode.

use crate::endpoint::Endpoint;
use crate::error::DriverError;
use crate::request::Params;
use async_trait::async_trait;
use serde_json::Value;

/// Transaction boundary a statement runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    Read,
    Write,
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionMode::Read => write!(f, "read"),
            TransactionMode::Write => write!(f, "write"),
        }
    }
}

/// Opens physical connections.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Connection: Connection;

    /// Open a connection for `endpoint`. Expensive; the pool calls this once
    /// per key.
    async fn open(&self, endpoint: &Endpoint) -> Result<Self::Connection, DriverError>;
}

/// One physical connection, shared by every holder of a pooled client.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    type Session: Session;

    /// Start a session scoped to a single call.
    async fn session(&self) -> Result<Self::Session, DriverError>;

    /// Tear the connection down. The pool guarantees this runs at most once.
    async fn close(&self);
}

/// A call-scoped session.
#[async_trait]
pub trait Session: Send {
    /// Run `statement` in a transaction of the given mode and drain the
    /// whole result stream. Returns the number of rows consumed.
    async fn run(
        &mut self,
        mode: TransactionMode,
        statement: &str,
        params: &Params,
    ) -> Result<u64, DriverError>;

    /// Run `statement` outside of metrics and return `column` of the first
    /// row, or `None` when there are no rows.
    async fn scalar(
        &mut self,
        statement: &str,
        params: &Params,
        column: &str,
    ) -> Result<Option<Value>, DriverError>;
}
