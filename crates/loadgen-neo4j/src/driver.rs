//! `loadgen_core::Driver` implementation on top of neo4rs.

use crate::args::Neo4jSettings;
use crate::error::Neo4jDriverError;
use crate::params::build_query;
use async_trait::async_trait;
use loadgen_core::{Connection, Driver, DriverError, Endpoint, Params, Session, TransactionMode};
use neo4rs::{query, ConfigBuilder, Graph, Operation};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Opens one neo4rs [`Graph`] per pooled connection.
#[derive(Debug, Clone, Default)]
pub struct Neo4jDriver {
    settings: Neo4jSettings,
}

impl Neo4jDriver {
    pub fn new(settings: Neo4jSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Neo4jSettings {
        &self.settings
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Graph, Neo4jDriverError> {
        let credentials = endpoint.credentials();
        let mut builder = ConfigBuilder::default()
            .uri(endpoint.uri())
            .user(credentials.principal())
            .password(credentials.secret())
            .fetch_size(self.settings.fetch_size)
            .max_connections(self.settings.max_connections);
        if let Some(database) = endpoint.database() {
            builder = builder.db(database);
        }
        let config = builder
            .build()
            .map_err(|e| Neo4jDriverError::Config(e.to_string()))?;

        let graph = Graph::connect(config)
            .map_err(|e| Neo4jDriverError::Connection(e.to_string()))?;

        if self.settings.verify_connectivity {
            graph
                .run(query("RETURN 1"))
                .await
                .map_err(|e| Neo4jDriverError::Connection(e.to_string()))?;
        }
        Ok(graph)
    }
}

#[async_trait]
impl Driver for Neo4jDriver {
    type Connection = Neo4jConnection;

    async fn open(&self, endpoint: &Endpoint) -> Result<Neo4jConnection, DriverError> {
        info!("Connecting to Neo4j at {}", endpoint);
        let graph = self.connect(endpoint).await?;
        Ok(Neo4jConnection {
            graph: Mutex::new(Some(graph)),
        })
    }
}

/// A connected [`Graph`]. Closing drops it, which shuts its Bolt pool down.
pub struct Neo4jConnection {
    graph: Mutex<Option<Graph>>,
}

impl Neo4jConnection {
    fn graph(&self) -> Option<Graph> {
        self.graph
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Connection for Neo4jConnection {
    type Session = Neo4jSession;

    async fn session(&self) -> Result<Neo4jSession, DriverError> {
        let graph = self.graph().ok_or(DriverError::Closed)?;
        Ok(Neo4jSession { graph })
    }

    async fn close(&self) {
        let graph = self
            .graph
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if graph.is_some() {
            debug!("Neo4j connection dropped");
        }
    }
}

/// Bolt access mode a transaction is opened with. Read transactions are
/// routed to followers on `neo4j://` URIs.
fn access_mode(mode: TransactionMode) -> Operation {
    match mode {
        TransactionMode::Read => Operation::Read,
        TransactionMode::Write => Operation::Write,
    }
}

/// Call-scoped session: one explicit transaction per `run`.
pub struct Neo4jSession {
    graph: Graph,
}

impl Neo4jSession {
    async fn run_txn(
        &self,
        mode: TransactionMode,
        statement: &str,
        params: &Params,
    ) -> Result<u64, Neo4jDriverError> {
        let query = build_query(statement, params)?;
        let mut txn = self.graph.start_txn_as(access_mode(mode), None).await?;
        let mut stream = txn.execute(query).await?;

        let mut rows = 0u64;
        while stream.next(txn.handle()).await?.is_some() {
            rows += 1;
        }

        match mode {
            TransactionMode::Read => txn.rollback().await?,
            TransactionMode::Write => {
                txn.commit().await?;
            }
        }
        Ok(rows)
    }

    async fn first_value(
        &self,
        statement: &str,
        params: &Params,
        column: &str,
    ) -> Result<Option<Value>, Neo4jDriverError> {
        let query = build_query(statement, params)?;
        let mut result = self.graph.execute(query).await?;
        let Some(row) = result.next().await? else {
            return Ok(None);
        };

        if let Ok(value) = row.get::<Option<i64>>(column) {
            return Ok(value.map(Value::from));
        }
        if let Ok(value) = row.get::<Option<f64>>(column) {
            return Ok(value.map(Value::from));
        }
        row.get::<Option<String>>(column)
            .map(|value| value.map(Value::from))
            .map_err(|e| Neo4jDriverError::Column {
                column: column.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Session for Neo4jSession {
    async fn run(
        &mut self,
        mode: TransactionMode,
        statement: &str,
        params: &Params,
    ) -> Result<u64, DriverError> {
        Ok(self.run_txn(mode, statement, params).await?)
    }

    async fn scalar(
        &mut self,
        statement: &str,
        params: &Params,
        column: &str,
    ) -> Result<Option<Value>, DriverError> {
        Ok(self.first_value(statement, params, column).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_connection_refuses_sessions() {
        let connection = Neo4jConnection {
            graph: Mutex::new(None),
        };
        assert!(matches!(connection.session().await, Err(DriverError::Closed)));
        connection.close().await;
    }

    #[test]
    fn test_read_transactions_use_read_access_mode() {
        assert_eq!(access_mode(TransactionMode::Read), Operation::Read);
        assert_eq!(access_mode(TransactionMode::Write), Operation::Write);
    }
}
