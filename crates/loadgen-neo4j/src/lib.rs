//! Neo4j backend for graph-loadgen.
//!
//! Implements the `loadgen_core` driver traits with [neo4rs]. Each pooled
//! connection owns one `neo4rs::Graph`; every call opens an explicit
//! transaction, drains the result stream, then commits writes and rolls
//! reads back.
//!
//! # Example
//!
//! ```ignore
//! use loadgen_core::{Credentials, Endpoint, Pool};
//! use loadgen_neo4j::{Neo4jDriver, Neo4jSettings};
//!
//! let pool = Pool::new(Neo4jDriver::new(Neo4jSettings::default()));
//! let endpoint = Endpoint::new("bolt://localhost:7687", Credentials::new("neo4j", "password"))?;
//! let handle = pool.acquire(&endpoint).await?;
//! ```

mod args;
mod driver;
mod error;
mod params;

pub use args::{
    Neo4jArgs, Neo4jSettings, DEFAULT_FETCH_SIZE, DEFAULT_MAX_CONNECTIONS, DEFAULT_USERNAME,
};
pub use driver::{Neo4jConnection, Neo4jDriver, Neo4jSession};
pub use error::Neo4jDriverError;
pub use params::{build_query, json_to_bolt};
