//! Endpoint and credential types.

use crate::error::ConfigError;
use crate::pool::PoolKey;
use std::fmt;

const SUPPORTED_SCHEMES: &[&str] = &[
    "bolt://",
    "bolt+s://",
    "bolt+ssc://",
    "neo4j://",
    "neo4j+s://",
    "neo4j+ssc://",
];

/// Principal and secret used to authenticate against the database.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    principal: String,
    secret: String,
}

impl Credentials {
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

// The secret must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A validated database endpoint: URI, credentials and optional database name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    uri: String,
    credentials: Credentials,
    database: Option<String>,
}

impl Endpoint {
    /// Validate and build an endpoint.
    ///
    /// Fails when the URI is empty, uses an unsupported scheme or has no host,
    /// or when the principal is empty.
    pub fn new(uri: &str, credentials: Credentials) -> Result<Self, ConfigError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ConfigError::MissingUri);
        }

        let rest = SUPPORTED_SCHEMES
            .iter()
            .find_map(|scheme| uri.strip_prefix(*scheme))
            .ok_or_else(|| ConfigError::UnsupportedScheme {
                uri: uri.to_string(),
            })?;

        let host = rest
            .split(|c: char| c == '/' || c == '?')
            .next()
            .unwrap_or_default();
        if host.is_empty() || host.starts_with(':') {
            return Err(ConfigError::MissingHost {
                uri: uri.to_string(),
            });
        }

        if credentials.principal.trim().is_empty() {
            return Err(ConfigError::MissingPrincipal);
        }

        Ok(Self {
            uri: uri.to_string(),
            credentials,
            database: None,
        })
    }

    /// Target a specific database instead of the server default.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        let database = database.into();
        self.database = if database.is_empty() {
            None
        } else {
            Some(database)
        };
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// The pool key this endpoint maps to.
    pub fn pool_key(&self) -> PoolKey {
        PoolKey::new(
            &self.uri,
            &self.credentials.principal,
            self.database.as_deref(),
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pool_key())
    }
}
