//! Reference-counted registry of shared clients.
//!
//! At most one connection exists per [`PoolKey`]. The first acquire for a key
//! opens it, later acquires share it, and the release that drops the last
//! lease closes it.
//!
//! # Locking
//!
//! The registry map sits behind a short synchronous lock that is never held
//! across an await. Each key owns a slot with its own async lock, which
//! serialises the check-then-act of acquire (including opening the
//! connection) and release for that key only. When the last lease goes, the
//! slot is marked retired and unlinked; an acquirer that was already waiting
//! on a retired slot goes back to the map and starts over, so two records can
//! never coexist for one key.

use crate::client::Client;
use crate::driver::{Connection, Driver};
use crate::endpoint::Endpoint;
use crate::error::PoolError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifies one physical connection: endpoint URI, principal and database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    uri: String,
    principal: String,
    database: Option<String>,
}

impl PoolKey {
    pub fn new(uri: &str, principal: &str, database: Option<&str>) -> Self {
        Self {
            uri: uri.to_string(),
            principal: principal.to_string(),
            database: database.map(str::to_string),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.principal, self.uri)?;
        if let Some(db) = &self.database {
            write!(f, "/{db}")?;
        }
        Ok(())
    }
}

/// A lease on a pooled client. Give it back with [`Pool::release`].
pub struct ClientHandle<C: Connection> {
    pool_id: Uuid,
    lease: Uuid,
    client: Arc<Client<C>>,
}

impl<C: Connection> ClientHandle<C> {
    pub fn client(&self) -> &Client<C> {
        &self.client
    }

    pub fn key(&self) -> &PoolKey {
        self.client.key()
    }

    pub fn lease_id(&self) -> Uuid {
        self.lease
    }

    /// Whether two handles lease the same underlying client.
    pub fn shares_client_with(&self, other: &ClientHandle<C>) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl<C: Connection> fmt::Debug for ClientHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("lease", &self.lease)
            .field("client", &self.client)
            .finish()
    }
}

/// Result of [`Pool::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// Other leases remain; the connection stays open.
    Retained { refcount: usize },
    /// That was the last lease; the connection has been closed.
    Closed,
    /// The pool was shut down and already closed this client.
    ShutDown,
    /// The handle does not match any live lease. Nothing was changed.
    Inconsistent,
}

/// Counters describing connection churn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub opened: u64,
    pub closed: u64,
    pub live: u64,
}

struct ClientRecord<C: Connection> {
    client: Arc<Client<C>>,
    leases: HashSet<Uuid>,
}

struct Slot<C: Connection> {
    record: Option<ClientRecord<C>>,
    retired: bool,
}

type SlotRef<C> = Arc<tokio::sync::Mutex<Slot<C>>>;

struct Registry<C: Connection> {
    slots: HashMap<PoolKey, SlotRef<C>>,
    shut_down: bool,
}

/// Process-local pool of shared clients, owned by one load test run.
pub struct Pool<D: Driver> {
    id: Uuid,
    driver: D,
    registry: Mutex<Registry<D::Connection>>,
    shut_down: AtomicBool,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl<D: Driver> Pool<D> {
    pub fn new(driver: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver,
            registry: Mutex::new(Registry {
                slots: HashMap::new(),
                shut_down: false,
            }),
            shut_down: AtomicBool::new(false),
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Lease the client for `endpoint`, opening a connection if none exists.
    pub async fn acquire(
        &self,
        endpoint: &Endpoint,
    ) -> Result<ClientHandle<D::Connection>, PoolError> {
        let key = endpoint.pool_key();

        loop {
            let slot = self.slot_for(&key)?;
            let mut guard = slot.lock().await;
            if guard.retired {
                // Lost a race with the final release of this key.
                continue;
            }

            let lease = Uuid::new_v4();
            if let Some(record) = guard.record.as_mut() {
                record.leases.insert(lease);
                debug!(
                    "Pool.acquire: {} refcount = {}",
                    record.client,
                    record.leases.len()
                );
                return Ok(ClientHandle {
                    pool_id: self.id,
                    lease,
                    client: Arc::clone(&record.client),
                });
            }

            let connection = match self.driver.open(endpoint).await {
                Ok(connection) => connection,
                Err(source) => {
                    guard.retired = true;
                    self.unlink(&key, &slot);
                    return Err(PoolError::Open { key, source });
                }
            };
            let client = Arc::new(Client::new(key.clone(), connection));
            self.opened.fetch_add(1, Ordering::Relaxed);
            info!("Pool: added connection {} for {}", client, key);

            guard.record = Some(ClientRecord {
                client: Arc::clone(&client),
                leases: HashSet::from([lease]),
            });

            return Ok(ClientHandle {
                pool_id: self.id,
                lease,
                client,
            });
        }
    }

    /// Give a lease back. The last release for a key closes its connection.
    ///
    /// Unknown or already released leases are logged and ignored.
    pub async fn release(&self, handle: ClientHandle<D::Connection>) -> ReleaseStatus {
        let key = handle.key().clone();

        if handle.pool_id != self.id {
            error!(
                "Pool: {} was leased from another pool, ignoring release",
                handle.client
            );
            return ReleaseStatus::Inconsistent;
        }

        let slot = self.registry().slots.get(&key).cloned();
        let Some(slot) = slot else {
            if self.is_shut_down() {
                debug!("Pool: {} released after shutdown", handle.client);
                return ReleaseStatus::ShutDown;
            }
            error!("Pool: unknown client {} for {}", handle.client, key);
            return ReleaseStatus::Inconsistent;
        };

        let mut guard = slot.lock().await;
        let remaining = match guard.record.as_mut() {
            Some(record) if Arc::ptr_eq(&record.client, &handle.client) => record
                .leases
                .remove(&handle.lease)
                .then(|| record.leases.len()),
            _ => None,
        };
        let Some(refcount) = remaining else {
            if guard.retired && self.is_shut_down() {
                debug!("Pool: {} released after shutdown", handle.client);
                return ReleaseStatus::ShutDown;
            }
            error!(
                "Pool: unknown lease {} for {}, ignoring release",
                handle.lease, handle.client
            );
            return ReleaseStatus::Inconsistent;
        };
        debug!("Pool.release: {} refcount = {}", handle.client, refcount);

        if refcount > 0 {
            return ReleaseStatus::Retained { refcount };
        }

        let Some(record) = guard.record.take() else {
            return ReleaseStatus::Inconsistent;
        };
        guard.retired = true;
        self.unlink(&key, &slot);
        drop(guard);

        if record.client.close().await {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
        info!("Pool: removed connection {} for {}", record.client, key);
        ReleaseStatus::Closed
    }

    /// Number of live leases for `key`; zero when no record exists.
    pub async fn refcount(&self, key: &PoolKey) -> usize {
        let slot = self.registry().slots.get(key).cloned();
        match slot {
            Some(slot) => slot
                .lock()
                .await
                .record
                .as_ref()
                .map(|r| r.leases.len())
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Number of records currently holding an open connection.
    pub async fn live_connections(&self) -> usize {
        let slots: Vec<_> = self.registry().slots.values().cloned().collect();
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.record.is_some() {
                live += 1;
            }
        }
        live
    }

    pub fn stats(&self) -> PoolStats {
        let opened = self.opened.load(Ordering::Relaxed);
        let closed = self.closed.load(Ordering::Relaxed);
        PoolStats {
            opened,
            closed,
            live: opened.saturating_sub(closed),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Refuse further acquires and force-close every remaining record.
    ///
    /// Returns how many connections were closed here. Clients closed this way
    /// report later requests as interrupted and their handles release as
    /// [`ReleaseStatus::ShutDown`].
    pub async fn shutdown(&self) -> usize {
        let slots: Vec<(PoolKey, SlotRef<D::Connection>)> = {
            let mut registry = self.registry();
            registry.shut_down = true;
            self.shut_down.store(true, Ordering::Release);
            registry.slots.drain().collect()
        };

        let mut force_closed = 0;
        for (key, slot) in slots {
            let mut guard = slot.lock().await;
            guard.retired = true;
            let Some(record) = guard.record.take() else {
                continue;
            };
            drop(guard);

            if !record.leases.is_empty() {
                warn!(
                    "Pool: force-closing {} for {} with {} outstanding lease(s)",
                    record.client,
                    key,
                    record.leases.len()
                );
            }
            if record.client.close().await {
                self.closed.fetch_add(1, Ordering::Relaxed);
                force_closed += 1;
            }
        }

        info!("Pool: shut down, {} connection(s) force-closed", force_closed);
        force_closed
    }

    fn registry(&self) -> MutexGuard<'_, Registry<D::Connection>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_for(&self, key: &PoolKey) -> Result<SlotRef<D::Connection>, PoolError> {
        let mut registry = self.registry();
        if registry.shut_down {
            return Err(PoolError::ShutDown);
        }
        let slot = registry.slots.entry(key.clone()).or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(Slot {
                record: None,
                retired: false,
            }))
        });
        Ok(Arc::clone(slot))
    }

    fn unlink(&self, key: &PoolKey, slot: &SlotRef<D::Connection>) {
        let mut registry = self.registry();
        if registry
            .slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            registry.slots.remove(key);
        }
    }
}
