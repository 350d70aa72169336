//! Function state access.
//!
//! The bridge lazily constructs a single process-wide state storage client on first use. The
//! client is namespace-agnostic; namespaces & tables are addressed per call.

use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};

use crate::cleaner::TableAdmin;
use crate::config::Config;
use crate::database::{Database, StorageResult};
use crate::error::{AppError, AppResult};
use crate::models::KvRecord;
use crate::utils;
use mesh_core::descriptor::{ComponentKind, JobIdentity};

/// The client name used when connecting to the state storage service.
pub const STATE_CLIENT_NAME: &str = "functions-admin";
/// The error message returned while no state storage client is available.
pub const ERR_STATE_UNAVAILABLE: &str = "State storage client is not done initializing. Please try again in a little while.";

/// A client of the state storage service.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Get the record stored under the given key, `None` if the key is absent.
    async fn get(&self, namespace: &str, table: &str, key: &str) -> StorageResult<Option<KvRecord>>;

    /// Write the given bytes under the given key, returning the new record.
    async fn put(&self, namespace: &str, table: &str, key: &str, value: Vec<u8>) -> StorageResult<KvRecord>;

    /// Delete a table along with all of its data.
    async fn delete_table(&self, namespace: &str, table: &str) -> StorageResult<()>;
}

/// A factory of state storage clients.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    /// Connect a new client under the given client name.
    async fn connect(&self, client_name: &str) -> Result<Arc<dyn StorageClient>>;
}

/// A connector which opens the sled table store found at the configured storage location.
///
/// sled holds an exclusive lock on its path, so the store is opened once and every connect hands
/// out a handle to the same database.
pub struct SledConnector {
    config: Arc<Config>,
    db: OnceCell<Database>,
}

impl SledConnector {
    /// Create a new instance.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Get a handle to the table store, opening it on first use.
    pub async fn database(&self) -> Result<Database> {
        let db = self
            .db
            .get_or_try_init(|| async {
                tracing::info!(url = ?self.config.state_storage_service_url, "opening state storage");
                Database::new(self.config.clone()).await
            })
            .await?;
        Ok(db.clone())
    }
}

#[async_trait]
impl StorageConnector for SledConnector {
    async fn connect(&self, client_name: &str) -> Result<Arc<dyn StorageClient>> {
        tracing::debug!(client_name, "connecting state storage client");
        Ok(Arc::new(self.database().await?))
    }
}

/// A typed function state value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StateValue {
    Number(i64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A function state entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateEntry {
    pub key: String,
    pub value: StateValue,
    pub version: u64,
}

impl StateEntry {
    /// Decode the given stored record.
    ///
    /// Numbers are decoded when the store flags the record as numeric, else the value is decoded
    /// as UTF-8, falling back to raw bytes.
    pub fn decode(key: String, record: KvRecord) -> AppResult<Self> {
        let value = if record.is_number {
            StateValue::Number(utils::decode_i64(&record.value).map_err(AppError::Ise)?)
        } else {
            match String::from_utf8(record.value) {
                Ok(text) => StateValue::Text(text),
                Err(err) => StateValue::Bytes(err.into_bytes()),
            }
        };
        Ok(Self {
            key,
            value,
            version: record.version,
        })
    }
}

struct StateClient(Arc<dyn StorageClient>);

/// The process-wide bridge to the state storage service.
pub struct StateStoreBridge {
    connector: Option<Arc<dyn StorageConnector>>,
    client: ArcSwapOption<StateClient>,
    /// Serializes client construction, so that at most one connect is in flight.
    connecting: Mutex<()>,
}

impl StateStoreBridge {
    /// Create a new instance.
    ///
    /// Without a connector, every operation reports the state store as unavailable.
    pub fn new(connector: Option<Arc<dyn StorageConnector>>) -> Self {
        Self {
            connector,
            client: ArcSwapOption::empty(),
            connecting: Mutex::new(()),
        }
    }

    /// Get the state stored under the given key of a function.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get(&self, kind: ComponentKind, tenant: &str, namespace: &str, name: &str, key: &str) -> AppResult<StateEntry> {
        let identity = validate(kind, tenant, namespace, name, key)?;
        let client = self.client().await?;
        let record = client
            .0
            .get(&identity.state_namespace(), &identity.name, key)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("key '{}' doesn't exist.", key)))?;
        StateEntry::decode(key.to_string(), record)
    }

    /// Write the given state under the given key of a function.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub async fn put(&self, kind: ComponentKind, tenant: &str, namespace: &str, name: &str, key: &str, value: StateValue) -> AppResult<()> {
        let identity = validate(kind, tenant, namespace, name, key)?;
        let bytes = match value {
            StateValue::Text(text) => text.into_bytes(),
            StateValue::Bytes(bytes) => bytes,
            StateValue::Number(_) => return Err(AppError::InvalidInput("numeric state can not be written directly".into())),
        };
        let client = self.client().await?;
        let record = client
            .0
            .put(&identity.state_namespace(), &identity.name, key, bytes)
            .await
            .map_err(AppError::from)?;
        tracing::debug!(%identity, key, version = record.version, "function state written");
        Ok(())
    }

    /// Drop the installed client, if any.
    pub fn reset(&self) {
        self.client.store(None);
    }

    /// Get the installed client, constructing & installing one if needed.
    ///
    /// Construction is single-flight: callers arriving while a connect is in flight wait for it,
    /// then use the client it installed.
    async fn client(&self) -> AppResult<Arc<StateClient>> {
        if let Some(client) = self.client.load_full() {
            return Ok(client);
        }
        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| AppError::Unavailable(ERR_STATE_UNAVAILABLE.into()))?;
        let _connecting = self.connecting.lock().await;
        if let Some(client) = self.client.load_full() {
            return Ok(client);
        }
        let candidate = match connector.connect(STATE_CLIENT_NAME).await {
            Ok(client) => Arc::new(StateClient(client)),
            Err(err) => {
                tracing::error!(error = ?err, "error creating state storage client");
                return Err(AppError::Unavailable(ERR_STATE_UNAVAILABLE.into()));
            }
        };
        let prev = self.client.compare_and_swap(&None::<Arc<StateClient>>, Some(candidate.clone()));
        match &*prev {
            Some(installed) => Ok(installed.clone()),
            None => Ok(candidate),
        }
    }
}

#[async_trait]
impl TableAdmin for StateStoreBridge {
    async fn delete_table(&self, namespace: &str, table: &str) -> AppResult<()> {
        let client = self.client().await?;
        client.0.delete_table(namespace, table).await.map_err(AppError::from)
    }
}

fn validate(kind: ComponentKind, tenant: &str, namespace: &str, name: &str, key: &str) -> AppResult<JobIdentity> {
    let identity = JobIdentity::new(tenant, namespace, name);
    identity.validate(kind)?;
    if key.is_empty() {
        return Err(AppError::InvalidInput("Key is not provided".into()));
    }
    Ok(identity)
}
