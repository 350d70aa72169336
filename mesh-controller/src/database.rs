//! Database management.
//!
//! The table store keeps every table of a state namespace in its own sled tree, named
//! `tables/{namespace}/{table}`. A registry tree tracks which namespaces & tables exist, so that
//! absent namespaces can be told apart from absent tables and absent keys.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sled::{Config as SledConfig, Db, IVec};
use thiserror::Error;

use crate::config::Config;
use crate::error::{AppError, ShutdownError, ShutdownResult};
use crate::models::KvRecord;
use crate::state::StorageClient;
use crate::utils;

pub type Tree = sled::Tree;

/// The DB tree used to register namespaces & tables.
const TREE_REGISTRY: &str = "registry";
/// The DB tree prefix used for tables.
const TREE_TABLE_PREFIX: &str = "tables";
/// The registry key prefix of namespaces.
const PREFIX_NAMESPACE: &str = "ns/";
/// The registry key prefix of tables.
const PREFIX_TABLE: &str = "table/";
/// The URL scheme accepted in front of a storage path.
const FILE_SCHEME: &str = "file://";

/// Errors returned by the table store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The target namespace has never been created.
    #[error("namespace '{0}' is not found")]
    NamespaceNotFound(String),
    /// The target table does not exist in its namespace.
    #[error("stream '{0}' is not found")]
    StreamNotFound(String),
    /// The namespace or table being created already exists.
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    /// Any other storage failure.
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ShutdownError> for StorageError {
    fn from(err: ShutdownError) -> Self {
        Self::Internal(err.0)
    }
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        Self::Internal(anyhow::Error::from(err))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NamespaceNotFound(_) | StorageError::StreamNotFound(_) => AppError::NotFound(err.to_string()),
            StorageError::AlreadyExists(name) => AppError::Conflict(name),
            StorageError::Internal(err) => AppError::Ise(err),
        }
    }
}

/// A result type used by the table store.
pub type StorageResult<T> = ::std::result::Result<T, StorageError>;

/// An abstraction over the table store database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    /// The underlying DB handle.
    db: Db,
    /// The registry of namespaces & tables.
    registry: Tree,
}

impl Database {
    /// Open the database at the configured state storage location.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let url = config
            .state_storage_service_url
            .as_deref()
            .context("no state storage service URL is configured")?;
        let dbpath = PathBuf::from(url.strip_prefix(FILE_SCHEME).unwrap_or(url));
        tokio::fs::create_dir_all(&dbpath)
            .await
            .context("error creating dir for state storage database")?;

        Self::spawn_blocking(move || -> Result<Self> {
            let db = SledConfig::new().path(dbpath).mode(sled::Mode::HighThroughput).open()?;
            let registry = db.open_tree(TREE_REGISTRY)?;
            let inner = Arc::new(DatabaseInner { db, registry });
            Ok(Self { inner })
        })
        .await?
    }

    /// Spawn a blocking database-related function, returning a ShutdownError if anything goes
    /// wrong related to spawning & joining.
    #[tracing::instrument(level = "trace", skip(f), err)]
    pub async fn spawn_blocking<F, R>(f: F) -> ShutdownResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|err| ShutdownError::from(anyhow::Error::from(err)))
    }

    /// Create a new namespace.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn create_namespace(&self, namespace: &str) -> StorageResult<()> {
        let (registry, key, namespace) = (self.inner.registry.clone(), namespace_key(namespace), namespace.to_string());
        Self::spawn_blocking(move || -> StorageResult<()> {
            match registry.compare_and_swap(key, None as Option<&[u8]>, Some(&[] as &[u8]))? {
                Ok(()) => Ok(()),
                Err(_) => Err(StorageError::AlreadyExists(namespace)),
            }
        })
        .await?
    }

    /// Create a new table in the given namespace.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn create_table(&self, namespace: &str, table: &str) -> StorageResult<()> {
        let registry = self.inner.registry.clone();
        let (namespace, table) = (namespace.to_string(), table.to_string());
        Self::spawn_blocking(move || -> StorageResult<()> {
            if !registry.contains_key(namespace_key(&namespace))? {
                return Err(StorageError::NamespaceNotFound(namespace));
            }
            match registry.compare_and_swap(table_key(&namespace, &table), None as Option<&[u8]>, Some(&[] as &[u8]))? {
                Ok(()) => Ok(()),
                Err(_) => Err(StorageError::AlreadyExists(format!("{}/{}", namespace, table))),
            }
        })
        .await?
    }

    /// Delete a table along with all of its data.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_table(&self, namespace: &str, table: &str) -> StorageResult<()> {
        self.ensure_table(namespace, table).await?;
        let (db, registry) = (self.inner.db.clone(), self.inner.registry.clone());
        let (key, tree_name) = (table_key(namespace, table), table_tree_name(namespace, table));
        Self::spawn_blocking(move || -> StorageResult<()> {
            registry.remove(key)?;
            db.drop_tree(IVec::from(tree_name.as_str()))?;
            Ok(())
        })
        .await?
    }

    /// Get a handle to the DB tree of a table, which must already exist.
    pub async fn get_table_tree(&self, namespace: &str, table: &str) -> StorageResult<Tree> {
        self.ensure_table(namespace, table).await?;
        let name = table_tree_name(namespace, table);
        let (db, ivname) = (self.inner.db.clone(), IVec::from(name.as_str()));
        let tree = Self::spawn_blocking(move || -> Result<Tree> { Ok(db.open_tree(ivname)?) })
            .await
            .and_then(|res| res.map_err(|err| ShutdownError(anyhow!("could not open DB tree {} {}", &name, err))))?;
        Ok(tree)
    }

    /// Get the record stored under the given key.
    pub async fn get(&self, namespace: &str, table: &str, key: &str) -> StorageResult<Option<KvRecord>> {
        let tree = self.get_table_tree(namespace, table).await?;
        let key = key.to_string();
        Self::spawn_blocking(move || -> StorageResult<Option<KvRecord>> {
            match tree.get(key.as_bytes())? {
                Some(bytes) => Ok(Some(utils::decode_model(&bytes)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    /// Write the given bytes under the given key, returning the new record.
    pub async fn put(&self, namespace: &str, table: &str, key: &str, value: Vec<u8>) -> StorageResult<KvRecord> {
        let tree = self.get_table_tree(namespace, table).await?;
        let key = key.to_string();
        Self::spawn_blocking(move || write_record(&tree, &key, |_| Ok((value.clone(), false)))).await?
    }

    /// Increment the counter stored under the given key, returning the new record.
    pub async fn incr(&self, namespace: &str, table: &str, key: &str, amount: i64) -> StorageResult<KvRecord> {
        let tree = self.get_table_tree(namespace, table).await?;
        let key = key.to_string();
        Self::spawn_blocking(move || {
            write_record(&tree, &key, |current| {
                let base = match current {
                    Some(record) if record.is_number => utils::decode_i64(&record.value)?,
                    Some(_) => return Err(anyhow!("value of key '{}' is not a number", key)),
                    None => 0,
                };
                Ok((utils::encode_i64(base.wrapping_add(amount)).to_vec(), true))
            })
        })
        .await?
    }

    async fn ensure_table(&self, namespace: &str, table: &str) -> StorageResult<()> {
        let registry = self.inner.registry.clone();
        let (namespace, table) = (namespace.to_string(), table.to_string());
        Self::spawn_blocking(move || -> StorageResult<()> {
            if !registry.contains_key(namespace_key(&namespace))? {
                return Err(StorageError::NamespaceNotFound(namespace));
            }
            if !registry.contains_key(table_key(&namespace, &table))? {
                return Err(StorageError::StreamNotFound(format!("{}/{}", namespace, table)));
            }
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl StorageClient for Database {
    async fn get(&self, namespace: &str, table: &str, key: &str) -> StorageResult<Option<KvRecord>> {
        Database::get(self, namespace, table, key).await
    }

    async fn put(&self, namespace: &str, table: &str, key: &str, value: Vec<u8>) -> StorageResult<KvRecord> {
        Database::put(self, namespace, table, key, value).await
    }

    async fn delete_table(&self, namespace: &str, table: &str) -> StorageResult<()> {
        Database::delete_table(self, namespace, table).await
    }
}

/// Write a new record under the given key, bumping its version atomically.
///
/// The given function computes the new value & number flag from the current record, and may be
/// invoked more than once under contention.
fn write_record<F>(tree: &Tree, key: &str, f: F) -> StorageResult<KvRecord>
where
    F: Fn(Option<&KvRecord>) -> Result<(Vec<u8>, bool)>,
{
    loop {
        let current = tree.get(key.as_bytes())?;
        let current_record = match &current {
            Some(bytes) => Some(utils::decode_model::<KvRecord>(bytes)?),
            None => None,
        };
        let (value, is_number) = f(current_record.as_ref())?;
        let record = KvRecord {
            value,
            version: current_record.map(|rec| rec.version + 1).unwrap_or(0),
            is_number,
        };
        let encoded = utils::encode_model(&record)?;
        match tree.compare_and_swap(key.as_bytes(), current, Some(encoded))? {
            Ok(()) => return Ok(record),
            Err(_) => continue,
        }
    }
}

fn namespace_key(namespace: &str) -> String {
    format!("{}{}", PREFIX_NAMESPACE, namespace)
}

fn table_key(namespace: &str, table: &str) -> String {
    format!("{}{}/{}", PREFIX_TABLE, namespace, table)
}

fn table_tree_name(namespace: &str, table: &str) -> String {
    format!("{}/{}/{}", TREE_TABLE_PREFIX, namespace, table)
}
