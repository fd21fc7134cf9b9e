//! SQL-backed metadata store for containers, blobs, and blocks.
//!
//! Every mutating operation runs inside a single backing-store transaction:
//! look up the target rows (container existence first), project the embedded
//! lease against the operation's logical clock, validate access conditions,
//! compute the new state, persist, commit.

mod blob;
mod block;
mod container;
mod extents;
mod schema;
mod service;

pub use blob::DeleteBlobOptions;
pub use extents::{ReferredExtentsIterator, DEFAULT_EXTENT_PAGE_SIZE};

use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Transaction};
use tracing::debug;

use crate::config::{DbConfig, DbDialect};
use crate::context::Context;
use crate::error::{ErrorCode, StorageError, StorageResult};

/// SQL-backed blob metadata store.
///
/// The connection pool and schema are process-wide; `init` is idempotent
/// with respect to schema creation, and `close` drains the pool and marks
/// the store closed.
pub struct SqlBlobMetadataStore {
    pool: AnyPool,
    dialect: DbDialect,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl SqlBlobMetadataStore {
    /// Connects to the backing database described by `config`.
    pub async fn connect(config: DbConfig) -> StorageResult<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(32)
            .connect(&config.uri)
            .await?;
        debug!(dialect = config.dialect.as_str(), "connected to metadata database");
        Ok(Self {
            pool,
            dialect: config.dialect,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Synchronizes the schema. Idempotent; must be called before the first
    /// operation.
    pub async fn init(&self) -> StorageResult<()> {
        self.check_open()?;
        schema::synchronize(&self.pool, self.dialect).await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drains the connection pool and marks the store closed. Subsequent
    /// calls fail.
    pub async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StorageError::with_message(
                ErrorCode::InvalidOperation,
                "metadata store is already closed",
            ));
        }
        self.pool.close().await;
        Ok(())
    }

    pub(crate) fn check_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::with_message(
                ErrorCode::InvalidOperation,
                "metadata store is closed",
            ))
        } else {
            Ok(())
        }
    }

    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub(crate) async fn begin(&self) -> StorageResult<Transaction<'static, Any>> {
        self.check_open()?;
        Ok(self.pool.begin().await?)
    }
}

/// Attaches the operation's request id to an error surfaced to the caller.
pub(crate) fn tag_request<T>(result: StorageResult<T>, ctx: &Context) -> StorageResult<T> {
    result.map_err(|err| match err.request_id {
        Some(_) => err,
        None => err.with_request_id(ctx.request_id.clone()),
    })
}

/// Serializes an optional nested value into a JSON text column.
pub(crate) fn json_opt<T: Serialize>(value: &Option<T>) -> StorageResult<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(Into::into))
        .transpose()
}

/// Serializes a nested value into a JSON text column.
pub(crate) fn json_text<T: Serialize>(value: &T) -> StorageResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Restores an optional nested value from a JSON text column.
pub(crate) fn parse_json_opt<T: DeserializeOwned>(text: Option<String>) -> StorageResult<Option<T>> {
    text.filter(|t| !t.is_empty())
        .map(|t| serde_json::from_str(&t).map_err(Into::into))
        .transpose()
}

/// Parses a required TEXT datetime column.
pub(crate) fn parse_time_col(text: String) -> StorageResult<chrono::DateTime<chrono::Utc>> {
    crate::context::parse_db_time(&text).ok_or_else(|| {
        StorageError::with_message(
            ErrorCode::InternalError,
            format!("invalid timestamp in metadata row: {text}"),
        )
    })
}

/// Parses an optional TEXT datetime column.
pub(crate) fn parse_time_col_opt(
    text: Option<String>,
) -> StorageResult<Option<chrono::DateTime<chrono::Utc>>> {
    text.filter(|t| !t.is_empty()).map(parse_time_col).transpose()
}
