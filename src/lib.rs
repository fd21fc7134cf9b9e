//! SQL-backed blob metadata store for an Azure Blob Storage emulator.
//!
//! This crate maintains the authoritative state of accounts' service
//! properties, containers, blobs (including snapshots), and staged or
//! committed blocks, and enforces the lease protocol that gates mutating
//! operations. Payload bytes live in an external extent store; metadata rows
//! only carry opaque chunk references.
//!
//! # Example
//!
//! ```no_run
//! use azurite_sql_rs::{Context, DbConfig, SqlBlobMetadataStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SqlBlobMetadataStore::connect(DbConfig::from_env().unwrap())
//!         .await
//!         .unwrap();
//!     store.init().await.unwrap();
//!
//!     let ctx = Context::new(chrono::Utc::now());
//!     let containers = store
//!         .list_containers(&ctx, "devstoreaccount1", None, None, None)
//!         .await
//!         .unwrap();
//!     println!("{} containers", containers.0.len());
//! }
//! ```

pub mod config;
pub mod context;
pub mod cors;
pub mod error;
pub mod lease;
pub mod models;
pub mod store;

// Re-exports for convenience
pub use config::{DbConfig, DbDialect};
pub use context::Context;
pub use error::{ErrorCode, StorageError, StorageResult};
pub use lease::{Lease, LeaseAccessConditions, LeaseDurationType, LeaseState, LeaseStatus};
pub use store::{
    DeleteBlobOptions, ReferredExtentsIterator, SqlBlobMetadataStore, DEFAULT_EXTENT_PAGE_SIZE,
};
