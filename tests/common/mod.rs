//! Shared test fixtures: a throwaway SQLite-backed store and deterministic
//! logical clocks.

#![allow(dead_code)]

use azurite_sql_rs::models::{BlobModel, BlobType, BlockModel, ContainerModel, ExtentChunk};
use azurite_sql_rs::{Context, DbConfig, SqlBlobMetadataStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

pub const ACCOUNT: &str = "devstoreaccount1";

pub struct TestStore {
    pub store: SqlBlobMetadataStore,
    // Keeps the database directory alive for the duration of the test.
    _dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.db");
        let store = SqlBlobMetadataStore::connect(DbConfig::sqlite(path.to_str().unwrap()))
            .await
            .unwrap();
        store.init().await.unwrap();
        Self { store, _dir: dir }
    }
}

/// Base instant every test clock is offset from.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 27, 12, 0, 0).unwrap()
}

/// Context whose logical clock is `base_time() + secs`.
pub fn ctx_at(secs: i64) -> Context {
    Context::new(base_time() + Duration::seconds(secs))
}

pub fn container(name: &str, at: i64) -> ContainerModel {
    ContainerModel::new(ACCOUNT, name, base_time() + Duration::seconds(at))
}

/// A committed block blob model ready for `create_blob`.
pub fn committed_block_blob(container: &str, name: &str, at: i64) -> BlobModel {
    let mut blob = BlobModel::new(
        ACCOUNT,
        container,
        name,
        BlobType::BlockBlob,
        base_time() + Duration::seconds(at),
    );
    blob.is_committed = true;
    blob
}

/// A fresh opaque chunk reference of the given size.
pub fn chunk(size: u64) -> ExtentChunk {
    ExtentChunk::new(Uuid::new_v4().to_string(), 0, size)
}

pub fn staged_block(container: &str, blob: &str, block_name: &str, size: u64) -> BlockModel {
    BlockModel::new(ACCOUNT, container, blob, block_name, size, chunk(size))
}
