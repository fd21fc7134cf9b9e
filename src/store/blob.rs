//! Blob operations.

use std::collections::HashMap;

use sqlx::{Any, Row, Transaction};
use tracing::instrument;

use crate::context::{format_db_time, format_snapshot_time, Context};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::lease::{Lease, LeaseAccessConditions, LeaseDurationType, LeaseState, LeaseStatus};
use crate::models::new_etag;
use crate::models::{
    AccessTier, BlobHttpHeaders, BlobModel, BlobType, ContentProperties, DeleteSnapshotsOption,
    ExtentChunk, PersistencyBlock,
};

use super::container::assert_container_exists;
use super::{
    json_opt, json_text, parse_json_opt, parse_time_col, parse_time_col_opt, tag_request,
    SqlBlobMetadataStore,
};

/// Default page size for `list_blobs`.
pub(crate) const DEFAULT_LIST_BLOBS_MAX_RESULTS: u32 = 5000;

const BLOB_COLUMNS: &str = "blobId, accountName, containerName, blobName, snapshot, deleting, \
     blobType, isCommitted, creationTime, lastModified, etag, contentProperties, accessTier, \
     accessTierInferred, accessTierChangeTime, blobSequenceNumber, leaseId, leaseStatus, \
     leaseState, leaseDurationType, leaseDurationSeconds, leaseExpireTime, leaseBreakTime, \
     persistency, committedBlocksInOrder, metadata";

/// Options for `delete_blob`.
#[derive(Debug, Clone, Default)]
pub struct DeleteBlobOptions {
    /// Snapshot to target; empty targets the base blob.
    pub snapshot: String,
    /// How snapshots are treated when targeting the base blob.
    pub delete_snapshots: Option<DeleteSnapshotsOption>,
    pub conditions: LeaseAccessConditions,
}

impl SqlBlobMetadataStore {
    /// Creates or overwrites a blob. Overwriting an existing blob is gated
    /// by its lease and rejected while the blob sits in the archive tier.
    #[instrument(skip_all, fields(account = %blob.account, container = %blob.container, blob = %blob.name))]
    pub async fn create_blob(
        &self,
        ctx: &Context,
        blob: BlobModel,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, &blob.account, &blob.container).await?;

            let existing =
                find_blob(&mut tx, &blob.account, &blob.container, &blob.name, &blob.snapshot)
                    .await?;

            let mut blob = blob;
            match existing {
                Some(existing) => {
                    let lease = existing.lease.clone().project(ctx.start_time);
                    lease.check_write(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;
                    if existing.access_tier == Some(AccessTier::Archive) {
                        return Err(StorageError::new(ErrorCode::BlobArchived));
                    }
                    blob.blob_id = existing.blob_id;
                    update_blob(&mut tx, &blob).await?;
                }
                None => {
                    blob.blob_id = insert_blob(&mut tx, &blob).await?;
                }
            }

            tx.commit().await?;
            Ok(blob)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Returns the full record of a live committed blob for download.
    pub async fn download_blob(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let result = self
            .load_committed_blob(ctx, account, container, blob, snapshot, conditions)
            .await;
        tag_request(result, ctx)
    }

    /// Returns the properties of a live committed blob.
    pub async fn get_blob_properties(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let result = self
            .load_committed_blob(ctx, account, container, blob, snapshot, conditions)
            .await;
        tag_request(result, ctx)
    }

    /// Pure lookup of a blob's type and commit flag.
    pub async fn get_blob_type(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
    ) -> StorageResult<Option<(BlobType, bool)>> {
        let result = async {
            self.check_open()?;
            let row = sqlx::query(
                "SELECT blobType, isCommitted FROM Blobs WHERE accountName = ? AND \
                 containerName = ? AND blobName = ? AND snapshot = ? AND deleting = 0",
            )
            .bind(account)
            .bind(container)
            .bind(blob)
            .bind(snapshot)
            .fetch_optional(self.pool())
            .await?;

            row.map(|row| {
                let blob_type: String = row.try_get("blobType")?;
                let blob_type = BlobType::parse(&blob_type).ok_or_else(|| {
                    StorageError::with_message(
                        ErrorCode::InternalError,
                        format!("invalid blob type in metadata row: {blob_type}"),
                    )
                })?;
                Ok::<_, StorageError>((blob_type, row.try_get::<i64, _>("isCommitted")? != 0))
            })
            .transpose()
        }
        .await;
        tag_request(result, ctx)
    }

    /// Lists live blobs of a container ordered by name, optionally including
    /// snapshot rows. The returned marker is the last blob name of a full
    /// page with more rows behind it.
    pub async fn list_blobs(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        prefix: Option<&str>,
        max_results: Option<u32>,
        marker: Option<&str>,
        include_snapshots: bool,
    ) -> StorageResult<(Vec<BlobModel>, Option<String>)> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, account, container).await?;

            let max_results = max_results.unwrap_or(DEFAULT_LIST_BLOBS_MAX_RESULTS);

            let mut sql = format!(
                "SELECT {BLOB_COLUMNS} FROM Blobs \
                 WHERE accountName = ? AND containerName = ? AND deleting = 0"
            );
            if !include_snapshots {
                sql.push_str(" AND snapshot = ''");
            }
            if prefix.is_some() {
                sql.push_str(" AND blobName LIKE ?");
            }
            if marker.is_some() {
                sql.push_str(" AND blobName > ?");
            }
            sql.push_str(" ORDER BY blobName ASC, snapshot ASC LIMIT ?");

            let mut query = sqlx::query(&sql).bind(account).bind(container);
            if let Some(prefix) = prefix {
                query = query.bind(format!("{prefix}%"));
            }
            if let Some(marker) = marker {
                query = query.bind(marker);
            }
            // Over-fetch by one row to detect whether a marker is needed.
            let rows = query
                .bind(max_results as i64 + 1)
                .fetch_all(&mut *tx)
                .await?;
            tx.commit().await?;

            let mut blobs = rows
                .iter()
                .map(blob_from_row)
                .collect::<StorageResult<Vec<_>>>()?;

            let next_marker = if blobs.len() > max_results as usize {
                blobs.truncate(max_results as usize);
                blobs.last().map(|b| b.name.clone())
            } else {
                None
            };
            Ok((blobs, next_marker))
        }
        .await;
        tag_request(result, ctx)
    }

    /// Lists live blobs across every account and container, paged by
    /// surrogate id. Feeds the referenced-extent iterator.
    pub async fn list_all_blobs(
        &self,
        max_results: u32,
        marker: i64,
        include_snapshots: bool,
    ) -> StorageResult<(Vec<BlobModel>, Option<i64>)> {
        self.check_open()?;

        let mut sql =
            format!("SELECT {BLOB_COLUMNS} FROM Blobs WHERE deleting = 0 AND blobId > ?");
        if !include_snapshots {
            sql.push_str(" AND snapshot = ''");
        }
        sql.push_str(" ORDER BY blobId ASC LIMIT ?");

        let rows = sqlx::query(&sql)
            .bind(marker)
            .bind(max_results as i64)
            .fetch_all(self.pool())
            .await?;

        let blobs = rows
            .iter()
            .map(blob_from_row)
            .collect::<StorageResult<Vec<_>>>()?;

        let next_marker = if blobs.len() == max_results as usize {
            blobs.last().map(|b| b.blob_id)
        } else {
            None
        };
        Ok((blobs, next_marker))
    }

    /// Replaces a blob's HTTP content properties, stamping a fresh etag.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn set_blob_http_headers(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        headers: Option<BlobHttpHeaders>,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, account, container).await?;

            let mut model = find_blob(&mut tx, account, container, blob, "")
                .await?
                .filter(|b| b.is_committed)
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;

            let lease = model.lease.clone().project(ctx.start_time);
            lease.check_write(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;

            if let Some(headers) = headers {
                let length = model.content_properties.content_length;
                model.content_properties = ContentProperties {
                    content_length: length,
                    content_type: headers.content_type,
                    content_encoding: headers.content_encoding,
                    content_language: headers.content_language,
                    content_md5: headers.content_md5,
                    content_disposition: headers.content_disposition,
                    cache_control: headers.cache_control,
                };
            }
            model.last_modified = ctx.start_time;
            model.etag = new_etag();
            model.lease = lease.collapsed_after_write();

            update_blob(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Replaces a blob's user metadata.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn set_blob_metadata(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        metadata: HashMap<String, String>,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, account, container).await?;

            let mut model = find_blob(&mut tx, account, container, blob, "")
                .await?
                .filter(|b| b.is_committed)
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;

            let lease = model.lease.clone().project(ctx.start_time);
            lease.check_write(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;

            model.metadata = metadata;
            model.last_modified = ctx.start_time;
            model.etag = new_etag();
            model.lease = lease.collapsed_after_write();

            update_blob(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Clones the live blob into a read-only snapshot row addressed by the
    /// operation's start time. Returns the created snapshot.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn create_snapshot(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        metadata: Option<HashMap<String, String>>,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, account, container).await?;

            let model = find_blob(&mut tx, account, container, blob, "")
                .await?
                .filter(|b| b.is_committed)
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;

            let lease = model.lease.clone().project(ctx.start_time);
            lease.check_read(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;

            let mut snapshot = model.as_snapshot(format_snapshot_time(&ctx.start_time));
            if let Some(metadata) = metadata {
                snapshot.metadata = metadata;
            }
            snapshot.blob_id = insert_blob(&mut tx, &snapshot).await?;

            tx.commit().await?;
            Ok(snapshot)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Tombstones a blob, its snapshots, or both, along with any staged
    /// blocks. Physical removal is the external sweep's job.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn delete_blob(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        options: DeleteBlobOptions,
    ) -> StorageResult<()> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, account, container).await?;

            let model = find_blob(&mut tx, account, container, blob, &options.snapshot)
                .await?
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;

            let against_base_blob = model.is_base_blob();
            if against_base_blob {
                let lease = model.lease.clone().project(ctx.start_time);
                lease.check_write(&options.conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;
            }

            let snapshot_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM Blobs WHERE accountName = ? AND containerName = ? \
                 AND blobName = ? AND snapshot <> '' AND deleting = 0",
            )
            .bind(account)
            .bind(container)
            .bind(blob)
            .fetch_one(&mut *tx)
            .await?;

            match (against_base_blob, options.delete_snapshots) {
                (true, None) if snapshot_count > 0 => {
                    return Err(StorageError::new(ErrorCode::SnapshotsPresent));
                }
                (true, None) => {
                    tombstone_blob_rows(&mut tx, account, container, blob, Scope::BaseOnly).await?;
                    tombstone_blocks(&mut tx, account, container, blob).await?;
                }
                (true, Some(DeleteSnapshotsOption::Include)) => {
                    tombstone_blob_rows(&mut tx, account, container, blob, Scope::All).await?;
                    tombstone_blocks(&mut tx, account, container, blob).await?;
                }
                (true, Some(DeleteSnapshotsOption::Only)) => {
                    tombstone_blob_rows(&mut tx, account, container, blob, Scope::SnapshotsOnly)
                        .await?;
                }
                (false, Some(_)) => {
                    return Err(StorageError::new(ErrorCode::InvalidOperation));
                }
                (false, None) => {
                    tombstone_blob_rows(
                        &mut tx,
                        account,
                        container,
                        blob,
                        Scope::Snapshot(&options.snapshot),
                    )
                    .await?;
                }
            }

            tx.commit().await?;
            Ok(())
        }
        .await;
        tag_request(result, ctx)
    }

    /// Moves a block blob between access tiers. Returns 202 when the blob
    /// starts rehydrating out of the archive tier, 200 otherwise.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob, tier = tier.as_str()))]
    pub async fn set_tier(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        tier: AccessTier,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<u16> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, account, container).await?;

            let mut model = find_blob(&mut tx, account, container, blob, snapshot)
                .await?
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;

            if !model.is_base_blob() {
                return Err(StorageError::new(ErrorCode::BlobSnapshotsPresent));
            }
            if model.blob_type != BlobType::BlockBlob {
                return Err(StorageError::new(ErrorCode::InvalidBlobType));
            }

            let lease = model.lease.clone().project(ctx.start_time);
            lease.check_write(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;

            let status = if model.access_tier == Some(AccessTier::Archive)
                && tier != AccessTier::Archive
            {
                202
            } else {
                200
            };

            model.access_tier = Some(tier);
            model.access_tier_inferred = false;
            model.access_tier_change_time = Some(ctx.start_time);
            model.lease = lease.collapsed_after_write();

            update_blob(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(status)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Acquires a lease on the live blob.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn acquire_blob_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        duration: i64,
        proposed_lease_id: Option<&str>,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model =
                load_lease_target(&mut tx, account, container, blob, snapshot).await?;
            model.lease = model
                .lease
                .project(ctx.start_time)
                .acquire(ctx.start_time, duration, proposed_lease_id)?;
            persist_blob_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Releases a blob lease.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn release_blob_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        lease_id: &str,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model =
                load_lease_target(&mut tx, account, container, blob, snapshot).await?;
            model.lease = model.lease.project(ctx.start_time).release(lease_id)?;
            persist_blob_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Renews a blob lease.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn renew_blob_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        lease_id: &str,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model =
                load_lease_target(&mut tx, account, container, blob, snapshot).await?;
            model.lease = model
                .lease
                .project(ctx.start_time)
                .renew(ctx.start_time, lease_id)?;
            persist_blob_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Breaks a blob lease; returns the blob and the remaining break time in
    /// seconds.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn break_blob_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        break_period: Option<i64>,
    ) -> StorageResult<(BlobModel, i64)> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model =
                load_lease_target(&mut tx, account, container, blob, snapshot).await?;
            let (lease, lease_time) = model
                .lease
                .project(ctx.start_time)
                .break_lease(ctx.start_time, break_period)?;
            model.lease = lease;
            persist_blob_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok((model, lease_time))
        }
        .await;
        tag_request(result, ctx)
    }

    /// Changes the id of an active blob lease.
    #[instrument(skip_all, fields(account = %account, container = %container, blob = %blob))]
    pub async fn change_blob_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        lease_id: &str,
        proposed_lease_id: &str,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model =
                load_lease_target(&mut tx, account, container, blob, snapshot).await?;
            model.lease = model
                .lease
                .project(ctx.start_time)
                .change(lease_id, proposed_lease_id)?;
            persist_blob_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    // Declared but not implemented operations; none of them mutates state.

    pub async fn copy_from_url(
        &self,
        ctx: &Context,
        _source: &str,
        _account: &str,
        _container: &str,
        _blob: &str,
    ) -> StorageResult<()> {
        tag_request(Err(StorageError::new(ErrorCode::NotImplemented)), ctx)
    }

    pub async fn undelete_blob(
        &self,
        ctx: &Context,
        _account: &str,
        _container: &str,
        _blob: &str,
    ) -> StorageResult<()> {
        tag_request(Err(StorageError::new(ErrorCode::NotImplemented)), ctx)
    }

    pub async fn upload_pages(
        &self,
        ctx: &Context,
        _account: &str,
        _container: &str,
        _blob: &str,
        _start: u64,
        _end: u64,
        _persistency: Option<ExtentChunk>,
    ) -> StorageResult<()> {
        tag_request(Err(StorageError::new(ErrorCode::NotImplemented)), ctx)
    }

    pub async fn clear_pages(
        &self,
        ctx: &Context,
        _account: &str,
        _container: &str,
        _blob: &str,
        _start: u64,
        _end: u64,
    ) -> StorageResult<()> {
        tag_request(Err(StorageError::new(ErrorCode::NotImplemented)), ctx)
    }

    pub async fn get_page_ranges(
        &self,
        ctx: &Context,
        _account: &str,
        _container: &str,
        _blob: &str,
    ) -> StorageResult<()> {
        tag_request(Err(StorageError::new(ErrorCode::NotImplemented)), ctx)
    }

    pub async fn resize_page_blob(
        &self,
        ctx: &Context,
        _account: &str,
        _container: &str,
        _blob: &str,
        _size: u64,
    ) -> StorageResult<()> {
        tag_request(Err(StorageError::new(ErrorCode::NotImplemented)), ctx)
    }

    pub async fn update_sequence_number(
        &self,
        ctx: &Context,
        _account: &str,
        _container: &str,
        _blob: &str,
        _sequence_number: i64,
    ) -> StorageResult<()> {
        tag_request(Err(StorageError::new(ErrorCode::NotImplemented)), ctx)
    }

    async fn load_committed_blob(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        snapshot: &str,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let mut tx = self.begin().await?;
        assert_container_exists(&mut tx, account, container).await?;

        let mut model = find_blob(&mut tx, account, container, blob, snapshot)
            .await?
            .filter(|b| b.is_committed)
            .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;
        tx.commit().await?;

        model.lease = model.lease.project(ctx.start_time);
        model
            .lease
            .check_read(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;
        Ok(model)
    }
}

/// Scope of a blob tombstoning statement.
enum Scope<'a> {
    BaseOnly,
    SnapshotsOnly,
    All,
    Snapshot(&'a str),
}

async fn tombstone_blob_rows(
    tx: &mut Transaction<'static, Any>,
    account: &str,
    container: &str,
    blob: &str,
    scope: Scope<'_>,
) -> StorageResult<()> {
    let mut sql = String::from(
        "UPDATE Blobs SET deleting = deleting + 1 \
         WHERE accountName = ? AND containerName = ? AND blobName = ? AND deleting = 0",
    );
    match scope {
        Scope::BaseOnly => sql.push_str(" AND snapshot = ''"),
        Scope::SnapshotsOnly => sql.push_str(" AND snapshot <> ''"),
        Scope::All => {}
        Scope::Snapshot(_) => sql.push_str(" AND snapshot = ?"),
    }

    let mut query = sqlx::query(&sql).bind(account).bind(container).bind(blob);
    if let Scope::Snapshot(snapshot) = scope {
        query = query.bind(snapshot);
    }
    query.execute(&mut **tx).await?;
    Ok(())
}

pub(crate) async fn tombstone_blocks(
    tx: &mut Transaction<'static, Any>,
    account: &str,
    container: &str,
    blob: &str,
) -> StorageResult<()> {
    sqlx::query(
        "UPDATE Blocks SET deleting = deleting + 1 \
         WHERE accountName = ? AND containerName = ? AND blobName = ?",
    )
    .bind(account)
    .bind(container)
    .bind(blob)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Loads the target of a blob lease operation. Lease operations address the
/// live blob; a snapshot target is rejected.
async fn load_lease_target(
    tx: &mut Transaction<'static, Any>,
    account: &str,
    container: &str,
    blob: &str,
    snapshot: &str,
) -> StorageResult<BlobModel> {
    assert_container_exists(tx, account, container).await?;
    if !snapshot.is_empty() {
        return Err(StorageError::new(ErrorCode::BlobSnapshotsPresent));
    }
    find_blob(tx, account, container, blob, "")
        .await?
        .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))
}

/// Looks up the live row for `(blob, snapshot)` inside a transaction.
pub(crate) async fn find_blob(
    tx: &mut Transaction<'static, Any>,
    account: &str,
    container: &str,
    blob: &str,
    snapshot: &str,
) -> StorageResult<Option<BlobModel>> {
    let row = sqlx::query(&format!(
        "SELECT {BLOB_COLUMNS} FROM Blobs WHERE accountName = ? AND containerName = ? \
         AND blobName = ? AND snapshot = ? AND deleting = 0"
    ))
    .bind(account)
    .bind(container)
    .bind(blob)
    .bind(snapshot)
    .fetch_optional(&mut **tx)
    .await?;

    row.as_ref().map(blob_from_row).transpose()
}

/// Inserts a blob row, returning the assigned surrogate id.
pub(crate) async fn insert_blob(
    tx: &mut Transaction<'static, Any>,
    blob: &BlobModel,
) -> StorageResult<i64> {
    let done = sqlx::query(
        "INSERT INTO Blobs (accountName, containerName, blobName, snapshot, deleting, \
         blobType, isCommitted, creationTime, lastModified, etag, contentProperties, \
         accessTier, accessTierInferred, accessTierChangeTime, blobSequenceNumber, leaseId, \
         leaseStatus, leaseState, leaseDurationType, leaseDurationSeconds, leaseExpireTime, \
         leaseBreakTime, persistency, committedBlocksInOrder, metadata) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&blob.account)
    .bind(&blob.container)
    .bind(&blob.name)
    .bind(&blob.snapshot)
    .bind(blob.deleting as i64)
    .bind(blob.blob_type.as_str())
    .bind(blob.is_committed as i64)
    .bind(format_db_time(&blob.creation_time))
    .bind(format_db_time(&blob.last_modified))
    .bind(&blob.etag)
    .bind(json_text(&blob.content_properties)?)
    .bind(blob.access_tier.map(|t| t.as_str()))
    .bind(blob.access_tier_inferred as i64)
    .bind(blob.access_tier_change_time.map(|t| format_db_time(&t)))
    .bind(blob.sequence_number)
    .bind(&blob.lease.lease_id)
    .bind(blob.lease.lease_status.as_str())
    .bind(blob.lease.lease_state.as_str())
    .bind(blob.lease.lease_duration_type.map(|d| d.as_str()))
    .bind(blob.lease.lease_duration_seconds)
    .bind(blob.lease.lease_expire_time.map(|t| format_db_time(&t)))
    .bind(blob.lease.lease_break_time.map(|t| format_db_time(&t)))
    .bind(json_opt(&blob.persistency)?)
    .bind(json_text(&blob.committed_blocks_in_order)?)
    .bind(json_text(&blob.metadata)?)
    .execute(&mut **tx)
    .await?;

    Ok(done.last_insert_id().unwrap_or_default())
}

/// Rewrites every mutable column of an existing blob row.
pub(crate) async fn update_blob(
    tx: &mut Transaction<'static, Any>,
    blob: &BlobModel,
) -> StorageResult<()> {
    sqlx::query(
        "UPDATE Blobs SET blobType = ?, isCommitted = ?, creationTime = ?, lastModified = ?, \
         etag = ?, contentProperties = ?, accessTier = ?, accessTierInferred = ?, \
         accessTierChangeTime = ?, blobSequenceNumber = ?, leaseId = ?, leaseStatus = ?, \
         leaseState = ?, leaseDurationType = ?, leaseDurationSeconds = ?, leaseExpireTime = ?, \
         leaseBreakTime = ?, persistency = ?, committedBlocksInOrder = ?, metadata = ? \
         WHERE blobId = ?",
    )
    .bind(blob.blob_type.as_str())
    .bind(blob.is_committed as i64)
    .bind(format_db_time(&blob.creation_time))
    .bind(format_db_time(&blob.last_modified))
    .bind(&blob.etag)
    .bind(json_text(&blob.content_properties)?)
    .bind(blob.access_tier.map(|t| t.as_str()))
    .bind(blob.access_tier_inferred as i64)
    .bind(blob.access_tier_change_time.map(|t| format_db_time(&t)))
    .bind(blob.sequence_number)
    .bind(&blob.lease.lease_id)
    .bind(blob.lease.lease_status.as_str())
    .bind(blob.lease.lease_state.as_str())
    .bind(blob.lease.lease_duration_type.map(|d| d.as_str()))
    .bind(blob.lease.lease_duration_seconds)
    .bind(blob.lease.lease_expire_time.map(|t| format_db_time(&t)))
    .bind(blob.lease.lease_break_time.map(|t| format_db_time(&t)))
    .bind(json_opt(&blob.persistency)?)
    .bind(json_text(&blob.committed_blocks_in_order)?)
    .bind(json_text(&blob.metadata)?)
    .bind(blob.blob_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn persist_blob_lease(
    tx: &mut Transaction<'static, Any>,
    blob: &BlobModel,
) -> StorageResult<()> {
    sqlx::query(
        "UPDATE Blobs SET leaseId = ?, leaseStatus = ?, leaseState = ?, \
         leaseDurationType = ?, leaseDurationSeconds = ?, leaseExpireTime = ?, \
         leaseBreakTime = ? WHERE blobId = ?",
    )
    .bind(&blob.lease.lease_id)
    .bind(blob.lease.lease_status.as_str())
    .bind(blob.lease.lease_state.as_str())
    .bind(blob.lease.lease_duration_type.map(|d| d.as_str()))
    .bind(blob.lease.lease_duration_seconds)
    .bind(blob.lease.lease_expire_time.map(|t| format_db_time(&t)))
    .bind(blob.lease.lease_break_time.map(|t| format_db_time(&t)))
    .bind(blob.blob_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) fn blob_from_row(row: &sqlx::any::AnyRow) -> StorageResult<BlobModel> {
    let blob_type: String = row.try_get("blobType")?;
    let blob_type = BlobType::parse(&blob_type).ok_or_else(|| {
        StorageError::with_message(
            ErrorCode::InternalError,
            format!("invalid blob type in metadata row: {blob_type}"),
        )
    })?;

    let last_modified = parse_time_col(row.try_get("lastModified")?)?;
    let creation_time =
        parse_time_col_opt(row.try_get("creationTime")?)?.unwrap_or(last_modified);

    let lease = Lease {
        lease_id: row.try_get("leaseId")?,
        lease_status: LeaseStatus::parse(&row.try_get::<String, _>("leaseStatus")?)
            .unwrap_or_default(),
        lease_state: LeaseState::parse(&row.try_get::<String, _>("leaseState")?)
            .unwrap_or_default(),
        lease_duration_type: row
            .try_get::<Option<String>, _>("leaseDurationType")?
            .as_deref()
            .and_then(LeaseDurationType::parse),
        lease_duration_seconds: row.try_get("leaseDurationSeconds")?,
        lease_expire_time: parse_time_col_opt(row.try_get("leaseExpireTime")?)?,
        lease_break_time: parse_time_col_opt(row.try_get("leaseBreakTime")?)?,
    };

    let content_properties: Option<ContentProperties> =
        parse_json_opt(row.try_get("contentProperties")?)?;
    let committed_blocks: Option<Vec<PersistencyBlock>> =
        parse_json_opt(row.try_get("committedBlocksInOrder")?)?;
    let metadata: Option<HashMap<String, String>> = parse_json_opt(row.try_get("metadata")?)?;

    Ok(BlobModel {
        blob_id: row.try_get("blobId")?,
        account: row.try_get("accountName")?,
        container: row.try_get("containerName")?,
        name: row.try_get("blobName")?,
        snapshot: row.try_get("snapshot")?,
        deleting: row.try_get::<i64, _>("deleting")? as u64,
        blob_type,
        is_committed: row.try_get::<i64, _>("isCommitted")? != 0,
        creation_time,
        last_modified,
        etag: row.try_get("etag")?,
        content_properties: content_properties.unwrap_or_default(),
        access_tier: row
            .try_get::<Option<String>, _>("accessTier")?
            .as_deref()
            .and_then(AccessTier::parse),
        access_tier_inferred: row.try_get::<i64, _>("accessTierInferred")? != 0,
        access_tier_change_time: parse_time_col_opt(row.try_get("accessTierChangeTime")?)?,
        sequence_number: row.try_get("blobSequenceNumber")?,
        lease,
        committed_blocks_in_order: committed_blocks.unwrap_or_default(),
        metadata: metadata.unwrap_or_default(),
        persistency: parse_json_opt(row.try_get("persistency")?)?,
    })
}
