//! Block staging and commit.

use std::collections::HashMap;

use sqlx::{Any, Row, Transaction};
use tracing::instrument;

use crate::context::Context;
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::lease::LeaseAccessConditions;
use crate::models::new_etag;
use crate::models::{
    BlobModel, BlobType, BlockItem, BlockList, BlockListEntry, BlockListType, BlockModel,
    ExtentChunk, PersistencyBlock,
};

use super::blob::{find_blob, insert_blob, tombstone_blocks, update_blob};
use super::container::assert_container_exists;
use super::{json_text, tag_request, SqlBlobMetadataStore};

const BLOCK_COLUMNS: &str =
    "id, accountName, containerName, blobName, blockName, deleting, size, persistency";

impl SqlBlobMetadataStore {
    /// Stages a block, replacing any previously staged block of the same
    /// name.
    #[instrument(skip_all, fields(account = %block.account, container = %block.container, blob = %block.blob_name, block = %block.block_name))]
    pub async fn stage_block(&self, ctx: &Context, block: BlockModel) -> StorageResult<BlockModel> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, &block.account, &block.container).await?;

            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM Blocks WHERE accountName = ? AND containerName = ? \
                 AND blobName = ? AND blockName = ? AND deleting = 0",
            )
            .bind(&block.account)
            .bind(&block.container)
            .bind(&block.blob_name)
            .bind(&block.block_name)
            .fetch_optional(&mut *tx)
            .await?;

            let mut block = block;
            match existing {
                Some(id) => {
                    sqlx::query("UPDATE Blocks SET size = ?, persistency = ? WHERE id = ?")
                        .bind(block.size as i64)
                        .bind(json_text(&block.persistency)?)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    block.id = id;
                }
                None => {
                    let done = sqlx::query(
                        "INSERT INTO Blocks (accountName, containerName, blobName, blockName, \
                         deleting, size, persistency) VALUES (?, ?, ?, ?, 0, ?, ?)",
                    )
                    .bind(&block.account)
                    .bind(&block.container)
                    .bind(&block.blob_name)
                    .bind(&block.block_name)
                    .bind(block.size as i64)
                    .bind(json_text(&block.persistency)?)
                    .execute(&mut *tx)
                    .await?;
                    block.id = done.last_insert_id().unwrap_or_default();
                }
            }

            tx.commit().await?;
            Ok(block)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Returns the committed and/or uncommitted block lists of a blob.
    /// Uncommitted blocks come back in staging order.
    pub async fn get_block_list(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        blob: &str,
        list_type: BlockListType,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlockList> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, account, container).await?;

            let model = find_blob(&mut tx, account, container, blob, "").await?;
            match &model {
                Some(model) => {
                    let lease = model.lease.clone().project(ctx.start_time);
                    lease.check_read(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;
                }
                // A blob row only becomes mandatory once the committed list
                // is requested; staged-only blobs have no row yet.
                None if list_type.includes_committed() => {
                    return Err(StorageError::new(ErrorCode::BlobNotFound));
                }
                None => {}
            }

            let mut list = BlockList::default();
            if list_type.includes_committed() {
                if let Some(model) = &model {
                    list.committed_blocks = model
                        .committed_blocks_in_order
                        .iter()
                        .map(|b| BlockItem {
                            name: b.name.clone(),
                            size: b.size,
                        })
                        .collect();
                }
            }

            if list_type.includes_uncommitted() {
                let rows = sqlx::query(
                    "SELECT blockName, size FROM Blocks WHERE accountName = ? AND \
                     containerName = ? AND blobName = ? AND deleting = 0 ORDER BY id ASC",
                )
                .bind(account)
                .bind(container)
                .bind(blob)
                .fetch_all(&mut *tx)
                .await?;
                list.uncommitted_blocks = rows
                    .iter()
                    .map(|row| {
                        Ok(BlockItem {
                            name: row.try_get("blockName")?,
                            size: row.try_get::<i64, _>("size")? as u64,
                        })
                    })
                    .collect::<StorageResult<Vec<_>>>()?;
            }

            tx.commit().await?;
            Ok(list)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Commits a block list, assembling the blob's committed sequence from
    /// staged and previously committed blocks, then tombstoning every staged
    /// block row of the blob.
    #[instrument(skip_all, fields(account = %blob.account, container = %blob.container, blob = %blob.name, blocks = block_list.len()))]
    pub async fn commit_block_list(
        &self,
        ctx: &Context,
        blob: BlobModel,
        block_list: Vec<BlockListEntry>,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<BlobModel> {
        let result = async {
            let mut tx = self.begin().await?;
            assert_container_exists(&mut tx, &blob.account, &blob.container).await?;

            let existing =
                find_blob(&mut tx, &blob.account, &blob.container, &blob.name, "").await?;

            let mut committed: HashMap<&str, &PersistencyBlock> = HashMap::new();
            if let Some(existing) = &existing {
                let lease = existing.lease.clone().project(ctx.start_time);
                lease.check_write(conditions, ErrorCode::LeaseIdMismatchWithBlobOperation)?;
                for block in &existing.committed_blocks_in_order {
                    committed.insert(block.name.as_str(), block);
                }
            }

            let staged = load_staged_blocks(&mut tx, &blob.account, &blob.container, &blob.name)
                .await?;
            let mut uncommitted: HashMap<&str, PersistencyBlock> = HashMap::new();
            for block in &staged {
                uncommitted.insert(
                    block.block_name.as_str(),
                    PersistencyBlock {
                        name: block.block_name.clone(),
                        size: block.size,
                        persistency: block.persistency.clone(),
                    },
                );
            }

            let mut selected: Vec<PersistencyBlock> = Vec::with_capacity(block_list.len());
            for entry in &block_list {
                let name = entry.block_name.as_str();
                let block = match entry.commit_type.to_lowercase().as_str() {
                    "uncommitted" => uncommitted.get(name).cloned(),
                    "committed" => committed.get(name).map(|b| (*b).clone()),
                    "latest" => uncommitted
                        .get(name)
                        .cloned()
                        .or_else(|| committed.get(name).map(|b| (*b).clone())),
                    _ => return Err(StorageError::new(ErrorCode::InvalidOperation)),
                };
                selected
                    .push(block.ok_or_else(|| StorageError::new(ErrorCode::InvalidOperation))?);
            }

            let content_length: u64 = selected.iter().map(|b| b.size).sum();

            let mut model = blob;
            model.snapshot = String::new();
            model.deleting = 0;
            model.blob_type = BlobType::BlockBlob;
            model.is_committed = true;
            model.committed_blocks_in_order = selected;
            model.content_properties.content_length = content_length;
            model.persistency = None;
            model.last_modified = ctx.start_time;
            model.etag = new_etag();

            match &existing {
                Some(existing) => {
                    model.blob_id = existing.blob_id;
                    model.creation_time = existing.creation_time;
                    update_blob(&mut tx, &model).await?;
                }
                None => {
                    model.blob_id = insert_blob(&mut tx, &model).await?;
                }
            }

            tombstone_blocks(&mut tx, &model.account, &model.container, &model.name).await?;

            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Internal paged scan of live staged blocks, used by the
    /// referenced-extent iterator.
    pub(crate) async fn list_blocks_paged(
        &self,
        max_results: u32,
        marker: i64,
    ) -> StorageResult<(Vec<BlockModel>, Option<i64>)> {
        self.check_open()?;
        let rows = sqlx::query(&format!(
            "SELECT {BLOCK_COLUMNS} FROM Blocks WHERE deleting = 0 AND id > ? \
             ORDER BY id ASC LIMIT ?"
        ))
        .bind(marker)
        .bind(max_results as i64)
        .fetch_all(self.pool())
        .await?;

        let blocks = rows
            .iter()
            .map(block_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        let next_marker = if blocks.len() == max_results as usize {
            blocks.last().map(|b| b.id)
        } else {
            None
        };
        Ok((blocks, next_marker))
    }
}

async fn load_staged_blocks(
    tx: &mut Transaction<'static, Any>,
    account: &str,
    container: &str,
    blob: &str,
) -> StorageResult<Vec<BlockModel>> {
    let rows = sqlx::query(&format!(
        "SELECT {BLOCK_COLUMNS} FROM Blocks WHERE accountName = ? AND containerName = ? \
         AND blobName = ? AND deleting = 0 ORDER BY id ASC"
    ))
    .bind(account)
    .bind(container)
    .bind(blob)
    .fetch_all(&mut **tx)
    .await?;

    rows.iter().map(block_from_row).collect()
}

fn block_from_row(row: &sqlx::any::AnyRow) -> StorageResult<BlockModel> {
    let persistency: String = row.try_get("persistency")?;
    let persistency: ExtentChunk = serde_json::from_str(&persistency)?;
    Ok(BlockModel {
        id: row.try_get("id")?,
        account: row.try_get("accountName")?,
        container: row.try_get("containerName")?,
        blob_name: row.try_get("blobName")?,
        block_name: row.try_get("blockName")?,
        deleting: row.try_get::<i64, _>("deleting")? as u64,
        size: row.try_get::<i64, _>("size")? as u64,
        persistency,
    })
}
