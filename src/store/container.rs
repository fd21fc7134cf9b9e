//! Container operations.

use std::collections::HashMap;

use sqlx::{Any, Row, Transaction};
use tracing::instrument;

use crate::context::{format_db_time, Context};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::lease::{Lease, LeaseAccessConditions};
use crate::models::{
    validate_container_name, ContainerModel, PublicAccessLevel, SignedIdentifier,
};
use crate::models::new_etag;

use super::{
    json_text, parse_json_opt, parse_time_col, tag_request, SqlBlobMetadataStore,
};

/// Default page size for `list_containers`.
pub(crate) const DEFAULT_LIST_CONTAINERS_MAX_RESULTS: u32 = 5000;

const CONTAINER_COLUMNS: &str = "containerId, accountName, containerName, lastModified, etag, \
     metadata, containerAcl, publicAccess, lease, hasImmutabilityPolicy, hasLegalHold";

impl SqlBlobMetadataStore {
    /// Lists an account's containers ordered by surrogate id, filtered by an
    /// optional name prefix. The returned marker continues the listing.
    pub async fn list_containers(
        &self,
        ctx: &Context,
        account: &str,
        prefix: Option<&str>,
        max_results: Option<u32>,
        marker: Option<i64>,
    ) -> StorageResult<(Vec<ContainerModel>, Option<i64>)> {
        let result = async {
            self.check_open()?;
            let max_results = max_results.unwrap_or(DEFAULT_LIST_CONTAINERS_MAX_RESULTS);

            let mut sql = format!(
                "SELECT {CONTAINER_COLUMNS} FROM Containers \
                 WHERE accountName = ? AND containerId > ?"
            );
            if prefix.is_some() {
                sql.push_str(" AND containerName LIKE ?");
            }
            sql.push_str(" ORDER BY containerId ASC LIMIT ?");

            let mut query = sqlx::query(&sql).bind(account).bind(marker.unwrap_or(0));
            if let Some(prefix) = prefix {
                query = query.bind(format!("{prefix}%"));
            }
            let rows = query
                .bind(max_results as i64)
                .fetch_all(self.pool())
                .await?;

            let containers = rows
                .iter()
                .map(container_from_row)
                .collect::<StorageResult<Vec<_>>>()?;

            let next_marker = if containers.len() == max_results as usize {
                containers.last().map(|c| c.container_id)
            } else {
                None
            };
            Ok((containers, next_marker))
        }
        .await;
        tag_request(result, ctx)
    }

    /// Creates a container. A name collision within the account reports
    /// `ContainerAlreadyExists`.
    #[instrument(skip_all, fields(account = %container.account, container = %container.name))]
    pub async fn create_container(
        &self,
        ctx: &Context,
        container: ContainerModel,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            validate_container_name(&container.name)?;
            let mut tx = self.begin().await?;

            let insert = sqlx::query(
                "INSERT INTO Containers (accountName, containerName, lastModified, etag, \
                 metadata, containerAcl, publicAccess, lease, hasImmutabilityPolicy, \
                 hasLegalHold) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&container.account)
            .bind(&container.name)
            .bind(format_db_time(&container.last_modified))
            .bind(&container.etag)
            .bind(json_text(&container.metadata)?)
            .bind(json_text(&container.container_acl)?)
            .bind(container.public_access.as_str())
            .bind(json_text(&container.lease)?)
            .bind(container.has_immutability_policy as i64)
            .bind(container.has_legal_hold as i64)
            .execute(&mut *tx)
            .await;

            let done = match insert {
                Ok(done) => done,
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(StorageError::new(ErrorCode::ContainerAlreadyExists));
                }
                Err(err) => return Err(err.into()),
            };
            tx.commit().await?;

            let mut container = container;
            container.container_id = done.last_insert_id().unwrap_or_default();
            Ok(container)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Returns container properties after projecting the lease onto the
    /// operation's logical clock. Read-gated by the container lease.
    pub async fn get_container_properties(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;
            tx.commit().await?;

            model.lease = model.lease.project(ctx.start_time);
            model
                .lease
                .check_read(conditions, ErrorCode::LeaseIdMismatchWithContainerOperation)?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Returns the container together with its stored access policies.
    pub async fn get_container_acl(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<ContainerModel> {
        self.get_container_properties(ctx, account, container, conditions)
            .await
    }

    /// Replaces the container's user metadata.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn set_container_metadata(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        metadata: HashMap<String, String>,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;

            model.lease = model.lease.project(ctx.start_time);
            model
                .lease
                .check_write(conditions, ErrorCode::LeaseIdMismatchWithContainerOperation)?;

            model.metadata = metadata;
            model.last_modified = ctx.start_time;
            model.etag = new_etag();

            sqlx::query(
                "UPDATE Containers SET lastModified = ?, etag = ?, metadata = ?, lease = ? \
                 WHERE containerId = ?",
            )
            .bind(format_db_time(&model.last_modified))
            .bind(&model.etag)
            .bind(json_text(&model.metadata)?)
            .bind(json_text(&model.lease)?)
            .bind(model.container_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Replaces the container's access policies and public-access mode
    /// atomically.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn set_container_acl(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        container_acl: Vec<SignedIdentifier>,
        public_access: PublicAccessLevel,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;

            model.lease = model.lease.project(ctx.start_time);
            model
                .lease
                .check_write(conditions, ErrorCode::LeaseIdMismatchWithContainerOperation)?;

            model.container_acl = container_acl;
            model.public_access = public_access;
            model.last_modified = ctx.start_time;
            model.etag = new_etag();

            sqlx::query(
                "UPDATE Containers SET lastModified = ?, etag = ?, containerAcl = ?, \
                 publicAccess = ?, lease = ? WHERE containerId = ?",
            )
            .bind(format_db_time(&model.last_modified))
            .bind(&model.etag)
            .bind(json_text(&model.container_acl)?)
            .bind(model.public_access.as_str())
            .bind(json_text(&model.lease)?)
            .bind(model.container_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Deletes a container and tombstones all of its blobs and blocks.
    /// Physical removal of the tombstoned rows is the external sweep's job.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn delete_container(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        conditions: &LeaseAccessConditions,
    ) -> StorageResult<()> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;

            model.lease = model.lease.project(ctx.start_time);
            model
                .lease
                .check_write(conditions, ErrorCode::LeaseIdMismatchWithContainerOperation)?;

            sqlx::query("DELETE FROM Containers WHERE containerId = ?")
                .bind(model.container_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE Blobs SET deleting = deleting + 1 \
                 WHERE accountName = ? AND containerName = ?",
            )
            .bind(account)
            .bind(container)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE Blocks SET deleting = deleting + 1 \
                 WHERE accountName = ? AND containerName = ?",
            )
            .bind(account)
            .bind(container)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }
        .await;
        tag_request(result, ctx)
    }

    /// Existence probe; reports `ContainerNotFound` on a miss.
    pub async fn check_container_exist(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
    ) -> StorageResult<()> {
        let result = async {
            self.check_open()?;
            let found: Option<i64> = sqlx::query_scalar(
                "SELECT containerId FROM Containers \
                 WHERE accountName = ? AND containerName = ?",
            )
            .bind(account)
            .bind(container)
            .fetch_optional(self.pool())
            .await?;
            match found {
                Some(_) => Ok(()),
                None => Err(StorageError::new(ErrorCode::ContainerNotFound)),
            }
        }
        .await;
        tag_request(result, ctx)
    }

    /// Acquires a lease on a container.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn acquire_container_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        duration: i64,
        proposed_lease_id: Option<&str>,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;
            model.lease = model
                .lease
                .project(ctx.start_time)
                .acquire(ctx.start_time, duration, proposed_lease_id)?;
            persist_container_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Releases a container lease.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn release_container_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        lease_id: &str,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;
            model.lease = model.lease.project(ctx.start_time).release(lease_id)?;
            persist_container_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Renews a container lease.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn renew_container_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        lease_id: &str,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;
            model.lease = model
                .lease
                .project(ctx.start_time)
                .renew(ctx.start_time, lease_id)?;
            persist_container_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Breaks a container lease; returns the container and the remaining
    /// break time in seconds.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn break_container_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        break_period: Option<i64>,
    ) -> StorageResult<(ContainerModel, i64)> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;
            let (lease, lease_time) = model
                .lease
                .project(ctx.start_time)
                .break_lease(ctx.start_time, break_period)?;
            model.lease = lease;
            persist_container_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok((model, lease_time))
        }
        .await;
        tag_request(result, ctx)
    }

    /// Changes the id of an active container lease.
    #[instrument(skip_all, fields(account = %account, container = %container))]
    pub async fn change_container_lease(
        &self,
        ctx: &Context,
        account: &str,
        container: &str,
        lease_id: &str,
        proposed_lease_id: &str,
    ) -> StorageResult<ContainerModel> {
        let result = async {
            let mut tx = self.begin().await?;
            let mut model = find_container(&mut tx, account, container).await?;
            model.lease = model
                .lease
                .project(ctx.start_time)
                .change(lease_id, proposed_lease_id)?;
            persist_container_lease(&mut tx, &model).await?;
            tx.commit().await?;
            Ok(model)
        }
        .await;
        tag_request(result, ctx)
    }
}

/// Looks up a container inside a transaction; `ContainerNotFound` on a miss.
pub(crate) async fn find_container(
    tx: &mut Transaction<'static, Any>,
    account: &str,
    container: &str,
) -> StorageResult<ContainerModel> {
    let row = sqlx::query(&format!(
        "SELECT {CONTAINER_COLUMNS} FROM Containers \
         WHERE accountName = ? AND containerName = ?"
    ))
    .bind(account)
    .bind(container)
    .fetch_optional(&mut **tx)
    .await?;

    row.as_ref()
        .map(container_from_row)
        .transpose()?
        .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))
}

/// Asserts that a container exists without materializing it.
pub(crate) async fn assert_container_exists(
    tx: &mut Transaction<'static, Any>,
    account: &str,
    container: &str,
) -> StorageResult<()> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT containerId FROM Containers WHERE accountName = ? AND containerName = ?",
    )
    .bind(account)
    .bind(container)
    .fetch_optional(&mut **tx)
    .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(StorageError::new(ErrorCode::ContainerNotFound)),
    }
}

async fn persist_container_lease(
    tx: &mut Transaction<'static, Any>,
    model: &ContainerModel,
) -> StorageResult<()> {
    sqlx::query("UPDATE Containers SET lease = ? WHERE containerId = ?")
        .bind(json_text(&model.lease)?)
        .bind(model.container_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn container_from_row(row: &sqlx::any::AnyRow) -> StorageResult<ContainerModel> {
    let lease: Option<Lease> = parse_json_opt(row.try_get("lease")?)?;
    let metadata: Option<HashMap<String, String>> = parse_json_opt(row.try_get("metadata")?)?;
    let container_acl: Option<Vec<SignedIdentifier>> =
        parse_json_opt(row.try_get("containerAcl")?)?;
    let public_access: Option<String> = row.try_get("publicAccess")?;

    Ok(ContainerModel {
        container_id: row.try_get("containerId")?,
        account: row.try_get("accountName")?,
        name: row.try_get("containerName")?,
        last_modified: parse_time_col(row.try_get("lastModified")?)?,
        etag: row.try_get("etag")?,
        metadata: metadata.unwrap_or_default(),
        container_acl: container_acl.unwrap_or_default(),
        public_access: public_access
            .as_deref()
            .and_then(PublicAccessLevel::parse)
            .unwrap_or_default(),
        has_immutability_policy: row.try_get::<i64, _>("hasImmutabilityPolicy")? != 0,
        has_legal_hold: row.try_get::<i64, _>("hasLegalHold")? != 0,
        lease: lease.unwrap_or_default(),
    })
}
