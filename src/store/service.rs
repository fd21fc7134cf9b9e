//! Service-properties operations.

use sqlx::Row;
use tracing::instrument;

use crate::context::Context;
use crate::error::StorageResult;
use crate::models::ServicePropertiesModel;

use super::{json_opt, parse_json_opt, tag_request, SqlBlobMetadataStore};

const SERVICE_COLUMNS: &str = "accountName, defaultServiceVersion, cors, logging, \
     minuteMetrics, hourMetrics, staticWebsite, deleteRetentionPolicy";

impl SqlBlobMetadataStore {
    /// Creates or updates an account's service properties. Fields absent
    /// from the update keep their stored value.
    #[instrument(skip_all, fields(account = %properties.account_name))]
    pub async fn set_service_properties(
        &self,
        ctx: &Context,
        properties: ServicePropertiesModel,
    ) -> StorageResult<ServicePropertiesModel> {
        let result = async {
            let mut tx = self.begin().await?;

            let existing = sqlx::query(&format!(
                "SELECT {SERVICE_COLUMNS} FROM Services WHERE accountName = ?"
            ))
            .bind(&properties.account_name)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| service_from_row(&row))
            .transpose()?;

            let update = existing.is_some();
            let merged = match existing {
                Some(stored) => properties.merged_into(stored),
                None => properties,
            };

            let statement = if update {
                "UPDATE Services SET defaultServiceVersion = ?, cors = ?, logging = ?, \
                 minuteMetrics = ?, hourMetrics = ?, staticWebsite = ?, \
                 deleteRetentionPolicy = ? WHERE accountName = ?"
            } else {
                "INSERT INTO Services (defaultServiceVersion, cors, logging, minuteMetrics, \
                 hourMetrics, staticWebsite, deleteRetentionPolicy, accountName) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            };

            sqlx::query(statement)
                .bind(&merged.default_service_version)
                .bind(json_opt(&merged.cors)?)
                .bind(json_opt(&merged.logging)?)
                .bind(json_opt(&merged.minute_metrics)?)
                .bind(json_opt(&merged.hour_metrics)?)
                .bind(json_opt(&merged.static_website)?)
                .bind(json_opt(&merged.delete_retention_policy)?)
                .bind(&merged.account_name)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(merged)
        }
        .await;
        tag_request(result, ctx)
    }

    /// Returns an account's service properties, or `None` when they have
    /// never been set.
    pub async fn get_service_properties(
        &self,
        ctx: &Context,
        account: &str,
    ) -> StorageResult<Option<ServicePropertiesModel>> {
        let result = async {
            self.check_open()?;
            sqlx::query(&format!(
                "SELECT {SERVICE_COLUMNS} FROM Services WHERE accountName = ?"
            ))
            .bind(account)
            .fetch_optional(self.pool())
            .await?
            .map(|row| service_from_row(&row))
            .transpose()
        }
        .await;
        tag_request(result, ctx)
    }
}

fn service_from_row(row: &sqlx::any::AnyRow) -> StorageResult<ServicePropertiesModel> {
    Ok(ServicePropertiesModel {
        account_name: row.try_get("accountName")?,
        default_service_version: row.try_get("defaultServiceVersion")?,
        cors: parse_json_opt(row.try_get("cors")?)?,
        logging: parse_json_opt(row.try_get("logging")?)?,
        minute_metrics: parse_json_opt(row.try_get("minuteMetrics")?)?,
        hour_metrics: parse_json_opt(row.try_get("hourMetrics")?)?,
        static_website: parse_json_opt(row.try_get("staticWebsite")?)?,
        delete_retention_policy: parse_json_opt(row.try_get("deleteRetentionPolicy")?)?,
    })
}
