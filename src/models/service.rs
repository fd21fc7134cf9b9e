//! Service-level data models.

use serde::{Deserialize, Serialize};

/// CORS rule for a storage service.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub max_age_in_seconds: u32,
}

/// Logging configuration for a storage service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub version: String,
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub retention_policy: RetentionPolicy,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            read: false,
            write: false,
            delete: false,
            retention_policy: RetentionPolicy::default(),
        }
    }
}

/// Metrics configuration for a storage service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    pub version: String,
    pub enabled: bool,
    pub include_apis: bool,
    pub retention_policy: RetentionPolicy,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            enabled: false,
            include_apis: false,
            retention_policy: RetentionPolicy::default(),
        }
    }
}

/// Retention policy for logs and metrics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub days: Option<u32>,
}

/// Static website configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticWebsite {
    pub enabled: bool,
    pub index_document: Option<String>,
    pub error_document_404_path: Option<String>,
    pub default_index_document_path: Option<String>,
}

/// Delete retention policy for soft-delete.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRetentionPolicy {
    pub enabled: bool,
    pub days: Option<u32>,
}

/// Service properties for one account. Created on first set, updated in
/// place; every field other than the account name is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServicePropertiesModel {
    pub account_name: String,
    pub default_service_version: Option<String>,
    pub cors: Option<Vec<CorsRule>>,
    pub logging: Option<LoggingConfig>,
    pub hour_metrics: Option<MetricsConfig>,
    pub minute_metrics: Option<MetricsConfig>,
    pub static_website: Option<StaticWebsite>,
    pub delete_retention_policy: Option<DeleteRetentionPolicy>,
}

impl ServicePropertiesModel {
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            ..Default::default()
        }
    }

    /// Merges an update into the stored record: present fields override,
    /// absent fields keep their stored value.
    pub fn merged_into(self, existing: ServicePropertiesModel) -> ServicePropertiesModel {
        ServicePropertiesModel {
            account_name: self.account_name,
            default_service_version: self
                .default_service_version
                .or(existing.default_service_version),
            cors: self.cors.or(existing.cors),
            logging: self.logging.or(existing.logging),
            hour_metrics: self.hour_metrics.or(existing.hour_metrics),
            minute_metrics: self.minute_metrics.or(existing.minute_metrics),
            static_website: self.static_website.or(existing.static_website),
            delete_retention_policy: self
                .delete_retention_policy
                .or(existing.delete_retention_policy),
        }
    }
}
