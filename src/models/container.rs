//! Container data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::lease::Lease;

use super::new_etag;

/// Public access level for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PublicAccessLevel {
    #[default]
    None,
    Container,
    Blob,
}

impl PublicAccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicAccessLevel::None => "",
            PublicAccessLevel::Container => "container",
            PublicAccessLevel::Blob => "blob",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "" | "none" | "private" => Some(PublicAccessLevel::None),
            "container" => Some(PublicAccessLevel::Container),
            "blob" => Some(PublicAccessLevel::Blob),
            _ => None,
        }
    }
}

/// Signed identifier for container access policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignedIdentifier {
    pub id: String,
    pub access_policy: AccessPolicy,
}

/// Access policy for a signed identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    pub start: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub permission: String,
}

/// Complete container model stored in the metadata store.
#[derive(Debug, Clone)]
pub struct ContainerModel {
    /// Surrogate id assigned on insert; used as the list cursor.
    pub container_id: i64,
    /// Account name.
    pub account: String,
    /// Container name.
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    /// User-defined metadata.
    pub metadata: HashMap<String, String>,
    /// Signed identifiers for stored access policies.
    pub container_acl: Vec<SignedIdentifier>,
    pub public_access: PublicAccessLevel,
    pub has_immutability_policy: bool,
    pub has_legal_hold: bool,
    /// Embedded lease record.
    pub lease: Lease,
}

impl ContainerModel {
    /// Creates a new container model stamped with the given instant.
    pub fn new(account: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            container_id: 0,
            account: account.into(),
            name: name.into(),
            last_modified: now,
            etag: new_etag(),
            metadata: HashMap::new(),
            container_acl: Vec::new(),
            public_access: PublicAccessLevel::None,
            has_immutability_policy: false,
            has_legal_hold: false,
            lease: Lease::default(),
        }
    }
}

/// Validates a container name.
pub fn validate_container_name(name: &str) -> StorageResult<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            "Container name must be between 3 and 63 characters",
        ));
    }

    // $root, $logs and $web are special containers
    if name == "$root" || name == "$logs" || name == "$web" {
        return Ok(());
    }

    let first_char = name.chars().next().unwrap_or_default();
    if !first_char.is_ascii_alphanumeric() {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            "Container name must start with a letter or number",
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(StorageError::with_message(
                ErrorCode::InvalidResourceName,
                "Container name can only contain lowercase letters, numbers, and hyphens",
            ));
        }
    }

    if name.contains("--") {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            "Container name cannot have consecutive hyphens",
        ));
    }

    Ok(())
}
