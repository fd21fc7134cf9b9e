//! Blob data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::lease::Lease;

use super::codec;
use super::new_etag;

/// Blob types supported by Azure Blob Storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobType {
    BlockBlob,
    PageBlob,
    AppendBlob,
}

impl BlobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobType::BlockBlob => "BlockBlob",
            BlobType::PageBlob => "PageBlob",
            BlobType::AppendBlob => "AppendBlob",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BlockBlob" => Some(BlobType::BlockBlob),
            "PageBlob" => Some(BlobType::PageBlob),
            "AppendBlob" => Some(BlobType::AppendBlob),
            _ => None,
        }
    }
}

/// Access tiers for blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AccessTier {
    #[default]
    Hot,
    Cool,
    Cold,
    Archive,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Hot => "Hot",
            AccessTier::Cool => "Cool",
            AccessTier::Cold => "Cold",
            AccessTier::Archive => "Archive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hot" => Some(AccessTier::Hot),
            "cool" => Some(AccessTier::Cool),
            "cold" => Some(AccessTier::Cold),
            "archive" => Some(AccessTier::Archive),
            _ => None,
        }
    }
}

/// Reference to payload bytes held by the external extent store. The
/// metadata core never dereferences it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtentChunk {
    /// UUID of the extent containing this data.
    pub id: String,
    /// Byte offset within the extent.
    pub offset: u64,
    /// Number of bytes.
    pub count: u64,
}

impl ExtentChunk {
    pub fn new(id: impl Into<String>, offset: u64, count: u64) -> Self {
        Self {
            id: id.into(),
            offset,
            count,
        }
    }
}

/// Content properties of a blob, persisted as one JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentProperties {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    #[serde(with = "codec::buffer_opt", default)]
    pub content_md5: Option<Vec<u8>>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
}

/// HTTP headers applied to a blob by `set_blob_http_headers`.
#[derive(Debug, Clone, Default)]
pub struct BlobHttpHeaders {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_md5: Option<Vec<u8>>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
}

/// Entry of a committed block list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistencyBlock {
    /// Client-supplied block name.
    pub name: String,
    /// Block size in bytes.
    pub size: u64,
    /// Reference to the block's payload.
    pub persistency: ExtentChunk,
}

/// Option controlling how `delete_blob` treats snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSnapshotsOption {
    /// Delete the base blob together with all of its snapshots.
    Include,
    /// Delete only the snapshots, keeping the base blob.
    Only,
}

impl DeleteSnapshotsOption {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "include" => Some(DeleteSnapshotsOption::Include),
            "only" => Some(DeleteSnapshotsOption::Only),
            _ => None,
        }
    }
}

/// Complete blob model stored in the metadata store.
///
/// Identity is `(account, container, name, snapshot, deleting)`; `snapshot`
/// is empty for the live blob and the snapshot's creation timestamp
/// otherwise, and `deleting` is the tombstone generation (0 = live).
#[derive(Debug, Clone)]
pub struct BlobModel {
    /// Surrogate id assigned on insert.
    pub blob_id: i64,
    pub account: String,
    pub container: String,
    pub name: String,
    pub snapshot: String,
    /// Tombstone generation; 0 means live.
    pub deleting: u64,
    pub blob_type: BlobType,
    /// False until a block list is committed or a single-shot upload lands.
    pub is_committed: bool,
    pub creation_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub content_properties: ContentProperties,
    pub access_tier: Option<AccessTier>,
    pub access_tier_inferred: bool,
    pub access_tier_change_time: Option<DateTime<Utc>>,
    /// Sequence number for page blobs.
    pub sequence_number: Option<i64>,
    /// Embedded lease record.
    pub lease: Lease,
    /// Ordered committed block references for block blobs.
    pub committed_blocks_in_order: Vec<PersistencyBlock>,
    /// User-defined metadata.
    pub metadata: HashMap<String, String>,
    /// Payload reference for single-shot uploads.
    pub persistency: Option<ExtentChunk>,
}

impl BlobModel {
    /// Creates a new live blob model stamped with the given instant.
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
        blob_type: BlobType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            blob_id: 0,
            account: account.into(),
            container: container.into(),
            name: name.into(),
            snapshot: String::new(),
            deleting: 0,
            blob_type,
            is_committed: false,
            creation_time: now,
            last_modified: now,
            etag: new_etag(),
            content_properties: ContentProperties::default(),
            access_tier: match blob_type {
                BlobType::BlockBlob => Some(AccessTier::Hot),
                _ => None,
            },
            access_tier_inferred: blob_type == BlobType::BlockBlob,
            access_tier_change_time: None,
            sequence_number: match blob_type {
                BlobType::PageBlob => Some(0),
                _ => None,
            },
            lease: Lease::default(),
            committed_blocks_in_order: Vec::new(),
            metadata: HashMap::new(),
            persistency: None,
        }
    }

    /// Clones this blob into a snapshot row addressed by `snapshot`, with a
    /// cleared lease.
    pub fn as_snapshot(&self, snapshot: impl Into<String>) -> Self {
        let mut clone = self.clone();
        clone.blob_id = 0;
        clone.snapshot = snapshot.into();
        clone.lease = Lease::default();
        clone
    }

    /// Returns true for the live (non-snapshot) row.
    pub fn is_base_blob(&self) -> bool {
        self.snapshot.is_empty()
    }
}
