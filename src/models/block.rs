//! Block data models for block blobs.

use serde::{Deserialize, Serialize};

use super::blob::ExtentChunk;

/// A staged (uncommitted) block.
#[derive(Debug, Clone)]
pub struct BlockModel {
    /// Surrogate id assigned on insert; preserves staging order.
    pub id: i64,
    pub account: String,
    pub container: String,
    pub blob_name: String,
    /// Client-supplied block name.
    pub block_name: String,
    /// Tombstone generation; 0 means staged and live.
    pub deleting: u64,
    /// Block size in bytes.
    pub size: u64,
    /// Reference to the block's payload.
    pub persistency: ExtentChunk,
}

impl BlockModel {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        blob_name: impl Into<String>,
        block_name: impl Into<String>,
        size: u64,
        persistency: ExtentChunk,
    ) -> Self {
        Self {
            id: 0,
            account: account.into(),
            container: container.into(),
            blob_name: blob_name.into(),
            block_name: block_name.into(),
            deleting: 0,
            size,
            persistency,
        }
    }
}

/// Filter for `get_block_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockListType {
    Committed,
    Uncommitted,
    #[default]
    All,
}

impl BlockListType {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "committed" => BlockListType::Committed,
            "uncommitted" => BlockListType::Uncommitted,
            _ => BlockListType::All,
        }
    }

    pub fn includes_committed(&self) -> bool {
        matches!(self, BlockListType::Committed | BlockListType::All)
    }

    pub fn includes_uncommitted(&self) -> bool {
        matches!(self, BlockListType::Uncommitted | BlockListType::All)
    }
}

/// One entry of a block list as returned by `get_block_list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockItem {
    pub name: String,
    pub size: u64,
}

/// Block lists returned by `get_block_list`.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    pub committed_blocks: Vec<BlockItem>,
    pub uncommitted_blocks: Vec<BlockItem>,
}

/// One entry of the block list supplied to `commit_block_list`: the block
/// name plus the source it commits from (`committed`, `uncommitted`, or
/// `latest`, matched case-insensitively).
#[derive(Debug, Clone)]
pub struct BlockListEntry {
    pub block_name: String,
    pub commit_type: String,
}

impl BlockListEntry {
    pub fn new(block_name: impl Into<String>, commit_type: impl Into<String>) -> Self {
        Self {
            block_name: block_name.into(),
            commit_type: commit_type.into(),
        }
    }
}
