//! Lazy enumeration of persistence chunks referenced by live metadata.
//!
//! Feeds the external garbage collector. Concurrent mutations are not
//! prevented during iteration; the collector must cross-check liveness
//! before deleting any chunk.

use futures::stream::{self, Stream};

use crate::error::StorageResult;
use crate::models::ExtentChunk;

use super::SqlBlobMetadataStore;

/// Default number of rows fetched per batch.
pub const DEFAULT_EXTENT_PAGE_SIZE: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Blobs,
    Blocks,
    Done,
}

/// Single-pass iterator over the chunks referenced by committed blobs
/// (single-shot payloads and committed block lists) followed by the chunks
/// referenced by live uncommitted blocks. Pages by surrogate id.
pub struct ReferredExtentsIterator<'a> {
    store: &'a SqlBlobMetadataStore,
    phase: Phase,
    marker: i64,
    page_size: u32,
}

impl SqlBlobMetadataStore {
    /// Starts a referenced-extent scan with the given page size.
    pub fn iterate_extents(&self, page_size: Option<u32>) -> ReferredExtentsIterator<'_> {
        ReferredExtentsIterator {
            store: self,
            phase: Phase::Blobs,
            marker: 0,
            page_size: page_size.unwrap_or(DEFAULT_EXTENT_PAGE_SIZE).max(1),
        }
    }
}

impl<'a> ReferredExtentsIterator<'a> {
    /// Returns the next non-empty batch of referenced chunks, or `None` once
    /// the scan is exhausted.
    pub async fn next(&mut self) -> StorageResult<Option<Vec<ExtentChunk>>> {
        loop {
            match self.phase {
                Phase::Done => return Ok(None),
                Phase::Blobs => {
                    let (blobs, next_marker) = self
                        .store
                        .list_all_blobs(self.page_size, self.marker, true)
                        .await?;
                    match next_marker {
                        Some(marker) => self.marker = marker,
                        None => {
                            self.phase = Phase::Blocks;
                            self.marker = 0;
                        }
                    }

                    let mut chunks = Vec::new();
                    for blob in blobs.iter().filter(|b| b.is_committed) {
                        if let Some(persistency) = &blob.persistency {
                            chunks.push(persistency.clone());
                        }
                        chunks.extend(
                            blob.committed_blocks_in_order
                                .iter()
                                .map(|b| b.persistency.clone()),
                        );
                    }
                    if chunks.is_empty() {
                        continue;
                    }
                    return Ok(Some(chunks));
                }
                Phase::Blocks => {
                    let (blocks, next_marker) = self
                        .store
                        .list_blocks_paged(self.page_size, self.marker)
                        .await?;
                    match next_marker {
                        Some(marker) => self.marker = marker,
                        None => self.phase = Phase::Done,
                    }

                    let chunks: Vec<ExtentChunk> =
                        blocks.into_iter().map(|b| b.persistency).collect();
                    if chunks.is_empty() {
                        continue;
                    }
                    return Ok(Some(chunks));
                }
            }
        }
    }

    /// Adapts the iterator into a `Stream` of chunk batches.
    pub fn into_stream(self) -> impl Stream<Item = StorageResult<Vec<ExtentChunk>>> + 'a {
        stream::try_unfold(self, |mut iter| async move {
            Ok(iter.next().await?.map(|batch| (batch, iter)))
        })
    }
}
