//! Data models for services, containers, blobs, and blocks.

pub mod blob;
pub mod block;
pub mod codec;
pub mod container;
pub mod service;

pub use blob::{
    AccessTier, BlobHttpHeaders, BlobModel, BlobType, ContentProperties, DeleteSnapshotsOption,
    ExtentChunk, PersistencyBlock,
};
pub use block::{BlockItem, BlockList, BlockListEntry, BlockListType, BlockModel};
pub use container::{
    validate_container_name, AccessPolicy, ContainerModel, PublicAccessLevel, SignedIdentifier,
};
pub use service::{
    CorsRule, DeleteRetentionPolicy, LoggingConfig, MetricsConfig, RetentionPolicy,
    ServicePropertiesModel, StaticWebsite,
};

/// Returns a fresh opaque etag. Every mutation of an entity stamps a new one.
pub fn new_etag() -> String {
    format!("\"0x{}\"", uuid::Uuid::new_v4().simple())
}
