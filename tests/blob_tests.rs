//! Blob operation tests.

mod common;

use std::collections::HashMap;

use azurite_sql_rs::models::{
    AccessTier, BlobHttpHeaders, BlobModel, BlobType, DeleteSnapshotsOption,
};
use azurite_sql_rs::store::DeleteBlobOptions;
use azurite_sql_rs::{ErrorCode, LeaseAccessConditions};
use common::{committed_block_blob, container, ctx_at, TestStore, ACCOUNT};

const CONTAINER: &str = "blobcontainer";

async fn fixture_with_container() -> TestStore {
    let fixture = TestStore::new().await;
    fixture
        .store
        .create_container(&ctx_at(0), container(CONTAINER, 0))
        .await
        .unwrap();
    fixture
}

#[tokio::test]
async fn test_create_and_get_blob() {
    let fixture = fixture_with_container().await;

    let mut blob = committed_block_blob(CONTAINER, "hello.txt", 1);
    blob.content_properties.content_length = 11;
    blob.content_properties.content_type = Some("text/plain".to_string());
    blob.content_properties.content_md5 = Some(vec![0x12, 0x34, 0x56]);
    blob.metadata
        .insert("author".to_string(), "tester".to_string());
    blob.persistency = Some(common::chunk(11));

    fixture
        .store
        .create_blob(&ctx_at(1), blob, &LeaseAccessConditions::default())
        .await
        .unwrap();

    let stored = fixture
        .store
        .get_blob_properties(
            &ctx_at(2),
            ACCOUNT,
            CONTAINER,
            "hello.txt",
            "",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(stored.blob_type, BlobType::BlockBlob);
    assert!(stored.is_committed);
    assert_eq!(stored.content_properties.content_length, 11);
    assert_eq!(
        stored.content_properties.content_type.as_deref(),
        Some("text/plain")
    );
    assert_eq!(
        stored.content_properties.content_md5,
        Some(vec![0x12, 0x34, 0x56])
    );
    assert_eq!(stored.metadata.get("author").map(String::as_str), Some("tester"));
    assert!(stored.persistency.is_some());
}

#[tokio::test]
async fn test_blob_requires_container() {
    let fixture = TestStore::new().await;

    let err = fixture
        .store
        .create_blob(
            &ctx_at(0),
            committed_block_blob("missing", "b", 0),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ContainerNotFound);
}

#[tokio::test]
async fn test_get_missing_blob() {
    let fixture = fixture_with_container().await;

    let err = fixture
        .store
        .download_blob(
            &ctx_at(1),
            ACCOUNT,
            CONTAINER,
            "absent",
            "",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BlobNotFound);
}

#[tokio::test]
async fn test_archived_blob_blocks_overwrite() {
    let fixture = fixture_with_container().await;
    let store = &fixture.store;

    store
        .create_blob(
            &ctx_at(1),
            committed_block_blob(CONTAINER, "archived", 1),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();

    let status = store
        .set_tier(
            &ctx_at(2),
            ACCOUNT,
            CONTAINER,
            "archived",
            "",
            AccessTier::Archive,
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(status, 200);

    let err = store
        .create_blob(
            &ctx_at(3),
            committed_block_blob(CONTAINER, "archived", 3),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BlobArchived);

    // Rehydration out of archive is accepted with 202; afterwards the
    // overwrite goes through.
    let status = store
        .set_tier(
            &ctx_at(4),
            ACCOUNT,
            CONTAINER,
            "archived",
            "",
            AccessTier::Hot,
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(status, 202);

    store
        .create_blob(
            &ctx_at(5),
            committed_block_blob(CONTAINER, "archived", 5),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();

    let stored = store
        .get_blob_properties(
            &ctx_at(6),
            ACCOUNT,
            CONTAINER,
            "archived",
            "",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(stored.access_tier, Some(AccessTier::Hot));
    assert!(stored.access_tier_inferred);
}

#[tokio::test]
async fn test_set_tier_rejects_non_block_blobs() {
    let fixture = fixture_with_container().await;

    let mut page_blob = BlobModel::new(
        ACCOUNT,
        CONTAINER,
        "page.vhd",
        BlobType::PageBlob,
        common::base_time(),
    );
    page_blob.is_committed = true;
    fixture
        .store
        .create_blob(&ctx_at(1), page_blob, &LeaseAccessConditions::default())
        .await
        .unwrap();

    let err = fixture
        .store
        .set_tier(
            &ctx_at(2),
            ACCOUNT,
            CONTAINER,
            "page.vhd",
            "",
            AccessTier::Cool,
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidBlobType);
}

#[tokio::test]
async fn test_set_blob_http_headers_and_metadata() {
    let fixture = fixture_with_container().await;
    let store = &fixture.store;

    let created = store
        .create_blob(
            &ctx_at(1),
            committed_block_blob(CONTAINER, "doc", 1),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();

    let headers = BlobHttpHeaders {
        content_type: Some("application/json".to_string()),
        cache_control: Some("no-cache".to_string()),
        ..Default::default()
    };
    let updated = store
        .set_blob_http_headers(
            &ctx_at(2),
            ACCOUNT,
            CONTAINER,
            "doc",
            Some(headers),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_ne!(updated.etag, created.etag);
    assert!(updated.last_modified >= created.last_modified);
    assert_eq!(
        updated.content_properties.content_type.as_deref(),
        Some("application/json")
    );
    assert_eq!(
        updated.content_properties.cache_control.as_deref(),
        Some("no-cache")
    );

    let mut metadata = HashMap::new();
    metadata.insert("stage".to_string(), "final".to_string());
    let after_metadata = store
        .set_blob_metadata(
            &ctx_at(3),
            ACCOUNT,
            CONTAINER,
            "doc",
            metadata.clone(),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(after_metadata.metadata, metadata);
    assert_ne!(after_metadata.etag, updated.etag);
}

#[tokio::test]
async fn test_snapshot_lifecycle() {
    let fixture = fixture_with_container().await;
    let store = &fixture.store;

    store
        .create_blob(
            &ctx_at(1),
            committed_block_blob(CONTAINER, "snapped", 1),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();

    let snapshot = store
        .create_snapshot(
            &ctx_at(2),
            ACCOUNT,
            CONTAINER,
            "snapped",
            None,
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert!(!snapshot.snapshot.is_empty());

    // The snapshot is addressable on its own.
    let stored = store
        .get_blob_properties(
            &ctx_at(3),
            ACCOUNT,
            CONTAINER,
            "snapped",
            &snapshot.snapshot,
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(stored.snapshot, snapshot.snapshot);

    let (all, _) = store
        .list_blobs(&ctx_at(3), ACCOUNT, CONTAINER, None, None, None, true)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    let (live_only, _) = store
        .list_blobs(&ctx_at(3), ACCOUNT, CONTAINER, None, None, None, false)
        .await
        .unwrap();
    assert_eq!(live_only.len(), 1);

    // Deleting the base blob while snapshots exist needs an explicit choice.
    let err = store
        .delete_blob(
            &ctx_at(4),
            ACCOUNT,
            CONTAINER,
            "snapped",
            DeleteBlobOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SnapshotsPresent);

    // Snapshot targets reject the delete-snapshots option.
    let err = store
        .delete_blob(
            &ctx_at(5),
            ACCOUNT,
            CONTAINER,
            "snapped",
            DeleteBlobOptions {
                snapshot: snapshot.snapshot.clone(),
                delete_snapshots: Some(DeleteSnapshotsOption::Only),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidOperation);

    // `Only` keeps the base blob alive.
    store
        .delete_blob(
            &ctx_at(6),
            ACCOUNT,
            CONTAINER,
            "snapped",
            DeleteBlobOptions {
                delete_snapshots: Some(DeleteSnapshotsOption::Only),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let (remaining, _) = store
        .list_blobs(&ctx_at(7), ACCOUNT, CONTAINER, None, None, None, true)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].is_base_blob());

    // `Include` removes the rest.
    store
        .delete_blob(
            &ctx_at(8),
            ACCOUNT,
            CONTAINER,
            "snapped",
            DeleteBlobOptions {
                delete_snapshots: Some(DeleteSnapshotsOption::Include),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let (remaining, _) = store
        .list_blobs(&ctx_at(9), ACCOUNT, CONTAINER, None, None, None, true)
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_list_blobs_prefix_and_marker() {
    let fixture = fixture_with_container().await;
    let store = &fixture.store;

    for name in ["log/a", "log/b", "log/c", "data/x"] {
        store
            .create_blob(
                &ctx_at(1),
                committed_block_blob(CONTAINER, name, 1),
                &LeaseAccessConditions::default(),
            )
            .await
            .unwrap();
    }

    let (page, marker) = store
        .list_blobs(&ctx_at(2), ACCOUNT, CONTAINER, Some("log/"), Some(2), None, false)
        .await
        .unwrap();
    assert_eq!(
        page.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
        ["log/a", "log/b"]
    );
    let marker = marker.expect("more rows behind a full page");

    let (rest, marker) = store
        .list_blobs(
            &ctx_at(2),
            ACCOUNT,
            CONTAINER,
            Some("log/"),
            Some(2),
            Some(&marker),
            false,
        )
        .await
        .unwrap();
    assert_eq!(
        rest.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
        ["log/c"]
    );
    assert!(marker.is_none());
}

#[tokio::test]
async fn test_get_blob_type() {
    let fixture = fixture_with_container().await;

    fixture
        .store
        .create_blob(
            &ctx_at(1),
            committed_block_blob(CONTAINER, "typed", 1),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();

    let found = fixture
        .store
        .get_blob_type(&ctx_at(2), ACCOUNT, CONTAINER, "typed", "")
        .await
        .unwrap();
    assert_eq!(found, Some((BlobType::BlockBlob, true)));

    let missing = fixture
        .store
        .get_blob_type(&ctx_at(2), ACCOUNT, CONTAINER, "absent", "")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_unimplemented_operations_report_not_implemented() {
    let fixture = fixture_with_container().await;
    let store = &fixture.store;

    let err = store
        .copy_from_url(&ctx_at(1), "https://src", ACCOUNT, CONTAINER, "b")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);

    let err = store
        .undelete_blob(&ctx_at(1), ACCOUNT, CONTAINER, "b")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);

    let err = store
        .upload_pages(&ctx_at(1), ACCOUNT, CONTAINER, "b", 0, 511, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);

    let err = store
        .resize_page_blob(&ctx_at(1), ACCOUNT, CONTAINER, "b", 1024)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);

    let err = store
        .update_sequence_number(&ctx_at(1), ACCOUNT, CONTAINER, "b", 7)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);
}

#[tokio::test]
async fn test_errors_carry_the_request_id() {
    let fixture = fixture_with_container().await;

    let ctx = azurite_sql_rs::Context::with_request_id(common::base_time(), "req-42");
    let err = fixture
        .store
        .get_blob_properties(
            &ctx,
            ACCOUNT,
            CONTAINER,
            "absent",
            "",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.request_id.as_deref(), Some("req-42"));
}
