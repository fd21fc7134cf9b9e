//! Container operation tests.

mod common;

use std::collections::HashMap;

use azurite_sql_rs::models::{AccessPolicy, PublicAccessLevel, SignedIdentifier};
use azurite_sql_rs::{ErrorCode, LeaseAccessConditions};
use common::{container, ctx_at, TestStore, ACCOUNT};

#[tokio::test]
async fn test_create_container() {
    let fixture = TestStore::new().await;

    let created = fixture
        .store
        .create_container(&ctx_at(0), container("testcontainer", 0))
        .await
        .unwrap();
    assert!(created.container_id > 0);

    let props = fixture
        .store
        .get_container_properties(
            &ctx_at(1),
            ACCOUNT,
            "testcontainer",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(props.etag, created.etag);
    assert_eq!(props.last_modified, created.last_modified);
}

#[tokio::test]
async fn test_create_duplicate_container() {
    let fixture = TestStore::new().await;

    fixture
        .store
        .create_container(&ctx_at(0), container("dupcontainer", 0))
        .await
        .unwrap();
    let err = fixture
        .store
        .create_container(&ctx_at(1), container("dupcontainer", 1))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ContainerAlreadyExists);
}

#[tokio::test]
async fn test_invalid_container_name_is_rejected() {
    let fixture = TestStore::new().await;

    let err = fixture
        .store
        .create_container(&ctx_at(0), container("UPPER", 0))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidResourceName);
}

#[tokio::test]
async fn test_get_missing_container() {
    let fixture = TestStore::new().await;

    let err = fixture
        .store
        .get_container_properties(
            &ctx_at(0),
            ACCOUNT,
            "nosuchcontainer",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ContainerNotFound);

    let err = fixture
        .store
        .check_container_exist(&ctx_at(0), ACCOUNT, "nosuchcontainer")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ContainerNotFound);
}

#[tokio::test]
async fn test_set_container_metadata_refreshes_etag() {
    let fixture = TestStore::new().await;

    let created = fixture
        .store
        .create_container(&ctx_at(0), container("metacontainer", 0))
        .await
        .unwrap();

    let mut metadata = HashMap::new();
    metadata.insert("key1".to_string(), "value1".to_string());
    metadata.insert("key2".to_string(), "value2".to_string());

    let updated = fixture
        .store
        .set_container_metadata(
            &ctx_at(5),
            ACCOUNT,
            "metacontainer",
            metadata.clone(),
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();

    // Every mutation stamps a fresh etag and a non-decreasing lastModified.
    assert_ne!(updated.etag, created.etag);
    assert!(updated.last_modified >= created.last_modified);

    let props = fixture
        .store
        .get_container_properties(
            &ctx_at(6),
            ACCOUNT,
            "metacontainer",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(props.metadata, metadata);
}

#[tokio::test]
async fn test_container_acl_round_trip() {
    let fixture = TestStore::new().await;

    fixture
        .store
        .create_container(&ctx_at(0), container("aclcontainer", 0))
        .await
        .unwrap();

    let acl = vec![SignedIdentifier {
        id: "policy1".to_string(),
        access_policy: AccessPolicy {
            start: Some(common::base_time()),
            expiry: Some(common::base_time() + chrono::Duration::hours(1)),
            permission: "rw".to_string(),
        },
    }];

    fixture
        .store
        .set_container_acl(
            &ctx_at(2),
            ACCOUNT,
            "aclcontainer",
            acl.clone(),
            PublicAccessLevel::Blob,
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();

    let stored = fixture
        .store
        .get_container_acl(
            &ctx_at(3),
            ACCOUNT,
            "aclcontainer",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(stored.container_acl, acl);
    assert_eq!(stored.public_access, PublicAccessLevel::Blob);
}

#[tokio::test]
async fn test_list_containers_with_prefix_and_marker() {
    let fixture = TestStore::new().await;

    for name in ["list-a", "list-b", "list-c", "other"] {
        fixture
            .store
            .create_container(&ctx_at(0), container(name, 0))
            .await
            .unwrap();
    }

    let (page, marker) = fixture
        .store
        .list_containers(&ctx_at(1), ACCOUNT, Some("list-"), Some(2), None)
        .await
        .unwrap();
    assert_eq!(
        page.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        ["list-a", "list-b"]
    );
    let marker = marker.expect("a full page should return a continuation marker");

    let (rest, _) = fixture
        .store
        .list_containers(&ctx_at(1), ACCOUNT, Some("list-"), Some(2), Some(marker))
        .await
        .unwrap();
    assert_eq!(
        rest.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        ["list-c"]
    );

    // Other accounts see nothing.
    let (foreign, _) = fixture
        .store
        .list_containers(&ctx_at(1), "otheraccount", None, None, None)
        .await
        .unwrap();
    assert!(foreign.is_empty());
}

#[tokio::test]
async fn test_delete_container_requires_lease_id_when_leased() {
    let fixture = TestStore::new().await;

    fixture
        .store
        .create_container(&ctx_at(0), container("leasedcontainer", 0))
        .await
        .unwrap();
    fixture
        .store
        .acquire_container_lease(&ctx_at(1), ACCOUNT, "leasedcontainer", -1, Some("C1"))
        .await
        .unwrap();

    let err = fixture
        .store
        .delete_container(
            &ctx_at(2),
            ACCOUNT,
            "leasedcontainer",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::LeaseIdMissing);

    let err = fixture
        .store
        .delete_container(
            &ctx_at(3),
            ACCOUNT,
            "leasedcontainer",
            &LeaseAccessConditions::with_id("wrong"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::LeaseIdMismatchWithContainerOperation);

    fixture
        .store
        .delete_container(
            &ctx_at(4),
            ACCOUNT,
            "leasedcontainer",
            &LeaseAccessConditions::with_id("C1"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_container_cascades_to_blobs_and_blocks() {
    let fixture = TestStore::new().await;
    let store = &fixture.store;

    store
        .create_container(&ctx_at(0), container("cascade", 0))
        .await
        .unwrap();

    for name in ["blob-1", "blob-2"] {
        store
            .create_blob(
                &ctx_at(1),
                common::committed_block_blob("cascade", name, 1),
                &LeaseAccessConditions::default(),
            )
            .await
            .unwrap();
        store
            .create_snapshot(
                &ctx_at(2),
                ACCOUNT,
                "cascade",
                name,
                None,
                &LeaseAccessConditions::default(),
            )
            .await
            .unwrap();
    }
    store
        .stage_block(&ctx_at(3), common::staged_block("cascade", "blob-1", "AAAA", 16))
        .await
        .unwrap();

    store
        .delete_container(&ctx_at(4), ACCOUNT, "cascade", &LeaseAccessConditions::default())
        .await
        .unwrap();

    let err = store
        .check_container_exist(&ctx_at(5), ACCOUNT, "cascade")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ContainerNotFound);

    // Recreating the container must not resurrect tombstoned rows.
    store
        .create_container(&ctx_at(6), container("cascade", 6))
        .await
        .unwrap();
    let err = store
        .get_blob_properties(
            &ctx_at(7),
            ACCOUNT,
            "cascade",
            "blob-1",
            "",
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BlobNotFound);

    let (blobs, _) = store
        .list_blobs(&ctx_at(7), ACCOUNT, "cascade", None, None, None, true)
        .await
        .unwrap();
    assert!(blobs.is_empty());

    let list = store
        .get_block_list(
            &ctx_at(8),
            ACCOUNT,
            "cascade",
            "blob-1",
            azurite_sql_rs::models::BlockListType::Uncommitted,
            &LeaseAccessConditions::default(),
        )
        .await
        .unwrap();
    assert!(list.uncommitted_blocks.is_empty());
}

#[tokio::test]
async fn test_store_close_rejects_further_operations() {
    let fixture = TestStore::new().await;

    fixture.store.close().await.unwrap();
    let err = fixture.store.close().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidOperation);

    let err = fixture
        .store
        .check_container_exist(&ctx_at(0), ACCOUNT, "any")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidOperation);
}
