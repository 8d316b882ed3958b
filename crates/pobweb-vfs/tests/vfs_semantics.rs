//! Virtual file semantics over the SQLite backend.

use std::sync::Arc;

use bytes::Bytes;
use pobweb_vfs::{
    Metadata, Owner, PutResult, SqliteKv, Subject, VfsError, VfsProfile, VfsService,
};
use serde_json::json;

fn service() -> VfsService {
    VfsService::new(Arc::new(SqliteKv::memory().unwrap()))
}

fn owner(sub: &str) -> Owner {
    Owner::new(Subject::new(sub).unwrap(), None)
}

fn meta(v: serde_json::Value) -> Metadata {
    v.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let vfs = service();
    let alice = owner("auth0|alice");
    let bob = owner("auth0|bob");

    vfs.put(&alice, "Builds/a.xml", Bytes::from_static(b"<Build/>"), None, VfsProfile::METADATA, None)
        .await
        .unwrap();

    let err = vfs.get(&bob, "Builds/a.xml", VfsProfile::METADATA).await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound { .. }));
    assert!(vfs.list(&bob, "", VfsProfile::METADATA).await.unwrap().is_empty());
    // bob deleting the same path does not touch alice's entry
    vfs.delete(&bob, "Builds/a.xml").await.unwrap();
    assert!(vfs.get(&alice, "Builds/a.xml", VfsProfile::METADATA).await.is_ok());
}

#[tokio::test]
async fn test_subject_with_separator_cannot_read_other_tenant() {
    let vfs = service();
    let victim = owner("a");
    let attacker = owner("a:vfs:x");
    vfs.put(&victim, "x:vfs:secret", Bytes::from_static(b"s"), None, VfsProfile::METADATA, None)
        .await
        .unwrap();
    assert!(vfs.get(&attacker, "secret", VfsProfile::METADATA).await.is_err());
    assert!(vfs.list(&attacker, "", VfsProfile::METADATA).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_namespaces_are_separate_key_spaces() {
    let vfs = service();
    let plain = owner("u");
    let poe2 = Owner::new(Subject::new("u").unwrap(), Some("poe2".into()));
    vfs.put(&poe2, "Builds/b.xml", Bytes::from_static(b"2"), None, VfsProfile::METADATA, None)
        .await
        .unwrap();
    assert!(vfs.get(&plain, "Builds/b.xml", VfsProfile::METADATA).await.is_err());
    let names: Vec<_> = vfs
        .list(&poe2, "", VfsProfile::METADATA)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(names, ["Builds/b.xml"]);
}

#[tokio::test]
async fn test_round_trip_and_delete() {
    let vfs = service();
    let me = owner("u");
    let value = Bytes::from((0u8..=255).collect::<Vec<u8>>());
    vfs.put(&me, "bin/all-bytes", value.clone(), None, VfsProfile::PLAIN, None)
        .await
        .unwrap();
    let entry = vfs.get(&me, "bin/all-bytes", VfsProfile::PLAIN).await.unwrap();
    assert_eq!(entry.value, value);
    assert_eq!(entry.metadata, None);

    vfs.delete(&me, "bin/all-bytes").await.unwrap();
    assert!(matches!(
        vfs.get(&me, "bin/all-bytes", VfsProfile::PLAIN).await,
        Err(VfsError::NotFound { .. })
    ));
    // deleting again still succeeds
    vfs.delete(&me, "bin/all-bytes").await.unwrap();
}

#[tokio::test]
async fn test_conditional_write() {
    let vfs = service();
    let me = owner("u");
    let path = "Settings.xml";
    assert_eq!(
        vfs.put(&me, path, Bytes::from_static(b"v1"), None, VfsProfile::PLAIN, None)
            .await
            .unwrap(),
        PutResult::Written
    );

    // plain profile refuses to replace by default
    assert_eq!(
        vfs.put(&me, path, Bytes::from_static(b"v2"), None, VfsProfile::PLAIN, None)
            .await
            .unwrap(),
        PutResult::Rejected
    );
    assert_eq!(
        vfs.get(&me, path, VfsProfile::PLAIN).await.unwrap().value,
        Bytes::from_static(b"v1")
    );

    // unless asked to
    assert_eq!(
        vfs.put(&me, path, Bytes::from_static(b"v3"), None, VfsProfile::PLAIN, Some(true))
            .await
            .unwrap(),
        PutResult::Written
    );
    assert_eq!(
        vfs.get(&me, path, VfsProfile::PLAIN).await.unwrap().value,
        Bytes::from_static(b"v3")
    );

    // metadata profile replaces by default, refuses with overwrite=false
    assert_eq!(
        vfs.put(&me, path, Bytes::from_static(b"v4"), None, VfsProfile::METADATA, Some(false))
            .await
            .unwrap(),
        PutResult::Rejected
    );
    assert_eq!(
        vfs.put(&me, path, Bytes::from_static(b"v5"), None, VfsProfile::METADATA, None)
            .await
            .unwrap(),
        PutResult::Written
    );
}

#[tokio::test]
async fn test_metadata_replace_not_merge() {
    let vfs = service();
    let me = owner("u");
    vfs.put(&me, "dir", Bytes::new(), Some(meta(json!({"dir": true}))), VfsProfile::METADATA, None)
        .await
        .unwrap();
    assert_eq!(
        vfs.head(&me, "dir", VfsProfile::METADATA).await.unwrap(),
        Some(meta(json!({"dir": true})))
    );

    vfs.put(&me, "dir", Bytes::new(), None, VfsProfile::METADATA, None)
        .await
        .unwrap();
    assert_eq!(
        vfs.head(&me, "dir", VfsProfile::METADATA).await.unwrap(),
        Some(Metadata::new())
    );
    // plain profile never exposes metadata
    assert_eq!(vfs.head(&me, "dir", VfsProfile::PLAIN).await.unwrap(), None);
}

#[tokio::test]
async fn test_list_drains_every_page() {
    let vfs = service().with_page_size(3);
    let me = owner("u");
    for i in 0..10 {
        vfs.put(
            &me,
            &format!("Builds/{i:02}.xml"),
            Bytes::new(),
            Some(meta(json!({"i": i}))),
            VfsProfile::METADATA,
            None,
        )
        .await
        .unwrap();
    }
    vfs.put(&me, "Other/x", Bytes::new(), None, VfsProfile::METADATA, None)
        .await
        .unwrap();

    let all = vfs.list(&me, "", VfsProfile::METADATA).await.unwrap();
    assert_eq!(all.len(), 11);

    let builds = vfs.list(&me, "Builds/", VfsProfile::METADATA).await.unwrap();
    assert_eq!(builds.len(), 10);
    assert_eq!(builds[0].name, "Builds/00.xml");
    assert_eq!(builds[0].metadata, Some(meta(json!({"i": 0}))));

    let plain = vfs.list(&me, "Builds/", VfsProfile::PLAIN).await.unwrap();
    assert!(plain.iter().all(|l| l.metadata.is_none()));
}

#[tokio::test]
async fn test_limits() {
    let vfs = service().with_limits(pobweb_vfs::Limits {
        max_value_bytes: 4,
        max_metadata_bytes: 16,
    });
    let me = owner("u");
    assert!(matches!(
        vfs.put(&me, "big", Bytes::from_static(b"12345"), None, VfsProfile::PLAIN, None)
            .await,
        Err(VfsError::TooLarge { .. })
    ));
    assert!(matches!(
        vfs.put(
            &me,
            "meta",
            Bytes::new(),
            Some(meta(json!({"long": "xxxxxxxxxxxxxxxx"}))),
            VfsProfile::METADATA,
            None
        )
        .await,
        Err(VfsError::InvalidMetadata { .. })
    ));
    assert!(vfs.get(&me, "big", VfsProfile::PLAIN).await.is_err());
}

#[tokio::test]
async fn test_invalid_paths_are_client_errors() {
    let vfs = service();
    let me = owner("u");
    let err = vfs.get(&me, "/etc/passwd", VfsProfile::PLAIN).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(matches!(err, VfsError::InvalidPath { .. }));
}

#[tokio::test]
async fn test_concurrent_no_overwrite_puts_admit_one_writer() {
    let vfs = Arc::new(service());
    let mut handles = Vec::new();
    for i in 0..16u8 {
        let vfs = Arc::clone(&vfs);
        handles.push(tokio::spawn(async move {
            vfs.put(&owner("u"), "race", Bytes::from(vec![i]), None, VfsProfile::PLAIN, None)
                .await
                .unwrap()
        }));
    }
    let mut written = 0;
    for h in handles {
        if h.await.unwrap() == PutResult::Written {
            written += 1;
        }
    }
    assert_eq!(written, 1);
}
