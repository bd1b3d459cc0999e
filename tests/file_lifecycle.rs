//! End-to-end file lifecycle tests.
//!
//! Upload, list, share, download and delete through the `Hangar` context,
//! checking quota accounting and access decisions along the way.

mod common;

use chrono::{Duration, Utc};
use futures::TryStreamExt;
use serde_json::json;

use common::{text_upload, TestApp};
use hangar::{
    Accounts, HangarError, ListQuery, NewProvider, RegistrationRequest, RequestOrigin, Requester,
    SortKey, SortOrder, UploadRequest,
};

#[tokio::test]
async fn test_quota_scenario() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let files = app.hangar.files();

    let first = files.upload(&alice, text_upload("a.txt", 600)).await.unwrap();
    assert_eq!(app.used(&alice).await, 600);

    let err = files.upload(&alice, text_upload("b.txt", 800)).await.unwrap_err();
    assert!(matches!(
        err,
        HangarError::QuotaExceeded {
            requested: 800,
            available: 400
        }
    ));
    assert_eq!(app.used(&alice).await, 600);

    files.upload(&alice, text_upload("c.txt", 400)).await.unwrap();
    assert_eq!(app.used(&alice).await, 1000);

    files.delete(&alice, &first.id).await.unwrap();
    assert_eq!(app.used(&alice).await, 400);
    assert_eq!(app.stored_bytes(&alice).await, 400);
    assert_eq!(app.blob_count(), 1);
}

#[tokio::test]
async fn test_direct_link_window() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let files = app.hangar.files();
    let origin = RequestOrigin::new("192.0.2.1", "curl/8.0");

    let file = files.upload(&alice, text_upload("private.txt", 32)).await.unwrap();
    let link = files.issue_direct_link(&alice, &file.id).await.unwrap();
    assert!(link.url.contains(&format!("/api/files/{}/download?token=", file.id)));

    let grant = files.verify_link(&link.token).unwrap();
    let requester = Requester::anonymous().with_link(grant);

    let before = files
        .download_at(&requester, &file.id, &origin, link.expires_at - Duration::seconds(1))
        .await
        .unwrap();
    let content: Vec<bytes::Bytes> = before.stream.try_collect().await.unwrap();
    assert_eq!(content.concat().len(), 32);

    let after = files
        .download_at(&requester, &file.id, &origin, link.expires_at + Duration::seconds(1))
        .await;
    assert!(matches!(after, Err(HangarError::Forbidden(_))));

    // only the successful attempt is recorded
    let record = files.get(&alice, &file.id).await.unwrap();
    assert_eq!(record.download_count, 1);
}

#[tokio::test]
async fn test_forged_or_foreign_links_are_refused() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let files = app.hangar.files();
    let origin = RequestOrigin::default();

    let one = files.upload(&alice, text_upload("one.txt", 1)).await.unwrap();
    let two = files.upload(&alice, text_upload("two.txt", 1)).await.unwrap();

    assert!(matches!(
        files.verify_link("garbage"),
        Err(HangarError::Forbidden(_))
    ));

    let link = files.issue_direct_link(&alice, &one.id).await.unwrap();
    let requester = Requester::anonymous().with_link(files.verify_link(&link.token).unwrap());
    assert!(matches!(
        files.download(&requester, &two.id, &origin).await,
        Err(HangarError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_private_file_stays_reachable_by_token() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let files = app.hangar.files();
    let origin = RequestOrigin::default();

    let file = files.upload(&alice, text_upload("shared.txt", 8)).await.unwrap();
    files.set_visibility(&alice, &file.id, true, None).await.unwrap();
    assert!(files
        .download(&Requester::anonymous(), &file.id, &origin)
        .await
        .is_ok());

    let link = files.issue_direct_link(&alice, &file.id).await.unwrap();
    files.set_visibility(&alice, &file.id, false, None).await.unwrap();

    assert!(matches!(
        files.download(&Requester::anonymous(), &file.id, &origin).await,
        Err(HangarError::Forbidden(_))
    ));
    let requester = Requester::anonymous().with_link(files.verify_link(&link.token).unwrap());
    assert!(files.download(&requester, &file.id, &origin).await.is_ok());
}

#[tokio::test]
async fn test_expiry_overrides_every_path() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let root = app.admin("root").await;
    let files = app.hangar.files();
    let origin = RequestOrigin::default();

    let file = files.upload(&alice, text_upload("soon.txt", 4)).await.unwrap();
    let link = files.issue_direct_link(&alice, &file.id).await.unwrap();
    let expires_at = Utc::now() + Duration::minutes(10);
    files
        .set_visibility(&alice, &file.id, true, Some(expires_at))
        .await
        .unwrap();

    let later = expires_at + Duration::seconds(1);
    let with_link = Requester::anonymous().with_link(files.verify_link(&link.token).unwrap());
    for requester in [
        Requester::anonymous(),
        Requester::principal(alice.clone()),
        Requester::principal(root.clone()),
        with_link,
    ] {
        let result = files.download_at(&requester, &file.id, &origin, later).await;
        assert!(matches!(result, Err(HangarError::Gone(_))));
    }
}

#[tokio::test]
async fn test_admin_access() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let bob = app.user("bob", 1000).await;
    let root = app.admin("root").await;
    let files = app.hangar.files();
    let origin = RequestOrigin::default();

    let file = files.upload(&alice, text_upload("a.txt", 3)).await.unwrap();

    assert!(files
        .download(&Requester::principal(root.clone()), &file.id, &origin)
        .await
        .is_ok());
    assert!(files.issue_direct_link(&root, &file.id).await.is_ok());
    assert!(matches!(
        files.download(&Requester::principal(bob.clone()), &file.id, &origin).await,
        Err(HangarError::Forbidden(_))
    ));

    // admins read but do not delete other users' files
    assert!(matches!(
        files.delete(&root, &file.id).await,
        Err(HangarError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_is_idempotent_at_the_record_level() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let files = app.hangar.files();

    let file = files.upload(&alice, text_upload("gone.txt", 70)).await.unwrap();
    std::fs::remove_file(app.hangar.local().path_for(&file.stored_name).unwrap()).unwrap();

    files.delete(&alice, &file.id).await.unwrap();
    assert_eq!(app.used(&alice).await, 0);

    assert!(matches!(
        files.delete(&alice, &file.id).await,
        Err(HangarError::NotFound(_))
    ));
    assert_eq!(app.used(&alice).await, 0);
}

#[tokio::test]
async fn test_provider_in_use_cannot_be_deleted() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let providers = app.hangar.providers();
    let files = app.hangar.files();

    let unused = providers
        .register(&alice.id, NewProvider::new("spare", "local", json!({})))
        .await
        .unwrap();
    providers.delete(&alice.id, &unused.id).await.unwrap();

    let disk = providers
        .register(&alice.id, NewProvider::new("disk", "local", json!({})).as_default())
        .await
        .unwrap();
    let file = files
        .upload(&alice, text_upload("on-disk.txt", 10).with_storage(&disk.id))
        .await
        .unwrap();
    assert_eq!(file.storage_id.as_deref(), Some(disk.id.as_str()));
    assert_eq!(file.storage_type, "local");

    assert!(matches!(
        providers.delete(&alice.id, &disk.id).await,
        Err(HangarError::Conflict(_))
    ));
    assert!(providers.get(&alice.id, &disk.id).await.is_ok());

    files.delete(&alice, &file.id).await.unwrap();
    providers.delete(&alice.id, &disk.id).await.unwrap();
}

#[tokio::test]
async fn test_upload_through_unusable_provider() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 1000).await;
    let bob = app.user("bob", 1000).await;
    let providers = app.hangar.providers();
    let files = app.hangar.files();

    // registered, but the OAuth flow has not produced an endpoint yet
    let drive = providers
        .register(
            &alice.id,
            NewProvider::new(
                "drive",
                "onedrive",
                json!({"client_id": "id", "client_secret": "secret"}),
            ),
        )
        .await
        .unwrap();
    let result = files
        .upload(&alice, text_upload("a.txt", 10).with_storage(&drive.id))
        .await;
    assert!(matches!(result, Err(HangarError::Validation(_))));
    assert_eq!(app.used(&alice).await, 0);

    // someone else's provider is invisible
    let result = files
        .upload(&bob, text_upload("b.txt", 10).with_storage(&drive.id))
        .await;
    assert!(matches!(result, Err(HangarError::NotFound(_))));
    assert_eq!(app.used(&bob).await, 0);
    assert_eq!(app.blob_count(), 0);
}

#[tokio::test]
async fn test_admission_policy() {
    let app = TestApp::with_max_file_size(100).await;
    let alice = app.user("alice", 10_000).await;
    let files = app.hangar.files();

    let too_big = files.upload(&alice, text_upload("big.txt", 101)).await;
    assert!(matches!(too_big, Err(HangarError::Validation(_))));

    let unnamed = files.upload(&alice, text_upload("", 10)).await;
    assert!(matches!(unnamed, Err(HangarError::Validation(_))));

    let script = files
        .upload(
            &alice,
            UploadRequest::new("run.sh", "application/x-sh", b"#!/bin/sh".to_vec()),
        )
        .await;
    assert!(matches!(script, Err(HangarError::UnsupportedMediaType(_))));

    let image = files
        .upload(
            &alice,
            UploadRequest::new("Photo.PNG", "IMAGE/PNG", vec![0u8; 100]),
        )
        .await
        .unwrap();
    assert_eq!(image.mime_type, "image/png");
    assert!(image.stored_name.ends_with(".png"));
    assert_eq!(image.original_name, "Photo.PNG");

    assert_eq!(app.used(&alice).await, 100);
}

#[tokio::test]
async fn test_listing() {
    let app = TestApp::new().await;
    let alice = app.user("alice", 10_000).await;
    let bob = app.user("bob", 10_000).await;
    let files = app.hangar.files();

    for (name, size) in [("b-report.txt", 30), ("a-notes.txt", 10), ("c-report.txt", 20)] {
        files.upload(&alice, text_upload(name, size)).await.unwrap();
    }
    files.upload(&bob, text_upload("bob-report.txt", 5)).await.unwrap();

    let by_size = files
        .list(
            &alice,
            &ListQuery::new().with_sort(SortKey::FileSize, SortOrder::Asc),
        )
        .await
        .unwrap();
    let names: Vec<&str> = by_size.files.iter().map(|f| f.original_name.as_str()).collect();
    assert_eq!(names, vec!["a-notes.txt", "c-report.txt", "b-report.txt"]);
    assert_eq!(by_size.total, 3);
    assert_eq!(by_size.pages, 1);

    let search = ListQuery::from_params(Some(1), Some(1), Some("original_name"), Some("desc"), Some("REPORT"));
    let page = files.list(&alice, &search).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.pages, 2);
    assert_eq!(page.files.len(), 1);
    assert_eq!(page.files[0].original_name, "c-report.txt");
}

#[tokio::test]
async fn test_accounts_and_stats() {
    let app = TestApp::new().await;
    let accounts: Accounts<'_> = app.hangar.accounts();

    accounts
        .register(RegistrationRequest::new(
            "carol",
            "carol@example.com",
            "correct horse",
        ))
        .await
        .unwrap();
    let carol = accounts.authenticate("CAROL@example.com", "correct horse").await.unwrap();
    assert!(matches!(
        accounts.authenticate("carol", "wrong password").await,
        Err(HangarError::Auth(_))
    ));

    let files = app.hangar.files();
    let doc = files.upload(&carol, text_upload("doc.txt", 50)).await.unwrap();
    files
        .upload(
            &carol,
            UploadRequest::new("pic.jpg", "image/jpeg", vec![0u8; 25]),
        )
        .await
        .unwrap();
    files.set_visibility(&carol, &doc.id, true, None).await.unwrap();
    files
        .download(&Requester::anonymous(), &doc.id, &RequestOrigin::default())
        .await
        .unwrap();

    let stats = app.hangar.stats();
    let overview = stats.overview(&carol.id).await.unwrap();
    assert_eq!(overview.total_files, 2);
    assert_eq!(overview.total_downloads, 1);
    assert_eq!(overview.used, 75);
    assert_eq!(overview.top_downloads[0].id, doc.id);

    let usage = stats.usage(&carol.id).await.unwrap();
    assert_eq!(usage.by_storage_type.len(), 1);
    assert_eq!(usage.by_storage_type[0].size, 75);

    let analytics = stats.analytics(&carol.id, Utc::now()).await.unwrap();
    assert_eq!(analytics.this_month.total_files, 2);
    assert_eq!(analytics.file_type_breakdown.len(), 2);

    let history = stats.history(&carol.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].file_count, 2);

    let downloads = files.downloads_for_owner(&carol, 1, 10).await.unwrap();
    assert_eq!(downloads.total, 1);
    assert_eq!(downloads.logs[0].original_name, "doc.txt");
}
