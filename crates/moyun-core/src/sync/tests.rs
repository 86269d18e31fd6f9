use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::watch;

use super::*;
use crate::clock::ManualClock;
use crate::models::{ChangeType, Document, LibraryItem, Paragraph, Settings};
use crate::remote::{AuthProvider, InjectedFailure, MemoryTransport, RemoteStore, SessionAuth};

struct Harness {
    local: LocalStore,
    transport: Arc<MemoryTransport>,
    auth: Arc<SessionAuth>,
    clock: ManualClock,
    sync: SyncOrchestrator<MemoryTransport>,
}

async fn harness() -> Harness {
    let local = LocalStore::open_in_memory().await.unwrap();
    let transport = Arc::new(MemoryTransport::new());
    let auth = Arc::new(SessionAuth::signed_in("u1"));
    let provider: Arc<dyn AuthProvider> = auth.clone();
    let remote = RemoteStore::new(Arc::clone(&transport), provider);
    let clock = ManualClock::new(1_000);
    let sync = SyncOrchestrator::new(local.clone(), remote, Arc::new(clock.clone()));
    Harness {
        local,
        transport,
        auth,
        clock,
        sync,
    }
}

fn document(id: &str, last_modified: i64, text: &str) -> Document {
    let mut document = Document::new(format!("Doc {id}"), last_modified);
    document.id = id.to_string();
    document.paragraphs.push(Paragraph::new(text));
    document
}

fn body(id: &str, last_modified: i64, text: &str) -> Value {
    serde_json::to_value(document(id, last_modified, text)).unwrap()
}

fn index_entry(id: &str, last_modified: i64) -> Value {
    json!({"id": id, "title": format!("Doc {id}"), "lastModified": last_modified, "previewText": ""})
}

impl Harness {
    async fn seed_local_document(&self, id: &str, last_modified: i64, text: &str) {
        let document = document(id, last_modified, text);
        self.local.save_document_body(&document).await.unwrap();
        let mut index = self.local.load_document_index().await.unwrap().entries;
        index.insert(document.index_entry());
        self.local.save_document_index(&index).await.unwrap();
    }

    fn remote_index_ids(&self) -> Vec<(String, i64)> {
        self.transport
            .peek("users/u1/docs/index")
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .map(|entry| {
                (
                    entry["id"].as_str().unwrap().to_string(),
                    entry["lastModified"].as_i64().unwrap(),
                )
            })
            .collect()
    }

    async fn local_index_ids(&self) -> Vec<(String, i64)> {
        self.local
            .load_document_index()
            .await
            .unwrap()
            .entries
            .sorted_by_recency()
            .into_iter()
            .map(|entry| (entry.id, entry.last_modified))
            .collect()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn index_sync_merges_both_directions() {
    let h = harness().await;
    h.seed_local_document("a", 100, "local a").await;
    h.transport.seed(
        "users/u1/docs/index",
        json!([index_entry("a", 50), index_entry("b", 80)]),
    );
    h.transport.seed("users/u1/docs/a", body("a", 50, "remote a"));
    h.transport.seed("users/u1/docs/b", body("b", 80, "remote b"));

    let outcome = h.sync.sync_document_index().await.unwrap();
    assert_eq!((outcome.uploads, outcome.downloads), (1, 1));

    let expected = vec![("a".to_string(), 100), ("b".to_string(), 80)];
    assert_eq!(h.local_index_ids().await, expected);
    assert_eq!(h.remote_index_ids(), expected);

    let remote_a = h.transport.peek("users/u1/docs/a").unwrap();
    assert_eq!(remote_a["paragraphs"][0]["content"], json!("local a"));
    let local_b = h.local.load_document("b").await.unwrap().unwrap();
    assert_eq!(local_b.paragraphs[0].content, "remote b");
}

#[tokio::test(flavor = "multi_thread")]
async fn second_sync_all_writes_nothing() {
    let h = harness().await;
    h.seed_local_document("a", 100, "a").await;
    h.transport.seed("users/u1/docs/index", json!([index_entry("b", 80)]));
    h.transport.seed("users/u1/docs/b", body("b", 80, "b"));
    h.sync
        .save_library_item(LibraryItem::new("Harbor", "Fog and bells", 0))
        .await
        .unwrap();
    h.sync
        .save_settings(serde_json::from_value(json!({"apiKey": "K", "theme": "ink"})).unwrap())
        .await
        .unwrap();

    let first = h.sync.sync_all().await;
    assert!(first.is_success());
    assert!(first.total_uploads() > 0);

    h.transport.clear_log();
    let second = h.sync.sync_all().await;
    assert!(second.is_success());
    assert_eq!(second.total_uploads() + second.total_downloads(), 0);
    assert!(h.transport.writes().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_install_initializes_empty_collections_on_both_sides() {
    let h = harness().await;

    let summary = h.sync.sync_all().await;
    assert!(summary.is_success());
    assert_eq!(h.transport.peek("users/u1/docs/index"), Some(json!([])));
    assert_eq!(h.transport.peek("users/u1/worldLibrary"), Some(json!([])));
    assert!(h.local.load_document_index().await.unwrap().initialized);
}

#[tokio::test(flavor = "multi_thread")]
async fn secret_never_leaves_the_device() {
    let h = harness().await;
    h.local
        .save_settings(
            &serde_json::from_value(json!({"_lastModified": 200, "apiKey": "K", "theme": "dark"}))
                .unwrap(),
        )
        .await
        .unwrap();

    let outcome = h.sync.sync_settings().await.unwrap();
    assert_eq!(outcome.uploads, 1);
    let remote = h.transport.peek("users/u1/settings").unwrap();
    assert_eq!(remote.get("apiKey"), None);
    assert_eq!(remote["theme"], json!("dark"));

    h.transport.seed(
        "users/u1/settings",
        json!({"_lastModified": 300, "apiKey": "REMOTE", "theme": "light"}),
    );
    let outcome = h.sync.sync_settings().await.unwrap();
    assert_eq!(outcome.downloads, 1);

    let local: Settings = h.local.load_settings().await.unwrap().unwrap();
    assert_eq!(local.api_key, "K");
    assert_eq!(local.field("theme"), Some(&json!("light")));
    assert!(!h.transport.snapshot().to_string().contains("\"K\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_is_resumable_after_a_failure() {
    let h = harness().await;
    for id in ["a", "b", "c"] {
        h.sync.save_document(document(id, 0, id)).await.unwrap();
    }
    let queued = h.sync.queue().list().await.unwrap();
    assert_eq!(queued.len(), 3);

    h.transport
        .fail_path("users/u1/docs/b", InjectedFailure::Unavailable);
    let report = h.sync.drain().await;
    assert!(!report.success);
    assert_eq!(report.count, 2);
    assert_eq!(report.failed_ids(), vec![queued[1].id]);

    let remaining = h.sync.queue().list().await.unwrap();
    assert_eq!(remaining, vec![queued[1].clone()]);

    h.transport.clear_failures();
    h.transport.clear_log();
    let report = h.sync.drain().await;
    assert!(report.success);
    assert_eq!(report.count, 1);
    assert_eq!(h.transport.writes(), vec!["users/u1/docs/b"]);
    assert!(h.sync.queue().is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_does_not_run_offline_or_signed_out() {
    let h = harness().await;
    h.sync.save_document(document("a", 0, "a")).await.unwrap();

    h.sync.on_unreachable();
    let report = h.sync.drain().await;
    assert_eq!(report.reason.as_deref(), Some("offline"));
    assert!(!report.success);

    h.sync.on_reachable();
    h.auth.sign_out();
    let report = h.sync.drain().await;
    assert!(report.reason.is_some());
    assert_eq!(h.sync.queue().len().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_is_superseded_by_newer_remote_body() {
    let h = harness().await;
    h.transport.seed("users/u1/docs/a", body("a", 5_000, "newer remote"));
    h.sync.save_document(document("a", 0, "older local")).await.unwrap();

    let report = h.sync.drain().await;
    assert!(report.success);
    assert_eq!(report.count, 1);
    assert!(h.transport.writes().is_empty());
    assert!(h.sync.queue().is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_queue_records_are_kept_and_counted() {
    let h = harness().await;
    h.sync
        .queue()
        .append("x", ChangeType::Update, &json!("not a document"))
        .await
        .unwrap();
    h.sync.save_document(document("a", 0, "fine")).await.unwrap();

    let report = h.sync.drain().await;
    assert_eq!(report.count, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].change.entity_id, "x");
    assert!(report.failed[0].reason.contains("corrupt"));
    assert_eq!(h.sync.queue().len().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_delete_is_not_resurrected_by_sync() {
    let h = harness().await;
    h.seed_local_document("a", 100, "a").await;
    h.sync.sync_all().await;
    assert!(h.transport.peek("users/u1/docs/a").is_some());

    h.sync.on_unreachable();
    assert!(h.sync.delete_document("a").await.unwrap());
    h.sync.sync_all().await;
    assert!(h.local_index_ids().await.is_empty());
    assert_eq!(h.local.load_document("a").await.unwrap(), None);

    h.sync.on_reachable();
    let report = h.sync.drain().await;
    assert!(report.success);
    assert!(h.transport.peek("users/u1/docs/a").is_none());
    assert!(h.remote_index_ids().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn map_shaped_remote_index_is_rewritten_as_list() {
    let h = harness().await;
    h.transport.seed(
        "users/u1/docs/index",
        json!({"a": index_entry("a", 10), "b": index_entry("b", 20)}),
    );
    h.transport.seed("users/u1/docs/a", body("a", 10, "a"));
    h.transport.seed("users/u1/docs/b", body("b", 20, "b"));

    let outcome = h.sync.sync_document_index().await.unwrap();
    assert_eq!(outcome.downloads, 2);
    assert!(h
        .transport
        .peek("users/u1/docs/index")
        .is_some_and(|value| value.is_array()));
    assert_eq!(
        h.remote_index_ids(),
        vec![("b".to_string(), 20), ("a".to_string(), 10)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_remote_body_is_not_downloaded() {
    let h = harness().await;
    h.seed_local_document("a", 10, "local a").await;
    h.transport.seed(
        "users/u1/docs/index",
        json!([index_entry("a", 20), index_entry("ghost", 30)]),
    );

    let outcome = h.sync.sync_document_index().await.unwrap();
    assert_eq!(outcome.downloads, 0);
    assert_eq!(h.local_index_ids().await, vec![("a".to_string(), 10)]);
    assert_eq!(h.local.load_document("ghost").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_remote_entries_are_skipped() {
    let h = harness().await;
    h.transport.seed(
        "users/u1/docs/index",
        json!([index_entry("a", 20), {"title": "no id"}, 42]),
    );
    h.transport.seed("users/u1/docs/a", body("a", 20, "a"));

    let outcome = h.sync.sync_document_index().await.unwrap();
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.downloads, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_ids_unusable_as_paths_do_not_stop_the_pass() {
    let h = harness().await;
    h.transport.seed(
        "users/u1/docs/index",
        json!([index_entry("bad.id", 5), index_entry("b", 80)]),
    );
    h.transport.seed("users/u1/docs/b", body("b", 80, "remote b"));

    let outcome = h.sync.sync_document_index().await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.downloads, 1);
    assert_eq!(h.local_index_ids().await, vec![("b".to_string(), 80)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_remote_settings_win_even_with_a_null_secret() {
    let h = harness().await;
    h.local
        .save_settings(
            &serde_json::from_value(json!({"_lastModified": 100, "apiKey": "K", "theme": "ink"}))
                .unwrap(),
        )
        .await
        .unwrap();
    h.transport.seed(
        "users/u1/settings",
        json!({"_lastModified": 500, "apiKey": null, "theme": "paper"}),
    );

    let outcome = h.sync.sync_settings().await.unwrap();
    assert_eq!((outcome.uploads, outcome.downloads, outcome.skipped), (0, 1, 0));

    let local = h.local.load_settings().await.unwrap().unwrap();
    assert_eq!(local.api_key, "K");
    assert_eq!(local.last_modified, 500);
    assert_eq!(local.field("theme"), Some(&json!("paper")));
    let remote = h.transport.peek("users/u1/settings").unwrap();
    assert_eq!(remote["theme"], json!("paper"));
    assert!(h.transport.writes().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_change_types_are_kept_and_counted() {
    let h = harness().await;
    {
        let db = h.local.database();
        let db = db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO pending_changes (entity_id, change_type, payload, timestamp)
                 VALUES ('x', 'rename', '{}', 1)",
                (),
            )
            .await
            .unwrap();
    }
    h.sync.save_document(document("a", 0, "fine")).await.unwrap();

    let report = h.sync.drain().await;
    assert!(!report.success);
    assert_eq!(report.count, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].change.entity_id, "x");
    assert_eq!(report.failed[0].change.change_type, ChangeType::Unknown);
    assert!(report.failed[0].reason.contains("corrupt"));
    assert_eq!(h.sync.queue().len().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_prunes_queued_writes_it_uploaded() {
    let h = harness().await;
    h.sync.save_document(document("a", 0, "first")).await.unwrap();
    h.clock.advance(10);
    h.sync.save_document(document("a", 0, "second")).await.unwrap();
    assert_eq!(h.sync.queue().len().await.unwrap(), 2);

    let summary = h.sync.sync_all().await;
    assert!(summary.is_success());
    assert!(h.sync.queue().is_empty().await.unwrap());
    let remote_a = h.transport.peek("users/u1/docs/a").unwrap();
    assert_eq!(remote_a["paragraphs"][0]["content"], json!("second"));

    h.sync.on_unreachable();
    h.clock.advance(10);
    h.sync.save_document(document("b", 0, "offline")).await.unwrap();
    h.sync.delete_document("a").await.unwrap();
    h.sync.on_reachable();
    h.sync.sync_all().await;
    let kinds: Vec<(String, ChangeType)> = h
        .sync
        .queue()
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|change| (change.entity_id, change.change_type))
        .collect();
    assert_eq!(kinds, vec![("a".to_string(), ChangeType::Delete)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_index_syncs_run_one_at_a_time() {
    let h = harness().await;
    h.seed_local_document("a", 100, "local a").await;
    h.transport.seed("users/u1/docs/index", json!([index_entry("b", 80)]));
    h.transport.seed("users/u1/docs/b", body("b", 80, "remote b"));

    let (first, second) = tokio::join!(
        h.sync.sync_document_index(),
        h.sync.sync_document_index()
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.uploads + second.uploads, 1);
    assert_eq!(first.downloads + second.downloads, 1);

    let expected = vec![("a".to_string(), 100), ("b".to_string(), 80)];
    assert_eq!(h.local_index_ids().await, expected);
    assert_eq!(h.remote_index_ids(), expected);

    let held = h.sync.index_lock.lock().await;
    let blocked =
        tokio::time::timeout(Duration::from_millis(20), h.sync.sync_document_index()).await;
    assert!(blocked.is_err());
    drop(held);
}

#[tokio::test(flavor = "multi_thread")]
async fn library_merges_per_item_and_removal_reaches_remote() {
    let h = harness().await;
    let mut local_item = LibraryItem::new("Harbor", "local", 0);
    local_item.id = "w1".to_string();
    h.clock.set(10);
    h.sync.save_library_item(local_item).await.unwrap();
    h.transport.seed(
        "users/u1/worldLibrary",
        json!([
            {"id": "w1", "name": "Harbor", "content": "remote", "lastModified": 20},
            {"id": "w2", "name": "Market", "content": "stalls", "lastModified": 5}
        ]),
    );

    let outcome = h.sync.sync_library().await.unwrap();
    assert_eq!((outcome.uploads, outcome.downloads), (0, 2));
    let library = h.sync.library().await.unwrap();
    assert_eq!(library.len(), 2);
    assert_eq!(library[0].content, "remote");

    assert!(h.sync.remove_library_item("w2").await.unwrap());
    let remote = h.transport.peek("users/u1/worldLibrary").unwrap();
    assert_eq!(remote.as_array().map(Vec::len), Some(1));
    assert_eq!(remote[0]["id"], json!("w1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reports_synced_and_error() {
    let h = harness().await;
    let mut status = h.sync.subscribe();
    assert_eq!(*status.borrow_and_update(), SyncState::Idle);

    h.sync.sync_all().await;
    assert_eq!(*status.borrow_and_update(), SyncState::Synced);

    h.transport.set_offline(true);
    let summary = h.sync.sync_all().await;
    assert!(!summary.is_success());
    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(*status.borrow_and_update(), SyncState::Error);
}

#[tokio::test(flavor = "multi_thread")]
async fn signed_out_sync_all_is_a_noop() {
    let h = harness().await;
    h.auth.sign_out();
    h.seed_local_document("a", 1, "a").await;

    let summary = h.sync.sync_all().await;
    assert!(!summary.ran);
    assert_eq!(h.sync.status(), SyncState::Idle);
    assert!(h.transport.writes().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn permission_denied_is_reported_per_kind() {
    let h = harness().await;
    h.sync
        .save_settings(Settings::default())
        .await
        .unwrap();
    h.transport
        .fail_writes("users/u1", InjectedFailure::PermissionDenied);

    let summary = h.sync.sync_all().await;
    let settings = summary.outcome(SyncKind::Settings).unwrap();
    assert!(settings
        .failure
        .as_deref()
        .is_some_and(|reason| reason.contains("denied access")));
    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(h.sync.status(), SyncState::Error);
}

#[tokio::test(flavor = "multi_thread")]
async fn save_document_stamps_time_and_queues_create_then_update() {
    let h = harness().await;
    h.clock.set(777);
    let saved = h.sync.save_document(document("a", 0, "first")).await.unwrap();
    assert_eq!(saved.last_modified, 777);

    h.clock.set(778);
    h.sync.save_document(document("a", 0, "second")).await.unwrap();

    let kinds: Vec<ChangeType> = h
        .sync
        .queue()
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|change| change.change_type)
        .collect();
    assert_eq!(kinds, vec![ChangeType::Create, ChangeType::Update]);

    let index = h.sync.document_index().await.unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].preview_text, "second");
    assert_eq!(index[0].last_modified, 778);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_document_ids_are_rejected() {
    let h = harness().await;
    let error = h.sync.save_document(document("index", 0, "x")).await.unwrap_err();
    assert!(matches!(error, crate::Error::InvalidInput(_)));
    assert!(h.sync.queue().is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn exclusive_guard_blocks_sync() {
    let h = harness().await;
    let guard = h.sync.exclusive().await;

    let blocked =
        tokio::time::timeout(Duration::from_millis(20), h.sync.sync_settings()).await;
    assert!(blocked.is_err());

    drop(guard);
    h.sync.sync_settings().await.unwrap();
}

#[test]
fn abandoned_status_falls_to_error() {
    let (status, receiver) = watch::channel(SyncState::Idle);
    {
        let _guard = StatusGuard::begin(&status);
        assert_eq!(*receiver.borrow(), SyncState::Syncing);
    }
    assert_eq!(*receiver.borrow(), SyncState::Error);

    StatusGuard::begin(&status).finish(SyncState::Synced);
    assert_eq!(*receiver.borrow(), SyncState::Synced);
}
