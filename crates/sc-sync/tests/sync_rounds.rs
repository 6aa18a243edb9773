use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use sc_api::ContactsApi;
use sc_fs::init_workspace;
use sc_store::{MemoryStateBackend, StateBackend, StateStore, StoredState, SyncMeta};
use sc_sync::{
    ContactEntry, ContactsContext, SkipReason, SyncEngine, SyncOutcome, SyncStatus, SyncTrigger,
};
use serde_json::json;
use std::fs;
use std::time::Duration;

fn keyed_backend(contacts: &str) -> MemoryStateBackend {
    MemoryStateBackend::with_state(StoredState {
        contacts: Some(contacts.to_string()),
        sync_meta: SyncMeta::for_api_key("key-123"),
    })
}

#[test]
fn round_trip_pushes_changes_and_applies_remote_edits() {
    let server = MockServer::start();
    let sync = server.mock(|when, then| {
        when.method(POST)
            .path("/api/contacts/sync")
            .header("authorization", "Bearer key-123")
            .json_body_partial(
                json!({"items": {"GLOCAL": {"label": "Local", "updated_at": 100}}}).to_string(),
            );
        then.status(200).json_body(json!({
            "items": {
                "GLOCAL": {"label": "Local", "updated_at": 100},
                "GREMOTE": {"label": "Remote", "updated_at": 150},
                "GDROPPED": {"label": null, "updated_at": 999}
            }
        }));
    });

    let backend = keyed_backend(
        r#"{"GLOCAL":{"label":"Local","updated_at":100},"GDROPPED":{"label":"Old","updated_at":50}}"#,
    );
    let api = ContactsApi::new(&server.base_url()).expect("api client");
    let engine = SyncEngine::new(&api, &backend);

    let mut context = engine.load_context().expect("load");
    let outcome = engine
        .sync(&mut context, SyncTrigger::Automatic)
        .expect("sync");

    sync.assert_hits(1);
    assert!(outcome.changed());
    let labels = context.contacts.read();
    assert_eq!(labels.get("GLOCAL").map(String::as_str), Some("Local"));
    assert_eq!(labels.get("GREMOTE").map(String::as_str), Some("Remote"));
    assert!(context.contacts.get("GDROPPED").is_none());

    let stored = backend.load_state().expect("state");
    assert!(stored.sync_meta.last_sync_at > 0);
    assert_eq!(stored.sync_meta.last_sync_error, None);
    assert_eq!(
        SyncStatus::from_meta(&stored.sync_meta),
        SyncStatus::SyncedAt(stored.sync_meta.last_sync_at)
    );
}

#[test]
fn two_automatic_triggers_make_one_request() {
    let server = MockServer::start();
    let sync = server.mock(|when, then| {
        when.method(POST).path("/api/contacts/sync");
        then.status(200).json_body(json!({"items": {}}));
    });

    let backend = keyed_backend("{}");
    let api = ContactsApi::new(&server.base_url()).expect("api client");
    let engine = SyncEngine::new(&api, &backend);
    let mut context = engine.load_context().expect("load");

    let first = engine
        .sync(&mut context, SyncTrigger::Automatic)
        .expect("first");
    let second = engine
        .sync(&mut context, SyncTrigger::Automatic)
        .expect("second");

    sync.assert_hits(1);
    assert!(matches!(first, SyncOutcome::Succeeded { .. }));
    assert!(matches!(
        second,
        SyncOutcome::Skipped {
            reason: SkipReason::RateLimited { .. }
        }
    ));
}

#[test]
fn concurrent_trigger_is_dropped_while_a_round_is_in_flight() {
    let server = MockServer::start();
    let sync = server.mock(|when, then| {
        when.method(POST).path("/api/contacts/sync");
        then.status(200)
            .delay(Duration::from_millis(800))
            .json_body(json!({"items": {}}));
    });

    let backend = keyed_backend("{}");
    let api = ContactsApi::new(&server.base_url()).expect("api client");
    let engine = SyncEngine::new(&api, &backend);
    let mut first_context = engine.load_context().expect("load");
    let mut second_context = first_context.clone();

    let (first, second) = std::thread::scope(|scope| {
        let running =
            scope.spawn(|| engine.sync(&mut first_context, SyncTrigger::Explicit));

        std::thread::sleep(Duration::from_millis(200));
        let second = engine.sync(&mut second_context, SyncTrigger::Explicit);
        (running.join().expect("sync thread"), second)
    });

    sync.assert_hits(1);
    assert!(matches!(
        first.expect("first round"),
        SyncOutcome::Succeeded { .. }
    ));
    assert_eq!(
        second.expect("second round"),
        SyncOutcome::Skipped {
            reason: SkipReason::InFlight
        }
    );
    assert!(!engine.is_in_flight());
}

#[test]
fn server_error_is_recorded_and_change_set_is_resent() {
    let server = MockServer::start();
    let mut failing = server.mock(|when, then| {
        when.method(POST).path("/api/contacts/sync");
        then.status(500).json_body(json!({"error": "database unavailable"}));
    });

    let backend = keyed_backend(r#"{"GA":{"label":"Alice","updated_at":100}}"#);
    let api = ContactsApi::new(&server.base_url()).expect("api client");
    let engine = SyncEngine::new(&api, &backend);
    let mut context = engine.load_context().expect("load");

    let outcome = engine
        .sync(&mut context, SyncTrigger::Explicit)
        .expect("sync");
    assert!(outcome.is_failed());
    assert_eq!(
        backend.snapshot().sync_meta.last_sync_error.as_deref(),
        Some("database unavailable")
    );
    assert_eq!(context.meta.last_sync_at, 0);
    failing.assert_hits(1);
    failing.delete();

    let recovering = server.mock(|when, then| {
        when.method(POST)
            .path("/api/contacts/sync")
            .json_body_partial(
                json!({"items": {"GA": {"label": "Alice", "updated_at": 100}}}).to_string(),
            );
        then.status(200).json_body(json!({"items": {}}));
    });

    let outcome = engine
        .sync(&mut context, SyncTrigger::Explicit)
        .expect("retry");
    recovering.assert_hits(1);
    assert!(matches!(outcome, SyncOutcome::Succeeded { .. }));
    assert_eq!(backend.snapshot().sync_meta.last_sync_error, None);
}

#[test]
fn unreachable_server_is_a_recorded_failure() {
    let backend = keyed_backend("{}");
    let api = ContactsApi::new("http://127.0.0.1:9").expect("api client");
    let engine = SyncEngine::new(&api, &backend);
    let mut context = engine.load_context().expect("load");

    let outcome = engine
        .sync(&mut context, SyncTrigger::Explicit)
        .expect("sync");

    let SyncOutcome::Failed {
        message,
        http_status,
    } = outcome
    else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.starts_with("network request failed"));
    assert_eq!(http_status, None);
    assert!(!engine.is_in_flight());
}

#[test]
fn key_check_hits_api_root() {
    let server = MockServer::start();
    let check = server.mock(|when, then| {
        when.method(GET)
            .path("/api")
            .header("authorization", "Bearer key-123");
        then.status(200).json_body(json!({"ok": true}));
    });

    let backend = keyed_backend("{}");
    let api = ContactsApi::new(&server.base_url()).expect("api client");
    let engine = SyncEngine::new(&api, &backend);
    let mut context = engine.load_context().expect("load");

    let validation = engine.validate_api_key(&mut context).expect("validate");

    check.assert_hits(1);
    assert!(validation.is_accepted());
    assert_eq!(
        SyncStatus::from_meta(&backend.snapshot().sync_meta),
        SyncStatus::KeyAccepted
    );
}

#[test]
fn sqlite_workspace_upgrades_legacy_file_and_syncs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let init = init_workspace(Some(&temp.path().join("ws")), None).expect("init workspace");
    fs::write(&init.paths.legacy_contacts_path, r#"{"GLEGACY": "Legacy"}"#)
        .expect("legacy file");

    let server = MockServer::start();
    let sync = server.mock(|when, then| {
        when.method(POST).path("/api/contacts/sync");
        then.status(200).json_body(json!({
            "items": {"GNEW": {"label": "From elsewhere", "updated_at": 1_600_000_000_000_i64}}
        }));
    });

    let store = StateStore::from_workspace(&init.paths).expect("state store");
    let backend = store.profile("default");
    let api = ContactsApi::new(&server.base_url()).expect("api client");
    let engine = SyncEngine::new(&api, &backend);

    let mut context: ContactsContext = engine.load_context().expect("load");
    assert_eq!(context.contacts.read().len(), 1);
    engine.set_api_key(&mut context, "key-123").expect("set key");
    engine
        .sync(&mut context, SyncTrigger::Explicit)
        .expect("sync");
    sync.assert_hits(1);

    let reopened = StateStore::from_workspace(&init.paths).expect("reopen");
    let reloaded_backend = reopened.profile("default");
    let reloaded = SyncEngine::new(&api, &reloaded_backend)
        .load_context()
        .expect("reload");

    assert_eq!(reloaded, context);
    assert_eq!(
        reloaded.contacts.get("GNEW"),
        Some(&ContactEntry::live("From elsewhere", 1_600_000_000_000))
    );
    assert!(reloaded.meta.last_sync_at > 0);
}
