use assert_cmd::Command;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ALICE: &str = "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7";
const BOB: &str = "GBBD47IF6LWK7P7MDEVSCWR7DPUWV3NY3DTQEVFL4NAT4AQH3ZLLFLA5";

#[test]
fn contacts_are_stored_locally_without_a_key() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let saved = run_command(&workspace.path, &["contact", "set", ALICE, " Alice ", "--json"]);
    assert_eq!(saved["ok"], true);
    assert_eq!(saved["result"]["changed"], true);
    assert_eq!(saved["result"]["sync"], Value::Null);

    let listed = run_command(&workspace.path, &["contact", "list", "--json"]);
    assert_eq!(
        listed["result"]["contacts"],
        json!([{"id": ALICE, "label": "Alice"}])
    );

    let status = run_command(&workspace.path, &["sync", "status", "--json"]);
    assert_eq!(status["result"]["status"]["state"], "waiting_for_key");
    assert_eq!(status["result"]["pending_changes"], 1);
}

#[test]
fn key_set_validates_and_saving_syncs() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let check = server.mock(|when, then| {
        when.method(GET)
            .path("/api")
            .header("authorization", "Bearer key-123");
        then.status(200).json_body(json!({"ok": true}));
    });
    let sync = server.mock(|when, then| {
        when.method(POST)
            .path("/api/contacts/sync")
            .header("authorization", "Bearer key-123")
            .json_body_partial(json!({"items": {ALICE: {"label": "Alice"}}}).to_string());
        then.status(200).json_body(json!({
            "items": {BOB: {"label": "Bob", "updated_at": 1_600_000_000_000_i64}}
        }));
    });

    let key = run_command(&workspace.path, &["key", "set", "key-123", "--json"]);
    assert_eq!(key["ok"], true);
    assert_eq!(key["result"]["changed"], true);
    assert_eq!(key["result"]["validation"]["result"], "accepted");
    check.assert_hits(1);

    let saved = run_command(&workspace.path, &["contact", "set", ALICE, "Alice", "--json"]);
    assert_eq!(saved["result"]["sync"]["status"], "succeeded");
    assert_eq!(saved["result"]["sync"]["merge"]["upserted"], 1);
    sync.assert_hits(1);

    let listed = run_command(&workspace.path, &["contact", "list", "--json"]);
    let ids: Vec<&str> = listed["result"]["contacts"]
        .as_array()
        .expect("contacts array")
        .iter()
        .filter_map(|row| row["id"].as_str())
        .collect();
    assert_eq!(ids, vec![ALICE, BOB]);

    let status = run_command(&workspace.path, &["key", "status", "--json"]);
    assert_eq!(status["result"]["configured"], true);
    assert_eq!(status["result"]["status"]["state"], "synced");
}

#[test]
fn rejected_key_exits_with_auth_code() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    server.mock(|when, then| {
        when.method(GET).path("/api");
        then.status(401).json_body(json!({"message": "Invalid API key"}));
    });

    let assert = base_command(&workspace.path)
        .args(["key", "set", "bad-key", "--json"])
        .assert()
        .code(3);
    let output: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json stdout");
    assert_eq!(output["ok"], false);
    assert_eq!(
        output["result"]["status"]["message"],
        "API key check failed: Invalid API key"
    );
}

#[test]
fn failed_sync_is_recorded_and_exits_with_sync_code() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());
    store_key_without_check(&workspace.path, &server);

    server.mock(|when, then| {
        when.method(POST).path("/api/contacts/sync");
        then.status(502).body("upstream unavailable");
    });

    base_command(&workspace.path)
        .args(["sync", "run", "--json"])
        .assert()
        .code(4);

    let status = base_command(&workspace.path)
        .args(["sync", "status", "--json"])
        .assert()
        .code(4);
    let output: Value =
        serde_json::from_slice(&status.get_output().stdout).expect("json stdout");
    assert_eq!(output["result"]["last_sync_error"], "upstream unavailable");
    assert_eq!(output["result"]["status"]["state"], "sync_error");
    assert_eq!(output["result"]["last_sync_at"], 0);
}

#[test]
fn automatic_sync_is_rate_limited_across_invocations() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());
    store_key_without_check(&workspace.path, &server);

    let sync = server.mock(|when, then| {
        when.method(POST).path("/api/contacts/sync");
        then.status(200).json_body(json!({"items": {}}));
    });

    let first = run_command(&workspace.path, &["sync", "run", "--auto", "--json"]);
    assert_eq!(first["result"]["outcome"]["status"], "succeeded");

    let second = run_command(&workspace.path, &["sync", "run", "--auto", "--json"]);
    assert_eq!(second["result"]["outcome"]["status"], "skipped");
    assert!(second["result"]["outcome"]["reason"]["rate_limited"]["retry_in_ms"].is_i64());

    sync.assert_hits(1);

    let explicit = run_command(&workspace.path, &["sync", "run", "--json"]);
    assert_eq!(explicit["result"]["outcome"]["status"], "succeeded");
    sync.assert_hits(2);
}

#[test]
fn import_replaces_contacts_and_export_writes_them_back() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    run_command(&workspace.path, &["contact", "set", BOB, "Bob", "--json"]);

    let import_path = workspace.path.join("incoming.json");
    fs::write(
        &import_path,
        json!({ALICE: {"label": "Alice"}, "12345": "numeric", "a,b": "comma"}).to_string(),
    )
    .expect("write import");

    let imported = run_command(
        &workspace.path,
        &["import", import_path.to_str().expect("path"), "--json"],
    );
    assert_eq!(imported["result"]["imported"], 1);
    assert_eq!(imported["result"]["validation"]["result"], "no_api_key");

    let exported = run_command(
        &workspace.path,
        &["export", "--output", "StellarContacts.json", "--json"],
    );
    assert_eq!(exported["result"]["exported"], 1);

    let written: Value = serde_json::from_str(
        &fs::read_to_string(workspace.path.join("StellarContacts.json")).expect("read export"),
    )
    .expect("export json");
    assert_eq!(written, json!({ALICE: {"label": "Alice"}}));

    let status = run_command(&workspace.path, &["sync", "status", "--json"]);
    assert_eq!(status["result"]["tombstones"], 1);
}

#[test]
fn import_rejects_arrays() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let import_path = workspace.path.join("list.json");
    fs::write(&import_path, "[\"GA\"]").expect("write import");

    base_command(&workspace.path)
        .args(["import", import_path.to_str().expect("path")])
        .assert()
        .code(2);
}

#[test]
fn annotate_labels_known_accounts() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());
    run_command(&workspace.path, &["contact", "set", ALICE, "Alice", "--json"]);

    let page = workspace.path.join("page.txt");
    fs::write(&page, format!("paid {ALICE} and {BOB}\n")).expect("write page");

    let inline = run_command(
        &workspace.path,
        &["annotate", "--file", page.to_str().expect("path"), "--json"],
    );
    assert_eq!(
        inline["result"]["text"],
        format!("paid {ALICE} [Alice] and {BOB}\n")
    );

    let short = base_command(&workspace.path)
        .args(["annotate", "--short"])
        .write_stdin(format!("to {ALICE}"))
        .assert()
        .success();
    assert_eq!(
        String::from_utf8_lossy(&short.get_output().stdout),
        "to GA…OCCWN7 [📒 Alice]"
    );
}

#[test]
fn removing_unknown_contact_is_a_usage_error() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let assert = base_command(&workspace.path)
        .args(["contact", "remove", ALICE, "--json"])
        .assert()
        .code(2);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("\"kind\": \"usage\""), "stderr: {stderr}");
    assert!(stderr.contains("not found"), "stderr: {stderr}");
}

#[test]
fn key_check_announces_itself_in_text_mode() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let check = server.mock(|when, then| {
        when.method(GET)
            .path("/api")
            .header("authorization", "Bearer key-123");
        then.status(200).json_body(json!({"ok": true}));
    });

    let assert = base_command(&workspace.path)
        .args(["key", "check"])
        .assert()
        .code(2);
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(!stdout.contains("Checking API key..."));
    check.assert_hits(0);

    run_command(&workspace.path, &["key", "set", "key-123", "--json"]);
    let assert = base_command(&workspace.path)
        .args(["key", "check"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec!["Checking API key...", "API key accepted."]
    );
    check.assert_hits(2);
}

#[test]
fn doctor_reports_key_fingerprint() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());
    store_key_without_check(&workspace.path, &server);

    let report = run_command(&workspace.path, &["doctor", "--json"]);
    assert_eq!(report["ok"], true);
    assert_eq!(report["result"]["api_key"]["configured"], true);
    assert_eq!(
        report["result"]["api_key"]["fingerprint"]
            .as_str()
            .map(str::len),
        Some(12)
    );
}

fn store_key_without_check(workspace: &Path, server: &MockServer) {
    let mut check = server.mock(|when, then| {
        when.method(GET).path("/api");
        then.status(200);
    });
    run_command(workspace, &["key", "set", "key-123", "--json"]);
    check.delete();
}

fn init_workspace(workspace: &Path, server_url: &str) {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("stellar-contacts");
    cmd.args([
        "init",
        "--workspace",
        workspace.to_str().expect("workspace path"),
        "--server",
        server_url,
        "--json",
    ]);

    cmd.assert().success();
}

fn run_command(workspace: &Path, args: &[&str]) -> Value {
    let mut cmd = base_command(workspace);
    cmd.args(args);

    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    serde_json::from_str(&stdout).expect("json stdout")
}

fn base_command(workspace: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("stellar-contacts");
    cmd.current_dir(workspace)
        .env_remove("STELLAR_CONTACTS_API_KEY")
        .env_remove("STELLAR_CONTACTS_ENV_FILE")
        .env_remove("RUST_LOG")
        .args(["--workspace", workspace.to_str().expect("workspace path")]);
    cmd
}

#[derive(Debug)]
struct TestWorkspace {
    _temp: TempDir,
    path: PathBuf,
}

fn temp_workspace() -> TestWorkspace {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace_path = temp.path().join("workspace");
    fs::create_dir_all(&workspace_path).expect("create workspace dir");
    TestWorkspace {
        _temp: temp,
        path: workspace_path,
    }
}
