use sc_core::{ContactsResult, ExitCode};
use sc_fs::{
    ResolvedProfile, init_workspace, list_profiles, load_config, open_or_init, resolve_profile,
    resolve_workspace, run_doctor, save_config, set_active_profile, set_profile_server,
};
use sc_store::{StateStore, resolve_env_api_key};
use serde_json::json;
use std::path::PathBuf;

use crate::commands::key::key_fingerprint;
use crate::{GlobalOptions, InitOutput, ProfileChangedOutput, ProfileCommand, print_json};

pub(crate) fn cmd_init(globals: &GlobalOptions) -> ContactsResult<ExitCode> {
    let result = init_workspace(globals.workspace.as_deref(), globals.server.as_deref())?;
    StateStore::from_workspace(&result.paths)?;

    let output = InitOutput {
        workspace: result.paths.root.display().to_string(),
        created: display_paths(&result.created),
        updated: display_paths(&result.updated),
    };

    if globals.json {
        print_json(&json!({"ok": true, "result": output}))?;
        return Ok(ExitCode::Success);
    }

    println!("Workspace initialized: {}", output.workspace);
    print_path_list("Created", &output.created);
    print_path_list("Updated", &output.updated);
    Ok(ExitCode::Success)
}

fn display_paths(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|path| path.display().to_string()).collect()
}

fn print_path_list(heading: &str, paths: &[String]) {
    if paths.is_empty() {
        println!("{heading}: none");
        return;
    }

    println!("{heading}:");
    for path in paths {
        println!("  - {path}");
    }
}

pub(crate) fn cmd_doctor(globals: &GlobalOptions) -> ContactsResult<ExitCode> {
    let paths = resolve_workspace(globals.workspace.as_deref())?;

    let report = run_doctor(
        &paths,
        globals.profile.as_deref(),
        globals.server.as_deref(),
    )?;

    let stored_key = match report.active_profile.as_deref() {
        Some(profile) => {
            let store = StateStore::from_workspace(&paths)?;
            let meta = store.load_state(profile)?.sync_meta;
            meta.has_api_key().then(|| key_fingerprint(&meta.api_key))
        }
        None => None,
    };
    let env_key = resolve_env_api_key(&paths.root)?.is_some();

    if globals.json {
        print_json(&json!({
            "ok": report.healthy,
            "result": {
                "workspace": report.workspace,
                "healthy": report.healthy,
                "checks": report.checks,
                "active_profile": report.active_profile,
                "server": report.server,
                "api_key": {
                    "configured": stored_key.is_some(),
                    "fingerprint": stored_key,
                    "env_available": env_key
                }
            }
        }))?;
    } else {
        println!("Workspace: {}", report.workspace);
        println!(
            "Health: {}",
            if report.healthy {
                "healthy"
            } else {
                "degraded"
            }
        );

        for check in &report.checks {
            let prefix = if check.ok { "OK" } else { "FAIL" };
            println!("[{}] {} -> {}", prefix, check.name, check.details);
        }

        match &stored_key {
            Some(fingerprint) => println!("[OK] api_key -> configured (sha256 {fingerprint})"),
            None if env_key => println!(
                "[WARN] api_key -> not stored; STELLAR_CONTACTS_API_KEY available, run `stellar-contacts key set`"
            ),
            None => println!("[WARN] api_key -> not configured; sync is disabled"),
        }
    }

    Ok(if report.healthy {
        ExitCode::Success
    } else {
        ExitCode::Io
    })
}

pub(crate) fn cmd_profile(
    command: ProfileCommand,
    globals: &GlobalOptions,
) -> ContactsResult<ExitCode> {
    let paths = open_or_init(globals.workspace.as_deref(), globals.server.as_deref())?;
    let mut config = load_config(&paths)?;

    match command {
        ProfileCommand::List => {
            let profiles = list_profiles(&config);
            if globals.json {
                print_json(&json!({
                    "ok": true,
                    "result": {"active_profile": config.active_profile, "profiles": profiles}
                }))?;
            } else {
                for profile in profiles {
                    let marker = if profile.active { "*" } else { " " };
                    println!("{marker} {:<16} {}", profile.name, profile.server);
                }
            }
        }
        ProfileCommand::Use { name } => {
            set_active_profile(&mut config, &name)?;
            save_config(&paths, &config)?;
            let resolved = resolve_profile(&config, Some(&name), globals.server.as_deref())?;
            render_profile_change(globals, "Active profile is now", resolved)?;
        }
        ProfileCommand::Set { name, server } => {
            let target_profile = name
                .map(|name| name.trim().to_string())
                .unwrap_or_else(|| config.active_profile.clone());
            set_profile_server(&mut config, &target_profile, &server)?;
            save_config(&paths, &config)?;
            let resolved = resolve_profile(&config, Some(&target_profile), None)?;
            render_profile_change(globals, "Updated profile", resolved)?;
        }
    }

    Ok(ExitCode::Success)
}

fn render_profile_change(
    globals: &GlobalOptions,
    heading: &str,
    resolved: ResolvedProfile,
) -> ContactsResult<()> {
    let output = ProfileChangedOutput {
        profile: resolved.name,
        server: resolved.server,
    };

    if globals.json {
        print_json(&json!({"ok": true, "result": output}))
    } else {
        println!("{heading} '{}' -> {}", output.profile, output.server);
        Ok(())
    }
}
