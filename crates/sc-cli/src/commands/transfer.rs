use sc_core::{ContactsError, ContactsResult, ExitCode};
use sc_sync::{KeyValidation, SyncEngine, SyncTrigger, export_contacts, parse_import};
use serde_json::{Value, json};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use crate::annotate::{LabelStyle, annotate_text};
use crate::commands::sync::{describe_outcome, outcome_exit_code};
use crate::{GlobalOptions, print_json, resolve_user_path, with_profile_context};

pub(crate) fn cmd_import(file: PathBuf, globals: &GlobalOptions) -> ContactsResult<ExitCode> {
    with_profile_context(globals, |ctx| {
        let path = resolve_user_path(file, &ctx.paths.root);
        let text = fs::read_to_string(&path).map_err(|err| {
            ContactsError::io(format!(
                "failed to read import file '{}': {err}",
                path.display()
            ))
        })?;
        let rows = parse_import(&text)?;

        let backend = ctx.store.profile(&ctx.profile);
        let engine = SyncEngine::new(&ctx.api, &backend);
        let mut contacts = engine.load_context()?;
        let imported = engine.import_rows(&mut contacts, &rows)?;

        let exit = match (&imported.validation, &imported.sync) {
            (KeyValidation::Rejected(_), _) => ExitCode::Auth,
            (_, Some(outcome)) => outcome_exit_code(outcome),
            _ => ExitCode::Success,
        };

        if globals.json {
            print_json(&json!({"ok": exit == ExitCode::Success, "result": imported}))?;
        } else {
            println!(
                "Imported {} contacts from {}",
                imported.imported,
                path.display()
            );
            match &imported.validation {
                KeyValidation::NoApiKey => println!("No API key configured; not syncing"),
                KeyValidation::Accepted(_) => {}
                KeyValidation::Rejected(check) => println!("{}", check.message),
            }
            if let Some(outcome) = &imported.sync {
                println!("{}", describe_outcome(outcome));
            }
        }

        Ok(exit)
    })
}

pub(crate) fn cmd_export(
    output: Option<PathBuf>,
    globals: &GlobalOptions,
) -> ContactsResult<ExitCode> {
    with_profile_context(globals, |ctx| {
        let backend = ctx.store.profile(&ctx.profile);
        let engine = SyncEngine::new(&ctx.api, &backend);
        let contacts = engine.load_context()?;
        let exported = export_contacts(&contacts.contacts)?;
        let count = contacts.contacts.live_count();

        match output {
            Some(path) => {
                let path = if path.is_absolute() {
                    path
                } else {
                    ctx.paths.root.join(path)
                };
                fs::write(&path, format!("{exported}\n")).map_err(|err| {
                    ContactsError::io(format!(
                        "failed to write export file '{}': {err}",
                        path.display()
                    ))
                })?;

                if globals.json {
                    print_json(&json!({
                        "ok": true,
                        "result": {"path": path.display().to_string(), "exported": count}
                    }))?;
                } else {
                    println!("Exported {count} contacts to {}", path.display());
                }
            }
            None if globals.json => {
                let value: Value = serde_json::from_str(&exported).map_err(|err| {
                    ContactsError::io(format!("failed to re-read export: {err}"))
                })?;
                print_json(&json!({"ok": true, "result": {"contacts": value, "exported": count}}))?;
            }
            None => println!("{exported}"),
        }

        Ok(ExitCode::Success)
    })
}

pub(crate) fn cmd_annotate(
    file: Option<PathBuf>,
    short: bool,
    sync: bool,
    globals: &GlobalOptions,
) -> ContactsResult<ExitCode> {
    with_profile_context(globals, |ctx| {
        let text = match file {
            Some(file) => {
                let path = resolve_user_path(file, &ctx.paths.root);
                fs::read_to_string(&path).map_err(|err| {
                    ContactsError::io(format!("failed to read '{}': {err}", path.display()))
                })?
            }
            None => {
                let mut buffer = String::new();
                std::io::stdin()
                    .read_to_string(&mut buffer)
                    .map_err(|err| ContactsError::io(format!("failed to read stdin: {err}")))?;
                buffer
            }
        };

        let backend = ctx.store.profile(&ctx.profile);
        let engine = SyncEngine::new(&ctx.api, &backend);
        let mut contacts = engine.load_context()?;
        if sync {
            let outcome = engine.sync(&mut contacts, SyncTrigger::Automatic)?;
            tracing::debug!(outcome = %describe_outcome(&outcome), "refreshed before annotating");
        }

        let style = if short {
            LabelStyle::Short
        } else {
            LabelStyle::Inline
        };
        let result = annotate_text(&text, &contacts.contacts.read(), style);

        if globals.json {
            print_json(&json!({"ok": true, "result": result}))?;
        } else {
            print!("{}", result.text);
        }

        Ok(ExitCode::Success)
    })
}
