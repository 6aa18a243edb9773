use sc_core::{ContactsError, ContactsResult, ExitCode};
use sc_sync::{ContactId, SaveOutcome, SyncEngine};
use serde_json::json;

use crate::commands::sync::{describe_outcome, outcome_exit_code};
use crate::{ContactCommand, GlobalOptions, print_json, with_profile_context};

pub(crate) fn cmd_contact(
    command: ContactCommand,
    globals: &GlobalOptions,
) -> ContactsResult<ExitCode> {
    with_profile_context(globals, |ctx| {
        let backend = ctx.store.profile(&ctx.profile);
        let engine = SyncEngine::new(&ctx.api, &backend);
        let mut contacts = engine.load_context()?;

        match command {
            ContactCommand::List => {
                let labels = contacts.contacts.read();
                if globals.json {
                    let rows: Vec<_> = labels
                        .iter()
                        .map(|(id, label)| json!({"id": id, "label": label}))
                        .collect();
                    print_json(&json!({"ok": true, "result": {"contacts": rows}}))?;
                } else if labels.is_empty() {
                    println!("No contacts for profile '{}'", ctx.profile);
                } else {
                    for (id, label) in &labels {
                        println!("{id}  {label}");
                    }
                }

                Ok(ExitCode::Success)
            }
            ContactCommand::Set {
                id,
                label,
                no_sync,
            } => {
                let id = parse_id(&id)?;
                let label = label.trim();
                let saved =
                    engine.save_contact(&mut contacts, id.as_str(), Some(label), !no_sync)?;
                render_save(globals, &format!("Saved {id} as '{label}'"), &saved)
            }
            ContactCommand::Remove { id, no_sync } => {
                let id = parse_id(&id)?;
                if contacts
                    .contacts
                    .get(id.as_str())
                    .is_none_or(|entry| entry.is_tombstone())
                {
                    return Err(ContactsError::usage(format!("contact '{id}' not found")));
                }

                let saved = engine.save_contact(&mut contacts, id.as_str(), None, !no_sync)?;
                render_save(globals, &format!("Removed {id}"), &saved)
            }
        }
    })
}

fn parse_id(raw: &str) -> ContactsResult<ContactId> {
    ContactId::new(raw.trim()).ok_or_else(|| ContactsError::usage("contact id cannot be empty"))
}

fn render_save(
    globals: &GlobalOptions,
    summary: &str,
    saved: &SaveOutcome,
) -> ContactsResult<ExitCode> {
    let exit = saved
        .sync
        .as_ref()
        .map(outcome_exit_code)
        .unwrap_or(ExitCode::Success);

    if globals.json {
        print_json(&json!({"ok": exit == ExitCode::Success, "result": saved}))?;
    } else {
        if saved.changed {
            println!("{summary}");
        } else {
            println!("No change");
        }
        if let Some(outcome) = &saved.sync {
            println!("{}", describe_outcome(outcome));
        }
    }

    Ok(exit)
}
