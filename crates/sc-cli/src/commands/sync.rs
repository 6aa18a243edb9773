use sc_core::{ContactsResult, ExitCode};
use sc_sync::{
    SkipReason, SyncEngine, SyncOutcome, SyncStatus, SyncTrigger, changed_since, format_millis,
};
use serde_json::json;

use crate::{GlobalOptions, SyncCommand, print_json, with_profile_context};

pub(crate) fn cmd_sync(command: SyncCommand, globals: &GlobalOptions) -> ContactsResult<ExitCode> {
    with_profile_context(globals, |ctx| {
        let backend = ctx.store.profile(&ctx.profile);
        let engine = SyncEngine::new(&ctx.api, &backend);
        let mut contacts = engine.load_context()?;

        match command {
            SyncCommand::Run { auto } => {
                let trigger = if auto {
                    SyncTrigger::Automatic
                } else {
                    SyncTrigger::Explicit
                };
                let outcome = engine.sync(&mut contacts, trigger)?;

                if globals.json {
                    print_json(&json!({
                        "ok": !outcome.is_failed(),
                        "result": {
                            "profile": ctx.profile,
                            "server": ctx.server,
                            "outcome": outcome,
                            "status": SyncStatus::from_meta(&contacts.meta).line(),
                        }
                    }))?;
                } else {
                    println!("{}", describe_outcome(&outcome));
                }

                Ok(outcome_exit_code(&outcome))
            }
            SyncCommand::Status => {
                let status = SyncStatus::from_meta(&contacts.meta);
                let pending = changed_since(
                    &contacts.contacts,
                    contacts.meta.last_sync_at,
                    engine.now_ms(),
                )
                .len();
                let meta = &contacts.meta;

                if globals.json {
                    print_json(&json!({
                        "ok": true,
                        "result": {
                            "profile": ctx.profile,
                            "server": ctx.server,
                            "status": status.line(),
                            "last_sync_at": meta.last_sync_at,
                            "last_sync_attempt": meta.last_sync_attempt,
                            "last_sync_error": meta.last_sync_error,
                            "last_api_check": meta.last_api_check,
                            "contacts": contacts.contacts.live_count(),
                            "tombstones": contacts.contacts.tombstone_count(),
                            "pending_changes": pending,
                        }
                    }))?;
                } else {
                    println!("Profile: {} ({})", ctx.profile, ctx.server);
                    println!("Status: {status}");
                    println!("Last sync: {}", describe_moment(meta.last_sync_at));
                    println!("Last attempt: {}", describe_moment(meta.last_sync_attempt));
                    println!(
                        "Contacts: {} active, {} pending deletion",
                        contacts.contacts.live_count(),
                        contacts.contacts.tombstone_count()
                    );
                    println!("Pending changes: {pending}");
                }

                Ok(if matches!(status, SyncStatus::ApiError(_) | SyncStatus::SyncError(_)) {
                    ExitCode::Sync
                } else {
                    ExitCode::Success
                })
            }
        }
    })
}

pub(crate) fn describe_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Skipped { reason } => match reason {
            SkipReason::NoApiKey => {
                "Sync skipped: no API key configured (run `stellar-contacts key set`)".to_string()
            }
            SkipReason::InFlight => "Sync skipped: another round is in progress".to_string(),
            SkipReason::RateLimited { retry_in_ms } => format!(
                "Sync skipped: last attempt was too recent, retry in {}s",
                (retry_in_ms + 999) / 1000
            ),
        },
        SyncOutcome::Succeeded {
            synced_at,
            sent,
            received,
            merge,
            ..
        } => format!(
            "Synced at {}: sent {sent}, received {received} (updated {}, removed {}, purged {}, stale {})",
            format_millis(*synced_at),
            merge.upserted,
            merge.removed,
            merge.purged,
            merge.stale
        ),
        SyncOutcome::Failed { message, .. } => format!("Sync failed: {message}"),
    }
}

pub(crate) fn outcome_exit_code(outcome: &SyncOutcome) -> ExitCode {
    if outcome.is_failed() {
        ExitCode::Sync
    } else {
        ExitCode::Success
    }
}

fn describe_moment(millis: i64) -> String {
    if millis > 0 {
        format_millis(millis)
    } else {
        "never".to_string()
    }
}
