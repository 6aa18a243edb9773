use sc_core::{ContactsError, ContactsResult, ExitCode};
use sc_store::{API_KEY_ENV, resolve_env_api_key};
use sc_sync::{KeyValidation, SyncEngine, SyncStatus};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{GlobalOptions, KeyCommand, print_json, with_profile_context};

/// Short, non-reversible tag for telling keys apart in output.
pub(crate) fn key_fingerprint(api_key: &str) -> String {
    let digest = hex::encode(Sha256::digest(api_key.as_bytes()));
    digest[..12].to_string()
}

pub(crate) fn cmd_key(command: KeyCommand, globals: &GlobalOptions) -> ContactsResult<ExitCode> {
    with_profile_context(globals, |ctx| {
        let backend = ctx.store.profile(&ctx.profile);
        let engine = SyncEngine::new(&ctx.api, &backend);
        let mut contacts = engine.load_context()?;

        match command {
            KeyCommand::Set { key } => {
                let api_key = match key {
                    Some(key) => key,
                    None => resolve_env_api_key(&ctx.paths.root)?.ok_or_else(|| {
                        ContactsError::usage(format!(
                            "no API key given; pass KEY or set {API_KEY_ENV}"
                        ))
                    })?,
                };
                if api_key.trim().is_empty() {
                    return Err(ContactsError::usage(
                        "API key is empty; use `stellar-contacts key clear` to remove it",
                    ));
                }

                let changed = engine.set_api_key(&mut contacts, &api_key)?;
                let validation = if changed {
                    announce_check(globals);
                    Some(engine.validate_api_key(&mut contacts)?)
                } else {
                    None
                };

                let status = SyncStatus::from_meta(&contacts.meta);
                if globals.json {
                    print_json(&json!({
                        "ok": validation.as_ref().is_none_or(KeyValidation::is_accepted),
                        "result": {
                            "profile": ctx.profile,
                            "changed": changed,
                            "fingerprint": key_fingerprint(&contacts.meta.api_key),
                            "validation": validation,
                            "status": status.line(),
                        }
                    }))?;
                } else if changed {
                    println!(
                        "API key stored for profile '{}' (sha256 {})",
                        ctx.profile,
                        key_fingerprint(&contacts.meta.api_key)
                    );
                    println!("{status}");
                } else {
                    println!("API key unchanged for profile '{}'", ctx.profile);
                }

                Ok(validation_exit_code(validation.as_ref()))
            }
            KeyCommand::Check => {
                if contacts.meta.has_api_key() {
                    announce_check(globals);
                }
                let validation = engine.validate_api_key(&mut contacts)?;
                if validation == KeyValidation::NoApiKey {
                    return Err(ContactsError::usage(format!(
                        "no API key configured for profile '{}'",
                        ctx.profile
                    )));
                }

                let status = SyncStatus::from_meta(&contacts.meta);
                if globals.json {
                    print_json(&json!({
                        "ok": validation.is_accepted(),
                        "result": {
                            "profile": ctx.profile,
                            "validation": validation,
                            "status": status.line(),
                        }
                    }))?;
                } else {
                    println!("{status}");
                }

                Ok(validation_exit_code(Some(&validation)))
            }
            KeyCommand::Clear => {
                let changed = engine.set_api_key(&mut contacts, "")?;
                if globals.json {
                    print_json(&json!({
                        "ok": true,
                        "result": {"profile": ctx.profile, "changed": changed}
                    }))?;
                } else if changed {
                    println!("API key removed from profile '{}'; sync is disabled", ctx.profile);
                } else {
                    println!("No API key was configured for profile '{}'", ctx.profile);
                }

                Ok(ExitCode::Success)
            }
            KeyCommand::Status => {
                let meta = &contacts.meta;
                let fingerprint = meta
                    .has_api_key()
                    .then(|| key_fingerprint(&meta.api_key));
                let status = SyncStatus::from_meta(meta);

                if globals.json {
                    print_json(&json!({
                        "ok": true,
                        "result": {
                            "profile": ctx.profile,
                            "configured": fingerprint.is_some(),
                            "fingerprint": fingerprint,
                            "last_api_check": meta.last_api_check,
                            "status": status.line(),
                        }
                    }))?;
                } else {
                    match &fingerprint {
                        Some(fingerprint) => println!("API key: configured (sha256 {fingerprint})"),
                        None => println!("API key: not configured"),
                    }
                    println!("Status: {status}");
                }

                Ok(ExitCode::Success)
            }
        }
    })
}

/// The key check blocks on the network; say so before it starts.
fn announce_check(globals: &GlobalOptions) {
    if !globals.json {
        println!("{}", SyncStatus::Checking);
    }
}

fn validation_exit_code(validation: Option<&KeyValidation>) -> ExitCode {
    match validation {
        Some(KeyValidation::Rejected(_)) => ExitCode::Auth,
        _ => ExitCode::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_short_and_stable() {
        let fingerprint = key_fingerprint("secret-key");
        assert_eq!(fingerprint.len(), 12);
        assert_eq!(fingerprint, key_fingerprint("secret-key"));
        assert_ne!(fingerprint, key_fingerprint("other-key"));
        assert!(fingerprint.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
