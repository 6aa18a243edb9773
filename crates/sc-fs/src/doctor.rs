use crate::config::{ResolvedProfile, load_config, resolve_profile};
use crate::workspace::WorkspacePaths;
use sc_core::ContactsResult;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub ok: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub workspace: String,
    pub healthy: bool,
    pub checks: Vec<DoctorCheck>,
    pub active_profile: Option<String>,
    pub server: Option<String>,
}

impl DoctorCheck {
    fn new(name: &str, ok: bool, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            ok,
            details: details.into(),
        }
    }

    fn path(name: &str, path: &Path, present: bool) -> Self {
        Self::new(name, present, path.display().to_string())
    }
}

/// Inspects the workspace layout and the profile selection. Never fails on
/// a broken workspace; problems show up as failed checks.
pub fn run_doctor(
    paths: &WorkspacePaths,
    profile_override: Option<&str>,
    server_override: Option<&str>,
) -> ContactsResult<DoctorReport> {
    let mut checks = vec![
        DoctorCheck::path("workspace_root", &paths.root, paths.root.is_dir()),
        DoctorCheck::path("state_directory", &paths.state_dir, paths.is_initialized()),
        DoctorCheck::path("config_file", &paths.config_path, paths.config_path.is_file()),
        DoctorCheck::path(
            "state_db_file",
            &paths.state_db_path,
            paths.state_db_path.is_file(),
        ),
    ];

    if paths.legacy_contacts_path.is_file() {
        checks.push(DoctorCheck::new(
            "legacy_contacts",
            true,
            format!(
                "{} will be adopted by the default profile if it has no contacts yet",
                paths.legacy_contacts_path.display()
            ),
        ));
    }

    let resolved = if paths.config_path.is_file() {
        let (check, resolved) = profile_check(paths, profile_override, server_override);
        checks.push(check);
        resolved
    } else {
        None
    };

    Ok(DoctorReport {
        workspace: paths.root.display().to_string(),
        healthy: checks.iter().all(|check| check.ok),
        checks,
        active_profile: resolved.as_ref().map(|profile| profile.name.clone()),
        server: resolved.map(|profile| profile.server),
    })
}

fn profile_check(
    paths: &WorkspacePaths,
    profile_override: Option<&str>,
    server_override: Option<&str>,
) -> (DoctorCheck, Option<ResolvedProfile>) {
    let config = match load_config(paths) {
        Ok(config) => config,
        Err(err) => return (DoctorCheck::new("config_parse", false, err.message), None),
    };

    match resolve_profile(&config, profile_override, server_override) {
        Ok(resolved) => {
            let details = format!("{} ({})", resolved.name, resolved.server);
            (DoctorCheck::new("active_profile", true, details), Some(resolved))
        }
        Err(err) => (DoctorCheck::new("active_profile", false, err.message), None),
    }
}
