use sc_core::{ContactsError, ContactsResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "STELLAR_CONTACTS_API_KEY";
pub const ENV_FILE_ENV: &str = "STELLAR_CONTACTS_ENV_FILE";

const DOTENV: &str = ".env";

/// Looks for an API key in the process environment, then in a `.env` file:
/// `STELLAR_CONTACTS_ENV_FILE` if it names a file, otherwise the nearest
/// `.env` above the current directory or the workspace root.
pub fn resolve_env_api_key(workspace_root: &Path) -> ContactsResult<Option<String>> {
    if let Some(key) = std::env::var(API_KEY_ENV).ok().and_then(non_blank) {
        return Ok(Some(key));
    }

    let Some(path) = locate_env_file(workspace_root) else {
        return Ok(None);
    };

    let raw = fs::read_to_string(&path).map_err(|err| {
        ContactsError::io(format!("failed to read env file '{}': {err}", path.display()))
    })?;

    Ok(raw
        .lines()
        .filter_map(parse_env_line)
        .filter(|(name, _)| *name == API_KEY_ENV)
        .last()
        .and_then(|(_, value)| non_blank(value)))
}

fn locate_env_file(workspace_root: &Path) -> Option<PathBuf> {
    let explicit = std::env::var_os(ENV_FILE_ENV)
        .map(PathBuf::from)
        .filter(|path| path.is_file());
    if explicit.is_some() {
        return explicit;
    }

    let cwd = std::env::current_dir().ok();
    cwd.iter()
        .map(PathBuf::as_path)
        .chain([workspace_root])
        .find_map(|start| {
            start
                .ancestors()
                .map(|dir| dir.join(DOTENV))
                .find(|candidate| candidate.is_file())
        })
}

/// `NAME=value`, optionally prefixed with `export` and with the value in
/// matching single or double quotes. Comments and malformed lines are `None`.
fn parse_env_line(line: &str) -> Option<(&str, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }

    let line = line.strip_prefix("export ").unwrap_or(line);
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(value);

    Some((name, unquoted.to_string()))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
