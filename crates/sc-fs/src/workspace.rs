use crate::config::{
    DEFAULT_SERVER_URL, WorkspaceConfig, load_config, normalize_server, save_config,
    set_profile_server,
};
use sc_core::{ContactsError, ContactsResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the workspace root that holds config and state.
pub const STATE_DIR_NAME: &str = ".contacts";

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub state_db_path: PathBuf,
    /// Plain `{id: label}` JSON left behind by older installs. Read once when
    /// a profile has no stored contacts yet.
    pub legacy_contacts_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkspaceInitResult {
    pub paths: WorkspacePaths,
    pub created: Vec<PathBuf>,
    pub updated: Vec<PathBuf>,
}

impl WorkspacePaths {
    pub fn from_root(root: PathBuf) -> Self {
        let state_dir = root.join(STATE_DIR_NAME);

        Self {
            config_path: state_dir.join("config.toml"),
            state_db_path: state_dir.join("state.db"),
            legacy_contacts_path: state_dir.join("contacts.json"),
            root,
            state_dir,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir.is_dir()
    }
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Dir,
    File,
}

pub fn init_workspace(
    target: Option<&Path>,
    server: Option<&str>,
) -> ContactsResult<WorkspaceInitResult> {
    let paths = WorkspacePaths::from_root(workspace_root(target, "init")?);
    let mut created = Vec::new();
    let mut updated = Vec::new();

    for (path, entry) in [
        (&paths.root, Entry::Dir),
        (&paths.state_dir, Entry::Dir),
        (&paths.state_db_path, Entry::File),
    ] {
        if ensure(path, entry)? {
            created.push(path.clone());
        }
    }

    let server = server.map(normalize_server).transpose()?;
    if !paths.config_path.exists() {
        let config =
            WorkspaceConfig::with_default_server(server.as_deref().unwrap_or(DEFAULT_SERVER_URL));
        save_config(&paths, &config)?;
        created.push(paths.config_path.clone());
    } else if let Some(server) = server {
        // Re-running init with --server repoints the active profile.
        let mut config = load_config(&paths)?;
        let active = config.active_profile.clone();
        let current = config.profiles.get(&active).map(|profile| profile.server.as_str());
        if current.is_some_and(|current| current != server) {
            set_profile_server(&mut config, &active, &server)?;
            save_config(&paths, &config)?;
            updated.push(paths.config_path.clone());
        }
    } else {
        load_config(&paths)?;
    }

    Ok(WorkspaceInitResult {
        paths,
        created,
        updated,
    })
}

pub fn resolve_workspace(explicit: Option<&Path>) -> ContactsResult<WorkspacePaths> {
    let paths = WorkspacePaths::from_root(workspace_root(explicit, "workspace lookup")?);
    if !paths.is_initialized() {
        let root_display = paths.root.display();
        return Err(ContactsError::usage(format!(
            "workspace is not initialized at '{root_display}'; run `stellar-contacts init --workspace {root_display}` first"
        )));
    }

    Ok(paths)
}

/// Resolves the workspace, creating it on first use. Commands that only
/// touch local state should not require a separate `init` step.
pub fn open_or_init(target: Option<&Path>, server: Option<&str>) -> ContactsResult<WorkspacePaths> {
    let root = workspace_root(target, "workspace lookup")?;
    if !WorkspacePaths::from_root(root.clone()).is_initialized() {
        return init_workspace(Some(&root), server).map(|result| result.paths);
    }

    resolve_workspace(Some(&root))
}

fn workspace_root(target: Option<&Path>, purpose: &str) -> ContactsResult<PathBuf> {
    if let Some(path) = target
        && path.is_absolute()
    {
        return Ok(path.to_path_buf());
    }

    let cwd = std::env::current_dir().map_err(|err| {
        ContactsError::io(format!(
            "failed to resolve current directory for {purpose}: {err}"
        ))
    })?;

    Ok(match target {
        Some(path) => cwd.join(path),
        None => cwd,
    })
}

/// Returns `true` when the entry had to be created.
fn ensure(path: &Path, entry: Entry) -> ContactsResult<bool> {
    if path.exists() {
        let matches = match entry {
            Entry::Dir => path.is_dir(),
            Entry::File => path.is_file(),
        };
        if !matches {
            let expected = match entry {
                Entry::Dir => "a directory",
                Entry::File => "a file",
            };
            return Err(ContactsError::io(format!(
                "expected '{}' to be {expected}",
                path.display()
            )));
        }
        return Ok(false);
    }

    let result = match entry {
        Entry::Dir => fs::create_dir_all(path),
        Entry::File => fs::write(path, []),
    };
    result.map_err(|err| {
        ContactsError::io(format!("failed to create '{}': {err}", path.display()))
    })?;

    Ok(true)
}
