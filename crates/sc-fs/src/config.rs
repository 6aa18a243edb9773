use crate::workspace::WorkspacePaths;
use sc_core::{ContactsError, ContactsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_SERVER_URL: &str = "https://bsn.expert";

/// `.contacts/config.toml`. Each profile points at one contacts server and
/// owns its own contacts and sync state in the state database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub active_profile: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub server: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub name: String,
    pub active: bool,
    pub server: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProfile {
    pub name: String,
    pub server: String,
}

impl WorkspaceConfig {
    pub fn with_default_server(server: impl Into<String>) -> Self {
        Self {
            version: CONFIG_VERSION,
            active_profile: DEFAULT_PROFILE.to_string(),
            profiles: BTreeMap::from([(
                DEFAULT_PROFILE.to_string(),
                ProfileConfig {
                    server: server.into(),
                },
            )]),
        }
    }

    /// Repairs hand-edited configs: missing version, no profiles, or an
    /// active profile that no longer exists.
    pub fn ensure_defaults(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }

        if self.profiles.is_empty() {
            self.profiles.insert(
                DEFAULT_PROFILE.to_string(),
                ProfileConfig {
                    server: DEFAULT_SERVER_URL.to_string(),
                },
            );
        }

        if !self.profiles.contains_key(&self.active_profile) {
            self.active_profile = self
                .profiles
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        }
    }

    fn profile(&self, name: &str) -> ContactsResult<&ProfileConfig> {
        self.profiles.get(name).ok_or_else(|| {
            ContactsError::usage(format!("profile '{name}' not found in workspace config"))
        })
    }
}

/// Checks that `raw` is an http(s) base URL and drops trailing slashes so
/// endpoint paths can be appended directly.
pub fn normalize_server(raw: &str) -> ContactsResult<String> {
    let server = raw.trim().trim_end_matches('/');
    let host = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"));

    match host {
        Some(host) if !host.is_empty() && !host.contains(char::is_whitespace) => {
            Ok(server.to_string())
        }
        _ => Err(ContactsError::usage(format!(
            "server '{raw}' is not an http(s) URL"
        ))),
    }
}

pub fn load_config(paths: &WorkspacePaths) -> ContactsResult<WorkspaceConfig> {
    let location = paths.config_path.display();
    let contents = fs::read_to_string(&paths.config_path).map_err(|err| {
        ContactsError::io(format!("failed to read workspace config '{location}': {err}"))
    })?;

    let mut config: WorkspaceConfig = toml::from_str(&contents).map_err(|err| {
        ContactsError::io(format!("failed to parse workspace config '{location}': {err}"))
    })?;
    config.ensure_defaults();
    Ok(config)
}

pub fn save_config(paths: &WorkspacePaths, config: &WorkspaceConfig) -> ContactsResult<()> {
    let serialized = toml::to_string_pretty(config)
        .map_err(|err| ContactsError::io(format!("failed to encode config.toml: {err}")))?;

    fs::write(&paths.config_path, serialized).map_err(|err| {
        ContactsError::io(format!(
            "failed to write workspace config '{}': {err}",
            paths.config_path.display()
        ))
    })
}

pub fn list_profiles(config: &WorkspaceConfig) -> Vec<ProfileView> {
    config
        .profiles
        .iter()
        .map(|(name, profile)| ProfileView {
            name: name.clone(),
            active: *name == config.active_profile,
            server: profile.server.clone(),
        })
        .collect()
}

pub fn set_active_profile(config: &mut WorkspaceConfig, name: &str) -> ContactsResult<()> {
    config.profile(name)?;
    config.active_profile = name.to_string();
    Ok(())
}

/// Creates or repoints a profile.
pub fn set_profile_server(
    config: &mut WorkspaceConfig,
    name: &str,
    server: &str,
) -> ContactsResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContactsError::usage("profile name cannot be empty"));
    }

    let server = normalize_server(server)?;
    config
        .profiles
        .insert(name.to_string(), ProfileConfig { server });

    if config.active_profile.is_empty() {
        config.active_profile = name.to_string();
    }
    Ok(())
}

/// Picks the requested (or active) profile; `server_override` wins over the
/// stored server for this invocation only.
pub fn resolve_profile(
    config: &WorkspaceConfig,
    profile_override: Option<&str>,
    server_override: Option<&str>,
) -> ContactsResult<ResolvedProfile> {
    let name = profile_override.unwrap_or(&config.active_profile);
    let profile = config.profile(name)?;

    let server = match server_override {
        Some(server) => normalize_server(server)?,
        None => profile.server.clone(),
    };

    Ok(ResolvedProfile {
        name: name.to_string(),
        server,
    })
}
