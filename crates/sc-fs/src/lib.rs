mod config;
mod doctor;
mod workspace;

pub use config::{
    DEFAULT_PROFILE, DEFAULT_SERVER_URL, ProfileConfig, ProfileView, ResolvedProfile,
    WorkspaceConfig, list_profiles, load_config, normalize_server, resolve_profile, save_config,
    set_active_profile, set_profile_server,
};
pub use doctor::{DoctorCheck, DoctorReport, run_doctor};
pub use workspace::{
    STATE_DIR_NAME, WorkspaceInitResult, WorkspacePaths, init_workspace, open_or_init,
    resolve_workspace,
};
