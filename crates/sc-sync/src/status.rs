use chrono::DateTime;
use sc_store::{ApiCheckStatus, SyncMeta};
use serde::Serialize;
use std::fmt;

/// The one-line sync status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    WaitingForKey,
    Checking,
    ApiError(String),
    SyncError(String),
    SyncedAt(i64),
    KeyAccepted,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub state: &'static str,
    pub level: StatusLevel,
    pub message: String,
}

impl SyncStatus {
    /// Most recent outcome wins: a failed key check hides sync results, a
    /// sync error hides the last good sync time.
    pub fn from_meta(meta: &SyncMeta) -> Self {
        if !meta.has_api_key() {
            return SyncStatus::WaitingForKey;
        }

        if let Some(check) = &meta.last_api_check
            && check.status == ApiCheckStatus::Error
        {
            return SyncStatus::ApiError(check.message.clone());
        }

        if let Some(error) = &meta.last_sync_error {
            return SyncStatus::SyncError(error.clone());
        }

        if meta.last_sync_at > 0 {
            return SyncStatus::SyncedAt(meta.last_sync_at);
        }

        if meta
            .last_api_check
            .as_ref()
            .is_some_and(|check| check.status == ApiCheckStatus::Ok)
        {
            return SyncStatus::KeyAccepted;
        }

        SyncStatus::Waiting
    }

    pub fn state(&self) -> &'static str {
        match self {
            SyncStatus::WaitingForKey => "waiting_for_key",
            SyncStatus::Checking => "checking",
            SyncStatus::ApiError(_) => "api_error",
            SyncStatus::SyncError(_) => "sync_error",
            SyncStatus::SyncedAt(_) => "synced",
            SyncStatus::KeyAccepted => "key_accepted",
            SyncStatus::Waiting => "waiting",
        }
    }

    pub fn level(&self) -> StatusLevel {
        match self {
            SyncStatus::WaitingForKey | SyncStatus::Checking | SyncStatus::Waiting => {
                StatusLevel::Info
            }
            SyncStatus::ApiError(_) | SyncStatus::SyncError(_) => StatusLevel::Error,
            SyncStatus::SyncedAt(_) | SyncStatus::KeyAccepted => StatusLevel::Ok,
        }
    }

    pub fn line(&self) -> StatusLine {
        StatusLine {
            state: self.state(),
            level: self.level(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::WaitingForKey => f.write_str("Enter an API key to enable sync."),
            SyncStatus::Checking => f.write_str("Checking API key..."),
            SyncStatus::ApiError(message) => f.write_str(message),
            SyncStatus::SyncError(message) => write!(f, "Sync failed: {message}"),
            SyncStatus::SyncedAt(millis) => write!(f, "Synced at {}", format_millis(*millis)),
            SyncStatus::KeyAccepted => f.write_str("API key accepted."),
            SyncStatus::Waiting => f.write_str("Waiting for the first sync."),
        }
    }
}

pub fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|moment| moment.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
