use crate::{CONTACTS_KEY, SYNC_META_KEY, StateBackend, StoredState, decode_sync_meta};
use chrono::Utc;
use rusqlite::{Connection, Error as SqlError, ErrorCode, OptionalExtension, params};
use sc_core::{ContactsError, ContactsResult};
use sc_fs::{DEFAULT_PROFILE, WorkspacePaths};
use std::fs;
use std::path::{Path, PathBuf};

/// SQLite-backed state for every profile of a workspace.
#[derive(Debug, Clone)]
pub struct StateStore {
    db_path: PathBuf,
    legacy_contacts_path: PathBuf,
}

/// One profile's slice of a [`StateStore`], usable as a [`StateBackend`].
#[derive(Debug, Clone)]
pub struct ProfileState<'a> {
    store: &'a StateStore,
    profile: String,
}

impl StateStore {
    pub fn from_workspace(paths: &WorkspacePaths) -> ContactsResult<Self> {
        let store = Self {
            db_path: paths.state_db_path.clone(),
            legacy_contacts_path: paths.legacy_contacts_path.clone(),
        };

        let conn = store.connection()?;
        store.initialize_schema(&conn)?;
        store.migrate_legacy_contacts_if_needed(&conn)?;

        Ok(store)
    }

    pub fn profile(&self, profile: &str) -> ProfileState<'_> {
        ProfileState {
            store: self,
            profile: profile.to_string(),
        }
    }

    pub fn load_state(&self, profile: &str) -> ContactsResult<StoredState> {
        let key = profile_key(profile);
        let conn = self.connection()?;

        let contacts = read_value(&conn, &key, CONTACTS_KEY, &self.db_path)?;
        let sync_meta = read_value(&conn, &key, SYNC_META_KEY, &self.db_path)?
            .map(|raw| decode_sync_meta(&raw, "sqlite"))
            .unwrap_or_default();

        Ok(StoredState {
            contacts,
            sync_meta,
        })
    }

    pub fn save_state(&self, profile: &str, state: &StoredState) -> ContactsResult<()> {
        let key = profile_key(profile);
        let meta_payload = serde_json::to_string(&state.sync_meta).map_err(|err| {
            ContactsError::store(format!("failed to encode sync metadata: {err}"))
        })?;

        let mut conn = self.connection()?;
        let transaction = conn
            .transaction()
            .map_err(|err| sqlite_error("start state transaction", &self.db_path, err))?;

        match state.contacts.as_deref() {
            Some(contacts) => {
                write_value(&transaction, &key, CONTACTS_KEY, contacts)
                    .map_err(|err| sqlite_error("write contacts", &self.db_path, err))?;
            }
            None => {
                transaction
                    .execute(
                        "DELETE FROM kv_state WHERE profile = ?1 AND key = ?2",
                        params![key, CONTACTS_KEY],
                    )
                    .map_err(|err| sqlite_error("clear contacts", &self.db_path, err))?;
            }
        }

        write_value(&transaction, &key, SYNC_META_KEY, &meta_payload)
            .map_err(|err| sqlite_error("write sync metadata", &self.db_path, err))?;

        transaction
            .commit()
            .map_err(|err| sqlite_error("commit state transaction", &self.db_path, err))?;

        Ok(())
    }

    pub fn clear_profile(&self, profile: &str) -> ContactsResult<()> {
        let key = profile_key(profile);
        let conn = self.connection()?;
        conn.execute("DELETE FROM kv_state WHERE profile = ?1", params![key])
            .map_err(|err| sqlite_error("clear profile state", &self.db_path, err))?;
        Ok(())
    }

    fn connection(&self) -> ContactsResult<Connection> {
        Connection::open(&self.db_path)
            .map_err(|err| sqlite_error("open state database", &self.db_path, err))
    }

    fn initialize_schema(&self, conn: &Connection) -> ContactsResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS kv_state (
                 profile TEXT NOT NULL,
                 key TEXT NOT NULL,
                 value TEXT NOT NULL,
                 updated_at TEXT NOT NULL,
                 PRIMARY KEY (profile, key)
             );",
        )
        .map_err(|err| sqlite_error("initialize schema", &self.db_path, err))?;

        Ok(())
    }

    /// Older installs kept the flat `{id: label}` mapping in a JSON file.
    /// The raw text is adopted as-is; contact normalization upgrades it.
    fn migrate_legacy_contacts_if_needed(&self, conn: &Connection) -> ContactsResult<()> {
        if !self.legacy_contacts_path.is_file() {
            return Ok(());
        }

        let key = profile_key(DEFAULT_PROFILE);
        if read_value(conn, &key, CONTACTS_KEY, &self.db_path)?.is_some() {
            return Ok(());
        }

        let raw = fs::read_to_string(&self.legacy_contacts_path).map_err(|err| {
            ContactsError::io(format!(
                "failed to read legacy contacts file '{}': {}",
                self.legacy_contacts_path.display(),
                err
            ))
        })?;
        if raw.trim().is_empty() {
            return Ok(());
        }

        write_value(conn, &key, CONTACTS_KEY, &raw)
            .map_err(|err| sqlite_error("migrate legacy contacts", &self.db_path, err))?;
        tracing::info!(
            path = %self.legacy_contacts_path.display(),
            "adopted legacy contacts file"
        );

        Ok(())
    }
}

impl StateBackend for ProfileState<'_> {
    fn load_state(&self) -> ContactsResult<StoredState> {
        self.store.load_state(&self.profile)
    }

    fn save_state(&self, state: &StoredState) -> ContactsResult<()> {
        self.store.save_state(&self.profile, state)
    }
}

fn read_value(
    conn: &Connection,
    profile_key: &str,
    key: &str,
    db_path: &Path,
) -> ContactsResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_state WHERE profile = ?1 AND key = ?2",
        params![profile_key, key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(|err| sqlite_error("read state value", db_path, err))
}

fn write_value(
    conn: &Connection,
    profile_key: &str,
    key: &str,
    value: &str,
) -> Result<usize, SqlError> {
    conn.execute(
        "INSERT INTO kv_state (profile, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(profile, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![profile_key, key, value, Utc::now().to_rfc3339()],
    )
}

fn sqlite_error(action: &str, db_path: &Path, err: SqlError) -> ContactsError {
    if let SqlError::SqliteFailure(code, message) = &err
        && (code.code == ErrorCode::DatabaseCorrupt || code.code == ErrorCode::NotADatabase)
    {
        let detail = message.as_deref().unwrap_or("sqlite reported corruption");
        return ContactsError::store(format!(
            "failed to {action}: state database '{}' is corrupted ({detail}); remove '.contacts/state.db' and run `stellar-contacts sync run` to pull contacts again",
            db_path.display()
        ));
    }

    ContactsError::store(format!(
        "failed to {action} using state database '{}': {}",
        db_path.display(),
        err
    ))
}

fn profile_key(profile: &str) -> String {
    let mut output = String::with_capacity(profile.len());
    for ch in profile.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            output.push(ch);
        } else {
            output.push('_');
        }
    }

    if output.is_empty() {
        DEFAULT_PROFILE.to_string()
    } else {
        output
    }
}
