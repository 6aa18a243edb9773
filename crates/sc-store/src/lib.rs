mod env;
mod memory;
mod sqlite;

use sc_core::{ContactsResult, millis};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use env::{API_KEY_ENV, ENV_FILE_ENV, resolve_env_api_key};
pub use memory::MemoryStateBackend;
pub use sqlite::{ProfileState, StateStore};

pub const CONTACTS_KEY: &str = "contacts";
pub const SYNC_META_KEY: &str = "syncMeta";

/// Sync bookkeeping persisted next to the contacts mapping.
///
/// Absent fields decode to their defaults so partially written metadata from
/// older installs still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncMeta {
    pub api_key: String,
    #[serde(deserialize_with = "millis::deserialize_or_zero")]
    pub last_sync_at: i64,
    pub last_sync_error: Option<String>,
    pub last_api_check: Option<ApiCheck>,
    #[serde(deserialize_with = "millis::deserialize_or_zero")]
    pub last_sync_attempt: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCheckStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCheck {
    pub status: ApiCheckStatus,
    pub message: String,
    #[serde(default, deserialize_with = "millis::deserialize_or_zero")]
    pub checked_at: i64,
}

impl SyncMeta {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Metadata for a freshly entered key: no shared history with the remote.
    pub fn for_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

/// Everything the persistence layer holds for one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    /// Serialized contacts mapping, exactly as written. Decoding and upgrading
    /// legacy shapes is the caller's job.
    pub contacts: Option<String>,
    pub sync_meta: SyncMeta,
}

/// Key/value persistence used by the sync engine. Implementations must make a
/// `save_state` call durable before returning.
pub trait StateBackend: Send + Sync {
    fn load_state(&self) -> ContactsResult<StoredState>;

    fn save_state(&self, state: &StoredState) -> ContactsResult<()>;
}

/// Decodes persisted metadata field by field. A field that does not decode
/// keeps its default; the others survive, the API key in particular.
pub(crate) fn decode_sync_meta(raw: &str, origin: &str) -> SyncMeta {
    if raw.trim().is_empty() {
        return SyncMeta::default();
    }

    let fields = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => {
            tracing::warn!(origin, "discarding sync metadata that is not an object");
            return SyncMeta::default();
        }
        Err(err) => {
            tracing::warn!(origin, error = %err, "discarding unreadable sync metadata");
            return SyncMeta::default();
        }
    };

    let mut meta = SyncMeta::default();
    let field = MetaFields {
        fields: &fields,
        origin,
    };
    field.read("apiKey", &mut meta.api_key);
    field.read("lastSyncError", &mut meta.last_sync_error);
    field.read("lastApiCheck", &mut meta.last_api_check);

    let mut stamp = Millis(0);
    field.read("lastSyncAt", &mut stamp);
    meta.last_sync_at = stamp.0;

    let mut stamp = Millis(0);
    field.read("lastSyncAttempt", &mut stamp);
    meta.last_sync_attempt = stamp.0;

    meta
}

#[derive(Deserialize)]
struct Millis(#[serde(deserialize_with = "millis::deserialize_or_zero")] i64);

struct MetaFields<'a> {
    fields: &'a Map<String, Value>,
    origin: &'a str,
}

impl MetaFields<'_> {
    fn read<T: DeserializeOwned>(&self, name: &str, slot: &mut T) {
        let Some(value) = self.fields.get(name) else {
            return;
        };

        match serde_json::from_value::<T>(value.clone()) {
            Ok(decoded) => *slot = decoded,
            Err(err) => tracing::warn!(
                origin = self.origin,
                field = name,
                error = %err,
                "ignoring unreadable sync metadata field"
            ),
        }
    }
}
