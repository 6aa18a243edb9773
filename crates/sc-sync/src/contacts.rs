use regex::Regex;
use sc_core::{ContactsError, ContactsResult, millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Account identifier a label is bound to. Never empty or blank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ContactId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A label with its logical clock. `label: None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub label: Option<String>,
    pub updated_at: i64,
}

impl ContactEntry {
    pub fn live(label: impl Into<String>, updated_at: i64) -> Self {
        Self {
            label: Some(label.into()),
            updated_at,
        }
    }

    pub fn tombstone(updated_at: i64) -> Self {
        Self {
            label: None,
            updated_at,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.label.is_none()
    }
}

/// One row of user input (options page grid, import file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    pub id: String,
    pub label: String,
}

impl ContactRow {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub store: ContactStore,
    /// The persisted text was upgraded or repaired and should be written back.
    pub needs_persist: bool,
}

/// Shape of one persisted value before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredValue {
    Legacy(String),
    Structured {
        label: Option<String>,
        updated_at: Option<i64>,
    },
    Invalid,
}

impl StoredValue {
    fn classify(value: Value) -> Self {
        match value {
            Value::String(label) => StoredValue::Legacy(label),
            Value::Object(mut fields) => {
                let label = match fields.remove("label") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(label)) => Some(label),
                    Some(_) => return StoredValue::Invalid,
                };
                let updated_at = fields.remove("updated_at").and_then(value_millis);
                StoredValue::Structured { label, updated_at }
            }
            _ => StoredValue::Invalid,
        }
    }
}

fn value_millis(value: Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
        Value::String(text) => millis::parse_millis(&text),
        _ => None,
    }
}

fn comment_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s+//.*\n").expect("valid regex"))
}

/// The local id → entry mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactStore {
    entries: BTreeMap<ContactId, ContactEntry>,
}

impl ContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes persisted text into a well-formed store.
    ///
    /// Bare string values (the flat legacy format) and entries without a
    /// usable timestamp are stamped with `now`; values of any other shape are
    /// dropped. Both cases set `needs_persist`. Text that is not a JSON object
    /// yields an empty store.
    pub fn normalize(raw: Option<&str>, now: i64) -> Normalized {
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            return Normalized::default();
        };

        let cleaned = comment_lines().replace_all(raw, "");
        let parsed = match serde_json::from_str::<Value>(&cleaned) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::warn!("stored contacts are not a JSON object; starting empty");
                return Normalized::default();
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot parse stored contacts; starting empty");
                return Normalized::default();
            }
        };

        let stamp = now.max(1);
        let mut store = ContactStore::new();
        let mut needs_persist = false;

        for (raw_id, value) in parsed {
            let Some(id) = ContactId::new(raw_id) else {
                needs_persist = true;
                continue;
            };

            let entry = match StoredValue::classify(value) {
                StoredValue::Legacy(label) => {
                    needs_persist = true;
                    ContactEntry::live(label, stamp)
                }
                StoredValue::Structured {
                    label,
                    updated_at: Some(updated_at),
                } if updated_at > 0 => ContactEntry { label, updated_at },
                StoredValue::Structured { label, .. } => {
                    needs_persist = true;
                    ContactEntry {
                        label,
                        updated_at: stamp,
                    }
                }
                StoredValue::Invalid => {
                    tracing::debug!(id = %id, "dropping malformed stored contact");
                    needs_persist = true;
                    continue;
                }
            };

            store.entries.insert(id, entry);
        }

        Normalized {
            store,
            needs_persist,
        }
    }

    /// Live contacts as plain id → label pairs. Tombstones are never exposed.
    pub fn read(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| {
                entry
                    .label
                    .as_ref()
                    .map(|label| (id.to_string(), label.clone()))
            })
            .collect()
    }

    /// Upserts one entry; `label: None` writes a tombstone. The timestamp only
    /// moves when the label actually changes. Returns whether the store changed.
    pub fn write(&mut self, id: &str, label: Option<&str>, timestamp: i64) -> bool {
        let Some(id) = ContactId::new(id) else {
            return false;
        };

        let label = label.map(str::to_string);
        match self.entries.get_mut(&id) {
            Some(current) if current.label == label => false,
            Some(current) => {
                current.label = label;
                current.updated_at = timestamp.max(1);
                true
            }
            None => {
                self.entries.insert(
                    id,
                    ContactEntry {
                        label,
                        updated_at: timestamp.max(1),
                    },
                );
                true
            }
        }
    }

    pub fn remove(&mut self, id: &str, timestamp: i64) -> bool {
        self.write(id, None, timestamp)
    }

    /// Makes `rows` the complete set of live contacts. Live ids missing from
    /// `rows` become tombstones at `timestamp`; existing tombstones are kept.
    pub fn replace_all(&mut self, rows: &[ContactRow], timestamp: i64) {
        let timestamp = timestamp.max(1);
        let mut next = BTreeMap::new();

        for row in rows {
            let Some(id) = ContactId::new(row.id.as_str()) else {
                continue;
            };

            let updated_at = match self.entries.get(&id) {
                Some(previous) if previous.label.as_deref() == Some(row.label.as_str()) => {
                    if previous.updated_at > 0 {
                        previous.updated_at
                    } else {
                        timestamp
                    }
                }
                _ => timestamp,
            };
            next.insert(id, ContactEntry::live(row.label.clone(), updated_at));
        }

        for (id, entry) in &self.entries {
            if next.contains_key(id) {
                continue;
            }

            let carried = if entry.is_tombstone() {
                entry.clone()
            } else {
                ContactEntry::tombstone(timestamp)
            };
            next.insert(id.clone(), carried);
        }

        self.entries = next;
    }

    pub fn get(&self, id: &str) -> Option<&ContactEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ContactId, &ContactEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| !entry.is_tombstone())
            .count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.len() - self.live_count()
    }

    pub fn serialize(&self) -> ContactsResult<String> {
        serde_json::to_string(&self.entries)
            .map_err(|err| ContactsError::store(format!("failed to encode contacts: {err}")))
    }

    pub(crate) fn insert(&mut self, id: ContactId, entry: ContactEntry) {
        self.entries.insert(id, entry);
    }

    pub(crate) fn delete(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drops tombstones at or before `cutoff`, returning how many were purged.
    pub(crate) fn purge_tombstones(&mut self, cutoff: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !(entry.is_tombstone() && entry.updated_at <= cutoff));
        before - self.entries.len()
    }
}

/// Trims ids and labels and drops rows without an id.
pub fn sanitize_rows(rows: impl IntoIterator<Item = ContactRow>) -> Vec<ContactRow> {
    rows.into_iter()
        .map(|row| ContactRow {
            id: row.id.trim().to_string(),
            label: row.label.trim().to_string(),
        })
        .filter(|row| !row.id.is_empty())
        .collect()
}
