use crate::contacts::{ContactEntry, ContactId, ContactStore};
use sc_api::WireContact;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub upserted: usize,
    pub removed: usize,
    pub purged: usize,
    pub stale: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.upserted + self.removed + self.purged > 0
    }
}

/// Folds a remote change set into `store` with last-write-wins semantics.
///
/// An incoming entry older than the local one is ignored. An incoming
/// tombstone deletes the local entry outright. After the loop every local
/// tombstone at or before `sync_moment` is purged, since the round that just
/// completed carried it to the remote.
pub fn merge_remote(
    store: &mut ContactStore,
    items: &BTreeMap<String, WireContact>,
    sync_moment: i64,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for (raw_id, incoming) in items {
        let Some(id) = ContactId::new(raw_id.as_str()) else {
            continue;
        };

        let incoming_updated_at = incoming.updated_at.unwrap_or(0);
        let current = store.get(id.as_str());
        let current_updated_at = current.map(|entry| entry.updated_at).unwrap_or(0);

        if incoming_updated_at != 0 && incoming_updated_at < current_updated_at {
            tracing::debug!(
                id = %id,
                incoming = incoming_updated_at,
                current = current_updated_at,
                "ignoring stale remote contact"
            );
            outcome.stale += 1;
            continue;
        }

        let Some(label) = incoming.label.as_deref() else {
            if store.delete(id.as_str()) {
                outcome.removed += 1;
            }
            continue;
        };

        let next_updated_at = if incoming_updated_at > 0 {
            incoming_updated_at
        } else {
            sync_moment
        };
        let unchanged = current.is_some_and(|entry| {
            entry.label.as_deref() == Some(label) && entry.updated_at == next_updated_at
        });
        if unchanged {
            continue;
        }

        store.insert(id, ContactEntry::live(label, next_updated_at));
        outcome.upserted += 1;
    }

    outcome.purged = store.purge_tombstones(sync_moment);
    outcome
}
