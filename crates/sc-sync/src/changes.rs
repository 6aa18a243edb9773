use crate::contacts::ContactStore;
use sc_api::WireContact;
use std::collections::BTreeMap;

/// Entries the remote has not acknowledged yet: every tombstone, every entry
/// without a timestamp, and every entry written after the watermark.
///
/// Entries lacking a timestamp go out stamped with `now`.
pub fn changed_since(
    store: &ContactStore,
    last_sync_at: i64,
    now: i64,
) -> BTreeMap<String, WireContact> {
    store
        .entries()
        .filter(|(_, entry)| {
            entry.is_tombstone() || entry.updated_at <= 0 || entry.updated_at > last_sync_at
        })
        .map(|(id, entry)| {
            let updated_at = if entry.updated_at > 0 {
                entry.updated_at
            } else {
                now
            };
            (
                id.to_string(),
                WireContact {
                    label: entry.label.clone(),
                    updated_at: Some(updated_at),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> ContactStore {
        let mut store = ContactStore::new();
        store.write("GOLD", Some("Old friend"), 100);
        store.write("GNEW", Some("New friend"), 900);
        store.write("GGONE", None, 50);
        store
    }

    #[test]
    fn watermark_splits_acknowledged_entries() {
        let items = changed_since(&fixture(), 500, 1_000);

        assert_eq!(items.len(), 2);
        assert_eq!(items["GNEW"].label.as_deref(), Some("New friend"));
        assert_eq!(items["GNEW"].updated_at, Some(900));
        assert_eq!(items["GGONE"].label, None);
        assert_eq!(items["GGONE"].updated_at, Some(50));
        assert!(!items.contains_key("GOLD"));
    }

    #[test]
    fn zero_watermark_sends_everything() {
        let store = fixture();
        let items = changed_since(&store, 0, 1_000);
        assert_eq!(items.len(), store.len());
    }

    #[test]
    fn extraction_is_pure() {
        let store = fixture();
        assert_eq!(
            changed_since(&store, 500, 1_000),
            changed_since(&store, 500, 1_000)
        );
    }

    #[test]
    fn tombstones_go_out_even_when_old() {
        let mut store = ContactStore::new();
        store.remove("GA", 10);
        let items = changed_since(&store, 10_000, 20_000);
        assert_eq!(items["GA"].updated_at, Some(10));
    }
}
