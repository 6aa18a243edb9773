//! Bidirectional last-write-wins sync of account labels ("contacts").
//!
//! [`ContactStore`] owns the local mapping, [`changed_since`] picks what to
//! push, [`merge_remote`] folds the remote answer back in, and
//! [`SyncEngine`] drives a whole round against a [`ContactsRemote`] and a
//! [`sc_store::StateBackend`].

mod changes;
mod clock;
mod contacts;
mod engine;
mod merge;
mod status;
mod transfer;

pub use changes::changed_since;
pub use clock::{Clock, ManualClock, SystemClock};
pub use contacts::{ContactEntry, ContactId, ContactRow, ContactStore, Normalized, sanitize_rows};
pub use engine::{
    API_KEY_ACCEPTED, ContactsContext, ContactsRemote, ImportOutcome, KeyValidation,
    SYNC_MIN_INTERVAL_MS, SaveOutcome, SkipReason, SyncEngine, SyncOutcome, SyncPhase,
    SyncTrigger,
};
pub use merge::{MergeOutcome, merge_remote};
pub use status::{StatusLevel, StatusLine, SyncStatus, format_millis};
pub use transfer::{export_contacts, parse_import};
