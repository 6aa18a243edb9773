use crate::{StateBackend, StoredState};
use sc_core::{ContactsError, ContactsResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-process [`StateBackend`] for tests and embedders that bring their own
/// durability.
#[derive(Debug, Default)]
pub struct MemoryStateBackend {
    state: Mutex<StoredState>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StoredState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    pub fn with_contacts(raw: impl Into<String>) -> Self {
        Self::with_state(StoredState {
            contacts: Some(raw.into()),
            ..StoredState::default()
        })
    }

    pub fn snapshot(&self) -> StoredState {
        self.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every following `save_state` fail, simulating a broken disk.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateBackend for MemoryStateBackend {
    fn load_state(&self) -> ContactsResult<StoredState> {
        Ok(self.snapshot())
    }

    fn save_state(&self, state: &StoredState) -> ContactsResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ContactsError::store("memory backend rejected save"));
        }

        *self.lock() = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
