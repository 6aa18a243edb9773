use crate::changes::changed_since;
use crate::clock::{Clock, SystemClock};
use crate::contacts::{ContactRow, ContactStore};
use crate::merge::{MergeOutcome, merge_remote};
use sc_api::{ContactsApi, SyncRequest, SyncResponse};
use sc_core::ContactsResult;
use sc_store::{ApiCheck, ApiCheckStatus, StateBackend, StoredState, SyncMeta};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Automatic rounds closer together than this are dropped.
pub const SYNC_MIN_INTERVAL_MS: i64 = 60_000;
pub const API_KEY_ACCEPTED: &str = "API key accepted";

/// The remote half of a sync round.
pub trait ContactsRemote: Send + Sync {
    fn sync_contacts(
        &self,
        api_key: &str,
        request: &SyncRequest,
    ) -> ContactsResult<SyncResponse>;

    fn check_api_key(&self, api_key: &str) -> ContactsResult<()>;
}

impl ContactsRemote for ContactsApi {
    fn sync_contacts(
        &self,
        api_key: &str,
        request: &SyncRequest,
    ) -> ContactsResult<SyncResponse> {
        ContactsApi::sync_contacts(self, api_key, request)
    }

    fn check_api_key(&self, api_key: &str) -> ContactsResult<()> {
        ContactsApi::check_api_key(self, api_key)
    }
}

/// Contacts and sync metadata of one profile, loaded and normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactsContext {
    pub contacts: ContactStore,
    pub meta: SyncMeta,
}

impl ContactsContext {
    pub fn to_stored(&self) -> ContactsResult<StoredState> {
        Ok(StoredState {
            contacts: Some(self.contacts.serialize()?),
            sync_meta: self.meta.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Background trigger such as a page load. Subject to the rate limit.
    Automatic,
    /// A user action such as saving contacts.
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoApiKey,
    InFlight,
    RateLimited { retry_in_ms: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped {
        reason: SkipReason,
    },
    Succeeded {
        synced_at: i64,
        sent: usize,
        received: usize,
        merge: MergeOutcome,
        changed: bool,
    },
    Failed {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
    },
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, SyncOutcome::Succeeded { changed: true, .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Attempting { started_at: i64 },
    Succeeded { synced_at: i64, changed: bool },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "check", rename_all = "snake_case")]
pub enum KeyValidation {
    NoApiKey,
    Accepted(ApiCheck),
    Rejected(ApiCheck),
}

impl KeyValidation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, KeyValidation::Accepted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub changed: bool,
    pub sync: Option<SyncOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub validation: KeyValidation,
    pub sync: Option<SyncOutcome>,
}

/// Returns the phase to `Idle` however the round ends.
struct PhaseGuard<'e> {
    phase: &'e Mutex<SyncPhase>,
}

impl PhaseGuard<'_> {
    fn settle(&self, next: SyncPhase) {
        *lock_phase(self.phase) = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let mut phase = lock_phase(self.phase);
        tracing::debug!(phase = ?*phase, "sync round settled");
        *phase = SyncPhase::Idle;
    }
}

fn lock_phase(phase: &Mutex<SyncPhase>) -> MutexGuard<'_, SyncPhase> {
    phase
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SyncEngine<'a> {
    remote: &'a dyn ContactsRemote,
    backend: &'a dyn StateBackend,
    clock: Arc<dyn Clock>,
    phase: Mutex<SyncPhase>,
}

impl fmt::Debug for SyncEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl<'a> SyncEngine<'a> {
    pub fn new(remote: &'a dyn ContactsRemote, backend: &'a dyn StateBackend) -> Self {
        Self {
            remote,
            backend,
            clock: Arc::new(SystemClock),
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn phase(&self) -> SyncPhase {
        lock_phase(&self.phase).clone()
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase(), SyncPhase::Attempting { .. })
    }

    /// Loads and normalizes the profile state, writing it back straight away
    /// when normalization had to upgrade or repair it.
    pub fn load_context(&self) -> ContactsResult<ContactsContext> {
        let stored = self.backend.load_state()?;
        let normalized = ContactStore::normalize(stored.contacts.as_deref(), self.now_ms());
        let context = ContactsContext {
            contacts: normalized.store,
            meta: stored.sync_meta,
        };

        if normalized.needs_persist {
            tracing::info!(
                contacts = context.contacts.len(),
                "rewriting upgraded contact store"
            );
            self.persist(&context)?;
        }

        Ok(context)
    }

    pub fn persist(&self, context: &ContactsContext) -> ContactsResult<()> {
        self.backend.save_state(&context.to_stored()?)
    }

    /// Runs one push/pull round.
    ///
    /// Remote failures are recorded in `last_sync_error` and reported as
    /// [`SyncOutcome::Failed`]; only persistence errors are returned as `Err`.
    pub fn sync(
        &self,
        context: &mut ContactsContext,
        trigger: SyncTrigger,
    ) -> ContactsResult<SyncOutcome> {
        if !context.meta.has_api_key() {
            tracing::debug!("skipping sync: no API key configured");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::NoApiKey,
            });
        }

        let started_at = self.now_ms();
        let guard = match self.begin(&context.meta, trigger, started_at) {
            Ok(guard) => guard,
            Err(reason) => {
                tracing::debug!(?reason, ?trigger, "skipping sync");
                return Ok(SyncOutcome::Skipped { reason });
            }
        };

        context.meta.last_sync_attempt = started_at;
        self.persist(context)?;

        let request = SyncRequest {
            current_timestamp: started_at,
            items: changed_since(&context.contacts, context.meta.last_sync_at, started_at),
        };
        let sent = request.items.len();

        match self.remote.sync_contacts(&context.meta.api_key, &request) {
            Ok(response) => {
                let synced_at = self.now_ms();
                let merge = merge_remote(&mut context.contacts, &response.items, synced_at);
                let changed = merge.changed();

                context.meta.last_sync_at = synced_at;
                context.meta.last_sync_error = None;
                self.persist(context)?;

                guard.settle(SyncPhase::Succeeded { synced_at, changed });
                tracing::info!(
                    sent,
                    received = response.items.len(),
                    changed,
                    "contacts synced"
                );

                Ok(SyncOutcome::Succeeded {
                    synced_at,
                    sent,
                    received: response.items.len(),
                    merge,
                    changed,
                })
            }
            Err(error) => {
                tracing::warn!(error = %error.message, "contacts sync failed");
                context.meta.last_sync_error = Some(error.message.clone());
                self.persist(context)?;

                guard.settle(SyncPhase::Failed {
                    message: error.message.clone(),
                });

                Ok(SyncOutcome::Failed {
                    message: error.message,
                    http_status: error.http_status,
                })
            }
        }
    }

    fn begin(
        &self,
        meta: &SyncMeta,
        trigger: SyncTrigger,
        now: i64,
    ) -> Result<PhaseGuard<'_>, SkipReason> {
        let mut phase = lock_phase(&self.phase);
        if *phase != SyncPhase::Idle {
            return Err(SkipReason::InFlight);
        }

        if trigger == SyncTrigger::Automatic {
            let elapsed = now - meta.last_sync_attempt;
            if elapsed < SYNC_MIN_INTERVAL_MS {
                return Err(SkipReason::RateLimited {
                    retry_in_ms: SYNC_MIN_INTERVAL_MS - elapsed,
                });
            }
        }

        *phase = SyncPhase::Attempting { started_at: now };
        Ok(PhaseGuard { phase: &self.phase })
    }

    /// Stores a new key. A different key starts a fresh sync history.
    /// Returns whether the key changed.
    pub fn set_api_key(&self, context: &mut ContactsContext, raw: &str) -> ContactsResult<bool> {
        let api_key = raw.trim();
        if api_key == context.meta.api_key {
            return Ok(false);
        }

        context.meta = SyncMeta::for_api_key(api_key);
        self.persist(context)?;
        tracing::info!(
            configured = !api_key.is_empty(),
            "API key changed; sync history reset"
        );

        Ok(true)
    }

    /// Checks the configured key against the remote and records the result.
    /// Never touches the contacts.
    pub fn validate_api_key(&self, context: &mut ContactsContext) -> ContactsResult<KeyValidation> {
        if !context.meta.has_api_key() {
            return Ok(KeyValidation::NoApiKey);
        }

        let result = self.remote.check_api_key(&context.meta.api_key);

        let checked_at = self.now_ms();
        let validation = match result {
            Ok(()) => KeyValidation::Accepted(ApiCheck {
                status: ApiCheckStatus::Ok,
                message: API_KEY_ACCEPTED.to_string(),
                checked_at,
            }),
            Err(error) => {
                tracing::warn!(error = %error.message, "API key check failed");
                KeyValidation::Rejected(ApiCheck {
                    status: ApiCheckStatus::Error,
                    message: format!("API key check failed: {}", error.message),
                    checked_at,
                })
            }
        };

        context.meta.last_api_check = match &validation {
            KeyValidation::Accepted(check) | KeyValidation::Rejected(check) => Some(check.clone()),
            KeyValidation::NoApiKey => None,
        };
        self.persist(context)?;

        Ok(validation)
    }

    /// Sets (`Some`) or deletes (`None`) one contact, persists, and follows
    /// up with an explicit sync when asked to and a key is configured.
    pub fn save_contact(
        &self,
        context: &mut ContactsContext,
        id: &str,
        label: Option<&str>,
        sync: bool,
    ) -> ContactsResult<SaveOutcome> {
        let changed = context.contacts.write(id, label, self.now_ms());
        self.persist(context)?;

        Ok(SaveOutcome {
            changed,
            sync: self.follow_up_sync(context, sync)?,
        })
    }

    /// Replaces the full contact list, as the options page save does.
    pub fn save_rows(
        &self,
        context: &mut ContactsContext,
        rows: &[ContactRow],
        sync: bool,
    ) -> ContactsResult<SaveOutcome> {
        let before = context.contacts.clone();
        context.contacts.replace_all(rows, self.now_ms());
        let changed = before != context.contacts;
        self.persist(context)?;

        Ok(SaveOutcome {
            changed,
            sync: self.follow_up_sync(context, sync)?,
        })
    }

    /// Applies imported rows, then validates the key and syncs when it is
    /// accepted. An empty import changes nothing.
    pub fn import_rows(
        &self,
        context: &mut ContactsContext,
        rows: &[ContactRow],
    ) -> ContactsResult<ImportOutcome> {
        if rows.is_empty() {
            return Ok(ImportOutcome {
                imported: 0,
                validation: KeyValidation::NoApiKey,
                sync: None,
            });
        }

        context.contacts.replace_all(rows, self.now_ms());
        self.persist(context)?;

        let validation = self.validate_api_key(context)?;
        let sync = if validation.is_accepted() {
            Some(self.sync(context, SyncTrigger::Explicit)?)
        } else {
            None
        };

        Ok(ImportOutcome {
            imported: rows.len(),
            validation,
            sync,
        })
    }

    fn follow_up_sync(
        &self,
        context: &mut ContactsContext,
        enabled: bool,
    ) -> ContactsResult<Option<SyncOutcome>> {
        if !enabled || !context.meta.has_api_key() {
            return Ok(None);
        }

        self.sync(context, SyncTrigger::Explicit).map(Some)
    }
}
