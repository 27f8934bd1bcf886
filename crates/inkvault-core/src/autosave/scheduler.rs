use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use super::retry::{save_with_retry, RetryPolicy};
use super::{
    AutoSaveError, AutoSaveService, IntervalPolicy, SaveStatus, DEFAULT_ENCRYPTED_BACKOFF,
    DEFAULT_INTERVAL,
};
use crate::note::{Note, SharedNote};
use crate::persist::Persistor;

pub struct SchedulerOptions {
    pub interval_policy: Option<Arc<dyn IntervalPolicy>>,
    pub retry: RetryPolicy,
    pub encrypted_backoff: Duration,
    /// Used by `start_auto_save_with_settings` when no policy is configured.
    pub default_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval_policy: None,
            retry: RetryPolicy::default(),
            encrypted_backoff: DEFAULT_ENCRYPTED_BACKOFF,
            default_interval: DEFAULT_INTERVAL,
        }
    }
}

/// Per-note autosave scheduler.
///
/// Timers run as tasks on the supplied tokio runtime; each fire hands the
/// save itself to the blocking pool, so a slow persistor or a retry
/// back-off never stalls the async workers. Dropping the scheduler cancels
/// every pending timer.
pub struct AutoSaveScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    registry: RwLock<HashMap<String, Entry>>,
    /// Session that owns the running save of each note. Outlives
    /// re-registration and stop so one note never has two saves in flight.
    /// Locked only while `registry` is write-locked.
    in_flight: Mutex<HashMap<String, u64>>,
    persistor: Arc<dyn Persistor>,
    interval_policy: Option<Arc<dyn IntervalPolicy>>,
    retry: RetryPolicy,
    runtime: Handle,
    encrypted_backoff: RwLock<Duration>,
    default_interval: Duration,
    next_id: AtomicU64,
}

struct Entry {
    note: SharedNote,
    status: SaveStatus,
    interval: Duration,
    timer: Option<AbortHandle>,
    /// Changes on every (re)registration of the note.
    session: u64,
    /// Identifies the currently armed timer; stale fires are ignored.
    token: u64,
}

impl Entry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl AutoSaveScheduler {
    pub fn new(persistor: Arc<dyn Persistor>, runtime: Handle) -> Self {
        Self::with_options(persistor, runtime, SchedulerOptions::default())
    }

    pub fn with_options(
        persistor: Arc<dyn Persistor>,
        runtime: Handle,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                persistor,
                interval_policy: options.interval_policy,
                retry: options.retry,
                runtime,
                encrypted_backoff: RwLock::new(options.encrypted_backoff),
                default_interval: options.default_interval,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Interval `start_auto_save_with_settings` would use for `note`.
    pub fn effective_interval(&self, note: &Note) -> Duration {
        let backoff = *self.inner.encrypted_backoff.read();
        match &self.inner.interval_policy {
            Some(policy) => policy.load_effective_interval(note, backoff),
            None if note.is_encrypted => self.inner.default_interval + backoff,
            None => self.inner.default_interval,
        }
    }

    pub fn encrypted_note_count(&self) -> usize {
        self.inner
            .registry
            .read()
            .values()
            .filter(|entry| entry.note.read().is_encrypted)
            .count()
    }
}

impl AutoSaveService for AutoSaveScheduler {
    fn start_auto_save(&self, note: SharedNote, interval: Duration) {
        let note_id = note.read().id.clone();
        let session = self.inner.next_id();

        let mut registry = self.inner.registry.write();
        if let Some(mut previous) = registry.remove(&note_id) {
            previous.cancel_timer();
        }
        let mut status = SaveStatus::new(&note_id);
        status.is_saving = self.inner.in_flight.lock().contains_key(&note_id);
        let mut entry = Entry {
            note,
            status,
            interval,
            timer: None,
            session,
            token: 0,
        };
        self.inner.arm(&note_id, &mut entry);
        registry.insert(note_id.clone(), entry);

        info!(
            note_id = %note_id,
            interval_ms = interval.as_millis() as u64,
            "autosave started"
        );
    }

    fn stop_auto_save(&self, note_id: &str) {
        if let Some(mut entry) = self.inner.registry.write().remove(note_id) {
            entry.cancel_timer();
            info!(note_id, "autosave stopped");
        }
    }

    fn save_now(&self, note_id: &str) -> Result<(), AutoSaveError> {
        let (session, snapshot) = {
            let mut registry = self.inner.registry.write();
            let entry = registry
                .get_mut(note_id)
                .ok_or_else(|| AutoSaveError::NoteNotFound(note_id.to_string()))?;
            if entry.status.is_saving {
                return Err(AutoSaveError::SaveInProgress(note_id.to_string()));
            }
            self.inner.claim(note_id, entry);
            let snapshot = entry.note.read().clone();
            (entry.session, snapshot)
        };

        let result = save_with_retry(self.inner.persistor.as_ref(), &self.inner.retry, &snapshot);
        self.inner
            .finish(note_id, session, snapshot.revision(), &result, false);
        result
    }

    fn save_status(&self, note_id: &str) -> SaveStatus {
        self.inner
            .registry
            .read()
            .get(note_id)
            .map(|entry| entry.status.clone())
            .unwrap_or_else(|| SaveStatus::not_found(note_id))
    }

    fn all_save_statuses(&self) -> HashMap<String, SaveStatus> {
        self.inner
            .registry
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.status.clone()))
            .collect()
    }

    fn is_auto_save_active(&self, note_id: &str) -> bool {
        self.inner.registry.read().contains_key(note_id)
    }

    fn update_auto_save_interval(
        &self,
        note_id: &str,
        interval: Duration,
    ) -> Result<(), AutoSaveError> {
        let mut registry = self.inner.registry.write();
        let entry = registry
            .get_mut(note_id)
            .ok_or_else(|| AutoSaveError::NoteNotFound(note_id.to_string()))?;
        entry.interval = interval;
        self.inner.arm(note_id, entry);
        debug!(note_id, interval_ms = interval.as_millis() as u64, "autosave interval updated");
        Ok(())
    }

    fn start_auto_save_with_settings(&self, note: SharedNote) {
        let interval = {
            let guard = note.read();
            self.effective_interval(&guard)
        };
        self.start_auto_save(note, interval);
    }

    fn set_encrypted_backoff(&self, backoff: Duration) {
        *self.inner.encrypted_backoff.write() = backoff;
        debug!(backoff_ms = backoff.as_millis() as u64, "encrypted backoff updated");
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Replace the entry's timer with a fresh one firing after its interval.
    fn arm(self: &Arc<Self>, note_id: &str, entry: &mut Entry) {
        entry.cancel_timer();
        let token = self.next_id();
        entry.token = token;

        let weak: Weak<Inner> = Arc::downgrade(self);
        let id = note_id.to_string();
        let delay = entry.interval;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // Detached: stopping the note must not interrupt a running save.
            drop(tokio::task::spawn_blocking(move || {
                inner.run_scheduled_save(&id, token)
            }));
        });
        entry.timer = Some(task.abort_handle());
    }

    fn run_scheduled_save(self: &Arc<Self>, note_id: &str, token: u64) {
        let (session, snapshot) = {
            let mut registry = self.registry.write();
            let Some(entry) = registry.get_mut(note_id) else {
                debug!(note_id, "timer fired for unregistered note");
                return;
            };
            if entry.token != token {
                return;
            }
            entry.timer = None;

            if entry.status.is_saving {
                debug!(note_id, "save already in flight, rescheduling");
                self.arm(note_id, entry);
                return;
            }

            let snapshot = {
                let note = entry.note.read();
                note.is_modified().then(|| note.clone())
            };
            let Some(snapshot) = snapshot else {
                debug!(note_id, "note clean, skipping save");
                self.arm(note_id, entry);
                return;
            };
            self.claim(note_id, entry);
            (entry.session, snapshot)
        };

        let result = save_with_retry(self.persistor.as_ref(), &self.retry, &snapshot)
            .map_err(|e| {
                if snapshot.is_encrypted {
                    AutoSaveError::EncryptedSaveFailed(e.to_string())
                } else {
                    e
                }
            });
        self.finish(note_id, session, snapshot.revision(), &result, true);
    }

    /// Must be called with `registry` write-locked.
    fn claim(&self, note_id: &str, entry: &mut Entry) {
        entry.status.is_saving = true;
        self.in_flight.lock().insert(note_id.to_string(), entry.session);
    }

    /// Release the save claim and record the outcome, unless the note was
    /// stopped or re-registered while saving.
    fn finish(
        self: &Arc<Self>,
        note_id: &str,
        session: u64,
        revision: u64,
        result: &Result<(), AutoSaveError>,
        rearm: bool,
    ) {
        let mut registry = self.registry.write();
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(note_id) == Some(&session) {
                in_flight.remove(note_id);
            }
        }
        let Some(entry) = registry.get_mut(note_id) else {
            debug!(note_id, "note unregistered during save, dropping result");
            return;
        };
        entry.status.is_saving = false;
        if entry.session != session {
            debug!(note_id, "note re-registered during save, dropping result");
            return;
        }

        let now = Utc::now();
        entry.status.record(result, now);
        if result.is_ok() && !entry.note.write().mark_saved_at(revision, now) {
            debug!(note_id, "note edited during save, staying dirty");
        }

        // An interval update during the save already armed a new timer.
        if rearm && entry.timer.is_none() {
            self.arm(note_id, entry);
        }
    }

    fn shutdown(&self) {
        let mut registry = self.registry.write();
        let count = registry.len();
        for (_, mut entry) in registry.drain() {
            entry.cancel_timer();
        }
        if count > 0 {
            info!(notes = count, "autosave scheduler shut down");
        }
    }
}
