//! Timer-driven autosave.
//!
//! One registry entry per open note holds its cached handle, save status and
//! pending timer. A timer fire saves only dirty notes, never overlaps a
//! running save for the same note, and always re-arms afterwards, so a
//! failing note keeps being retried on every tick.

mod error;
mod retry;
mod scheduler;
mod status;

pub use error::AutoSaveError;
pub use retry::RetryPolicy;
pub use scheduler::{AutoSaveScheduler, SchedulerOptions};
pub use status::SaveStatus;

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::note::{Note, SharedNote};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ENCRYPTED_BACKOFF: Duration = Duration::from_secs(30);

/// Source of the configured autosave interval.
pub trait IntervalPolicy: Send + Sync {
    fn base_interval(&self) -> anyhow::Result<Duration>;

    /// Base interval plus `encrypted_backoff` for encrypted notes. A
    /// configuration error falls back to [`DEFAULT_INTERVAL`].
    fn load_effective_interval(&self, note: &Note, encrypted_backoff: Duration) -> Duration {
        let base = match self.base_interval() {
            Ok(interval) => interval,
            Err(e) => {
                warn!(error = %e, "failed to load autosave interval, using default");
                DEFAULT_INTERVAL
            }
        };
        if note.is_encrypted {
            base + encrypted_backoff
        } else {
            base
        }
    }
}

/// Autosave operations exposed to the editor layer.
pub trait AutoSaveService: Send + Sync {
    /// Register `note` and arm its timer, replacing any existing registration.
    fn start_auto_save(&self, note: SharedNote, interval: Duration);

    fn stop_auto_save(&self, note_id: &str);

    /// Save immediately on the calling thread.
    fn save_now(&self, note_id: &str) -> Result<(), AutoSaveError>;

    /// Snapshot of a note's status. Unknown notes yield a status whose
    /// `last_error` is [`AutoSaveError::StatusNotFound`].
    fn save_status(&self, note_id: &str) -> SaveStatus;

    fn all_save_statuses(&self) -> HashMap<String, SaveStatus>;

    fn is_auto_save_active(&self, note_id: &str) -> bool;

    fn update_auto_save_interval(
        &self,
        note_id: &str,
        interval: Duration,
    ) -> Result<(), AutoSaveError>;

    fn start_auto_save_with_settings(&self, note: SharedNote);

    fn set_encrypted_backoff(&self, backoff: Duration);

    fn shutdown(&self);
}
