use std::time::Duration;
use tracing::{info, warn};

use super::AutoSaveError;
use crate::note::Note;
use crate::persist::Persistor;

pub const ENCRYPTED_SAVE_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Attempt budget and pacing for encrypted-note saves.
///
/// Back-off is linear (`base_delay * attempt`) and blocks the saving thread.
/// Plain notes are always attempted exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: ENCRYPTED_SAVE_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn attempts_for(&self, encrypted: bool) -> u32 {
        if encrypted {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub fn pause(&self, attempt: u32) {
        std::thread::sleep(self.delay(attempt));
    }
}

pub(crate) fn save_with_retry(
    persistor: &dyn Persistor,
    policy: &RetryPolicy,
    note: &Note,
) -> Result<(), AutoSaveError> {
    if !note.is_encrypted {
        return persistor.save(note).map_err(|e| {
            warn!(note_id = %note.id, error = %e, "save failed");
            AutoSaveError::Persist(format!("{e:#}"))
        });
    }

    let attempts = policy.attempts_for(true);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match persistor.save(note) {
            Ok(()) => {
                if attempt > 1 {
                    info!(note_id = %note.id, attempt, "encrypted save succeeded after retry");
                }
                return Ok(());
            }
            Err(e) => {
                last_error = format!("{e:#}");
                warn!(
                    note_id = %note.id,
                    attempt,
                    max_attempts = attempts,
                    error = %last_error,
                    "encrypted save failed"
                );
                if attempt < attempts {
                    policy.pause(attempt);
                }
            }
        }
    }
    Err(AutoSaveError::EncryptedSaveRetryFailed {
        attempts,
        last_error,
    })
}
