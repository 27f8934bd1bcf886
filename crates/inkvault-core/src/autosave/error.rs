use thiserror::Error;

use crate::error::ErrorKind;

/// Autosave failures. Cloneable so the last one can live in a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutoSaveError {
    #[error("note {0} is not registered for autosave")]
    NoteNotFound(String),

    #[error("a save for note {0} is already in progress")]
    SaveInProgress(String),

    #[error("no save status for note {0}")]
    StatusNotFound(String),

    #[error("{0}")]
    Persist(String),

    #[error("encrypted note save failed: {0}")]
    EncryptedSaveFailed(String),

    #[error("encrypted note save failed after {attempts} attempts: {last_error}")]
    EncryptedSaveRetryFailed { attempts: u32, last_error: String },
}

impl AutoSaveError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AutoSaveError::NoteNotFound(_) => "NOTE_NOT_FOUND",
            AutoSaveError::SaveInProgress(_) => "SAVE_IN_PROGRESS",
            AutoSaveError::StatusNotFound(_) => "STATUS_NOT_FOUND",
            AutoSaveError::Persist(_) => "SAVE_FAILED",
            AutoSaveError::EncryptedSaveFailed(_) => "ENCRYPTED_SAVE_FAILED",
            AutoSaveError::EncryptedSaveRetryFailed { .. } => "ENCRYPTED_SAVE_RETRY_FAILED",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AutoSaveError::NoteNotFound(_) | AutoSaveError::StatusNotFound(_) => {
                ErrorKind::NotFound
            }
            AutoSaveError::SaveInProgress(_) => ErrorKind::Conflict,
            AutoSaveError::Persist(_)
            | AutoSaveError::EncryptedSaveFailed(_)
            | AutoSaveError::EncryptedSaveRetryFailed { .. } => ErrorKind::TransientIo,
        }
    }
}
