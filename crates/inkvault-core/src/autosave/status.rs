use chrono::{DateTime, Utc};

use super::AutoSaveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveStatus {
    pub note_id: String,
    pub is_saving: bool,
    pub last_saved: Option<DateTime<Utc>>,
    pub last_error: Option<AutoSaveError>,
    /// Successful saves since autosave started for this note.
    pub save_count: u64,
}

impl SaveStatus {
    pub(crate) fn new(note_id: &str) -> Self {
        Self {
            note_id: note_id.to_string(),
            is_saving: false,
            last_saved: None,
            last_error: None,
            save_count: 0,
        }
    }

    pub(crate) fn not_found(note_id: &str) -> Self {
        Self {
            last_error: Some(AutoSaveError::StatusNotFound(note_id.to_string())),
            ..Self::new(note_id)
        }
    }

    pub(crate) fn record(&mut self, result: &Result<(), AutoSaveError>, at: DateTime<Utc>) {
        match result {
            Ok(()) => {
                self.last_saved = Some(at);
                self.save_count += 1;
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e.clone()),
        }
    }
}
