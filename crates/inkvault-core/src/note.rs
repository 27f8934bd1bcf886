use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Note handle shared between the editor layer and the autosave scheduler.
pub type SharedNote = Arc<RwLock<Note>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    content: String,
    pub is_encrypted: bool,
    /// Cipher identifier (`aes256` / `chacha20`); empty for plain notes.
    #[serde(default)]
    pub encryption_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_saved: Option<DateTime<Utc>>,
    #[serde(skip)]
    dirty: bool,
    #[serde(skip)]
    revision: u64,
}

impl Note {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            is_encrypted: false,
            encryption_type: String::new(),
            created_at: now,
            updated_at: now,
            last_saved: None,
            dirty: true,
            revision: 0,
        }
    }

    pub fn encrypted(
        title: impl Into<String>,
        content: impl Into<String>,
        algorithm: impl Into<String>,
    ) -> Self {
        let mut note = Self::new(title, content);
        note.is_encrypted = true;
        note.encryption_type = algorithm.into();
        note
    }

    pub fn into_shared(self) -> SharedNote {
        Arc::new(RwLock::new(self))
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the body and mark the note dirty. Identical content is a no-op.
    pub fn update_content(&mut self, content: impl Into<String>) {
        let content = content.into();
        if content == self.content {
            return;
        }
        self.content = content;
        self.touch();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    pub fn mark_dirty(&mut self) {
        self.touch();
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
        self.last_saved = Some(Utc::now());
    }

    /// Clear the dirty flag for a save that captured `revision`. Returns
    /// `false` and leaves the note dirty if it was edited since.
    pub fn mark_saved_at(&mut self, revision: u64, at: DateTime<Utc>) -> bool {
        self.last_saved = Some(at);
        if self.revision != revision {
            return false;
        }
        self.dirty = false;
        true
    }

    pub fn is_modified(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision = self.revision.wrapping_add(1);
        self.updated_at = Utc::now();
    }
}
