//! Persistence capability consumed by the autosave scheduler.
//!
//! The scheduler only needs success or failure from [`Persistor::save`]; it
//! treats `Note::is_encrypted` as a hint for its own retry policy and never
//! learns how the bytes reach storage.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::encryption::EncryptionEngine;
use crate::error::{CryptoError, ErrorKind};
use crate::note::Note;

pub const PLAIN_EXTENSION: &str = "md";
pub const ENCRYPTED_EXTENSION: &str = "md.enc";

pub trait Persistor: Send + Sync {
    fn save(&self, note: &Note) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("no password registered for encrypted note {0}")]
    MissingPassword(String),

    #[error("note {0} has no stored file")]
    NotFound(String),

    #[error("invalid note id {0:?}")]
    InvalidNoteId(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl PersistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PersistError::MissingPassword(_) | PersistError::InvalidNoteId(_) => {
                ErrorKind::InvalidInput
            }
            PersistError::NotFound(_) => ErrorKind::NotFound,
            PersistError::Io { .. } => ErrorKind::TransientIo,
            PersistError::Crypto(e) => e.kind(),
        }
    }
}

/// Writes one file per note into a flat directory: `<id>.md` for plain
/// notes, `<id>.md.enc` holding an envelope for encrypted ones.
///
/// Passwords for encrypted notes are registered by the editor layer after
/// the user unlocks the note and are wiped on drop.
pub struct FilePersistor {
    dir: PathBuf,
    engine: EncryptionEngine,
    passwords: RwLock<HashMap<String, Zeroizing<String>>>,
}

impl FilePersistor {
    pub fn new(dir: impl Into<PathBuf>, engine: EncryptionEngine) -> Self {
        Self {
            dir: dir.into(),
            engine,
            passwords: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn set_note_password(&self, note_id: &str, password: &str) {
        self.passwords
            .write()
            .insert(note_id.to_string(), Zeroizing::new(password.to_string()));
    }

    pub fn forget_note_password(&self, note_id: &str) {
        self.passwords.write().remove(note_id);
    }

    /// File for `note_id` in the given mode. Ids must be a single plain
    /// path component so files cannot land outside the notes directory.
    pub fn note_path(&self, note_id: &str, encrypted: bool) -> Result<PathBuf, PersistError> {
        let invalid = note_id.is_empty()
            || note_id.starts_with('.')
            || note_id.contains(['/', '\\', '\0'])
            || note_id.contains("..");
        if invalid {
            return Err(PersistError::InvalidNoteId(note_id.to_string()));
        }
        let ext = if encrypted {
            ENCRYPTED_EXTENSION
        } else {
            PLAIN_EXTENSION
        };
        Ok(self.dir.join(format!("{note_id}.{ext}")))
    }

    pub fn write_note(&self, note: &Note) -> Result<PathBuf, PersistError> {
        let bytes = if note.is_encrypted {
            let passwords = self.passwords.read();
            let password = passwords
                .get(&note.id)
                .ok_or_else(|| PersistError::MissingPassword(note.id.clone()))?;
            self.engine
                .encrypt_content(note.content(), password, &note.encryption_type)?
        } else {
            note.content().as_bytes().to_vec()
        };

        let path = self.note_path(&note.id, note.is_encrypted)?;
        let stale = self.note_path(&note.id, !note.is_encrypted)?;
        write_atomic(&self.dir, &path, &bytes)?;
        // Only one mode may exist on disk.
        remove_if_exists(&stale)?;
        debug!(
            note_id = %note.id,
            encrypted = note.is_encrypted,
            bytes = bytes.len(),
            "note written"
        );
        Ok(path)
    }

    /// Read a note body back. `password` is required for encrypted notes.
    pub fn load_content(&self, note_id: &str, password: Option<&str>) -> Result<String, PersistError> {
        let enc_path = self.note_path(note_id, true)?;
        if enc_path.exists() {
            let password =
                password.ok_or_else(|| PersistError::MissingPassword(note_id.to_string()))?;
            let bytes = read(&enc_path)?;
            return Ok(self.engine.decrypt_content(&bytes, password, "")?);
        }

        let plain_path = self.note_path(note_id, false)?;
        if !plain_path.exists() {
            return Err(PersistError::NotFound(note_id.to_string()));
        }
        let bytes = read(&plain_path)?;
        String::from_utf8(bytes).map_err(|_| PersistError::Crypto(CryptoError::InvalidUtf8))
    }
}

impl Persistor for FilePersistor {
    fn save(&self, note: &Note) -> anyhow::Result<()> {
        self.write_note(note)?;
        Ok(())
    }
}

fn read(path: &Path) -> Result<Vec<u8>, PersistError> {
    fs::read(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_if_exists(path: &Path) -> Result<(), PersistError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed file from previous mode");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let io_err = |source: std::io::Error| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
