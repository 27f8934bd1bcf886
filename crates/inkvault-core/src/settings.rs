use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::autosave::IntervalPolicy;
use crate::crypto::Algorithm;
use crate::error::ErrorKind;

pub const MIN_AUTO_SAVE_MINUTES: u32 = 1;
pub const MAX_AUTO_SAVE_MINUTES: u32 = 60;
pub const DEFAULT_AUTO_SAVE_MINUTES: u32 = 5;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("auto-save interval must be between 1 and 60 minutes, got {0}")]
    InvalidInterval(u32),

    #[error("unsupported encryption algorithm: {0}")]
    InvalidEncryption(String),

    #[error("failed to read settings {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl SettingsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettingsError::InvalidInterval(_) | SettingsError::InvalidEncryption(_) => {
                ErrorKind::InvalidInput
            }
            SettingsError::Read { .. } | SettingsError::Write { .. } => ErrorKind::TransientIo,
            SettingsError::Malformed(_) => ErrorKind::InvalidInput,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub default_encryption: Algorithm,
    /// Minutes between autosave ticks.
    pub auto_save_interval: u32,
    #[serde(default)]
    pub default_save_location: Option<PathBuf>,
    #[serde(default)]
    pub biometric_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_encryption: Algorithm::Aes256,
            auto_save_interval: DEFAULT_AUTO_SAVE_MINUTES,
            default_save_location: None,
            biometric_enabled: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_interval(self.auto_save_interval)
    }

    pub fn update_encryption(&mut self, algorithm: &str) -> Result<(), SettingsError> {
        self.default_encryption = algorithm
            .parse()
            .map_err(|_| SettingsError::InvalidEncryption(algorithm.to_string()))?;
        Ok(())
    }

    pub fn update_auto_save_interval(&mut self, minutes: u32) -> Result<(), SettingsError> {
        check_interval(minutes)?;
        self.auto_save_interval = minutes;
        Ok(())
    }

    pub fn auto_save_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.auto_save_interval) * 60)
    }
}

fn check_interval(minutes: u32) -> Result<(), SettingsError> {
    if !(MIN_AUTO_SAVE_MINUTES..=MAX_AUTO_SAVE_MINUTES).contains(&minutes) {
        return Err(SettingsError::InvalidInterval(minutes));
    }
    Ok(())
}

/// JSON-backed settings file. Reads every time so edits made by another
/// process are picked up on the next autosave start.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings, SettingsError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let settings: Settings = serde_json::from_slice(&bytes)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        let data = serde_json::to_vec_pretty(settings)?;
        let write_err = |source: std::io::Error| SettingsError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&data).map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl IntervalPolicy for SettingsStore {
    fn base_interval(&self) -> anyhow::Result<Duration> {
        Ok(self.load()?.auto_save_duration())
    }
}
