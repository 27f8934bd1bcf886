//! Biometric unlock capability.
//!
//! The engine treats biometric hardware as an opaque yes/no oracle. Platform
//! integrations implement [`BiometricOracle`]; where no hardware exists,
//! [`UnsupportedBiometric`] reports unavailable and refuses every operation.
//! That refusal is a capability answer, not a transient fault, so callers
//! should fall back to password unlock instead of retrying.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BiometricKind {
    None,
    TouchId,
    FaceId,
}

impl fmt::Display for BiometricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BiometricKind::None => "none",
            BiometricKind::TouchId => "Touch ID",
            BiometricKind::FaceId => "Face ID",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BiometricError {
    #[error("biometric authentication is not supported on this platform")]
    NotSupported,

    #[error("biometric authentication is not enabled for note {0}")]
    NotEnabled(String),

    #[error("biometric authentication failed: {0}")]
    Failed(String),
}

impl BiometricError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BiometricError::NotSupported => ErrorKind::CryptoConfig,
            BiometricError::NotEnabled(_) => ErrorKind::NotFound,
            BiometricError::Failed(_) => ErrorKind::CryptoAuth,
        }
    }
}

/// Result of one authentication prompt.
#[derive(Debug, Clone)]
pub struct BiometricOutcome {
    pub success: bool,
    pub cancelled: bool,
    pub error: Option<BiometricError>,
    pub duration: Duration,
}

impl BiometricOutcome {
    pub fn failed(error: BiometricError) -> Self {
        Self {
            success: false,
            cancelled: false,
            error: Some(error),
            duration: Duration::ZERO,
        }
    }
}

pub trait BiometricOracle: Send + Sync {
    fn is_available(&self) -> (bool, BiometricKind);
    fn setup_for_note(&self, note_id: &str) -> Result<(), BiometricError>;
    fn authenticate_for_note(&self, note_id: &str, reason: &str) -> BiometricOutcome;
    fn remove_for_note(&self, note_id: &str) -> Result<(), BiometricError>;
    fn is_enabled_for_note(&self, note_id: &str) -> bool;
}

/// Oracle for platforms without biometric hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBiometric;

impl BiometricOracle for UnsupportedBiometric {
    fn is_available(&self) -> (bool, BiometricKind) {
        (false, BiometricKind::None)
    }

    fn setup_for_note(&self, _note_id: &str) -> Result<(), BiometricError> {
        Err(BiometricError::NotSupported)
    }

    fn authenticate_for_note(&self, _note_id: &str, _reason: &str) -> BiometricOutcome {
        BiometricOutcome::failed(BiometricError::NotSupported)
    }

    fn remove_for_note(&self, _note_id: &str) -> Result<(), BiometricError> {
        Err(BiometricError::NotSupported)
    }

    fn is_enabled_for_note(&self, _note_id: &str) -> bool {
        false
    }
}
