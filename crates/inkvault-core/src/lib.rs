//! inkvault-core: persistence and protection core for encrypted notes
//!
//! # Design principles
//! - NO custom crypto; AEAD, KDF and hashing come from audited RustCrypto crates.
//! - Passwords and derived keys are zeroized on drop.
//! - The scheduler never mutates note content; it only reads dirtiness and
//!   triggers persistence.
//!
//! # Module layout
//! - `autosave`    : per-note timers, dirty-checking, bounded retry, save status
//! - `encryption`  : `EncryptionEngine`: password-based envelope encrypt/decrypt
//! - `envelope`    : on-disk JSON envelope (`version`, `algorithm`, `salt`, ...)
//! - `crypto`      : PBKDF2 derivation, AEAD helpers, checksum, randomness
//! - `password`    : `PasswordGuard`: hashing, strength scoring, retry lockout
//! - `biometric`   : biometric oracle capability + unsupported-platform fallback
//! - `note`        : note model with dirty tracking
//! - `persist`     : `Persistor` capability + file-backed implementation
//! - `settings`    : user settings, JSON store, interval policy source
//! - `paths`       : platform data/config locations
//! - `error`       : shared error taxonomy

pub mod autosave;
pub mod biometric;
pub mod crypto;
pub mod encryption;
pub mod envelope;
pub mod error;
pub mod note;
pub mod password;
pub mod paths;
pub mod persist;
pub mod settings;

pub use autosave::{
    AutoSaveError, AutoSaveScheduler, AutoSaveService, IntervalPolicy, RetryPolicy, SaveStatus,
    SchedulerOptions,
};
pub use encryption::EncryptionEngine;
pub use error::{CryptoError, ErrorKind};
pub use note::{Note, SharedNote};
pub use password::{PasswordGuard, PasswordStrength};
pub use persist::{FilePersistor, Persistor};
pub use settings::{Settings, SettingsStore};
