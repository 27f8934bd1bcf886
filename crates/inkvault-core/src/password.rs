//! Credential hashing and brute-force mitigation.
//!
//! Hashes use the same KDF family as content encryption (PBKDF2-HMAC-SHA256)
//! but separate salts and a 64-byte output. Failed attempts are counted per
//! opaque identifier (note ID, user handle); reaching the limit locks the
//! identifier for a fixed window. Expired locks are cleared lazily, there is
//! no background timer.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto;
use crate::encryption::MIN_PASSWORD_LENGTH;
use crate::error::{CryptoError, ErrorKind};

pub const HASH_ALGORITHM: &str = "pbkdf2-sha256";
pub const PASSWORD_SALT_LEN: usize = 32;
pub const PASSWORD_HASH_LEN: usize = 64;
pub const PASSWORD_PBKDF2_ROUNDS: u32 = 100_000;
/// Upper bound accepted from stored records; hash files may be untrusted.
pub const MAX_PBKDF2_ROUNDS: u32 = 2_000_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_LOCKOUT: Duration = Duration::from_secs(5 * 60);

const COMMON_WEAK_PASSWORDS: &[&str] = &[
    "password", "123456", "123456789", "qwerty", "abc123",
    "password123", "admin", "root", "user", "guest",
    "12345678", "1234567890", "qwerty123", "password1",
    "123123", "111111", "000000", "1qaz2wsx",
];

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password is empty")]
    EmptyPassword,

    #[error("password hash is missing")]
    MissingHash,

    #[error("identifier is empty")]
    EmptyIdentifier,

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid stored hash: {0}")]
    InvalidHash(String),

    #[error("too many failed attempts, locked for {}", format_remaining(.remaining))]
    Locked { remaining: Duration },

    #[error("too many failed attempts ({attempts}), locked for {}", format_remaining(.duration))]
    LockedOut { attempts: u32, duration: Duration },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl PasswordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PasswordError::EmptyPassword
            | PasswordError::MissingHash
            | PasswordError::EmptyIdentifier => ErrorKind::InvalidInput,
            PasswordError::UnsupportedAlgorithm(_) => ErrorKind::CryptoConfig,
            PasswordError::InvalidHash(_) => ErrorKind::CryptoIntegrity,
            PasswordError::Locked { .. } | PasswordError::LockedOut { .. } => ErrorKind::Policy,
            PasswordError::Crypto(err) => err.kind(),
        }
    }

    /// Remaining lock time for lockout errors.
    pub fn lock_remaining(&self) -> Option<Duration> {
        match self {
            PasswordError::Locked { remaining } => Some(*remaining),
            PasswordError::LockedOut { duration, .. } => Some(*duration),
            _ => None,
        }
    }
}

fn format_remaining(d: &Duration) -> String {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub salt: String,
    pub hash: String,
    pub algorithm: String,
    pub rounds: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryInfo {
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl RetryInfo {
    fn remaining_lock(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until = self.locked_until?;
        if now < until {
            (until - now).to_std().ok()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PasswordStrength {
    Weak,
    Fair,
    Good,
    Strong,
}

impl fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PasswordStrength::Weak => "weak",
            PasswordStrength::Fair => "fair",
            PasswordStrength::Good => "good",
            PasswordStrength::Strong => "strong",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardParams {
    pub salt_len: usize,
    pub hash_len: usize,
    pub rounds: u32,
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for GuardParams {
    fn default() -> Self {
        Self {
            salt_len: PASSWORD_SALT_LEN,
            hash_len: PASSWORD_HASH_LEN,
            rounds: PASSWORD_PBKDF2_ROUNDS,
            max_attempts: MAX_RETRY_ATTEMPTS,
            lockout: RETRY_LOCKOUT,
        }
    }
}

#[derive(Debug, Default)]
pub struct PasswordGuard {
    params: GuardParams,
    retries: RwLock<HashMap<String, RetryInfo>>,
}

impl PasswordGuard {
    pub fn new() -> Self {
        Self::with_params(GuardParams::default())
    }

    pub fn with_params(params: GuardParams) -> Self {
        Self {
            params,
            retries: RwLock::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> GuardParams {
        self.params
    }

    pub fn hash_password(&self, password: &str) -> Result<PasswordHash, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::EmptyPassword);
        }
        let salt = crypto::generate_salt(self.params.salt_len);
        let hash = crypto::derive_bytes(
            password.as_bytes(),
            &salt,
            self.params.rounds,
            self.params.hash_len,
        )?;
        Ok(PasswordHash {
            salt: general_purpose::STANDARD.encode(&salt),
            hash: general_purpose::STANDARD.encode(hash.as_slice()),
            algorithm: HASH_ALGORITHM.to_string(),
            rounds: self.params.rounds,
            created_at: Utc::now(),
        })
    }

    /// Re-derive with the stored salt and rounds and compare in constant time.
    pub fn verify_password(
        &self,
        password: &str,
        hash: Option<&PasswordHash>,
    ) -> Result<bool, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::EmptyPassword);
        }
        let hash = hash.ok_or(PasswordError::MissingHash)?;
        if hash.algorithm != HASH_ALGORITHM {
            return Err(PasswordError::UnsupportedAlgorithm(hash.algorithm.clone()));
        }
        let salt = general_purpose::STANDARD
            .decode(&hash.salt)
            .map_err(|e| PasswordError::InvalidHash(format!("salt: {e}")))?;
        let expected = general_purpose::STANDARD
            .decode(&hash.hash)
            .map_err(|e| PasswordError::InvalidHash(format!("hash: {e}")))?;
        if expected.is_empty() {
            return Err(PasswordError::InvalidHash("hash is empty".into()));
        }
        if hash.rounds > MAX_PBKDF2_ROUNDS {
            return Err(PasswordError::InvalidHash(format!(
                "{} rounds exceeds the limit of {MAX_PBKDF2_ROUNDS}",
                hash.rounds
            )));
        }
        let computed = crypto::derive_bytes(password.as_bytes(), &salt, hash.rounds, expected.len())?;
        Ok(bool::from(computed.as_slice().ct_eq(&expected)))
    }

    /// Score a password and list every deficiency found.
    pub fn check_password_strength(&self, password: &str) -> (PasswordStrength, Vec<String>) {
        let mut suggestions = Vec::new();
        let length = password.chars().count();
        if length < MIN_PASSWORD_LENGTH {
            suggestions.push(format!(
                "Use at least {MIN_PASSWORD_LENGTH} characters"
            ));
            return (PasswordStrength::Weak, suggestions);
        }

        let mut score: i32 = 0;
        for tier in [8, 12, 16] {
            if length >= tier {
                score += 1;
            }
        }

        // ASCII letters and digits form their classes; every other
        // character, including non-ASCII letters, counts as special.
        let (mut lower, mut upper, mut number, mut special) = (false, false, false, false);
        for c in password.chars() {
            match c {
                'a'..='z' => lower = true,
                'A'..='Z' => upper = true,
                '0'..='9' => number = true,
                _ => special = true,
            }
        }

        let classes = [
            (lower, "Add lowercase letters"),
            (upper, "Add uppercase letters"),
            (number, "Add digits"),
            (special, "Add symbols such as !@#$%^&*"),
        ];
        for (present, hint) in classes {
            if present {
                score += 1;
            } else {
                suggestions.push(hint.to_string());
            }
        }

        if is_common_weak_password(password) {
            suggestions.push("Avoid commonly used passwords".to_string());
            score -= 2;
        }
        if has_repeated_run(password) {
            suggestions.push("Avoid three or more repeated characters in a row".to_string());
            score -= 1;
        }

        let all_classes = lower && upper && number && special;
        let level = if score <= 2 {
            PasswordStrength::Weak
        } else if score <= 4 || !all_classes {
            PasswordStrength::Fair
        } else if score <= 6 {
            PasswordStrength::Good
        } else {
            PasswordStrength::Strong
        };
        if level == PasswordStrength::Strong && suggestions.is_empty() {
            suggestions.push("Password strength is good".to_string());
        }
        (level, suggestions)
    }

    /// Count a failed attempt for `identifier`.
    ///
    /// While locked the counter is left untouched and the remaining lock time
    /// is returned as an error. The call that reaches the attempt limit
    /// starts the lock and already reports it.
    pub fn record_failed_attempt(&self, identifier: &str) -> Result<(), PasswordError> {
        if identifier.is_empty() {
            return Err(PasswordError::EmptyIdentifier);
        }

        let mut retries = self.retries.write();
        let info = retries.entry(identifier.to_string()).or_default();
        let now = Utc::now();

        if let Some(remaining) = info.remaining_lock(now) {
            return Err(PasswordError::Locked { remaining });
        }
        if info.locked_until.take().is_some() {
            debug!(identifier, "lockout expired, restarting attempt count");
            info.attempts = 0;
        }

        info.attempts += 1;
        info.last_attempt = Some(now);

        if info.attempts >= self.params.max_attempts {
            let lockout = chrono::Duration::from_std(self.params.lockout)
                .unwrap_or_else(|_| chrono::Duration::minutes(5));
            info.locked_until = Some(now + lockout);
            warn!(
                identifier,
                attempts = info.attempts,
                lockout_secs = self.params.lockout.as_secs(),
                "identifier locked after repeated failures"
            );
            return Err(PasswordError::LockedOut {
                attempts: info.attempts,
                duration: self.params.lockout,
            });
        }
        Ok(())
    }

    pub fn is_locked(&self, identifier: &str) -> (bool, Duration) {
        let retries = self.retries.read();
        match retries.get(identifier).and_then(|info| info.remaining_lock(Utc::now())) {
            Some(remaining) => (true, remaining),
            None => (false, Duration::ZERO),
        }
    }

    /// Clear attempts and lock state, typically after a successful unlock.
    pub fn reset_retry_count(&self, identifier: &str) {
        if let Some(info) = self.retries.write().get_mut(identifier) {
            info.attempts = 0;
            info.locked_until = None;
        }
    }

    pub fn retry_info(&self, identifier: &str) -> Option<RetryInfo> {
        self.retries.read().get(identifier).cloned()
    }
}

fn is_common_weak_password(password: &str) -> bool {
    let lowered = password.to_lowercase();
    COMMON_WEAK_PASSWORDS.iter().any(|weak| *weak == lowered)
}

fn has_repeated_run(password: &str) -> bool {
    let mut run = 1;
    let mut prev = None;
    for c in password.chars() {
        if Some(c) == prev {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else {
            run = 1;
        }
        prev = Some(c);
    }
    false
}
