//! Password-based authenticated encryption of note content.
//!
//! Every call draws a fresh salt and nonce, derives a key with
//! PBKDF2-HMAC-SHA256 and seals the content with the selected AEAD cipher.
//! The engine keeps no per-call state, so one instance can be shared across
//! threads.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::biometric::{BiometricError, BiometricOracle, UnsupportedBiometric};
use crate::crypto::{self, Algorithm, PBKDF2_ROUNDS, SALT_LEN};
use crate::envelope::EncryptedEnvelope;
use crate::error::CryptoError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Key derivation parameters used when sealing new envelopes.
///
/// Decryption always uses the salt stored in the envelope; only the round
/// count must match what was used at encryption time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub rounds: u32,
    pub salt_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            rounds: PBKDF2_ROUNDS,
            salt_len: SALT_LEN,
        }
    }
}

#[derive(Clone)]
pub struct EncryptionEngine {
    params: KdfParams,
    biometric: Arc<dyn BiometricOracle>,
}

impl Default for EncryptionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EncryptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl EncryptionEngine {
    pub fn new() -> Self {
        Self::with_params(KdfParams::default())
    }

    pub fn with_params(params: KdfParams) -> Self {
        Self {
            params,
            biometric: Arc::new(UnsupportedBiometric),
        }
    }

    pub fn with_biometric(mut self, oracle: Arc<dyn BiometricOracle>) -> Self {
        self.biometric = oracle;
        self
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Encrypt `content` under `password` and return the serialized envelope.
    pub fn encrypt_content(
        &self,
        content: &str,
        password: &str,
        algorithm: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        if content.is_empty() {
            return Err(CryptoError::EmptyContent);
        }
        if password.is_empty() {
            return Err(CryptoError::EmptyPassword);
        }
        let algorithm: Algorithm = algorithm.parse()?;

        let salt = crypto::generate_salt(self.params.salt_len);
        let key = crypto::derive_key(password, &salt, self.params.rounds)?;
        let (nonce, ciphertext) = crypto::seal(algorithm, &key, content.as_bytes())?;

        debug!(%algorithm, bytes = content.len(), "sealed note content");
        EncryptedEnvelope::seal(algorithm, &salt, &nonce, &ciphertext).to_bytes()
    }

    /// Decrypt a serialized envelope.
    ///
    /// `algorithm` may be empty to accept whatever cipher the envelope
    /// records. A checksum mismatch is reported as
    /// [`CryptoError::ChecksumMismatch`] before any key derivation; a wrong
    /// password surfaces as [`CryptoError::AeadDecrypt`].
    pub fn decrypt_content(
        &self,
        envelope: &[u8],
        password: &str,
        algorithm: &str,
    ) -> Result<String, CryptoError> {
        if envelope.is_empty() {
            return Err(CryptoError::EmptyEnvelope);
        }
        if password.is_empty() {
            return Err(CryptoError::EmptyPassword);
        }

        let decoded = EncryptedEnvelope::from_bytes(envelope)?.decode()?;
        if !algorithm.is_empty() && decoded.algorithm.as_str() != algorithm {
            return Err(CryptoError::AlgorithmMismatch {
                expected: algorithm.to_string(),
                actual: decoded.algorithm.to_string(),
            });
        }
        decoded.verify_checksum()?;

        let key = crypto::derive_key(password, &decoded.salt, self.params.rounds)?;
        let plaintext = crypto::open(decoded.algorithm, &key, &decoded.nonce, &decoded.ciphertext)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// Password policy for content encryption: 8–128 characters with at
    /// least one uppercase, lowercase, numeric and symbol character.
    pub fn validate_password(&self, password: &str) -> bool {
        let length = password.chars().count();
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
            return false;
        }

        let (mut upper, mut lower, mut number, mut special) = (false, false, false, false);
        for c in password.chars() {
            if c.is_uppercase() {
                upper = true;
            } else if c.is_lowercase() {
                lower = true;
            } else if c.is_numeric() {
                number = true;
            } else if is_symbol(c) {
                special = true;
            }
        }
        upper && lower && number && special
    }

    pub fn setup_biometric_auth(&self, note_id: &str) -> Result<(), BiometricError> {
        self.biometric.setup_for_note(note_id)
    }

    /// Returns `Ok(false)` when the user cancelled the prompt.
    pub fn authenticate_with_biometric(&self, note_id: &str) -> Result<bool, BiometricError> {
        let outcome = self
            .biometric
            .authenticate_for_note(note_id, "Unlock encrypted note");
        match outcome.error {
            Some(err) if !outcome.cancelled => Err(err),
            _ => Ok(outcome.success),
        }
    }

    pub fn biometric(&self) -> &Arc<dyn BiometricOracle> {
        &self.biometric
    }
}

static PUNCT_OR_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{P}\p{S}]$").expect("static pattern compiles"));

/// Unicode punctuation (`P*`) or symbol (`S*`) character.
pub(crate) fn is_symbol(c: char) -> bool {
    let mut buf = [0u8; 4];
    PUNCT_OR_SYMBOL.is_match(c.encode_utf8(&mut buf))
}
