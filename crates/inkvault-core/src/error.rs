use thiserror::Error;

/// Coarse classification shared by every error type in the crate.
///
/// Callers use it to decide whether to retry, re-prompt for a password, or
/// report a corrupted note, without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Note, status or file absent.
    NotFound,
    /// A save for the same note is already running.
    Conflict,
    /// A single persistence failure; retrying may succeed.
    TransientIo,
    /// Stored checksum does not match the ciphertext.
    CryptoIntegrity,
    /// AEAD tag rejected, almost always a wrong password.
    CryptoAuth,
    /// Unsupported algorithm or envelope version.
    CryptoConfig,
    /// Weak password or lockout.
    Policy,
    /// Caller supplied empty or malformed input.
    InvalidInput,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("content to encrypt is empty")]
    EmptyContent,

    #[error("password is empty")]
    EmptyPassword,

    #[error("encrypted data is empty")]
    EmptyEnvelope,

    #[error("unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(String),

    #[error("algorithm mismatch: expected {expected}, envelope uses {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    #[error("checksum mismatch, encrypted data is corrupted or was modified")]
    ChecksumMismatch,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("decryption failed (authentication tag mismatch, wrong password or tampering)")]
    AeadDecrypt,

    #[error("decrypted content is not valid UTF-8")]
    InvalidUtf8,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::EmptyContent
            | CryptoError::EmptyPassword
            | CryptoError::EmptyEnvelope => ErrorKind::InvalidInput,
            CryptoError::UnsupportedAlgorithm(_)
            | CryptoError::UnsupportedVersion(_)
            | CryptoError::AlgorithmMismatch { .. }
            | CryptoError::KeyDerivation(_)
            | CryptoError::AeadEncrypt => ErrorKind::CryptoConfig,
            CryptoError::ChecksumMismatch
            | CryptoError::MalformedEnvelope(_)
            | CryptoError::Serialisation(_)
            | CryptoError::Base64Decode(_)
            | CryptoError::InvalidUtf8 => ErrorKind::CryptoIntegrity,
            CryptoError::AeadDecrypt => ErrorKind::CryptoAuth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_password_and_corruption_are_distinct_kinds() {
        assert_eq!(CryptoError::AeadDecrypt.kind(), ErrorKind::CryptoAuth);
        assert_eq!(CryptoError::ChecksumMismatch.kind(), ErrorKind::CryptoIntegrity);
        assert_eq!(
            CryptoError::UnsupportedVersion("2.0".into()).kind(),
            ErrorKind::CryptoConfig
        );
    }
}
