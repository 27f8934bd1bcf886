//! At-rest format of an encrypted note.
//!
//! UTF-8 JSON object:
//!
//! ```json
//! {"version":"1.0","algorithm":"aes256","salt":"..","nonce":"..","data":"..","checksum":".."}
//! ```
//!
//! `salt`, `nonce`, `data` (ciphertext + tag) and `checksum` (SHA-256 of the
//! ciphertext) are standard base64. The field set is fixed; notes written by
//! earlier releases must keep decoding.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{self, Algorithm};
use crate::error::CryptoError;

pub const ENVELOPE_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub version: String,
    pub algorithm: String,
    pub salt: String,
    pub nonce: String,
    pub data: String,
    pub checksum: String,
}

/// Binary view of an envelope after base64 decoding.
#[derive(Debug)]
pub struct DecodedEnvelope {
    pub algorithm: Algorithm,
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub checksum: Vec<u8>,
}

impl EncryptedEnvelope {
    pub fn seal(algorithm: Algorithm, salt: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Self {
        let checksum = crypto::sha256(ciphertext);
        Self {
            version: ENVELOPE_VERSION.to_string(),
            algorithm: algorithm.as_str().to_string(),
            salt: general_purpose::STANDARD.encode(salt),
            nonce: general_purpose::STANDARD.encode(nonce),
            data: general_purpose::STANDARD.encode(ciphertext),
            checksum: general_purpose::STANDARD.encode(checksum),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode binary fields. Version and algorithm are checked here;
    /// the checksum is decoded but not compared.
    pub fn decode(&self) -> Result<DecodedEnvelope, CryptoError> {
        if self.version != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion(self.version.clone()));
        }
        let algorithm: Algorithm = self.algorithm.parse()?;
        Ok(DecodedEnvelope {
            algorithm,
            salt: general_purpose::STANDARD.decode(&self.salt)?,
            nonce: general_purpose::STANDARD.decode(&self.nonce)?,
            ciphertext: general_purpose::STANDARD.decode(&self.data)?,
            checksum: general_purpose::STANDARD.decode(&self.checksum)?,
        })
    }
}

impl DecodedEnvelope {
    /// Recompute SHA-256 over the ciphertext and compare with the stored value.
    pub fn verify_checksum(&self) -> Result<(), CryptoError> {
        if crypto::sha256(&self.ciphertext).as_slice() != self.checksum.as_slice() {
            return Err(CryptoError::ChecksumMismatch);
        }
        Ok(())
    }
}
