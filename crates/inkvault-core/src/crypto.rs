//! Low-level primitives shared by the encryption engine and the password guard.
//!
//! Key derivation: PBKDF2-HMAC-SHA256.
//! AEAD: AES-256-GCM or ChaCha20-Poly1305, 32-byte key, 12-byte random nonce,
//! 16-byte tag appended to the ciphertext.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// AEAD cipher selector. Serialized as the identifiers stored in envelopes
/// and settings (`"aes256"`, `"chacha20"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Aes256,
    ChaCha20,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::Aes256, Algorithm::ChaCha20];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Aes256 => "aes256",
            Algorithm::ChaCha20 => "chacha20",
        }
    }

    /// Nonce size mandated by the cipher.
    pub fn nonce_len(&self) -> usize {
        match self {
            Algorithm::Aes256 | Algorithm::ChaCha20 => NONCE_LEN,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes256" => Ok(Algorithm::Aes256),
            "chacha20" => Ok(Algorithm::ChaCha20),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Derive `len` bytes from a password with PBKDF2-HMAC-SHA256.
pub fn derive_bytes(
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if rounds == 0 {
        return Err(CryptoError::KeyDerivation("round count must be positive".into()));
    }
    if len == 0 {
        return Err(CryptoError::KeyDerivation("output length must be positive".into()));
    }
    let mut out = Zeroizing::new(vec![0u8; len]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut out);
    Ok(out)
}

/// Derive a 32-byte AEAD key from a password and salt.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    rounds: u32,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let bytes = derive_bytes(password.as_bytes(), salt, rounds, KEY_LEN)?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Encrypt `plaintext`, returning `(nonce, ciphertext || tag)`.
///
/// The nonce is always drawn from the OS CSPRNG here; callers cannot supply one.
pub fn seal(
    algorithm: Algorithm,
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    match algorithm {
        Algorithm::Aes256 => seal_with::<Aes256Gcm>(key, plaintext),
        Algorithm::ChaCha20 => seal_with::<ChaCha20Poly1305>(key, plaintext),
    }
}

/// Decrypt and authenticate `ciphertext` with the given nonce.
pub fn open(
    algorithm: Algorithm,
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if nonce.len() != algorithm.nonce_len() {
        return Err(CryptoError::MalformedEnvelope(format!(
            "nonce must be {} bytes for {algorithm}, got {}",
            algorithm.nonce_len(),
            nonce.len()
        )));
    }
    let plaintext = match algorithm {
        Algorithm::Aes256 => open_with::<Aes256Gcm>(key, nonce, ciphertext)?,
        Algorithm::ChaCha20 => open_with::<ChaCha20Poly1305>(key, nonce, ciphertext)?,
    };
    Ok(Zeroizing::new(plaintext))
}

fn seal_with<C>(key: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = C::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::AeadEncrypt)?;
    Ok((nonce.to_vec(), ciphertext))
}

fn open_with<C>(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let nonce = chacha20poly1305::aead::Nonce::<C>::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::AeadDecrypt)
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

pub fn generate_salt(len: usize) -> Vec<u8> {
    random_bytes(len)
}
