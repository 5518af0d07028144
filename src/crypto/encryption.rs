//! Transparent field-encryption facility. Repository encode/decode hooks call
//! into this module so that callers above the storage layer never see ciphertext.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use sha2::{Digest, Sha256};

use super::CryptoError;

pub const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// A nonce + ciphertext container. `to_bytes`/`from_bytes` use a nonce-prefixed
/// layout so a single byte column can hold the whole payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    pub fn encrypt(key_bytes: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Self, CryptoError> {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(Self {
            nonce: nonce.into(),
            ciphertext,
        })
    }

    pub fn decrypt(&self, key_bytes: &[u8; KEY_LENGTH]) -> Result<Vec<u8>, CryptoError> {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        let cipher = Aes256Gcm::new(key);
        cipher
            .decrypt(aes_gcm::Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LENGTH + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::MalformedPayload(format!(
                "expected at least {} bytes, got {}",
                NONCE_LENGTH + TAG_LENGTH,
                bytes.len()
            )));
        }
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&bytes[..NONCE_LENGTH]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_LENGTH..].to_vec(),
        })
    }
}

/// Encrypt a plaintext string and return the nonce-prefixed byte layout ready
/// for a BLOB column.
pub fn encrypt_field(key_bytes: &[u8; KEY_LENGTH], plaintext: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(EncryptedData::encrypt(key_bytes, plaintext.as_bytes())?.to_bytes())
}

/// Decrypt a BLOB column back into a UTF-8 string.
pub fn decrypt_field(key_bytes: &[u8; KEY_LENGTH], bytes: &[u8]) -> Result<String, CryptoError> {
    let encrypted = EncryptedData::from_bytes(bytes)?;
    let plaintext = encrypted.decrypt(key_bytes)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::MalformedPayload("not valid utf-8".into()))
}

/// Deterministic SHA-256 hex digest maintained alongside an encrypted field so
/// equality lookups can be performed without decrypting every row.
pub fn searchable_hash(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Parse a 32-byte encryption key from a base64 or hex string as loaded from
/// `ENCRYPTION_KEY`.
pub fn parse_key(raw: &str) -> Result<[u8; KEY_LENGTH], CryptoError> {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .or_else(|_| hex_decode(raw))
        .map_err(|_| CryptoError::InvalidKey("not valid base64 or hex".into()))?;
    if decoded.len() != KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: decoded.len(),
        });
    }
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&decoded);
    Ok(key)
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
