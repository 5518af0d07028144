//! Process-wide encryption handle injected into repositories. When disabled
//! (`ENCRYPTION_ENABLED=false`), fields are stored as plain UTF-8/raw bytes —
//! useful for local development and the test suite.

use zeroize::ZeroizeOnDrop;

use super::encryption::{decrypt_field, encrypt_field, KEY_LENGTH};
use super::CryptoError;

#[derive(Clone, ZeroizeOnDrop)]
pub struct Cipher {
    key: Option<[u8; KEY_LENGTH]>,
}

impl Cipher {
    pub fn enabled(key: [u8; KEY_LENGTH]) -> Self {
        Self { key: Some(key) }
    }

    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.key {
            Some(key) => Ok(super::encryption::EncryptedData::encrypt(key, plaintext)?.to_bytes()),
            None => Ok(plaintext.to_vec()),
        }
    }

    pub fn decrypt_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.key {
            Some(key) => super::encryption::EncryptedData::from_bytes(bytes)?.decrypt(key),
            None => Ok(bytes.to_vec()),
        }
    }

    pub fn encrypt_text(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        match &self.key {
            Some(key) => encrypt_field(key, plaintext),
            None => Ok(plaintext.as_bytes().to_vec()),
        }
    }

    pub fn decrypt_text(&self, bytes: &[u8]) -> Result<String, CryptoError> {
        match &self.key {
            Some(key) => decrypt_field(key, bytes),
            None => String::from_utf8(bytes.to_vec())
                .map_err(|_| CryptoError::MalformedPayload("not valid utf-8".into())),
        }
    }

    pub fn encrypt_text_opt(&self, plaintext: Option<&str>) -> Result<Option<Vec<u8>>, CryptoError> {
        plaintext.map(|t| self.encrypt_text(t)).transpose()
    }

    pub fn decrypt_text_opt(&self, bytes: Option<&[u8]>) -> Result<Option<String>, CryptoError> {
        bytes.map(|b| self.decrypt_text(b)).transpose()
    }
}
