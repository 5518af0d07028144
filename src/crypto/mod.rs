pub mod cipher;
pub mod encryption;

pub use cipher::Cipher;
pub use encryption::{searchable_hash, EncryptedData};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(String),
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
}
