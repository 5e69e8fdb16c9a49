use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Public key import failed: {0}")]
    KeyImport(String),

    #[error("Key export failed: {0}")]
    KeyExport(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// The plaintext does not fit in a single RSA-OAEP block.
    #[error("Payload too large: {len} bytes exceeds the {max} byte limit for this key")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Decryption failed (wrong key or malformed ciphertext)")]
    Decryption,
}
