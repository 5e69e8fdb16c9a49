//! Message envelope codec
//!
//! RSA-OAEP with SHA-256 for both the OAEP digest and MGF1.
//!
//! Wire format: base64(ciphertext), exactly one RSA block per payload.
//!
//! A single block holds at most `k - 2*hLen - 2` bytes of plaintext, where
//! `k` is the modulus length and `hLen` the digest length (190 bytes for a
//! 2048-bit key). Longer payloads are rejected with
//! [`CryptoError::PayloadTooLarge`]; they are never truncated or split.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{PrivateKey, PublicKey};

const DIGEST_LEN: usize = 32;

/// Largest plaintext (in UTF-8 bytes) that fits under `key`.
pub fn max_plaintext_len(key: &PublicKey) -> usize {
    key.modulus_bytes().saturating_sub(2 * DIGEST_LEN + 2)
}

/// Encrypt `plaintext` for the holder of `recipient`'s private key.
pub fn encrypt(plaintext: &str, recipient: &PublicKey) -> Result<String, CryptoError> {
    let max = max_plaintext_len(recipient);
    if plaintext.len() > max {
        return Err(CryptoError::PayloadTooLarge { len: plaintext.len(), max });
    }

    let ciphertext = recipient
        .inner()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt a base64 ciphertext produced by [`encrypt`].
///
/// Malformed base64, a ciphertext for another key and non-UTF-8 plaintext
/// all surface as [`CryptoError::Decryption`].
pub fn decrypt(ciphertext: &str, key: &PrivateKey) -> Result<String, CryptoError> {
    let data = STANDARD.decode(ciphertext).map_err(|_| CryptoError::Decryption)?;

    let plaintext = Zeroizing::new(
        key.inner()
            .decrypt(Oaep::new::<Sha256>(), &data)
            .map_err(|_| CryptoError::Decryption)?,
    );

    String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::Decryption)
}
