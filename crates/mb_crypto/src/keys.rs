//! Asymmetric key management
//!
//! Each local session owns one RSA keypair (2048-bit modulus, e = 65537)
//! used with OAEP/SHA-256. The public half travels as base64-encoded SPKI
//! DER; the private half stays inside the session client and is only ever
//! serialised as PKCS#8 PEM for the local key store.
//!
//! Public-key export is deterministic: the same key always yields the same
//! string, so exported keys can be compared and fingerprinted directly.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Modulus size used for every session keypair unless configured otherwise.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus we generate or accept from a peer.
pub const MIN_KEY_BITS: usize = 1024;

// ── Public key ────────────────────────────────────────────────────────────────

/// RSA public key of a peer (or of the local identity).
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Base64 SPKI DER, the portable form sent in key announcements.
    pub fn export(&self) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.to_der()?))
    }

    /// Inverse of [`PublicKey::export`].
    pub fn import(encoded: &str) -> Result<Self, CryptoError> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyImport(format!("base64: {e}")))?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
        if key.size() * 8 < MIN_KEY_BITS {
            return Err(CryptoError::KeyImport(format!(
                "Public key must be at least {MIN_KEY_BITS} bits, got {}",
                key.size() * 8
            )));
        }
        Ok(Self(key))
    }

    /// Modulus length in bytes (256 for a 2048-bit key).
    pub fn modulus_bytes(&self) -> usize {
        self.0.size()
    }

    /// Human-readable fingerprint: SHA-256 of the SPKI DER, truncated to
    /// 20 bytes, hex-encoded in groups of 4 for display.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        let digest = Sha256::digest(self.to_der()?);
        let hex = hex::encode(&digest[..20]);
        Ok(hex
            .as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::KeyExport(e.to_string()))
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.0.size() * 8)
    }
}

// ── Private key ───────────────────────────────────────────────────────────────

/// Local private key.  Debug output never includes key material.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// PKCS#8 PEM, wiped from memory when the returned value is dropped.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyExport(e.to_string()))
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::KeyImport(e.to_string()))
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// Session keypair.  Generated once per local identity.
#[derive(Debug, Clone)]
pub struct IdentityKeyPair {
    pub public: PublicKey,
    private: PrivateKey,
}

impl IdentityKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(DEFAULT_KEY_BITS)
    }

    pub fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_KEY_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "Modulus must be at least {MIN_KEY_BITS} bits, got {bits}"
            )));
        }
        let secret = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self::from_private(PrivateKey(secret)))
    }

    pub fn from_private(private: PrivateKey) -> Self {
        Self { public: private.public_key(), private }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn into_private(self) -> PrivateKey {
        self.private
    }

    /// Export the public key in base64 format for announcement.
    pub fn public_b64(&self) -> Result<String, CryptoError> {
        self.public.export()
    }
}

// ── Free-function surface ─────────────────────────────────────────────────────

pub fn generate_key_pair() -> Result<IdentityKeyPair, CryptoError> {
    IdentityKeyPair::generate()
}

pub fn export_public_key(key: &PublicKey) -> Result<String, CryptoError> {
    key.export()
}

pub fn import_public_key(encoded: &str) -> Result<PublicKey, CryptoError> {
    PublicKey::import(encoded)
}
