//! mb_crypto: Minber secure chat cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; RSA-OAEP (SHA-256) comes from the `rsa` crate.
//! - Private key material is zeroized on drop (inherited from `rsa`).
//! - Keys are opaque newtypes; callers only ever see portable strings.
//!
//! # Module layout
//! - `keys`:     RSA keypair generation, SPKI/PKCS#8 import + export, fingerprints
//! - `envelope`: encrypt/decrypt of chat-sized payloads under a peer public key
//! - `error`:    unified error type

pub mod envelope;
pub mod error;
pub mod keys;

pub use error::CryptoError;
pub use keys::{
    export_public_key, generate_key_pair, import_public_key, IdentityKeyPair, PrivateKey,
    PublicKey,
};
