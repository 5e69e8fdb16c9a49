use thiserror::Error;

use mb_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Hub connection failed: {0}")]
    Connection(String),

    #[error("Transport not started")]
    NotStarted,

    #[error("Invocation {method} failed: {reason}")]
    Invoke { method: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transport connection failed: {0}")]
    TransportConnection(String),

    #[error("Not connected to chat server")]
    NotConnected,

    #[error("No private key bound to this session")]
    NoPrivateKey,

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("User id cannot be used as a key file name: {0:?}")]
    InvalidUserId(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
