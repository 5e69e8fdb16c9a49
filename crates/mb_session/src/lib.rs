//! mb_session: Minber secure chat session layer
//!
//! # Design principles
//! - The private key never leaves [`client::SecureSessionClient`].
//! - Per-message decryption failures are contained: the message is still
//!   delivered, with a placeholder in place of the unreadable text.
//! - Inbound traffic is handled in delivery order on the caller's task;
//!   nothing here spawns background work except key generation.
//!
//! # Module layout
//! - `client`:    connection state machine, encryption on send, decryption on receive
//! - `directory`: peer id -> public key
//! - `store`:     message list reducer for edits, tombstones and reactions
//! - `chat`:      one-to-one facade with bool/Option results for UI code
//! - `observers`: typed subscribe/unsubscribe lists
//! - `transport`: hub transport trait
//! - `loopback`:  in-process hub
//! - `keystore`:  PEM-on-disk private key persistence
//! - `config`:    session configuration
//! - `error`:     error types

pub mod chat;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod keystore;
pub mod loopback;
pub mod observers;
pub mod store;
pub mod transport;

pub use chat::SecureChat;
pub use client::{ConnectionState, SecureSessionClient, DECRYPT_FAILED_PLACEHOLDER, ROOM_RECIPIENT};
pub use config::SessionConfig;
pub use directory::PeerKeyDirectory;
pub use error::{ConfigError, KeyStoreError, SessionError, TransportError};
pub use keystore::KeyStore;
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use observers::{Observers, SubscriptionId};
pub use store::MessageStore;
pub use transport::{EventReceiver, HubTransport};
