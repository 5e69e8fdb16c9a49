//! One-to-one chat facade for UI code.
//!
//! Bundles a session client, a shared message store and the peer being
//! talked to. Mutation methods never return errors: failures come back as
//! `false`/`None` and a human-readable message in [`SecureChat::error`].

use std::sync::Arc;

use parking_lot::Mutex;

use mb_crypto::{IdentityKeyPair, PrivateKey};
use mb_proto::{ChatMessage, DeleteScope, ReactionAction, SendOptions};

use crate::client::{ConnectionState, SecureSessionClient};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::keystore::KeyStore;
use crate::observers::SubscriptionId;
use crate::store::MessageStore;
use crate::transport::HubTransport;

pub const CONNECT_FAILED: &str = "Failed to connect to chat server. Please try again later.";
pub const NOT_CONNECTED: &str = "Not connected to chat server";
pub const CONNECTION_LOST: &str = "Lost connection to chat server. Please reconnect.";
pub const SEND_FAILED: &str = "Failed to send message. Please try again.";
pub const EDIT_FAILED: &str = "Failed to edit message. Please try again.";
pub const DELETE_FAILED: &str = "Failed to delete message. Please try again.";
pub const REACT_FAILED: &str = "Failed to react to message. Please try again.";

pub struct SecureChat<T> {
    client: SecureSessionClient<T>,
    peer_id: String,
    store: Arc<Mutex<MessageStore>>,
    key_store: Option<KeyStore>,
    subscriptions: Vec<SubscriptionId>,
    is_loading: bool,
    error: Option<String>,
}

impl<T: HubTransport> SecureChat<T> {
    pub fn new(config: SessionConfig, transport: T, peer_id: impl Into<String>) -> Self {
        let key_store = config.key_store_dir.clone().map(KeyStore::new);
        Self {
            client: SecureSessionClient::new(config, transport),
            peer_id: peer_id.into(),
            store: Arc::new(Mutex::new(MessageStore::new())),
            key_store,
            subscriptions: Vec::new(),
            is_loading: false,
            error: None,
        }
    }

    /// Obtain a keypair, connect, announce the public key and start
    /// collecting the conversation. Returns false and sets
    /// [`SecureChat::error`] on failure.
    pub async fn start(&mut self) -> bool {
        self.is_loading = true;
        self.error = None;
        let result = self.try_start().await;
        self.is_loading = false;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    target: "mb_session",
                    event = "chat_start_failed",
                    user_id = %self.client.user_id(),
                    peer_id = %self.peer_id,
                    error = %e
                );
                self.error = Some(CONNECT_FAILED.to_string());
                false
            }
        }
    }

    async fn try_start(&mut self) -> Result<(), SessionError> {
        if !self.client.has_private_key() {
            let key = self.obtain_private_key().await?;
            self.client.set_private_key(key);
        }
        if self.subscriptions.is_empty() {
            self.register_observers();
        }
        self.client.connect().await?;
        self.client.announce_public_key().await?;
        tracing::info!(
            target: "mb_session",
            event = "chat_started",
            user_id = %self.client.user_id(),
            peer_id = %self.peer_id
        );
        Ok(())
    }

    /// Stored key if there is one, otherwise a fresh key generated off the
    /// async runtime and saved for next time.
    async fn obtain_private_key(&self) -> Result<PrivateKey, SessionError> {
        let user_id = self.client.user_id();
        if let Some(store) = &self.key_store {
            if let Some(key) = store.load(user_id)? {
                return Ok(key);
            }
        }

        let bits = self.client.config().key_bits;
        let pair = tokio::task::spawn_blocking(move || IdentityKeyPair::generate_with_bits(bits))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))??;
        tracing::info!(target: "mb_session", event = "keypair_generated", user_id = %user_id, bits);

        let key = pair.into_private();
        if let Some(store) = &self.key_store {
            store.save(user_id, &key)?;
        }
        Ok(key)
    }

    fn register_observers(&mut self) {
        let me = self.client.user_id().to_string();
        let peer = self.peer_id.clone();
        let store = Arc::clone(&self.store);
        let on_message = self.client.on_message(move |msg| {
            if msg.sender_id == peer || msg.sender_id == me {
                store.lock().apply_new_message(msg.clone());
            }
        });

        let store = Arc::clone(&self.store);
        let on_update = self.client.on_message_update(move |update| {
            store.lock().apply_update(update);
        });

        self.subscriptions = vec![on_message, on_update];
    }

    /// Unsubscribe and disconnect.
    pub async fn stop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.client.unsubscribe(id);
        }
        self.client.disconnect().await;
    }

    // ── UI surface ───────────────────────────────────────────────────────────

    /// Snapshot of the conversation in arrival order, tombstones included.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.store.lock().messages().to_vec()
    }

    pub fn visible_messages(&self) -> Vec<ChatMessage> {
        self.store.lock().visible().cloned().collect()
    }

    pub fn store(&self) -> Arc<Mutex<MessageStore>> {
        Arc::clone(&self.store)
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// The last failure reported by this facade, or [`CONNECTION_LOST`] once
    /// the session client has dropped into `Error` on its own.
    pub fn error(&self) -> Option<&str> {
        match self.error.as_deref() {
            Some(message) => Some(message),
            None if self.client.state() == ConnectionState::Error => Some(CONNECTION_LOST),
            None => None,
        }
    }

    /// True once the peer's key is known, so sends will be encrypted.
    pub fn is_secure(&self) -> bool {
        self.client.directory().contains(&self.peer_id)
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn client(&self) -> &SecureSessionClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SecureSessionClient<T> {
        &mut self.client
    }

    /// Returns the new message id. The local view gets the plaintext.
    pub async fn send_message(&mut self, content: &str, options: &SendOptions) -> Option<String> {
        if !self.check_connected() {
            return None;
        }
        match self.client.send_message(&self.peer_id, content, options).await {
            Ok(mut local) => {
                local.content = content.to_string();
                local.reply_to_content = options.reply_to_content.clone();
                let id = local.id.clone();
                self.store.lock().apply_new_message(local);
                Some(id)
            }
            Err(e) => {
                self.record_failure("send_message", SEND_FAILED, &e);
                None
            }
        }
    }

    /// The edit is applied locally at once; the peer gets it from the hub.
    pub async fn edit_message(&mut self, message_id: &str, new_content: &str) -> bool {
        if !self.check_connected() {
            return false;
        }
        match self.client.edit_message(message_id, new_content).await {
            Ok(_) => {
                self.store.lock().apply_edit(message_id, new_content);
                true
            }
            Err(e) => {
                self.record_failure("edit_message", EDIT_FAILED, &e);
                false
            }
        }
    }

    pub async fn delete_message(&mut self, message_id: &str, delete_for: DeleteScope) -> bool {
        if !self.check_connected() {
            return false;
        }
        match self.client.delete_message(message_id, delete_for).await {
            Ok(()) => true,
            Err(e) => {
                self.record_failure("delete_message", DELETE_FAILED, &e);
                false
            }
        }
    }

    pub async fn react_to_message(&mut self, message_id: &str, emoji: &str, action: ReactionAction) -> bool {
        if !self.check_connected() {
            return false;
        }
        match self.client.react_to_message(message_id, emoji, action).await {
            Ok(()) => true,
            Err(e) => {
                self.record_failure("react_to_message", REACT_FAILED, &e);
                false
            }
        }
    }

    /// Apply every inbound event already delivered.
    pub fn process_pending(&mut self) -> usize {
        self.client.process_pending()
    }

    pub async fn next_event(&mut self) -> bool {
        self.client.next_event().await
    }

    fn check_connected(&mut self) -> bool {
        if self.client.is_connected() {
            return true;
        }
        self.error = Some(NOT_CONNECTED.to_string());
        false
    }

    fn record_failure(&mut self, op: &'static str, message: &str, err: &SessionError) {
        tracing::warn!(target: "mb_session", event = "chat_op_failed", op, error = %err);
        self.error = Some(message.to_string());
    }
}
