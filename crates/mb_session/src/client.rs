//! Secure session client
//!
//! Owns the local private key, the peer key directory and the hub
//! transport, and turns raw hub traffic into decrypted events for
//! observers.
//!
//! States: `Disconnected -> Connecting -> Connected`, with `Error` reachable
//! from `Connecting` or `Connected` on transport failure: a refused connect,
//! the inbound stream closing, or an invocation the transport can no longer
//! carry. `connect` retries from `Error`; `disconnect` returns to
//! `Disconnected` from any state.
//!
//! Inbound ordering: events are handled in the order the transport delivers
//! them. While no private key is bound, message lifecycle events are held in
//! a bounded FIFO and replayed by [`SecureSessionClient::set_private_key`].
//! System-channel and presence traffic is handled immediately.

use std::collections::{HashMap, VecDeque};

use mb_crypto::envelope;
use mb_crypto::{PrivateKey, PublicKey};
use mb_proto::hub::RegisterRequest;
use mb_proto::{
    ChatMessage, DeleteScope, HubEvent, HubInvocation, MessageDelete, MessageEdit,
    MessageReaction, MessageUpdate, ReactionAction, RoomRef, SendOptions, SystemMessage,
    UserConnection, SYSTEM_SENDER,
};

use crate::config::SessionConfig;
use crate::directory::PeerKeyDirectory;
use crate::error::{SessionError, TransportError};
use crate::observers::{Observers, SubscriptionId};
use crate::transport::{EventReceiver, HubTransport};

/// Substituted for any field that fails to decrypt.
pub const DECRYPT_FAILED_PLACEHOLDER: &str = "[Encrypted message - cannot decrypt]";

/// Reserved recipient for room (mosque community) messages.
pub const ROOM_RECIPIENT: &str = "mosque";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

pub struct SecureSessionClient<T> {
    config: SessionConfig,
    transport: T,
    state: ConnectionState,
    last_error: Option<String>,
    inbound: Option<EventReceiver>,
    private_key: Option<PrivateKey>,
    directory: PeerKeyDirectory,
    /// message id -> recipient, for every message this client sent.
    sent_recipients: HashMap<String, String>,
    pending: VecDeque<HubEvent>,
    message_observers: Observers<ChatMessage>,
    update_observers: Observers<MessageUpdate>,
    connected_observers: Observers<UserConnection>,
    disconnected_observers: Observers<String>,
    room_observers: Observers<ChatMessage>,
}

impl<T: HubTransport> SecureSessionClient<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            state: ConnectionState::Disconnected,
            last_error: None,
            inbound: None,
            private_key: None,
            directory: PeerKeyDirectory::new(),
            sent_recipients: HashMap::new(),
            pending: VecDeque::new(),
            message_observers: Observers::new(),
            update_observers: Observers::new(),
            connected_observers: Observers::new(),
            disconnected_observers: Observers::new(),
            room_observers: Observers::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Reason for the last transition into `Error`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn directory(&self) -> &PeerKeyDirectory {
        &self.directory
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Events waiting for a private key.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ── Connection lifecycle ─────────────────────────────────────────────────

    /// Open the hub connection and register. No-op when already connected.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        let public_key = match &self.private_key {
            Some(key) => Some(key.public_key().export()?),
            None => None,
        };

        self.state = ConnectionState::Connecting;
        tracing::info!(
            target: "mb_session",
            event = "connect_start",
            user_id = %self.config.user_id,
            hub_url = %self.transport.endpoint()
        );

        let rx = match self.transport.start().await {
            Ok(rx) => rx,
            Err(e) => return Err(self.fail_connect(e.to_string())),
        };

        let register = HubInvocation::Register(RegisterRequest {
            user_id: self.config.user_id.clone(),
            public_key,
        });
        if let Err(e) = self.transport.invoke(register).await {
            if let Err(stop_err) = self.transport.stop().await {
                tracing::debug!(target: "mb_session", event = "stop_after_register_failed", error = %stop_err);
            }
            return Err(self.fail_connect(e.to_string()));
        }

        self.inbound = Some(rx);
        self.state = ConnectionState::Connected;
        self.last_error = None;
        tracing::info!(target: "mb_session", event = "connect_ok", user_id = %self.config.user_id);
        Ok(())
    }

    fn fail_connect(&mut self, reason: String) -> SessionError {
        tracing::error!(
            target: "mb_session",
            event = "connect_failed",
            user_id = %self.config.user_id,
            hub_url = %self.transport.endpoint(),
            error = %reason
        );
        self.state = ConnectionState::Error;
        self.last_error = Some(reason.clone());
        SessionError::TransportConnection(reason)
    }

    /// Tear down the transport. Always ends in `Disconnected`.
    pub async fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            if let Err(e) = self.transport.stop().await {
                tracing::warn!(target: "mb_session", event = "disconnect_failed", error = %e);
            }
        }
        self.inbound = None;
        self.state = ConnectionState::Disconnected;
        tracing::info!(target: "mb_session", event = "disconnected", user_id = %self.config.user_id);
    }

    // ── Keys ─────────────────────────────────────────────────────────────────

    /// Bind the local private key and replay any buffered events through
    /// normal handling. Returns the number of replayed events.
    pub fn set_private_key(&mut self, key: PrivateKey) -> usize {
        self.private_key = Some(key);
        let pending = std::mem::take(&mut self.pending);
        let replayed = pending.len();
        if replayed > 0 {
            tracing::info!(target: "mb_session", event = "pending_replay", count = replayed);
        }
        for event in pending {
            self.handle_event(event);
        }
        replayed
    }

    pub fn add_peer_public_key(&mut self, peer_id: impl Into<String>, key: PublicKey) -> Option<PublicKey> {
        self.directory.add_public_key(peer_id, key)
    }

    /// Publish the local public key on the system channel.
    pub async fn announce_public_key(&mut self) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let key = self.private_key.as_ref().ok_or(SessionError::NoPrivateKey)?;
        let announcement = SystemMessage::PublicKey {
            user_id: self.config.user_id.clone(),
            public_key: key.public_key().export()?,
        };
        let msg = ChatMessage::outgoing(
            self.config.user_id.clone(),
            SYSTEM_SENDER,
            announcement.encode()?,
            &SendOptions::default(),
        );
        self.invoke(HubInvocation::SendMessage(msg)).await?;
        tracing::info!(target: "mb_session", event = "public_key_announced", user_id = %self.config.user_id);
        Ok(())
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Send a direct message and return the record as transmitted.
    ///
    /// The content (and the reply excerpt, independently) is encrypted when
    /// the recipient's key is in the directory; otherwise it goes out in
    /// clear with `is_encrypted = false`.
    pub async fn send_message(
        &mut self,
        recipient_id: &str,
        content: &str,
        options: &SendOptions,
    ) -> Result<ChatMessage, SessionError> {
        self.ensure_connected()?;

        let mut msg = ChatMessage::outgoing(self.config.user_id.clone(), recipient_id, content, options);
        if let Some(key) = self.directory.get_public_key(recipient_id) {
            msg.content = envelope::encrypt(content, key)?;
            if let Some(reply) = &options.reply_to_content {
                msg.reply_to_content = Some(envelope::encrypt(reply, key)?);
            }
            msg.is_encrypted = true;
        } else {
            tracing::warn!(
                target: "mb_session",
                event = "send_plaintext_fallback",
                recipient_id = %recipient_id,
                message_id = %msg.id
            );
        }

        self.invoke(HubInvocation::SendMessage(msg.clone())).await?;
        self.sent_recipients.insert(msg.id.clone(), recipient_id.to_string());

        tracing::info!(
            target: "mb_session",
            event = "send_message_ok",
            recipient_id = %recipient_id,
            message_id = %msg.id,
            encrypted = msg.is_encrypted,
            plaintext_bytes = content.len()
        );
        Ok(msg)
    }

    /// Send an unencrypted message to a room.
    pub async fn send_room_message(
        &mut self,
        room: &RoomRef,
        content: &str,
        options: &SendOptions,
    ) -> Result<ChatMessage, SessionError> {
        self.ensure_connected()?;

        let mut msg = ChatMessage::outgoing(self.config.user_id.clone(), ROOM_RECIPIENT, content, options);
        msg.mosque_id = Some(room.mosque_id.clone());
        msg.chat_room_id = Some(room.chat_room_id.clone());

        self.invoke(HubInvocation::SendMosqueMessage(msg.clone())).await?;
        self.sent_recipients.insert(msg.id.clone(), ROOM_RECIPIENT.to_string());
        tracing::info!(
            target: "mb_session",
            event = "send_room_message_ok",
            mosque_id = %room.mosque_id,
            chat_room_id = %room.chat_room_id,
            message_id = %msg.id
        );
        Ok(msg)
    }

    pub async fn join_room(&mut self, room: &RoomRef) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.invoke(HubInvocation::JoinMosqueChatRoom(room.clone())).await
    }

    pub async fn leave_room(&mut self, room: &RoomRef) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.invoke(HubInvocation::LeaveMosqueChatRoom(room.clone())).await
    }

    /// Re-encrypt `new_content` for the original recipient of `message_id`
    /// and transmit the edit. Only messages sent by this client can be
    /// edited.
    pub async fn edit_message(&mut self, message_id: &str, new_content: &str) -> Result<MessageEdit, SessionError> {
        self.ensure_connected()?;

        let recipient = self
            .sent_recipients
            .get(message_id)
            .ok_or_else(|| SessionError::UnknownMessage(message_id.to_string()))?;

        let edit = match self.directory.get_public_key(recipient) {
            Some(key) => MessageEdit {
                message_id: message_id.to_string(),
                new_content: envelope::encrypt(new_content, key)?,
                is_encrypted: true,
            },
            None => MessageEdit {
                message_id: message_id.to_string(),
                new_content: new_content.to_string(),
                is_encrypted: false,
            },
        };

        self.invoke(HubInvocation::EditMessage(edit.clone())).await?;
        tracing::info!(
            target: "mb_session",
            event = "edit_message_ok",
            message_id = %message_id,
            encrypted = edit.is_encrypted
        );
        Ok(edit)
    }

    /// Transmit a tombstone. Local state changes when the hub echoes it.
    pub async fn delete_message(&mut self, message_id: &str, delete_for: DeleteScope) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let call = HubInvocation::DeleteMessage(MessageDelete {
            message_id: message_id.to_string(),
            delete_for,
        });
        self.invoke(call).await
    }

    /// Transmit a reaction delta tagged with the local identity. Local state
    /// changes when the hub echoes it.
    pub async fn react_to_message(
        &mut self,
        message_id: &str,
        emoji: &str,
        action: ReactionAction,
    ) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let call = HubInvocation::ReactToMessage(MessageReaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            user_id: self.config.user_id.clone(),
            action,
        });
        self.invoke(call).await
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    async fn invoke(&mut self, call: HubInvocation) -> Result<(), SessionError> {
        let method = call.method();
        match self.transport.invoke(call).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(target: "mb_session", event = "invoke_failed", method, error = %e);
                if matches!(e, TransportError::NotStarted | TransportError::Connection(_)) {
                    self.transport_failed(e.to_string());
                }
                Err(e.into())
            }
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    pub fn on_message(&mut self, handler: impl FnMut(&ChatMessage) + Send + 'static) -> SubscriptionId {
        self.message_observers.subscribe(handler)
    }

    pub fn on_message_update(&mut self, handler: impl FnMut(&MessageUpdate) + Send + 'static) -> SubscriptionId {
        self.update_observers.subscribe(handler)
    }

    pub fn on_user_connected(&mut self, handler: impl FnMut(&UserConnection) + Send + 'static) -> SubscriptionId {
        self.connected_observers.subscribe(handler)
    }

    pub fn on_user_disconnected(&mut self, handler: impl FnMut(&String) + Send + 'static) -> SubscriptionId {
        self.disconnected_observers.subscribe(handler)
    }

    pub fn on_room_message(&mut self, handler: impl FnMut(&ChatMessage) + Send + 'static) -> SubscriptionId {
        self.room_observers.subscribe(handler)
    }

    /// Remove a handler registered through any `on_*` method.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.message_observers.unsubscribe(id)
            || self.update_observers.unsubscribe(id)
            || self.connected_observers.unsubscribe(id)
            || self.disconnected_observers.unsubscribe(id)
            || self.room_observers.unsubscribe(id)
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Wait for the next inbound event and handle it. Returns false once the
    /// connection is gone.
    pub async fn next_event(&mut self) -> bool {
        let Some(rx) = self.inbound.as_mut() else {
            return false;
        };
        match rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => {
                self.connection_lost();
                false
            }
        }
    }

    /// Handle every event already delivered, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(rx) = self.inbound.as_mut() else {
                break;
            };
            match rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    self.connection_lost();
                    break;
                }
            }
        }
        handled
    }

    fn connection_lost(&mut self) {
        self.transport_failed("hub closed the inbound stream".to_string());
    }

    /// The connection is unusable: drop the inbound stream and enter `Error`.
    fn transport_failed(&mut self, reason: String) {
        tracing::warn!(
            target: "mb_session",
            event = "connection_lost",
            user_id = %self.config.user_id,
            error = %reason
        );
        self.inbound = None;
        self.state = ConnectionState::Error;
        self.last_error = Some(reason);
    }

    /// Route one hub event to the directory and observers.
    pub fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::ReceiveMessage(msg) if msg.sender_id == SYSTEM_SENDER => {
                self.handle_system_message(&msg);
            }
            HubEvent::UserConnected(user) => {
                if !user.public_key.is_empty() {
                    self.import_peer_key(&user.user_id, &user.public_key, "presence");
                }
                self.connected_observers.emit(&user);
            }
            HubEvent::UserDisconnected(user_id) => {
                self.disconnected_observers.emit(&user_id);
            }
            HubEvent::ReceiveMosqueMessage(msg) => {
                self.room_observers.emit(&msg);
            }
            event if self.private_key.is_none() => self.buffer(event),
            HubEvent::ReceiveMessage(mut msg) => {
                if msg.is_encrypted {
                    if let Some(key) = &self.private_key {
                        msg.content = open(&msg.content, key, &msg.id, "content");
                        msg.reply_to_content = msg
                            .reply_to_content
                            .take()
                            .map(|reply| open(&reply, key, &msg.id, "reply_to_content"));
                    }
                }
                tracing::debug!(
                    target: "mb_session",
                    event = "message_received",
                    sender_id = %msg.sender_id,
                    message_id = %msg.id,
                    encrypted = msg.is_encrypted
                );
                self.message_observers.emit(&msg);
            }
            HubEvent::MessageEdited(mut edit) => {
                if edit.is_encrypted {
                    if let Some(key) = &self.private_key {
                        edit.new_content = open(&edit.new_content, key, &edit.message_id, "new_content");
                    }
                }
                self.update_observers.emit(&MessageUpdate::Edit(edit));
            }
            HubEvent::MessageDeleted(delete) => {
                self.update_observers.emit(&MessageUpdate::Delete(delete));
            }
            HubEvent::MessageReaction(reaction) => {
                self.update_observers.emit(&MessageUpdate::Reaction(reaction));
            }
        }
    }

    fn handle_system_message(&mut self, msg: &ChatMessage) {
        match SystemMessage::decode(&msg.content) {
            Ok(SystemMessage::PublicKey { user_id, public_key }) => {
                if user_id == self.config.user_id {
                    return;
                }
                self.import_peer_key(&user_id, &public_key, "system");
            }
            Err(e) => {
                tracing::debug!(target: "mb_session", event = "system_message_ignored", message_id = %msg.id, error = %e);
            }
        }
    }

    fn import_peer_key(&mut self, peer_id: &str, encoded: &str, source: &'static str) {
        match self.directory.import_announcement(peer_id, encoded) {
            Ok(replaced) => tracing::info!(
                target: "mb_session",
                event = "peer_key_imported",
                peer_id = %peer_id,
                source,
                replaced
            ),
            Err(e) => tracing::warn!(
                target: "mb_session",
                event = "peer_key_rejected",
                peer_id = %peer_id,
                source,
                error = %e
            ),
        }
    }

    fn buffer(&mut self, event: HubEvent) {
        if self.pending.len() >= self.config.max_pending_events {
            if let Some(dropped) = self.pending.pop_front() {
                tracing::warn!(
                    target: "mb_session",
                    event = "pending_overflow",
                    dropped = dropped.name(),
                    max = self.config.max_pending_events
                );
            }
        }
        tracing::debug!(target: "mb_session", event = "event_buffered", kind = event.name());
        self.pending.push_back(event);
    }
}

fn open(ciphertext: &str, key: &PrivateKey, message_id: &str, field: &'static str) -> String {
    match envelope::decrypt(ciphertext, key) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::warn!(
                target: "mb_session",
                event = "decrypt_failed",
                message_id = %message_id,
                field,
                error = %e
            );
            DECRYPT_FAILED_PLACEHOLDER.to_string()
        }
    }
}
