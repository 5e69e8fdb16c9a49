//! Chat message record and lifecycle deltas.
//!
//! `content` holds ciphertext on the wire when `is_encrypted` is set and
//! plaintext once the session client has decrypted it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// emoji -> user ids that applied it, in the order they reacted.
pub type Reactions = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Client-generated at send time.
    pub id: String,
    pub sender_id: String,
    /// Peer user id, or a reserved group recipient such as `"mosque"`.
    pub recipient_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// True only if the recipient's public key was known at send time.
    pub is_encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Encrypted independently of `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_content: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    /// Tombstone marker.
    #[serde(default)]
    pub deleted_for: Option<DeleteScope>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_url: Option<String>,
    #[serde(default)]
    pub reactions: Reactions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mosque_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_room_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
}

impl ChatMessage {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Fresh outgoing record: new id, current time, no reactions, clear text.
    pub fn outgoing(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
        options: &SendOptions,
    ) -> Self {
        Self {
            id: Self::new_id(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            is_encrypted: false,
            reply_to_id: options.reply_to_id.clone(),
            reply_to_content: options.reply_to_content.clone(),
            is_edited: false,
            deleted_for: None,
            kind: options.kind,
            sticker_url: options.sticker_url.clone(),
            reactions: Reactions::new(),
            mosque_id: None,
            chat_room_id: None,
            is_read: false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_for.is_some()
    }

    pub fn room(&self) -> Option<RoomRef> {
        match (&self.mosque_id, &self.chat_room_id) {
            (Some(mosque_id), Some(chat_room_id)) => Some(RoomRef {
                mosque_id: mosque_id.clone(),
                chat_room_id: chat_room_id.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteScope {
    /// Hidden from the deleting user's view only.
    #[serde(rename = "self")]
    SelfOnly,
    /// Removed from every participant's view.
    #[serde(rename = "everyone")]
    Everyone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    /// Carries `sticker_url`; `content` is empty.
    Sticker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Add,
    Remove,
}

/// Optional parts of an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reply_to_id: Option<String>,
    pub reply_to_content: Option<String>,
    pub kind: MessageKind,
    pub sticker_url: Option<String>,
}

impl SendOptions {
    pub fn reply_to(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            reply_to_id: Some(id.into()),
            reply_to_content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn sticker(url: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Sticker,
            sticker_url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// A community chat room inside a mosque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub mosque_id: String,
    pub chat_room_id: String,
}

// ── Lifecycle deltas ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdit {
    pub message_id: String,
    pub new_content: String,
    /// Whether `new_content` is ciphertext for the receiving participant.
    #[serde(default)]
    pub is_encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelete {
    pub message_id: String,
    pub delete_for: DeleteScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReaction {
    pub message_id: String,
    pub emoji: String,
    pub user_id: String,
    pub action: ReactionAction,
}

/// Decrypted update handed to observers and the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MessageUpdate {
    Edit(MessageEdit),
    Delete(MessageDelete),
    Reaction(MessageReaction),
}

impl MessageUpdate {
    pub fn message_id(&self) -> &str {
        match self {
            Self::Edit(e) => &e.message_id,
            Self::Delete(d) => &d.message_id,
            Self::Reaction(r) => &r.message_id,
        }
    }
}
