//! Real-time hub contract: named inbound events and outbound invocations.
//!
//! Both enums serialise adjacently tagged as `{"target": <name>, "arguments": ..}`
//! so the variant name is the hub method / event name on the wire.

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageDelete, MessageEdit, MessageReaction, RoomRef};

/// Presence notice for another participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConnection {
    pub user_id: String,
    pub connection_id: String,
    /// Base64 SPKI public key; empty when the user registered without one.
    #[serde(default)]
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Events pushed by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", content = "arguments")]
pub enum HubEvent {
    ReceiveMessage(ChatMessage),
    ReceiveMosqueMessage(ChatMessage),
    MessageEdited(MessageEdit),
    MessageDeleted(MessageDelete),
    MessageReaction(MessageReaction),
    UserConnected(UserConnection),
    UserDisconnected(String),
}

impl HubEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "ReceiveMessage",
            Self::ReceiveMosqueMessage(_) => "ReceiveMosqueMessage",
            Self::MessageEdited(_) => "MessageEdited",
            Self::MessageDeleted(_) => "MessageDeleted",
            Self::MessageReaction(_) => "MessageReaction",
            Self::UserConnected(_) => "UserConnected",
            Self::UserDisconnected(_) => "UserDisconnected",
        }
    }
}

/// Calls made on the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", content = "arguments")]
pub enum HubInvocation {
    Register(RegisterRequest),
    SendMessage(ChatMessage),
    SendMosqueMessage(ChatMessage),
    EditMessage(MessageEdit),
    DeleteMessage(MessageDelete),
    ReactToMessage(MessageReaction),
    JoinMosqueChatRoom(RoomRef),
    LeaveMosqueChatRoom(RoomRef),
}

impl HubInvocation {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Register(_) => "Register",
            Self::SendMessage(_) => "SendMessage",
            Self::SendMosqueMessage(_) => "SendMosqueMessage",
            Self::EditMessage(_) => "EditMessage",
            Self::DeleteMessage(_) => "DeleteMessage",
            Self::ReactToMessage(_) => "ReactToMessage",
            Self::JoinMosqueChatRoom(_) => "JoinMosqueChatRoom",
            Self::LeaveMosqueChatRoom(_) => "LeaveMosqueChatRoom",
        }
    }
}
