//! mb_proto: Wire types for Minber secure chat
//!
//! Everything here is serialised as camelCase JSON, matching the real-time
//! hub contract.
//!
//! # Modules
//! - `message`: the chat message record and its lifecycle deltas
//! - `hub`:     named inbound events and outbound invocations
//! - `system`:  tagged payloads carried on the reserved `system` channel

pub mod hub;
pub mod message;
pub mod system;

pub use hub::{HubEvent, HubInvocation, RegisterRequest, UserConnection};
pub use message::{
    ChatMessage, DeleteScope, MessageDelete, MessageEdit, MessageKind, MessageReaction,
    MessageUpdate, ReactionAction, Reactions, RoomRef, SendOptions,
};
pub use system::{SystemMessage, SYSTEM_SENDER};
