//! Message store reducer
//!
//! Ordered by arrival, never re-sorted by timestamp. Every mutation
//! tolerates an unknown message id (it is a no-op), because lifecycle
//! events may overtake the message they refer to.
//!
//! Invariant: no reaction entry is ever an empty list, and no user id
//! appears twice under the same emoji.

use mb_proto::{ChatMessage, DeleteScope, MessageUpdate, ReactionAction};

#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_new_message(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
    }

    /// Returns false if `message_id` is unknown.
    pub fn apply_edit(&mut self, message_id: &str, new_content: &str) -> bool {
        match self.get_mut(message_id) {
            Some(msg) => {
                msg.content = new_content.to_string();
                msg.is_edited = true;
                true
            }
            None => false,
        }
    }

    /// Returns false if `message_id` is unknown.
    pub fn apply_delete(&mut self, message_id: &str, delete_for: DeleteScope) -> bool {
        match self.get_mut(message_id) {
            Some(msg) => {
                msg.deleted_for = Some(delete_for);
                true
            }
            None => false,
        }
    }

    /// Returns true if the reactions of `message_id` changed.
    pub fn apply_reaction(&mut self, message_id: &str, emoji: &str, user_id: &str, action: ReactionAction) -> bool {
        let Some(msg) = self.get_mut(message_id) else {
            return false;
        };
        match action {
            ReactionAction::Add => {
                let users = msg.reactions.entry(emoji.to_string()).or_default();
                if users.iter().any(|u| u == user_id) {
                    return false;
                }
                users.push(user_id.to_string());
                true
            }
            ReactionAction::Remove => {
                let Some(users) = msg.reactions.get_mut(emoji) else {
                    return false;
                };
                let before = users.len();
                users.retain(|u| u != user_id);
                let changed = users.len() != before;
                if users.is_empty() {
                    msg.reactions.remove(emoji);
                }
                changed
            }
        }
    }

    pub fn apply_update(&mut self, update: &MessageUpdate) -> bool {
        match update {
            MessageUpdate::Edit(e) => self.apply_edit(&e.message_id, &e.new_content),
            MessageUpdate::Delete(d) => self.apply_delete(&d.message_id, d.delete_for),
            MessageUpdate::Reaction(r) => self.apply_reaction(&r.message_id, &r.emoji, &r.user_id, r.action),
        }
    }

    /// All messages in arrival order, tombstones included.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Messages a viewer should see: tombstoned ones are left out.
    pub fn visible(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| !m.is_deleted())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn get_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }
}
