//! In-process hub used by tests and the demo binary.
//!
//! Fan-out rules:
//! - `SendMessage` to a user goes to that user's connections only.
//! - `SendMessage` to `system` is re-broadcast to every other registered
//!   user with `sender_id = "system"`. A key announcement naming anyone but
//!   the caller is rejected.
//! - `EditMessage` goes to the other participant only.
//! - `DeleteMessage` with `everyone` and `ReactToMessage` go to both
//!   participants; `DeleteMessage` with `self` goes back to the caller only.
//! - `SendMosqueMessage` goes to every other member of the room.
//!
//! The caller's identity comes from `Register`, never from the payload.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use mb_proto::hub::RegisterRequest;
use mb_proto::{DeleteScope, HubEvent, HubInvocation, RoomRef, SystemMessage, UserConnection, SYSTEM_SENDER};

use crate::error::TransportError;
use crate::transport::{EventReceiver, HubTransport};

type ConnId = u64;

#[derive(Default)]
struct Connection {
    user_id: Option<String>,
    tx: Option<mpsc::UnboundedSender<HubEvent>>,
}

#[derive(Default)]
struct HubState {
    next_conn: ConnId,
    connections: HashMap<ConnId, Connection>,
    /// message id -> (sender, recipient)
    participants: HashMap<String, (String, String)>,
    rooms: HashMap<RoomRef, HashSet<ConnId>>,
    refuse_connections: bool,
}

impl HubState {
    fn deliver_to_conn(&self, conn: ConnId, event: &HubEvent) {
        if let Some(tx) = self.connections.get(&conn).and_then(|c| c.tx.as_ref()) {
            let _ = tx.send(event.clone());
        }
    }

    fn deliver_to_user(&self, user_id: &str, event: &HubEvent) {
        for c in self.connections.values() {
            if c.user_id.as_deref() == Some(user_id) {
                if let Some(tx) = &c.tx {
                    let _ = tx.send(event.clone());
                }
            }
        }
    }

    fn deliver_to_others(&self, except_user: &str, event: &HubEvent) {
        for c in self.connections.values() {
            match c.user_id.as_deref() {
                Some(uid) if uid != except_user => {
                    if let Some(tx) = &c.tx {
                        let _ = tx.send(event.clone());
                    }
                }
                _ => {}
            }
        }
    }

    /// The user on the other side of `message_id` from `caller`.
    fn counterpart(&self, message_id: &str, caller: &str) -> Option<String> {
        self.participants.get(message_id).map(|(sender, recipient)| {
            if sender == caller { recipient.clone() } else { sender.clone() }
        })
    }
}

/// Shared in-memory hub.  Cheap to clone.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new client-side transport attached to this hub.
    pub fn transport(&self, endpoint: impl Into<String>) -> LoopbackTransport {
        let mut state = self.state.lock();
        state.next_conn += 1;
        let conn = state.next_conn;
        state.connections.insert(conn, Connection::default());
        LoopbackTransport { hub: self.clone(), conn, endpoint: endpoint.into() }
    }

    /// Make every subsequent `start` fail until re-enabled.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Push a raw event to every connection of `user_id`.
    pub fn inject(&self, user_id: &str, event: HubEvent) {
        self.state.lock().deliver_to_user(user_id, &event);
    }

    pub fn registered_users(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut users: Vec<String> = state
            .connections
            .values()
            .filter(|c| c.tx.is_some())
            .filter_map(|c| c.user_id.clone())
            .collect();
        users.sort();
        users.dedup();
        users
    }

    fn route(&self, conn: ConnId, call: HubInvocation) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let method = call.method();

        let started = state.connections.get(&conn).is_some_and(|c| c.tx.is_some());
        if !started {
            return Err(TransportError::NotStarted);
        }

        if let HubInvocation::Register(RegisterRequest { user_id, public_key }) = call {
            if user_id == SYSTEM_SENDER {
                return Err(TransportError::Invoke { method, reason: "reserved user id".into() });
            }
            if let Some(c) = state.connections.get_mut(&conn) {
                c.user_id = Some(user_id.clone());
            }
            tracing::debug!(target: "mb_session::loopback", event = "register", conn, user_id = %user_id);
            let notice = HubEvent::UserConnected(UserConnection {
                user_id: user_id.clone(),
                connection_id: format!("conn-{conn}"),
                public_key: public_key.unwrap_or_default(),
            });
            state.deliver_to_others(&user_id, &notice);
            return Ok(());
        }

        let caller = state
            .connections
            .get(&conn)
            .and_then(|c| c.user_id.clone())
            .ok_or_else(|| TransportError::Invoke { method, reason: "not registered".into() })?;

        match call {
            HubInvocation::Register(_) => {}
            HubInvocation::SendMessage(mut msg) => {
                if msg.recipient_id == SYSTEM_SENDER {
                    if let Ok(SystemMessage::PublicKey { user_id, .. }) = SystemMessage::decode(&msg.content) {
                        if user_id != caller {
                            tracing::warn!(
                                target: "mb_session::loopback",
                                event = "forged_announcement",
                                conn,
                                caller = %caller,
                                claimed = %user_id
                            );
                            return Err(TransportError::Invoke {
                                method,
                                reason: format!("{caller} cannot announce a key for {user_id}"),
                            });
                        }
                    }
                    msg.sender_id = SYSTEM_SENDER.into();
                    state.deliver_to_others(&caller, &HubEvent::ReceiveMessage(msg));
                } else {
                    msg.sender_id = caller.clone();
                    state
                        .participants
                        .insert(msg.id.clone(), (caller.clone(), msg.recipient_id.clone()));
                    let recipient = msg.recipient_id.clone();
                    state.deliver_to_user(&recipient, &HubEvent::ReceiveMessage(msg));
                }
            }
            HubInvocation::SendMosqueMessage(mut msg) => {
                let room = msg.room().ok_or_else(|| TransportError::Invoke {
                    method,
                    reason: "mosque message without room".into(),
                })?;
                msg.sender_id = caller;
                let members: Vec<ConnId> = state
                    .rooms
                    .get(&room)
                    .map(|m| m.iter().copied().filter(|c| *c != conn).collect())
                    .unwrap_or_default();
                let event = HubEvent::ReceiveMosqueMessage(msg);
                for member in members {
                    state.deliver_to_conn(member, &event);
                }
            }
            HubInvocation::EditMessage(edit) => {
                if let Some(other) = state.counterpart(&edit.message_id, &caller) {
                    state.deliver_to_user(&other, &HubEvent::MessageEdited(edit));
                }
            }
            HubInvocation::DeleteMessage(del) => {
                let other = match del.delete_for {
                    DeleteScope::Everyone => state.counterpart(&del.message_id, &caller),
                    DeleteScope::SelfOnly => None,
                };
                let event = HubEvent::MessageDeleted(del);
                state.deliver_to_user(&caller, &event);
                if let Some(other) = other {
                    state.deliver_to_user(&other, &event);
                }
            }
            HubInvocation::ReactToMessage(mut reaction) => {
                reaction.user_id = caller.clone();
                let other = state.counterpart(&reaction.message_id, &caller);
                let event = HubEvent::MessageReaction(reaction);
                state.deliver_to_user(&caller, &event);
                if let Some(other) = other {
                    state.deliver_to_user(&other, &event);
                }
            }
            HubInvocation::JoinMosqueChatRoom(room) => {
                state.rooms.entry(room).or_default().insert(conn);
            }
            HubInvocation::LeaveMosqueChatRoom(room) => {
                if let Some(members) = state.rooms.get_mut(&room) {
                    members.remove(&conn);
                }
            }
        }
        Ok(())
    }
}

/// One client connection to a [`LoopbackHub`].
pub struct LoopbackTransport {
    hub: LoopbackHub,
    conn: ConnId,
    endpoint: String,
}

#[async_trait]
impl HubTransport for LoopbackTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn start(&self) -> Result<EventReceiver, TransportError> {
        let mut state = self.hub.state.lock();
        if state.refuse_connections {
            return Err(TransportError::Connection(format!("{} refused the connection", self.endpoint)));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let c = state.connections.entry(self.conn).or_default();
        c.tx = Some(tx);
        c.user_id = None;
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let mut state = self.hub.state.lock();
        let user = state.connections.get_mut(&self.conn).and_then(|c| {
            c.tx = None;
            c.user_id.take()
        });
        for members in state.rooms.values_mut() {
            members.remove(&self.conn);
        }
        if let Some(user_id) = user {
            state.deliver_to_others(&user_id, &HubEvent::UserDisconnected(user_id.clone()));
        }
        Ok(())
    }

    async fn invoke(&self, call: HubInvocation) -> Result<(), TransportError> {
        self.hub.route(self.conn, call)
    }
}
