//! Two and three party conversations over the in-process hub.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use mb_crypto::{envelope, IdentityKeyPair};
use mb_proto::{
    ChatMessage, DeleteScope, HubEvent, MessageKind, ReactionAction, RoomRef, SendOptions, SystemMessage,
    SYSTEM_SENDER,
};
use mb_session::chat::{NOT_CONNECTED, CONNECT_FAILED};
use mb_session::{
    KeyStore, LoopbackHub, LoopbackTransport, MessageStore, SecureChat, SecureSessionClient,
    SessionConfig, DECRYPT_FAILED_PLACEHOLDER,
};

static KEYS: OnceLock<[IdentityKeyPair; 3]> = OnceLock::new();

fn keys() -> &'static [IdentityKeyPair; 3] {
    KEYS.get_or_init(|| {
        [
            IdentityKeyPair::generate().unwrap(),
            IdentityKeyPair::generate().unwrap(),
            IdentityKeyPair::generate().unwrap(),
        ]
    })
}

fn key_a() -> &'static IdentityKeyPair {
    &keys()[0]
}

fn key_b() -> &'static IdentityKeyPair {
    &keys()[1]
}

fn key_m() -> &'static IdentityKeyPair {
    &keys()[2]
}

struct Party {
    client: SecureSessionClient<LoopbackTransport>,
    store: Arc<Mutex<MessageStore>>,
}

impl Party {
    fn new(hub: &LoopbackHub, user: &str) -> Self {
        let mut client = SecureSessionClient::new(SessionConfig::new(user), hub.transport("loopback://e2e"));
        let store = Arc::new(Mutex::new(MessageStore::new()));
        let sink = Arc::clone(&store);
        client.on_message(move |m| sink.lock().apply_new_message(m.clone()));
        let sink = Arc::clone(&store);
        client.on_message_update(move |u| {
            sink.lock().apply_update(u);
        });
        Self { client, store }
    }

    async fn online(hub: &LoopbackHub, user: &str, key: &IdentityKeyPair) -> Self {
        let mut party = Self::new(hub, user);
        party.client.set_private_key(key.private_key().clone());
        party.client.connect().await.unwrap();
        party
    }

    fn pump(&mut self) -> usize {
        self.client.process_pending()
    }

    fn message(&self, id: &str) -> ChatMessage {
        self.store.lock().get(id).cloned().unwrap()
    }
}

/// Both parties online and holding each other's keys.
async fn paired(hub: &LoopbackHub) -> (Party, Party) {
    let mut a = Party::online(hub, "alice", key_a()).await;
    let mut b = Party::online(hub, "bob", key_b()).await;
    // alice learns bob's key from the presence notice, bob learns alice's from the announcement
    a.pump();
    a.client.announce_public_key().await.unwrap();
    b.pump();
    assert!(a.client.directory().contains("bob"));
    assert!(b.client.directory().contains("alice"));
    (a, b)
}

#[tokio::test]
async fn encrypted_message_is_readable_only_by_recipient() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;

    let sent = b.client.send_message("alice", "hello", &SendOptions::default()).await.unwrap();
    assert!(sent.is_encrypted);
    assert_ne!(sent.content, "hello");
    assert!(envelope::decrypt(&sent.content, key_m().private_key()).is_err());

    assert_eq!(a.pump(), 1);
    let received = a.message(&sent.id);
    assert_eq!(received.content, "hello");
    assert_eq!(received.sender_id, "bob");
    assert!(received.is_encrypted);
}

#[tokio::test]
async fn reply_excerpt_is_decrypted_independently() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;

    let first = a.client.send_message("bob", "are you coming?", &SendOptions::default()).await.unwrap();
    b.pump();
    let options = SendOptions::reply_to(first.id.clone(), "are you coming?");
    let reply = b.client.send_message("alice", "yes, after Asr", &options).await.unwrap();
    a.pump();

    let got = a.message(&reply.id);
    assert_eq!(got.content, "yes, after Asr");
    assert_eq!(got.reply_to_id.as_deref(), Some(first.id.as_str()));
    assert_eq!(got.reply_to_content.as_deref(), Some("are you coming?"));
}

#[tokio::test]
async fn sticker_keeps_url_and_encrypts_empty_content() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;

    let options = SendOptions::sticker("https://cdn.minber.app/stickers/eid.png");
    let sent = b.client.send_message("alice", "", &options).await.unwrap();
    assert!(sent.is_encrypted);
    assert!(!sent.content.is_empty());
    assert_eq!(envelope::decrypt(&sent.content, key_a().private_key()).unwrap(), "");
    assert_eq!(sent.kind, MessageKind::Sticker);
    assert_eq!(sent.sticker_url.as_deref(), Some("https://cdn.minber.app/stickers/eid.png"));

    assert_eq!(a.pump(), 1);
    let got = a.message(&sent.id);
    assert_eq!(got.content, "");
    assert_eq!(got.kind, MessageKind::Sticker);
    assert_eq!(got.sticker_url.as_deref(), Some("https://cdn.minber.app/stickers/eid.png"));
}

#[tokio::test]
async fn announcement_for_someone_else_is_refused() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;
    let mut carol = Party::online(&hub, "carol", key_m()).await;
    a.pump();

    let forged = SystemMessage::PublicKey { user_id: "bob".into(), public_key: key_m().public_b64().unwrap() }
        .encode()
        .unwrap();
    assert!(carol.client.send_message(SYSTEM_SENDER, &forged, &SendOptions::default()).await.is_err());
    assert!(carol.client.is_connected());

    assert_eq!(a.pump(), 0);
    assert_eq!(a.client.directory().get_public_key("bob"), Some(&key_b().public));

    let sent = a.client.send_message("bob", "secret for bob", &SendOptions::default()).await.unwrap();
    assert!(envelope::decrypt(&sent.content, key_m().private_key()).is_err());
    b.pump();
    assert_eq!(b.message(&sent.id).content, "secret for bob");
    assert_eq!(carol.pump(), 0);
}

#[tokio::test]
async fn unknown_peer_gets_plaintext() {
    let hub = LoopbackHub::new();
    let mut a = Party::new(&hub, "alice");
    a.client.connect().await.unwrap();
    let mut b = Party::online(&hub, "bob", key_b()).await;

    // bob's presence notice carried a key; alice has none to announce
    a.pump();
    let sent = b.client.send_message("alice", "in the clear", &SendOptions::default()).await.unwrap();
    assert!(!sent.is_encrypted);
    assert_eq!(sent.content, "in the clear");

    a.client.set_private_key(key_a().private_key().clone());
    a.pump();
    let got = a.message(&sent.id);
    assert!(!got.is_encrypted);
    assert_eq!(got.content, "in the clear");
}

#[tokio::test]
async fn undecryptable_message_is_kept_with_placeholder() {
    let hub = LoopbackHub::new();
    let mut a = Party::online(&hub, "alice", key_a()).await;

    let mut forged = ChatMessage::outgoing("bob", "alice", "", &SendOptions::default());
    forged.content = envelope::encrypt("meant for someone else", &key_m().public).unwrap();
    forged.is_encrypted = true;
    let id = forged.id.clone();
    hub.inject("alice", HubEvent::ReceiveMessage(forged));

    assert_eq!(a.pump(), 1);
    assert_eq!(a.store.lock().len(), 1);
    assert_eq!(a.message(&id).content, DECRYPT_FAILED_PLACEHOLDER);
    assert!(a.client.is_connected());
}

#[tokio::test]
async fn events_before_key_binding_are_replayed_in_order() {
    let hub = LoopbackHub::new();
    let mut a = Party::new(&hub, "alice");
    a.client.connect().await.unwrap();
    let mut b = Party::online(&hub, "bob", key_b()).await;
    b.client.add_peer_public_key("alice", key_a().public.clone());

    let m1 = b.client.send_message("alice", "first", &SendOptions::default()).await.unwrap();
    let m2 = b.client.send_message("alice", "second", &SendOptions::default()).await.unwrap();
    b.client.react_to_message(&m1.id, "🤲", ReactionAction::Add).await.unwrap();

    a.pump();
    assert_eq!(a.client.pending_len(), 3);
    assert!(a.store.lock().is_empty());

    assert_eq!(a.client.set_private_key(key_a().private_key().clone()), 3);
    let store = a.store.lock();
    let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
    assert_eq!(store.get(&m1.id).unwrap().reactions["🤲"], vec!["bob"]);
    assert!(store.get(&m2.id).unwrap().reactions.is_empty());
}

#[tokio::test]
async fn edit_reaches_the_original_recipient() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;
    let mut carol = Party::online(&hub, "carol", key_m()).await;
    b.pump();

    let sent = b.client.send_message("alice", "see you at 5", &SendOptions::default()).await.unwrap();
    a.pump();
    let edit = b.client.edit_message(&sent.id, "see you at 6").await.unwrap();
    assert!(edit.is_encrypted);

    a.pump();
    let got = a.message(&sent.id);
    assert_eq!(got.content, "see you at 6");
    assert!(got.is_edited);

    carol.pump();
    assert!(carol.store.lock().is_empty());
}

#[tokio::test]
async fn delete_for_everyone_tombstones_both_views() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;

    let m1 = a.client.send_message("bob", "oops", &SendOptions::default()).await.unwrap();
    a.store.lock().apply_new_message(m1.clone());
    b.pump();
    assert_eq!(b.message(&m1.id).deleted_for, None);

    a.client.delete_message(&m1.id, DeleteScope::Everyone).await.unwrap();
    a.pump();
    b.pump();
    assert_eq!(a.message(&m1.id).deleted_for, Some(DeleteScope::Everyone));
    assert_eq!(b.message(&m1.id).deleted_for, Some(DeleteScope::Everyone));
    assert_eq!(b.store.lock().visible().count(), 0);
}

#[tokio::test]
async fn delete_for_self_only_touches_the_caller() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;

    let m1 = a.client.send_message("bob", "hello", &SendOptions::default()).await.unwrap();
    b.pump();
    b.client.delete_message(&m1.id, DeleteScope::SelfOnly).await.unwrap();
    b.pump();
    assert_eq!(a.pump(), 0);
    assert_eq!(b.message(&m1.id).deleted_for, Some(DeleteScope::SelfOnly));
}

#[tokio::test]
async fn reactions_flow_through_the_echo() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;

    let m1 = b.client.send_message("alice", "Jumu'ah mubarak", &SendOptions::default()).await.unwrap();
    b.store.lock().apply_new_message(m1.clone());
    a.pump();

    a.client.react_to_message(&m1.id, "❤️", ReactionAction::Add).await.unwrap();
    a.client.react_to_message(&m1.id, "❤️", ReactionAction::Add).await.unwrap();
    b.client.react_to_message(&m1.id, "❤️", ReactionAction::Add).await.unwrap();
    a.pump();
    b.pump();
    assert_eq!(a.message(&m1.id).reactions["❤️"], vec!["alice", "bob"]);
    assert_eq!(b.message(&m1.id).reactions["❤️"], vec!["alice", "bob"]);

    a.client.react_to_message(&m1.id, "❤️", ReactionAction::Remove).await.unwrap();
    b.client.react_to_message(&m1.id, "❤️", ReactionAction::Remove).await.unwrap();
    a.pump();
    b.pump();
    assert!(a.message(&m1.id).reactions.is_empty());
    assert!(b.message(&m1.id).reactions.is_empty());
}

#[tokio::test]
async fn room_messages_reach_members_only() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;
    let mut carol = Party::online(&hub, "carol", key_m()).await;
    let room = RoomRef { mosque_id: "masjid-1".into(), chat_room_id: "general".into() };

    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&heard);
    b.client.on_room_message(move |m| sink.lock().push(m.clone()));
    let carol_heard = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&carol_heard);
    carol.client.on_room_message(move |_| *sink.lock() += 1);

    a.client.join_room(&room).await.unwrap();
    b.client.join_room(&room).await.unwrap();
    let sent = a.client.send_room_message(&room, "khutbah starts 1:15", &SendOptions::default()).await.unwrap();
    assert!(!sent.is_encrypted);
    assert_eq!(sent.recipient_id, "mosque");

    b.pump();
    carol.pump();
    a.pump();
    {
        let heard = heard.lock();
        assert_eq!(heard.len(), 1);
        assert_eq!(heard[0].content, "khutbah starts 1:15");
        assert_eq!(heard[0].room(), Some(room.clone()));
    }
    assert_eq!(*carol_heard.lock(), 0);
    assert!(a.store.lock().is_empty());

    b.client.leave_room(&room).await.unwrap();
    a.client.send_room_message(&room, "second", &SendOptions::default()).await.unwrap();
    b.pump();
    assert_eq!(heard.lock().len(), 1);
}

#[tokio::test]
async fn disconnect_is_announced_and_blocks_sends() {
    let hub = LoopbackHub::new();
    let (mut a, mut b) = paired(&hub).await;
    let gone = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&gone);
    a.client.on_user_disconnected(move |id| sink.lock().push(id.clone()));

    b.client.disconnect().await;
    a.pump();
    assert_eq!(*gone.lock(), vec!["bob"]);
    assert!(b.client.send_message("alice", "hi", &SendOptions::default()).await.is_err());
}

// ── Facade ───────────────────────────────────────────────────────────────────

fn chat(hub: &LoopbackHub, dir: &std::path::Path, me: &str, peer: &str, key: &IdentityKeyPair) -> SecureChat<LoopbackTransport> {
    KeyStore::new(dir).save(me, key.private_key()).unwrap();
    let mut config = SessionConfig::new(me);
    config.key_store_dir = Some(dir.to_path_buf());
    SecureChat::new(config, hub.transport("loopback://e2e"), peer)
}

#[tokio::test]
async fn facade_conversation() {
    let hub = LoopbackHub::new();
    let tmp = tempfile::tempdir().unwrap();
    let mut a = chat(&hub, tmp.path(), "alice", "bob", key_a());
    let mut b = chat(&hub, tmp.path(), "bob", "alice", key_b());

    assert!(a.start().await);
    assert!(b.start().await);
    a.process_pending();
    assert!(a.is_secure());
    // bob joined after alice announced
    a.client_mut().announce_public_key().await.unwrap();
    b.process_pending();
    assert!(b.is_secure());

    let id = a.send_message("salaam bob", &SendOptions::default()).await.unwrap();
    assert_eq!(a.messages()[0].content, "salaam bob");
    b.process_pending();
    assert_eq!(b.messages()[0].content, "salaam bob");

    assert!(a.edit_message(&id, "salaam alaykum bob").await);
    assert_eq!(a.messages()[0].content, "salaam alaykum bob");
    b.process_pending();
    assert_eq!(b.messages()[0].content, "salaam alaykum bob");
    assert!(b.messages()[0].is_edited);

    assert!(b.react_to_message(&id, "👍", ReactionAction::Add).await);
    a.process_pending();
    b.process_pending();
    assert_eq!(a.messages()[0].reactions["👍"], vec!["bob"]);
    assert_eq!(b.messages()[0].reactions["👍"], vec!["bob"]);

    assert!(a.delete_message(&id, DeleteScope::Everyone).await);
    a.process_pending();
    b.process_pending();
    assert!(a.visible_messages().is_empty());
    assert!(b.visible_messages().is_empty());
    assert_eq!(b.messages().len(), 1);

    a.stop().await;
    assert!(!a.is_connected());
    assert_eq!(a.send_message("anyone?", &SendOptions::default()).await, None);
    assert_eq!(a.error(), Some(NOT_CONNECTED));
}

#[tokio::test]
async fn facade_ignores_other_conversations() {
    let hub = LoopbackHub::new();
    let tmp = tempfile::tempdir().unwrap();
    let mut a = chat(&hub, tmp.path(), "alice", "bob", key_a());
    assert!(a.start().await);
    let mut carol = Party::online(&hub, "carol", key_m()).await;

    carol.client.send_message("alice", "not bob", &SendOptions::default()).await.unwrap();
    a.process_pending();
    assert!(a.messages().is_empty());
}

#[tokio::test]
async fn facade_connect_failure_is_reported() {
    let hub = LoopbackHub::new();
    hub.refuse_connections(true);
    let tmp = tempfile::tempdir().unwrap();
    let mut a = chat(&hub, tmp.path(), "alice", "bob", key_a());

    assert!(!a.start().await);
    assert_eq!(a.error(), Some(CONNECT_FAILED));
}
