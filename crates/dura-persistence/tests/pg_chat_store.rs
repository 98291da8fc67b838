
use dura_chat::{ChatError, ChatStore, NewMessage, Role};
use dura_persistence::{PgChatStore, PoolProvider};
use test_support::provider;
use uuid::Uuid;

fn store() -> Option<PgChatStore<PoolProvider>> {
    match provider() {
        Some(p) => Some(PgChatStore::new(p)),
        None => {
            eprintln!("DATABASE_URL not set - skipping PG integration test");
            None
        }
    }
}

fn message(conversation_id: Uuid, role: Role, content: &str) -> NewMessage {
    NewMessage { id: Uuid::new_v4(), conversation_id, role, content: content.into() }
}

#[test]
fn conversation_and_message_inserts_are_idempotent() {
    let Some(store) = store() else { return };
    let id = Uuid::new_v4();
    let conv = store.create_conversation(id).unwrap();
    assert_eq!(store.create_conversation(id).unwrap(), conv);

    let first = message(conv.id, Role::User, "hola");
    let saved = store.insert_message(first.clone()).unwrap();
    let again = store.insert_message(NewMessage { content: "otra cosa".into(), ..first }).unwrap();
    assert_eq!(saved, again);
    assert_eq!(store.list_messages(conv.id).unwrap(), vec![saved]);

    store.delete_messages(conv.id).unwrap();
    store.delete_conversation(conv.id).unwrap();
}

#[test]
fn messages_keep_insertion_order() {
    let Some(store) = store() else { return };
    let conv = store.create_conversation(Uuid::new_v4()).unwrap();
    store.insert_message(message(conv.id, Role::User, "uno")).unwrap();
    store.insert_message(message(conv.id, Role::Assistant, "dos")).unwrap();
    store.insert_message(message(conv.id, Role::User, "tres")).unwrap();

    let contents: Vec<String> = store.list_messages(conv.id).unwrap().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["uno", "dos", "tres"]);
    assert_eq!(store.delete_messages(conv.id).unwrap(), 3);
    assert!(store.delete_conversation(conv.id).unwrap());
}

#[test]
fn message_for_unknown_conversation_is_rejected() {
    let Some(store) = store() else { return };
    let err = store.insert_message(message(Uuid::new_v4(), Role::User, "x")).unwrap_err();
    assert!(matches!(err, ChatError::ConversationNotFound(_)));
}

#[test]
fn conversation_with_messages_is_not_deleted() {
    let Some(store) = store() else { return };
    let conv = store.create_conversation(Uuid::new_v4()).unwrap();
    store.insert_message(message(conv.id, Role::User, "x")).unwrap();

    assert!(matches!(store.delete_conversation(conv.id), Err(ChatError::Store(_))));
    assert!(store.get_conversation(conv.id).unwrap().is_some());

    store.delete_messages(conv.id).unwrap();
    assert!(store.delete_conversation(conv.id).unwrap());
    assert!(!store.delete_conversation(conv.id).unwrap());
}
