//! Almacenamiento de conversaciones y mensajes.
//!
//! Las inserciones son idempotentes por id: insertar dos veces el mismo
//! mensaje devuelve la fila original. Los workflows dependen de ello para
//! poder repetir un step de escritura sin duplicar datos.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{Conversation, Message, NewMessage};

pub trait ChatStore: Send + Sync {
    /// Crea la conversación o devuelve la existente con ese id.
    fn create_conversation(&self, id: Uuid) -> Result<Conversation, ChatError>;
    fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, ChatError>;
    /// Más recientes primero.
    fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError>;
    fn insert_message(&self, message: NewMessage) -> Result<Message, ChatError>;
    /// Más antiguos primero.
    fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, ChatError>;
    /// Devuelve cuántos mensajes se borraron.
    fn delete_messages(&self, conversation_id: Uuid) -> Result<usize, ChatError>;
    fn delete_conversation(&self, id: Uuid) -> Result<bool, ChatError>;
}

#[derive(Default)]
struct Tables {
    conversations: IndexMap<Uuid, Conversation>,
    messages: IndexMap<Uuid, Message>,
}

#[derive(Default)]
pub struct InMemoryChatStore {
    tables: Mutex<Tables>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, ChatError> {
        self.tables.lock().map_err(|_| ChatError::Store("in-memory chat store lock poisoned".into()))
    }

    pub fn message_count(&self) -> usize {
        self.tables.lock().map(|t| t.messages.len()).unwrap_or(0)
    }
}

impl ChatStore for InMemoryChatStore {
    fn create_conversation(&self, id: Uuid) -> Result<Conversation, ChatError> {
        let mut t = self.lock()?;
        let conv = t.conversations.entry(id).or_insert_with(|| Conversation { id, created_at: Utc::now() });
        Ok(conv.clone())
    }

    fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, ChatError> {
        Ok(self.lock()?.conversations.get(&id).cloned())
    }

    fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let t = self.lock()?;
        let mut out: Vec<Conversation> = t.conversations.values().cloned().collect();
        out.reverse();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn insert_message(&self, message: NewMessage) -> Result<Message, ChatError> {
        let mut t = self.lock()?;
        if !t.conversations.contains_key(&message.conversation_id) {
            return Err(ChatError::ConversationNotFound(message.conversation_id.to_string()));
        }
        let row = t.messages.entry(message.id).or_insert_with(|| Message { id: message.id,
                                                                            conversation_id: message.conversation_id,
                                                                            role: message.role,
                                                                            content: message.content,
                                                                            created_at: Utc::now() });
        Ok(row.clone())
    }

    fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, ChatError> {
        let t = self.lock()?;
        Ok(t.messages.values().filter(|m| m.conversation_id == conversation_id).cloned().collect())
    }

    fn delete_messages(&self, conversation_id: Uuid) -> Result<usize, ChatError> {
        let mut t = self.lock()?;
        let before = t.messages.len();
        t.messages.retain(|_, m| m.conversation_id != conversation_id);
        Ok(before - t.messages.len())
    }

    fn delete_conversation(&self, id: Uuid) -> Result<bool, ChatError> {
        let mut t = self.lock()?;
        if t.messages.values().any(|m| m.conversation_id == id) {
            return Err(ChatError::Store(format!("conversation {id} still has messages")));
        }
        Ok(t.conversations.shift_remove(&id).is_some())
    }
}
