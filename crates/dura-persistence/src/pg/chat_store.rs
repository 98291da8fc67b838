//! `ChatStore` sobre `conversations` y `messages`.

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use dura_chat::{ChatError, ChatStore, Conversation, Message, NewMessage, Role};
use uuid::Uuid;

use super::{run_tx, ConnectionProvider};
use crate::schema::{conversations, messages};

#[derive(Queryable, Debug)]
struct ConversationRow {
    id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Debug)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
struct NewMessageRow<'a> {
    id: Uuid,
    conversation_id: Uuid,
    role: &'a str,
    content: &'a str,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation { id: row.id, created_at: row.created_at }
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role).ok_or_else(|| ChatError::Store(format!("message {} role '{}'", row.id, row.role)))?;
        Ok(Message { id: row.id,
                     conversation_id: row.conversation_id,
                     role,
                     content: row.content,
                     created_at: row.created_at })
    }
}

pub struct PgChatStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgChatStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn tx<T, F>(&self, op: &str, f: F) -> Result<T, ChatError>
        where F: Fn(&mut PgConnection) -> Result<T, DieselError>
    {
        run_tx(&self.provider, op, f).map_err(ChatError::from)
    }
}

impl<P: ConnectionProvider> ChatStore for PgChatStore<P> {
    fn create_conversation(&self, id: Uuid) -> Result<Conversation, ChatError> {
        let row: ConversationRow = self.tx("create_conversation", |tx| {
                                             diesel::insert_into(conversations::table).values(conversations::id.eq(id))
                                                                                      .on_conflict_do_nothing()
                                                                                      .execute(tx)?;
                                             conversations::table.find(id).first(tx)
                                         })?;
        Ok(row.into())
    }

    fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, ChatError> {
        let row: Option<ConversationRow> =
            self.tx("get_conversation", |tx| conversations::table.find(id).first(tx).optional())?;
        Ok(row.map(Conversation::from))
    }

    fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let rows: Vec<ConversationRow> = self.tx("list_conversations", |tx| {
                                                   conversations::table.order((conversations::created_at.desc(),
                                                                               conversations::id.desc()))
                                                                       .load(tx)
                                               })?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    fn insert_message(&self, message: NewMessage) -> Result<Message, ChatError> {
        let row: Option<MessageRow> = self.tx("insert_message", |tx| {
                                                let owner: Option<Uuid> = conversations::table.find(message.conversation_id)
                                                                                              .select(conversations::id)
                                                                                              .first(tx)
                                                                                              .optional()?;
                                                if owner.is_none() {
                                                    return Ok(None);
                                                }
                                                diesel::insert_into(messages::table).values(NewMessageRow { id: message.id,
                                                                                                            conversation_id: message.conversation_id,
                                                                                                            role: message.role.as_str(),
                                                                                                            content: &message.content })
                                                                                    .on_conflict_do_nothing()
                                                                                    .execute(tx)?;
                                                messages::table.find(message.id).first(tx).map(Some)
                                            })?;
        match row {
            Some(r) => Message::try_from(r),
            None => Err(ChatError::ConversationNotFound(message.conversation_id.to_string())),
        }
    }

    fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, ChatError> {
        let rows: Vec<MessageRow> = self.tx("list_messages", |tx| {
                                              messages::table.filter(messages::conversation_id.eq(conversation_id))
                                                             .order((messages::created_at.asc(), messages::id.asc()))
                                                             .load(tx)
                                          })?;
        rows.into_iter().map(Message::try_from).collect()
    }

    fn delete_messages(&self, conversation_id: Uuid) -> Result<usize, ChatError> {
        self.tx("delete_messages", |tx| {
                diesel::delete(messages::table.filter(messages::conversation_id.eq(conversation_id))).execute(tx)
            })
    }

    fn delete_conversation(&self, id: Uuid) -> Result<bool, ChatError> {
        let deleted: Option<usize> = self.tx("delete_conversation", |tx| {
                                               let remaining: i64 = messages::table.filter(messages::conversation_id.eq(id))
                                                                                   .count()
                                                                                   .get_result(tx)?;
                                               if remaining > 0 {
                                                   return Ok(None);
                                               }
                                               diesel::delete(conversations::table.find(id)).execute(tx).map(Some)
                                           })?;
        match deleted {
            Some(n) => Ok(n > 0),
            None => Err(ChatError::Store(format!("conversation {id} still has messages"))),
        }
    }
}
