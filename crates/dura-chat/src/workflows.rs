//! Workflows de chat.
//!
//! Cada escritura vive en su propio step y usa como clave primaria el id
//! estable del step, así que repetir un step cuyo resultado no llegó a
//! registrarse reencuentra la fila ya insertada en lugar de duplicarla.

use std::sync::Arc;

use dura_core::{DurableError, RetryPolicy, StepError, StepOptions, WorkflowContext, WorkflowRegistry};
use log::debug;
use uuid::Uuid;

use crate::model::ChatModel;
use crate::models::{Conversation, Message, NewMessage, Role, SendMessageInput, SendMessageOutput};
use crate::store::ChatStore;

pub const CREATE_CONVERSATION: &str = "create_conversation";
pub const SEND_MESSAGE: &str = "send_message";
pub const DELETE_CONVERSATION: &str = "delete_conversation";

/// Clase de step de las llamadas al modelo; su política se configura en
/// `EngineConfig::with_step_class`.
pub const MODEL_CALL_CLASS: &str = "model_call";

#[derive(Clone)]
pub struct ChatWorkflows {
    store: Arc<dyn ChatStore>,
    model: Arc<dyn ChatModel>,
}

impl ChatWorkflows {
    pub fn new(store: Arc<dyn ChatStore>, model: Arc<dyn ChatModel>) -> Self {
        Self { store, model }
    }

    /// Política por defecto de `model_call`: `max_attempts` intentos con
    /// backoff de 1s a 30s.
    pub fn model_call_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(max_attempts)
                              .with_backoff(std::time::Duration::from_secs(1), 2.0, std::time::Duration::from_secs(30))
    }

    pub fn register(&self, registry: &mut WorkflowRegistry) -> Result<(), DurableError> {
        let wf = self.clone();
        registry.register(CREATE_CONVERSATION, move |ctx, _: ()| wf.create_conversation(ctx))?;
        let wf = self.clone();
        registry.register(SEND_MESSAGE, move |ctx, input: SendMessageInput| wf.send_message(ctx, input))?;
        let wf = self.clone();
        registry.register(DELETE_CONVERSATION, move |ctx, id: Uuid| wf.delete_conversation(ctx, id))?;
        Ok(())
    }

    pub fn create_conversation(&self, ctx: &mut WorkflowContext<'_>) -> Result<Conversation, DurableError> {
        ctx.run_step("insert_conversation", |attempt| Ok(self.store.create_conversation(attempt.stable_id())?))
    }

    pub fn send_message(&self, ctx: &mut WorkflowContext<'_>, input: SendMessageInput) -> Result<SendMessageOutput, DurableError> {
        let history: Vec<Message> = ctx.run_step("load_history", |_| {
                                           if input.content.trim().is_empty() {
                                               return Err(StepError::permanent("message content is empty"));
                                           }
                                           if self.store.get_conversation(input.conversation_id)?.is_none() {
                                               return Err(StepError::permanent(format!("conversation not found: {}",
                                                                                       input.conversation_id)));
                                           }
                                           Ok(self.store.list_messages(input.conversation_id)?)
                                       })?;

        let user_message: Message = ctx.run_step("save_user_message", |attempt| {
                                               Ok(self.store.insert_message(NewMessage { id: attempt.stable_id(),
                                                                                         conversation_id: input.conversation_id,
                                                                                         role: Role::User,
                                                                                         content: input.content.clone() })?)
                                           })?;

        let reply: String = ctx.run_step_with("generate_reply", StepOptions::class(MODEL_CALL_CLASS), |attempt| {
                                   if attempt.is_retry() {
                                       debug!("model call retry #{} for {}", attempt.attempt, attempt.workflow_id);
                                   }
                                   Ok(self.model.complete(&history, &input.content)?)
                               })?;

        let assistant_message: Message = ctx.run_step("save_assistant_message", |attempt| {
                                                    Ok(self.store.insert_message(NewMessage { id: attempt.stable_id(),
                                                                                              conversation_id: input.conversation_id,
                                                                                              role: Role::Assistant,
                                                                                              content: reply.clone() })?)
                                                })?;

        Ok(SendMessageOutput { user_message, assistant_message })
    }

    /// Borra primero los mensajes y después la conversación. Devuelve `false`
    /// si la conversación no existía.
    pub fn delete_conversation(&self, ctx: &mut WorkflowContext<'_>, conversation_id: Uuid) -> Result<bool, DurableError> {
        let removed: usize = ctx.run_step("delete_messages", |_| Ok(self.store.delete_messages(conversation_id)?))?;
        debug!("removed {} message(s) from {}", removed, conversation_id);
        ctx.run_step("delete_conversation", |_| Ok(self.store.delete_conversation(conversation_id)?))
    }
}
