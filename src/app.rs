//! Ensamblado de la aplicación: registro de workflows, runtime, recuperación
//! y las operaciones de chat expuestas al exterior.
//!
//! Las escrituras pasan siempre por un workflow durable; las lecturas van
//! directas al `ChatStore`.

use std::sync::Arc;

use dura_chat::{ChatError, ChatModel, ChatStore, ChatWorkflows, Conversation, Message, ModelError, SendMessageInput,
                SendMessageOutput, CREATE_CONVERSATION, DELETE_CONVERSATION, SEND_MESSAGE};
use dura_core::{ConfigError, DurableError, EngineConfig, RecoveryManager, RecoveryReport, RecoverySummary, StepRecord,
                WorkflowExecution, WorkflowRegistry, WorkflowRuntime, WorkflowStore};
use dura_persistence::PersistenceError;
use log::info;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// La operación existe pero no se puede aplicar en el estado actual.
    #[error("rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Durable(DurableError),
}

impl From<DurableError> for AppError {
    fn from(err: DurableError) -> Self {
        match err {
            DurableError::ExecutionNotFound(id) => Self::NotFound(format!("execution {id}")),
            DurableError::ExecutionActive(_)
            | DurableError::ConflictingWorkflow { .. }
            | DurableError::ConflictingInput { .. }
            | DurableError::ShuttingDown => {
                Self::Rejected(err.to_string())
            }
            other => Self::Durable(other),
        }
    }
}

impl AppError {
    /// Código de salida del binario.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Invalid(_) => 3,
            Self::NotFound(_) | Self::Rejected(_) => 4,
            Self::Chat(ChatError::ConversationNotFound(_)) => 4,
            Self::Chat(ChatError::Invalid(_)) => 3,
            _ => 5,
        }
    }
}

/// Ejecución y sus steps, tal como están registrados.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution: WorkflowExecution,
    pub steps: Vec<StepRecord>,
}

pub struct App<S: WorkflowStore + 'static> {
    runtime: WorkflowRuntime<S>,
    chat: Arc<dyn ChatStore>,
}

impl<S: WorkflowStore + 'static> App<S> {
    /// Registra los workflows de chat y lanza el runtime. No recupera nada:
    /// llamar a `recover` antes de aceptar operaciones.
    pub fn new(store: Arc<S>,
               chat: Arc<dyn ChatStore>,
               model: Arc<dyn ChatModel>,
               config: EngineConfig)
               -> Result<Self, AppError> {
        let mut registry = WorkflowRegistry::new();
        ChatWorkflows::new(chat.clone(), model).register(&mut registry)?;
        info!("registered workflows: {:?}", registry.names());
        let runtime = WorkflowRuntime::builder(store).registry(registry).config(config).launch();
        Ok(Self { runtime, chat })
    }

    pub fn runtime(&self) -> &WorkflowRuntime<S> {
        &self.runtime
    }

    /// Retoma las ejecuciones pendientes sin esperarlas.
    pub fn recover(&self) -> Result<RecoveryReport, AppError> {
        Ok(RecoveryManager::new(self.runtime.clone()).recover()?)
    }

    pub fn recover_and_wait(&self) -> Result<RecoverySummary, AppError> {
        Ok(RecoveryManager::new(self.runtime.clone()).recover_and_wait()?)
    }

    pub fn create_conversation(&self, key: Option<String>) -> Result<Conversation, AppError> {
        Ok(self.runtime.start(CREATE_CONVERSATION, &(), key)?.get_result()?)
    }

    pub fn send_message(&self,
                        conversation_id: Uuid,
                        content: &str,
                        key: Option<String>)
                        -> Result<SendMessageOutput, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::Invalid("message content is empty".into()));
        }
        self.require_conversation(conversation_id)?;
        let input = SendMessageInput { conversation_id, content: content.to_string() };
        Ok(self.runtime.start(SEND_MESSAGE, &input, key)?.get_result()?)
    }

    /// `false` si la conversación ya no existía.
    pub fn delete_conversation(&self, conversation_id: Uuid, key: Option<String>) -> Result<bool, AppError> {
        Ok(self.runtime.start(DELETE_CONVERSATION, &conversation_id, key)?.get_result()?)
    }

    pub fn list_conversations(&self) -> Result<Vec<Conversation>, AppError> {
        Ok(self.chat.list_conversations()?)
    }

    pub fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, AppError> {
        self.chat
            .get_conversation(conversation_id)?
            .ok_or_else(|| AppError::NotFound(format!("conversation {conversation_id}")))
    }

    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, AppError> {
        self.require_conversation(conversation_id)?;
        Ok(self.chat.list_messages(conversation_id)?)
    }

    pub fn status(&self, id: &str) -> Result<ExecutionReport, AppError> {
        let execution = self.runtime.get_execution(id)?;
        let steps = self.runtime.list_steps(id)?;
        Ok(ExecutionReport { execution, steps })
    }

    pub fn pending(&self) -> Result<Vec<WorkflowExecution>, AppError> {
        Ok(self.runtime.list_pending()?)
    }

    /// Borra una ejecución terminada y sus steps.
    pub fn forget(&self, id: &str) -> Result<(), AppError> {
        Ok(self.runtime.delete_execution(id)?)
    }

    /// `true` si todas las ejecuciones en curso terminaron a tiempo.
    pub fn shutdown(&self) -> bool {
        self.runtime.shutdown()
    }

    fn require_conversation(&self, conversation_id: Uuid) -> Result<(), AppError> {
        self.get_conversation(conversation_id).map(|_| ())
    }
}
