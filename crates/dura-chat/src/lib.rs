//! dura-chat: conversaciones y mensajes sobre el motor durable.
//!
//! Las tres operaciones que modifican datos (`create_conversation`,
//! `send_message`, `delete_conversation`) son workflows registrados en un
//! `WorkflowRegistry`; las lecturas van directas al `ChatStore`.
//!
//! Módulos:
//! - `models`: conversación, mensaje, entradas/salidas de los workflows.
//! - `store`: trait `ChatStore` y backend en memoria.
//! - `model`: clientes del modelo de texto (`ChatModel`): OpenAI compatible
//!   y Anthropic.
//! - `workflows`: funciones de workflow y su registro.

pub mod config;
pub mod error;
pub mod model;
pub mod models;
pub mod store;
pub mod workflows;

pub use config::{ModelConfig, ModelProvider};
pub use error::{ChatError, ModelError};
pub use model::{from_config as model_from_config, AnthropicModel, ChatModel, OpenAiCompatModel, ScriptedModel};
pub use models::{Conversation, Message, NewMessage, Role, SendMessageInput, SendMessageOutput};
pub use store::{ChatStore, InMemoryChatStore};
pub use workflows::{ChatWorkflows, CREATE_CONVERSATION, DELETE_CONVERSATION, MODEL_CALL_CLASS, SEND_MESSAGE};
