//! Cliente del modelo de generación de texto.

pub mod anthropic;
pub mod openai;
pub mod scripted;

pub use anthropic::AnthropicModel;
pub use openai::OpenAiCompatModel;
pub use scripted::ScriptedModel;

use std::sync::Arc;

use crate::config::{ModelConfig, ModelProvider};
use crate::error::ModelError;
use crate::models::Message;

pub trait ChatModel: Send + Sync {
    /// Genera la respuesta a `user_message` dado el historial previo de la
    /// conversación (sin incluir `user_message`).
    fn complete(&self, history: &[Message], user_message: &str) -> Result<String, ModelError>;
}

/// Construye el cliente que corresponde a `config.provider`.
pub fn from_config(config: ModelConfig) -> Result<Arc<dyn ChatModel>, ModelError> {
    Ok(match config.provider {
        ModelProvider::OpenAiCompat => Arc::new(OpenAiCompatModel::new(config)?),
        ModelProvider::Anthropic => Arc::new(AnthropicModel::new(config)?),
    })
}
