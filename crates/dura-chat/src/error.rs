//! Errores del dominio de chat y del cliente del modelo.
//!
//! Ambos se convierten en `StepError` dentro de los workflows: la
//! clasificación transitorio/permanente decide si el step se reintenta.

use dura_core::StepError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    /// Almacenamiento no disponible (reintentable).
    #[error("chat store unavailable: {0}")]
    Unavailable(String),
    #[error("chat store error: {0}")]
    Store(String),
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<ChatError> for StepError {
    fn from(err: ChatError) -> Self {
        if err.is_transient() {
            StepError::Transient(err.to_string())
        } else {
            StepError::Permanent(err.to_string())
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("empty response from model")]
    Empty,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ModelError {
    /// Red, timeouts, 429 y 5xx se reintentan; el resto no.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<ModelError> for StepError {
    fn from(err: ModelError) -> Self {
        if err.is_transient() {
            StepError::Transient(err.to_string())
        } else {
            StepError::Permanent(err.to_string())
        }
    }
}
