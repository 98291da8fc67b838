//! Errores del motor durable.
//!
//! Tres niveles:
//! - `StepError`: lo que devuelve el cuerpo de un step (transitorio o
//!   permanente). Nunca sale del `StepRunner` tal cual.
//! - `StoreError`: fallos del almacenamiento (`WorkflowStore`).
//! - `DurableError`: taxonomía visible para workflows y llamadores.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallo producido por el cuerpo de un step.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StepError {
    /// Reintentable (red, IO, timeouts, 5xx...).
    #[error("transient: {0}")]
    Transient(String),
    /// No reintentable (input inválido, recurso inexistente...).
    #[error("permanent: {0}")]
    Permanent(String),
}

impl StepError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_transient() { ErrorClass::Transient } else { ErrorClass::Permanent }
    }
}

/// Errores del backend de persistencia, neutrales respecto al motor concreto.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store conflict: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store error: {0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum DurableError {
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),
    #[error("workflow already registered: {0}")]
    DuplicateWorkflow(String),
    #[error("execution {id} belongs to workflow '{existing}', not '{requested}'")]
    ConflictingWorkflow { id: String, existing: String, requested: String },
    /// Se reutilizó un id con un input distinto del registrado.
    #[error("execution {id} was started with a different input")]
    ConflictingInput { id: String },
    #[error("step {step_number} ({step_name}) failed after {attempts} attempts: {detail}")]
    StepTransientFailure { step_number: i32, step_name: String, attempts: i32, detail: String },
    #[error("step {step_number} ({step_name}) failed permanently: {detail}")]
    StepPermanentFailure { step_number: i32, step_name: String, detail: String },
    #[error("non-deterministic replay at step {step_number}: recorded '{recorded}', found '{found}'")]
    NonDeterministic { step_number: i32, recorded: String, found: String },
    #[error("execution {id} failed: {detail}")]
    ExecutionFailed { id: String, detail: String },
    #[error("persistence failure: {0}")]
    PersistenceFailure(StoreError),
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),
    #[error("execution still active: {0}")]
    ExecutionActive(String),
    #[error("serialization: {0}")]
    Serialization(String),
    /// Error de negocio devuelto por la función del workflow.
    #[error("{0}")]
    Workflow(String),
    #[error("timed out waiting for execution {0}")]
    ResultTimeout(String),
    #[error("runtime is shutting down")]
    ShuttingDown,
}

impl DurableError {
    pub fn workflow(msg: impl Into<String>) -> Self {
        Self::Workflow(msg.into())
    }

    /// `true` si el error proviene del almacenamiento (la ejecución queda
    /// recuperable y no debe finalizarse).
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }
}

impl From<StoreError> for DurableError {
    fn from(err: StoreError) -> Self {
        Self::PersistenceFailure(err)
    }
}

impl From<serde_json::Error> for DurableError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Clasificación gruesa de errores para logging y persistencia
/// (`workflow_steps.error_class`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Runtime,
    Validation,
    Transient,
    Permanent,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "runtime" => Some(Self::Runtime),
            "validation" => Some(Self::Validation),
            "transient" => Some(Self::Transient),
            "permanent" => Some(Self::Permanent),
            _ => None,
        }
    }
}

pub fn classify_error(err: &DurableError) -> ErrorClass {
    match err {
        DurableError::StepTransientFailure { .. } | DurableError::PersistenceFailure(_) | DurableError::ResultTimeout(_) => {
            ErrorClass::Transient
        }
        DurableError::StepPermanentFailure { .. } | DurableError::ExecutionFailed { .. } | DurableError::NonDeterministic { .. } => {
            ErrorClass::Permanent
        }
        DurableError::UnknownWorkflow(_)
        | DurableError::DuplicateWorkflow(_)
        | DurableError::ConflictingWorkflow { .. }
        | DurableError::ConflictingInput { .. }
        | DurableError::ExecutionNotFound(_)
        | DurableError::Serialization(_) => ErrorClass::Validation,
        DurableError::ExecutionActive(_) | DurableError::Workflow(_) | DurableError::ShuttingDown => ErrorClass::Runtime,
    }
}
