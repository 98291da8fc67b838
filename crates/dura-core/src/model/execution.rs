//! Fila `WorkflowExecution` y su máquina de estados.
//!
//! Transiciones válidas (monótonas, nunca se revierten):
//! - `Pending` -> `Running`
//! - `Running` -> `Running` (re-claim del mismo executor o con lease vencido)
//! - `Pending | Running` -> `Success | Error`
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing::hash_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl ExecutionStatus {
    /// Representación estable usada en la columna `status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) | (Self::Running, Self::Running) => true,
            (Self::Pending | Self::Running, Self::Success | Self::Error) => true,
            _ => false,
        }
    }

    /// Estados que la recuperación debe retomar.
    pub fn non_terminal() -> [ExecutionStatus; 2] {
        [Self::Pending, Self::Running]
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ejecución durable de un workflow. Única por `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_name: String,
    pub input: Value,
    pub status: ExecutionStatus,
    pub output: Option<Value>,
    pub error_detail: Option<String>,
    /// Veces que el runtime reclamó la ejecución para conducirla (incluye el
    /// primer start).
    pub recovery_attempts: i32,
    /// Executor que la reclamó por última vez. `updated_at` hace de latido.
    pub executor_id: Option<String>,
    /// Huella blake3 del JSON canónico de `input`.
    pub input_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `true` si `executor_id` puede reclamarla en `now`: está `Pending`, ya
    /// es suya, no tiene dueño o el último latido es anterior a `now - lease`.
    pub fn is_claimable_by(&self, executor_id: &str, lease: Duration, now: DateTime<Utc>) -> bool {
        match self.status {
            ExecutionStatus::Pending => true,
            ExecutionStatus::Running => match self.executor_id.as_deref() {
                None => true,
                Some(owner) if owner == executor_id => true,
                Some(_) => self.updated_at < lease_cutoff(lease, now),
            },
            _ => false,
        }
    }
}

/// Instante antes del cual un latido se considera vencido.
pub fn lease_cutoff(lease: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    match chrono::Duration::from_std(lease) {
        Ok(d) => now - d,
        Err(_) => DateTime::<Utc>::MIN_UTC,
    }
}

/// Datos para `create_execution_if_absent`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    pub id: String,
    pub workflow_name: String,
    pub input: Value,
}

impl NewExecution {
    pub fn into_execution(self, now: DateTime<Utc>) -> WorkflowExecution {
        let input_hash = hash_value(&self.input);
        WorkflowExecution { id: self.id,
                            workflow_name: self.workflow_name,
                            input: self.input,
                            status: ExecutionStatus::Pending,
                            output: None,
                            error_detail: None,
                            recovery_attempts: 0,
                            executor_id: None,
                            input_hash,
                            created_at: now,
                            updated_at: now }
    }
}

/// Resultado terminal con el que se finaliza una ejecución.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(Value),
    Error(String),
}

impl ExecutionOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Success(_) => ExecutionStatus::Success,
            Self::Error(_) => ExecutionStatus::Error,
        }
    }
}
