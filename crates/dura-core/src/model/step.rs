//! Registro posicional de un step (`StepRecord`).
//!
//! La identidad de un step es `(workflow_id, step_number)`; `step_name` sólo
//! sirve para detectar un replay no determinista.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ErrorClass;

/// Estado de un step persistido.
///
/// Las transiciones válidas son:
/// - `Running` -> `Success`
/// - `Running` -> `Error`
///
/// Un registro terminal es inmutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Running,
    Success,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub workflow_id: String,
    pub step_number: i32,
    pub step_name: String,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub error_detail: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub attempt_count: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    /// Fila nueva en estado `Running` y sin intentos.
    pub fn started(workflow_id: &str, step_number: i32, step_name: &str, now: DateTime<Utc>) -> Self {
        Self { workflow_id: workflow_id.to_string(),
               step_number,
               step_name: step_name.to_string(),
               status: StepStatus::Running,
               output: None,
               error_detail: None,
               error_class: None,
               attempt_count: 0,
               started_at: now,
               completed_at: None }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Resultado con el que se cierra un step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success(Value),
    Error { class: ErrorClass, detail: String },
}

impl StepOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            Self::Success(_) => StepStatus::Success,
            Self::Error { .. } => StepStatus::Error,
        }
    }

    /// Aplica el outcome sobre un registro `Running`.
    pub fn apply(self, record: &mut StepRecord, now: DateTime<Utc>) {
        record.status = self.status();
        record.completed_at = Some(now);
        match self {
            Self::Success(v) => record.output = Some(v),
            Self::Error { class, detail } => {
                record.error_class = Some(class);
                record.error_detail = Some(detail);
            }
        }
    }
}
