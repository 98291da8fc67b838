//! Datos visibles para el cuerpo de un step durante un intento.

use uuid::Uuid;

use crate::hashing::derive_uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepAttempt {
    pub workflow_id: String,
    pub step_number: i32,
    pub step_name: String,
    /// Intento actual (1-based), persistido antes de invocar el cuerpo.
    pub attempt: u32,
}

impl StepAttempt {
    /// Identificador estable para la posición del step: el mismo en todos los
    /// intentos y en cualquier replay de la ejecución.
    pub fn stable_id(&self) -> Uuid {
        derive_uuid(&self.workflow_id, self.step_number, "")
    }

    /// Variante con sal, para steps que necesitan más de un id.
    pub fn stable_id_for(&self, salt: &str) -> Uuid {
        derive_uuid(&self.workflow_id, self.step_number, salt)
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}
