//! Abstracción de almacenamiento del motor.
//!
//! Todas las mutaciones son compare-and-set: un registro terminal nunca se
//! sobrescribe y, ante una carrera, el perdedor recibe la fila ganadora. El
//! motor se apoya en ello para que dos conductores concurrentes de la misma
//! ejecución converjan al mismo resultado.

pub mod memory;

use std::time::Duration;

pub use memory::InMemoryWorkflowStore;

use crate::errors::StoreError;
use crate::model::{ExecutionOutcome, NewExecution, StepOutcome, StepRecord, WorkflowExecution};

pub trait WorkflowStore: Send + Sync {
    /// Inserta la ejecución en `Pending` si el id no existe. Devuelve la fila
    /// vigente y `true` si se creó en esta llamada.
    fn create_execution_if_absent(&self, new: NewExecution) -> Result<(WorkflowExecution, bool), StoreError>;

    fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Reclama la ejecución para `executor_id`: pasa a `Running`, anota el
    /// dueño, renueva `updated_at` e incrementa `recovery_attempts`.
    ///
    /// Sólo tiene efecto si la fila está `Pending`, ya es de `executor_id` o
    /// su último latido es anterior a `lease`. Devuelve la fila vigente y
    /// `true` si esta llamada la reclamó.
    fn claim_execution(&self, id: &str, executor_id: &str, lease: Duration)
                       -> Result<(WorkflowExecution, bool), StoreError>;

    /// Renueva `updated_at` mientras `executor_id` conduce la ejecución.
    /// `false` si la fila ya no es suya o ya es terminal.
    fn heartbeat(&self, id: &str, executor_id: &str) -> Result<bool, StoreError>;

    /// Transición a estado terminal. Si otra llamada ganó antes, devuelve la
    /// fila terminal existente sin modificarla.
    fn finalize_execution(&self, id: &str, outcome: ExecutionOutcome) -> Result<WorkflowExecution, StoreError>;

    /// Ejecuciones `Pending` o `Running`, por orden de creación.
    fn list_pending_executions(&self) -> Result<Vec<WorkflowExecution>, StoreError>;

    fn get_step(&self, workflow_id: &str, step_number: i32) -> Result<Option<StepRecord>, StoreError>;

    /// Crea el registro `Running` si no existe; si existe lo devuelve tal cual.
    fn begin_step(&self, workflow_id: &str, step_number: i32, step_name: &str) -> Result<StepRecord, StoreError>;

    /// Persiste el contador de intentos antes de invocar el cuerpo. No tiene
    /// efecto sobre registros terminales.
    fn record_attempt(&self, workflow_id: &str, step_number: i32, attempt_count: i32) -> Result<StepRecord, StoreError>;

    /// Cierra el step (`Running` -> terminal). Devuelve el registro ganador.
    fn complete_step(&self, workflow_id: &str, step_number: i32, outcome: StepOutcome) -> Result<StepRecord, StoreError>;

    /// Registros de la ejecución ordenados por `step_number`.
    fn list_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>, StoreError>;

    /// Borra la ejecución y sus steps. `false` si no existía.
    fn delete_execution(&self, id: &str) -> Result<bool, StoreError>;
}
