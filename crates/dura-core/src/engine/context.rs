//! Contexto que recibe una función de workflow.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::constants::FIRST_STEP_NUMBER;
use crate::errors::{DurableError, StepError};
use crate::step::{StepAttempt, StepOptions, StepRunner};
use crate::store::WorkflowStore;

/// Única capacidad durable expuesta a la función: `run_step`.
///
/// Los números de step se asignan por orden de llamada, así que el código de
/// la función fuera de los steps debe ser determinista.
pub struct WorkflowContext<'a> {
    workflow_id: &'a str,
    workflow_name: &'a str,
    store: &'a dyn WorkflowStore,
    config: &'a EngineConfig,
    next_step: i32,
}

impl<'a> WorkflowContext<'a> {
    pub fn new(workflow_id: &'a str, workflow_name: &'a str, store: &'a dyn WorkflowStore, config: &'a EngineConfig) -> Self {
        Self { workflow_id,
               workflow_name,
               store,
               config,
               next_step: FIRST_STEP_NUMBER }
    }

    pub fn workflow_id(&self) -> &str {
        self.workflow_id
    }

    pub fn workflow_name(&self) -> &str {
        self.workflow_name
    }

    /// Ejecuta (o reproduce) el siguiente step con la política por defecto.
    pub fn run_step<T, F>(&mut self, name: &str, body: F) -> Result<T, DurableError>
        where T: Serialize + DeserializeOwned,
              F: FnMut(&StepAttempt) -> Result<T, StepError>
    {
        self.run_step_with(name, StepOptions::default(), body)
    }

    pub fn run_step_with<T, F>(&mut self, name: &str, options: StepOptions, body: F) -> Result<T, DurableError>
        where T: Serialize + DeserializeOwned,
              F: FnMut(&StepAttempt) -> Result<T, StepError>
    {
        let step_number = self.next_step;
        self.next_step += 1;
        StepRunner::new(self.store, self.config, self.workflow_id).run(step_number, name, &options, body)
    }
}
