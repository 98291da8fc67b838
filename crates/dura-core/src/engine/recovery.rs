//! Recuperación al arrancar el proceso.
//!
//! Se ejecuta una vez, con el registro ya congelado y antes de aceptar
//! tráfico. Valida que todas las ejecuciones pendientes tengan función
//! registrada antes de retomar ninguna: un nombre desconocido es un error de
//! configuración y aborta el arranque.
//!
//! Las ejecuciones `Running` cuyo executor sigue latiendo no se retoman; se
//! informan en `owned_elsewhere`.

use chrono::Utc;
use log::{info, warn};
use serde_json::Value;

use crate::engine::{WorkflowHandle, WorkflowRuntime};
use crate::errors::DurableError;
use crate::store::WorkflowStore;

pub struct RecoveryManager<S: WorkflowStore + 'static> {
    runtime: WorkflowRuntime<S>,
}

#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub handles: Vec<WorkflowHandle<Value>>,
    /// Ids con lease vigente de otro executor.
    pub owned_elsewhere: Vec<String>,
}

impl RecoveryReport {
    pub fn ids(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoverySummary {
    pub resumed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Abandonadas sin estado terminal (p.ej. store caído); quedan pendientes.
    pub interrupted: usize,
    pub owned_elsewhere: usize,
}

impl<S: WorkflowStore + 'static> RecoveryManager<S> {
    pub fn new(runtime: WorkflowRuntime<S>) -> Self {
        Self { runtime }
    }

    /// Retoma todas las ejecuciones `Pending`/`Running` del store.
    pub fn recover(&self) -> Result<RecoveryReport, DurableError> {
        let pending = self.runtime.list_pending()?;
        if let Some(orphan) = pending.iter().find(|e| !self.runtime.registry().contains(&e.workflow_name)) {
            return Err(DurableError::UnknownWorkflow(orphan.workflow_name.clone()));
        }
        if pending.is_empty() {
            info!("recovery: nothing to resume");
            return Ok(RecoveryReport::default());
        }
        let now = Utc::now();
        let lease = self.runtime.config().executor_lease;
        let (claimable, held): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|e| e.is_claimable_by(self.runtime.executor_id(), lease, now));
        for execution in &held {
            info!("recovery: execution {} is live on {}; skipped",
                  execution.id,
                  execution.executor_id.as_deref().unwrap_or("?"));
        }
        info!("recovery: resuming {} execution(s)", claimable.len());
        let mut report = RecoveryReport { owned_elsewhere: held.into_iter().map(|e| e.id).collect(),
                                          ..Default::default() };
        for execution in &claimable {
            report.handles.push(self.runtime.resume(execution)?);
        }
        Ok(report)
    }

    /// `recover` y espera a que cada ejecución retomada termine.
    pub fn recover_and_wait(&self) -> Result<RecoverySummary, DurableError> {
        let report = self.recover()?;
        let mut summary = RecoverySummary { resumed: report.len(),
                                            owned_elsewhere: report.owned_elsewhere.len(),
                                            ..Default::default() };
        for handle in &report.handles {
            match handle.get_result() {
                Ok(_) => summary.succeeded += 1,
                Err(DurableError::ExecutionFailed { .. }) => summary.failed += 1,
                Err(e) => {
                    warn!("recovery: execution {} not finished: {}", handle.id(), e);
                    summary.interrupted += 1;
                }
            }
        }
        info!("recovery finished: {:?}", summary);
        Ok(summary)
    }
}
