//! `WorkflowStore` en memoria para tests y ejecución sin base de datos.
//!
//! Un único `Mutex` serializa todas las operaciones, con lo que cada
//! compare-and-set es atómico. Las ejecuciones viven en un `IndexMap` para
//! preservar el orden de creación en `list_pending_executions`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;

use super::WorkflowStore;
use crate::errors::StoreError;
use crate::model::{ExecutionOutcome, ExecutionStatus, NewExecution, StepOutcome, StepRecord, WorkflowExecution};

#[derive(Default)]
struct State {
    executions: IndexMap<String, WorkflowExecution>,
    steps: IndexMap<(String, i32), StepRecord>,
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: Mutex<State>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }

    /// Número de ejecuciones almacenadas.
    pub fn execution_count(&self) -> usize {
        self.state.lock().map(|s| s.executions.len()).unwrap_or(0)
    }
}

fn not_found(what: &str, key: impl std::fmt::Display) -> StoreError {
    StoreError::NotFound(format!("{what} {key}"))
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn create_execution_if_absent(&self, new: NewExecution) -> Result<(WorkflowExecution, bool), StoreError> {
        let mut st = self.lock()?;
        if let Some(existing) = st.executions.get(&new.id) {
            return Ok((existing.clone(), false));
        }
        let row = new.into_execution(Utc::now());
        st.executions.insert(row.id.clone(), row.clone());
        Ok((row, true))
    }

    fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.lock()?.executions.get(id).cloned())
    }

    fn claim_execution(&self, id: &str, executor_id: &str, lease: Duration)
                       -> Result<(WorkflowExecution, bool), StoreError> {
        let mut st = self.lock()?;
        let row = st.executions.get_mut(id).ok_or_else(|| not_found("execution", id))?;
        let now = Utc::now();
        if !row.is_claimable_by(executor_id, lease, now) {
            return Ok((row.clone(), false));
        }
        row.status = ExecutionStatus::Running;
        row.executor_id = Some(executor_id.to_string());
        row.recovery_attempts += 1;
        row.updated_at = now;
        Ok((row.clone(), true))
    }

    fn heartbeat(&self, id: &str, executor_id: &str) -> Result<bool, StoreError> {
        let mut st = self.lock()?;
        match st.executions.get_mut(id) {
            Some(row) if row.status == ExecutionStatus::Running && row.executor_id.as_deref() == Some(executor_id) => {
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn finalize_execution(&self, id: &str, outcome: ExecutionOutcome) -> Result<WorkflowExecution, StoreError> {
        let mut st = self.lock()?;
        let row = st.executions.get_mut(id).ok_or_else(|| not_found("execution", id))?;
        if !row.status.can_transition_to(outcome.status()) {
            return Ok(row.clone());
        }
        row.status = outcome.status();
        match outcome {
            ExecutionOutcome::Success(v) => row.output = Some(v),
            ExecutionOutcome::Error(detail) => row.error_detail = Some(detail),
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    fn list_pending_executions(&self) -> Result<Vec<WorkflowExecution>, StoreError> {
        let st = self.lock()?;
        let mut rows: Vec<WorkflowExecution> = st.executions.values().filter(|e| !e.is_terminal()).cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    fn get_step(&self, workflow_id: &str, step_number: i32) -> Result<Option<StepRecord>, StoreError> {
        Ok(self.lock()?.steps.get(&(workflow_id.to_string(), step_number)).cloned())
    }

    fn begin_step(&self, workflow_id: &str, step_number: i32, step_name: &str) -> Result<StepRecord, StoreError> {
        let mut st = self.lock()?;
        if !st.executions.contains_key(workflow_id) {
            return Err(not_found("execution", workflow_id));
        }
        let rec = st.steps
                    .entry((workflow_id.to_string(), step_number))
                    .or_insert_with(|| StepRecord::started(workflow_id, step_number, step_name, Utc::now()));
        Ok(rec.clone())
    }

    fn record_attempt(&self, workflow_id: &str, step_number: i32, attempt_count: i32) -> Result<StepRecord, StoreError> {
        let mut st = self.lock()?;
        let rec = st.steps
                    .get_mut(&(workflow_id.to_string(), step_number))
                    .ok_or_else(|| not_found("step", format!("{workflow_id}#{step_number}")))?;
        if !rec.is_terminal() {
            rec.attempt_count = attempt_count;
        }
        Ok(rec.clone())
    }

    fn complete_step(&self, workflow_id: &str, step_number: i32, outcome: StepOutcome) -> Result<StepRecord, StoreError> {
        let mut st = self.lock()?;
        let rec = st.steps
                    .get_mut(&(workflow_id.to_string(), step_number))
                    .ok_or_else(|| not_found("step", format!("{workflow_id}#{step_number}")))?;
        if !rec.is_terminal() {
            outcome.apply(rec, Utc::now());
        }
        Ok(rec.clone())
    }

    fn list_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let st = self.lock()?;
        let mut rows: Vec<StepRecord> = st.steps.values().filter(|r| r.workflow_id == workflow_id).cloned().collect();
        rows.sort_by_key(|r| r.step_number);
        Ok(rows)
    }

    fn delete_execution(&self, id: &str) -> Result<bool, StoreError> {
        let mut st = self.lock()?;
        let existed = st.executions.shift_remove(id).is_some();
        st.steps.retain(|(wf, _), _| wf != id);
        Ok(existed)
    }
}
