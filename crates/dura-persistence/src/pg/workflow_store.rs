//! `WorkflowStore` sobre las tablas `workflow_executions` y `workflow_steps`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use dura_core::hashing::hash_value;
use dura_core::{lease_cutoff, ErrorClass, ExecutionOutcome, ExecutionStatus, NewExecution, StepOutcome, StepRecord,
                StepStatus, StoreError, WorkflowExecution, WorkflowStore};
use serde_json::Value;

use super::{run_tx, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{workflow_executions as we, workflow_steps as ws};

/// Fila de `workflow_executions` (orden de columnas del `table!`).
#[derive(Queryable, Debug)]
pub struct ExecutionRow {
    pub id: String,
    pub workflow_name: String,
    pub input: Value,
    pub status: String,
    pub output: Option<Value>,
    pub error_detail: Option<String>,
    pub recovery_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `''` cuando nadie la ha reclamado.
    pub executor_id: String,
    pub input_hash: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = we)]
struct NewExecutionRow<'a> {
    id: &'a str,
    workflow_name: &'a str,
    input: &'a Value,
    status: &'a str,
    input_hash: &'a str,
}

/// Fila de `workflow_steps`.
#[derive(Queryable, Debug)]
pub struct StepRow {
    pub workflow_id: String,
    pub step_number: i32,
    pub step_name: String,
    pub status: String,
    pub output: Option<Value>,
    pub error_detail: Option<String>,
    pub error_class: Option<String>,
    pub attempt_count: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = ws)]
struct NewStepRow<'a> {
    workflow_id: &'a str,
    step_number: i32,
    step_name: &'a str,
    status: &'a str,
    attempt_count: i32,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = PersistenceError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = ExecutionStatus::parse(&row.status).ok_or_else(|| {
                                                            PersistenceError::Corrupt(format!("execution {} status '{}'",
                                                                                              row.id, row.status))
                                                        })?;
        Ok(WorkflowExecution { id: row.id,
                               workflow_name: row.workflow_name,
                               input: row.input,
                               status,
                               output: row.output,
                               error_detail: row.error_detail,
                               recovery_attempts: row.recovery_attempts,
                               executor_id: Some(row.executor_id).filter(|e| !e.is_empty()),
                               input_hash: row.input_hash,
                               created_at: row.created_at,
                               updated_at: row.updated_at })
    }
}

impl TryFrom<StepRow> for StepRecord {
    type Error = PersistenceError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| PersistenceError::Corrupt(format!("step {}#{} {what}", row.workflow_id, row.step_number));
        let status = StepStatus::parse(&row.status).ok_or_else(|| corrupt("status"))?;
        let error_class = match &row.error_class {
            Some(c) => Some(ErrorClass::parse(c).ok_or_else(|| corrupt("error_class"))?),
            None => None,
        };
        Ok(StepRecord { workflow_id: row.workflow_id,
                        step_number: row.step_number,
                        step_name: row.step_name,
                        status,
                        output: row.output,
                        error_detail: row.error_detail,
                        error_class,
                        attempt_count: row.attempt_count,
                        started_at: row.started_at,
                        completed_at: row.completed_at })
    }
}

fn non_terminal() -> Vec<&'static str> {
    ExecutionStatus::non_terminal().iter().map(|s| s.as_str()).collect()
}

pub struct PgWorkflowStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgWorkflowStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn tx<T, F>(&self, op: &str, f: F) -> Result<T, PersistenceError>
        where F: Fn(&mut PgConnection) -> Result<T, DieselError>
    {
        run_tx(&self.provider, op, f)
    }
}

fn execution(row: ExecutionRow) -> Result<WorkflowExecution, StoreError> {
    Ok(WorkflowExecution::try_from(row)?)
}

fn step(row: StepRow) -> Result<StepRecord, StoreError> {
    Ok(StepRecord::try_from(row)?)
}

impl<P: ConnectionProvider> WorkflowStore for PgWorkflowStore<P> {
    fn create_execution_if_absent(&self, new: NewExecution) -> Result<(WorkflowExecution, bool), StoreError> {
        let input_hash = hash_value(&new.input);
        let (row, created) = self.tx("create_execution_if_absent", |tx| {
                                     let inserted = diesel::insert_into(we::table).values(NewExecutionRow { id: &new.id,
                                                                                                            workflow_name: &new.workflow_name,
                                                                                                            input: &new.input,
                                                                                                            status: ExecutionStatus::Pending.as_str(),
                                                                                                            input_hash: &input_hash })
                                                                                  .on_conflict_do_nothing()
                                                                                  .execute(tx)?;
                                     let row: ExecutionRow = we::table.find(new.id.as_str()).first(tx)?;
                                     Ok((row, inserted == 1))
                                 })?;
        Ok((execution(row)?, created))
    }

    fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>, StoreError> {
        let row: Option<ExecutionRow> = self.tx("get_execution", |tx| we::table.find(id).first(tx).optional())?;
        row.map(execution).transpose()
    }

    fn claim_execution(&self, id: &str, executor_id: &str, lease: Duration)
                       -> Result<(WorkflowExecution, bool), StoreError> {
        let (row, acquired) = self.tx("claim_execution", |tx| {
                                      let now = Utc::now();
                                      let running = ExecutionStatus::Running.as_str();
                                      let claimable =
                                          we::status.eq(ExecutionStatus::Pending.as_str())
                                                    .or(we::status.eq(running).and(we::executor_id.eq(executor_id)
                                                                                                  .or(we::executor_id.eq(""))
                                                                                                  .or(we::updated_at.lt(lease_cutoff(lease, now)))));
                                      let claimed: Option<ExecutionRow> =
                                          diesel::update(we::table.filter(we::id.eq(id)).filter(claimable))
                                              .set((we::status.eq(running),
                                                    we::executor_id.eq(executor_id),
                                                    we::recovery_attempts.eq(we::recovery_attempts + 1),
                                                    we::updated_at.eq(now)))
                                              .get_result(tx)
                                              .optional()?;
                                      match claimed {
                                          Some(r) => Ok((r, true)),
                                          None => we::table.find(id).first(tx).map(|r| (r, false)),
                                      }
                                  })?;
        Ok((execution(row)?, acquired))
    }

    fn heartbeat(&self, id: &str, executor_id: &str) -> Result<bool, StoreError> {
        let touched = self.tx("heartbeat", |tx| {
                              diesel::update(we::table.filter(we::id.eq(id))
                                                      .filter(we::executor_id.eq(executor_id))
                                                      .filter(we::status.eq(ExecutionStatus::Running.as_str())))
                                  .set(we::updated_at.eq(Utc::now()))
                                  .execute(tx)
                          })?;
        Ok(touched == 1)
    }

    fn finalize_execution(&self, id: &str, outcome: ExecutionOutcome) -> Result<WorkflowExecution, StoreError> {
        let status = outcome.status().as_str();
        let (output, detail) = match outcome {
            ExecutionOutcome::Success(v) => (Some(v), None),
            ExecutionOutcome::Error(d) => (None, Some(d)),
        };
        let row = self.tx("finalize_execution", |tx| {
                          let won: Option<ExecutionRow> =
                              diesel::update(we::table.filter(we::id.eq(id)).filter(we::status.eq_any(non_terminal())))
                                  .set((we::status.eq(status),
                                        we::output.eq(output.clone()),
                                        we::error_detail.eq(detail.clone()),
                                        we::updated_at.eq(Utc::now())))
                                  .get_result(tx)
                                  .optional()?;
                          match won {
                              Some(r) => Ok(r),
                              None => we::table.find(id).first(tx),
                          }
                      })?;
        execution(row)
    }

    fn list_pending_executions(&self) -> Result<Vec<WorkflowExecution>, StoreError> {
        let rows: Vec<ExecutionRow> = self.tx("list_pending_executions", |tx| {
                                              we::table.filter(we::status.eq_any(non_terminal()))
                                                       .order((we::created_at.asc(), we::id.asc()))
                                                       .load(tx)
                                          })?;
        rows.into_iter().map(execution).collect()
    }

    fn get_step(&self, workflow_id: &str, step_number: i32) -> Result<Option<StepRecord>, StoreError> {
        let row: Option<StepRow> =
            self.tx("get_step", |tx| ws::table.find((workflow_id, step_number)).first(tx).optional())?;
        row.map(step).transpose()
    }

    fn begin_step(&self, workflow_id: &str, step_number: i32, step_name: &str) -> Result<StepRecord, StoreError> {
        let row = self.tx("begin_step", |tx| {
                          // serializa la numeración de steps de este workflow
                          let _owner: String = we::table.find(workflow_id).select(we::id).for_update().first(tx)?;
                          diesel::insert_into(ws::table).values(NewStepRow { workflow_id,
                                                                            step_number,
                                                                            step_name,
                                                                            status: StepStatus::Running.as_str(),
                                                                            attempt_count: 0 })
                                                        .on_conflict_do_nothing()
                                                        .execute(tx)?;
                          ws::table.find((workflow_id, step_number)).first::<StepRow>(tx)
                      })?;
        step(row)
    }

    fn record_attempt(&self, workflow_id: &str, step_number: i32, attempt_count: i32) -> Result<StepRecord, StoreError> {
        let row = self.tx("record_attempt", |tx| {
                          let updated: Option<StepRow> =
                              diesel::update(ws::table.filter(ws::workflow_id.eq(workflow_id))
                                                      .filter(ws::step_number.eq(step_number))
                                                      .filter(ws::status.eq(StepStatus::Running.as_str())))
                                  .set(ws::attempt_count.eq(attempt_count))
                                  .get_result(tx)
                                  .optional()?;
                          match updated {
                              Some(r) => Ok(r),
                              None => ws::table.find((workflow_id, step_number)).first(tx),
                          }
                      })?;
        step(row)
    }

    fn complete_step(&self, workflow_id: &str, step_number: i32, outcome: StepOutcome) -> Result<StepRecord, StoreError> {
        let status = outcome.status().as_str();
        let (output, detail, class) = match outcome {
            StepOutcome::Success(v) => (Some(v), None, None),
            StepOutcome::Error { class, detail } => (None, Some(detail), Some(class.as_str())),
        };
        let row = self.tx("complete_step", |tx| {
                          let won: Option<StepRow> =
                              diesel::update(ws::table.filter(ws::workflow_id.eq(workflow_id))
                                                      .filter(ws::step_number.eq(step_number))
                                                      .filter(ws::status.eq(StepStatus::Running.as_str())))
                                  .set((ws::status.eq(status),
                                        ws::output.eq(output.clone()),
                                        ws::error_detail.eq(detail.clone()),
                                        ws::error_class.eq(class),
                                        ws::completed_at.eq(Some(Utc::now()))))
                                  .get_result(tx)
                                  .optional()?;
                          match won {
                              Some(r) => Ok(r),
                              None => ws::table.find((workflow_id, step_number)).first(tx),
                          }
                      })?;
        step(row)
    }

    fn list_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let rows: Vec<StepRow> = self.tx("list_steps", |tx| {
                                         ws::table.filter(ws::workflow_id.eq(workflow_id))
                                                  .order(ws::step_number.asc())
                                                  .load(tx)
                                     })?;
        rows.into_iter().map(step).collect()
    }

    fn delete_execution(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self.tx("delete_execution", |tx| {
                              diesel::delete(ws::table.filter(ws::workflow_id.eq(id))).execute(tx)?;
                              diesel::delete(we::table.filter(we::id.eq(id))).execute(tx)
                          })?;
        Ok(deleted > 0)
    }
}
