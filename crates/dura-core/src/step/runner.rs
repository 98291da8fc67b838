//! StepRunner: ejecuta un step contra el log persistido.
//!
//! Orden de operaciones para la posición `(workflow_id, step_number)`:
//! 1. Si existe un registro terminal se reproduce (salida o fallo) sin
//!    invocar el cuerpo.
//! 2. Si no, se crea (o se retoma) el registro `Running` y se itera:
//!    persistir el contador de intentos, invocar el cuerpo y, según el
//!    resultado, cerrar el step o esperar el backoff.
//!
//! El contador de intentos vive en el store, así que el presupuesto de
//! reintentos se conserva entre reinicios del proceso. Al retomar un registro
//! `Running`, el último intento anotado no llegó a cerrarse (el proceso murió
//! durante el cuerpo o el backoff) y no se descuenta del presupuesto: el
//! cuerpo vuelve a invocarse al menos una vez.

use std::thread;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::errors::{DurableError, ErrorClass, StepError};
use crate::model::{StepOutcome, StepRecord, StepStatus};
use crate::step::{StepAttempt, StepOptions};
use crate::store::WorkflowStore;

pub struct StepRunner<'a> {
    store: &'a dyn WorkflowStore,
    config: &'a EngineConfig,
    workflow_id: &'a str,
}

impl<'a> StepRunner<'a> {
    pub fn new(store: &'a dyn WorkflowStore, config: &'a EngineConfig, workflow_id: &'a str) -> Self {
        Self { store, config, workflow_id }
    }

    pub fn run<T, F>(&self, step_number: i32, step_name: &str, options: &StepOptions, mut body: F) -> Result<T, DurableError>
        where T: Serialize + DeserializeOwned,
              F: FnMut(&StepAttempt) -> Result<T, StepError>
    {
        if let Some(rec) = self.store.get_step(self.workflow_id, step_number)? {
            check_name(&rec, step_name)?;
            if rec.is_terminal() {
                debug!("step {}#{} ({}) replayed from log", self.workflow_id, step_number, step_name);
                return replay(rec);
            }
        }

        let rec = self.store.begin_step(self.workflow_id, step_number, step_name)?;
        check_name(&rec, step_name)?;
        if rec.is_terminal() {
            return replay(rec);
        }

        let policy = self.config.resolve_retry(options);
        let mut attempts = (rec.attempt_count - 1).max(0) as u32;
        if rec.attempt_count > 0 {
            info!("step {}#{} ({}) resumed; attempt {} has no recorded outcome",
                  self.workflow_id, step_number, step_name, rec.attempt_count);
        }
        let mut last_failure: Option<String> = None;
        loop {
            if !policy.allows_another(attempts) {
                let detail = last_failure.unwrap_or_else(|| format!("retry budget exhausted after {attempts} attempts"));
                return self.close_with_error(step_number, step_name, ErrorClass::Transient, detail);
            }
            attempts += 1;
            self.store.record_attempt(self.workflow_id, step_number, attempts as i32)?;
            let attempt = StepAttempt { workflow_id: self.workflow_id.to_string(),
                                        step_number,
                                        step_name: step_name.to_string(),
                                        attempt: attempts };
            match body(&attempt) {
                Ok(value) => {
                    let json = match serde_json::to_value(&value) {
                        Ok(j) => j,
                        Err(e) => {
                            return self.close_with_error(step_number, step_name, ErrorClass::Permanent,
                                                         format!("output not serializable: {e}"))
                        }
                    };
                    let winner = self.store.complete_step(self.workflow_id, step_number, StepOutcome::Success(json))?;
                    debug!("step {}#{} ({}) recorded after {} attempt(s)", self.workflow_id, step_number, step_name, attempts);
                    return replay(winner);
                }
                Err(StepError::Transient(msg)) => {
                    if policy.allows_another(attempts) {
                        let wait = policy.backoff_after(attempts);
                        warn!("step {}#{} ({}) attempt {}/{} failed: {}; retrying in {:?}",
                              self.workflow_id, step_number, step_name, attempts, policy.max_attempts, msg, wait);
                        thread::sleep(wait);
                    }
                    last_failure = Some(msg);
                }
                Err(StepError::Permanent(msg)) => {
                    return self.close_with_error(step_number, step_name, ErrorClass::Permanent, msg);
                }
            }
        }
    }

    fn close_with_error<T: DeserializeOwned>(&self, step_number: i32, step_name: &str, class: ErrorClass, detail: String)
                                             -> Result<T, DurableError> {
        info!("step {}#{} ({}) closed as {} failure: {}", self.workflow_id, step_number, step_name, class.as_str(), detail);
        let winner = self.store.complete_step(self.workflow_id, step_number, StepOutcome::Error { class, detail })?;
        replay(winner)
    }
}

fn check_name(rec: &StepRecord, step_name: &str) -> Result<(), DurableError> {
    if rec.step_name != step_name {
        return Err(DurableError::NonDeterministic { step_number: rec.step_number,
                                                    recorded: rec.step_name.clone(),
                                                    found: step_name.to_string() });
    }
    Ok(())
}

/// Convierte un registro terminal en el resultado que ve el workflow.
fn replay<T: DeserializeOwned>(rec: StepRecord) -> Result<T, DurableError> {
    match rec.status {
        StepStatus::Success => {
            let raw = rec.output.unwrap_or(serde_json::Value::Null);
            serde_json::from_value(raw).map_err(|e| {
                DurableError::Serialization(format!("step {} ({}) output: {e}", rec.step_number, rec.step_name))
            })
        }
        StepStatus::Error => {
            let detail = rec.error_detail.unwrap_or_default();
            match rec.error_class {
                Some(ErrorClass::Transient) => Err(DurableError::StepTransientFailure { step_number: rec.step_number,
                                                                                        step_name: rec.step_name,
                                                                                        attempts: rec.attempt_count,
                                                                                        detail }),
                _ => Err(DurableError::StepPermanentFailure { step_number: rec.step_number,
                                                              step_name: rec.step_name,
                                                              detail }),
            }
        }
        StepStatus::Running => Err(DurableError::Serialization(format!("step {} is not terminal", rec.step_number))),
    }
}
