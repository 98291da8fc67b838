#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use dura_core::{DurableError, EngineConfig, InMemoryWorkflowStore, NewExecution, RetryPolicy, StepOutcome,
                WorkflowRegistry, WorkflowStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PIPELINE: &str = "pipeline";

/// Lease corto: un proceso "muerto" deja de bloquear sus ejecuciones enseguida.
pub const LEASE: Duration = Duration::from_millis(40);

/// Executor con el que los tests dejan ejecuciones a medias.
pub const CRASHED_EXECUTOR: &str = "ex-crashed";

/// Backoff de milisegundos para que los reintentos no alarguen los tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default().with_default_retry(RetryPolicy::default().with_backoff(Duration::from_millis(1),
                                                                                   2.0,
                                                                                   Duration::from_millis(4)))
                           .with_result_poll_interval(Duration::from_millis(10))
                           .with_executor_lease(LEASE)
}

/// Deja vencer el lease de las ejecuciones reclamadas hasta ahora.
pub fn expire_lease() {
    thread::sleep(LEASE + Duration::from_millis(15));
}

/// Contador de invocaciones de cuerpos de step, compartido entre hilos.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<HashMap<String, usize>>>);

impl Calls {
    pub fn hit(&self, name: &str) {
        *self.0.lock().unwrap().entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PipelineIn {
    pub base: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct PipelineOut {
    pub first: i64,
    pub second: i64,
}

/// Dos steps: `first` = base + 1, `second` = first * 2. `second` tarda un
/// poco para que los tests puedan solaparse con la ejecución.
pub fn register_pipeline(registry: &mut WorkflowRegistry, calls: &Calls) {
    let calls = calls.clone();
    registry.register(PIPELINE, move |ctx, input: PipelineIn| {
                let first: i64 = ctx.run_step("first", |_| {
                                        calls.hit("first");
                                        Ok(input.base + 1)
                                    })?;
                let second: i64 = ctx.run_step("second", |_| {
                                         calls.hit("second");
                                         thread::sleep(Duration::from_millis(20));
                                         Ok(first * 2)
                                     })?;
                Ok::<_, DurableError>(PipelineOut { first, second })
            })
            .unwrap();
}

pub fn pipeline_registry(calls: &Calls) -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    register_pipeline(&mut registry, calls);
    registry
}

/// Deja en el store una ejecución como la dejaría un proceso que murió
/// después de registrar `steps`, con su lease ya vencido.
pub fn simulate_crash(store: &InMemoryWorkflowStore, id: &str, workflow: &str, input: Value, steps: &[(&str, StepOutcome)]) {
    store.create_execution_if_absent(NewExecution { id: id.into(), workflow_name: workflow.into(), input }).unwrap();
    store.claim_execution(id, CRASHED_EXECUTOR, LEASE).unwrap();
    for (i, (name, outcome)) in steps.iter().enumerate() {
        let n = i as i32 + 1;
        store.begin_step(id, n, name).unwrap();
        store.record_attempt(id, n, 1).unwrap();
        store.complete_step(id, n, outcome.clone()).unwrap();
    }
    expire_lease();
}

pub fn crashed_after_first(store: &InMemoryWorkflowStore, id: &str, base: i64) {
    simulate_crash(store, id, PIPELINE, json!({ "base": base }), &[("first", StepOutcome::Success(json!(base + 1)))]);
}

/// Barrera de un solo uso con plazo, para detener un step a mitad.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (open, changed) = &*self.0;
        *open.lock().unwrap() = true;
        changed.notify_all();
    }

    /// `true` si se abrió antes de `timeout`.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (open, changed) = &*self.0;
        let guard = open.lock().unwrap();
        let (guard, _) = changed.wait_timeout_while(guard, timeout, |o| !*o).unwrap();
        *guard
    }
}

/// Como `register_pipeline`, pero `second` avisa en `entered` y no termina
/// hasta que se abre `release`.
pub fn gated_pipeline_registry(calls: &Calls, entered: &Gate, release: &Gate) -> WorkflowRegistry {
    let (calls, entered, release) = (calls.clone(), entered.clone(), release.clone());
    let mut registry = WorkflowRegistry::new();
    registry.register(PIPELINE, move |ctx, input: PipelineIn| {
                let first: i64 = ctx.run_step("first", |_| {
                                        calls.hit("first");
                                        Ok(input.base + 1)
                                    })?;
                let second: i64 = ctx.run_step("second", |_| {
                                         calls.hit("second");
                                         entered.open();
                                         release.wait(Duration::from_secs(5));
                                         Ok(first * 2)
                                     })?;
                Ok::<_, DurableError>(PipelineOut { first, second })
            })
            .unwrap();
    registry
}
