//! WorkflowRuntime: arranque idempotente y conducción de ejecuciones.
//!
//! Cada ejecución conducida corre en su propio hilo. Un conjunto en memoria
//! evita que este proceso conduzca el mismo id dos veces. Entre procesos la
//! exclusión la da el claim: cada runtime tiene un `executor_id`, y una fila
//! `Running` de otro executor sólo se reclama cuando su latido (`updated_at`)
//! supera `executor_lease`. Mientras conduce, el runtime renueva el latido
//! desde un hilo auxiliar.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::{ENGINE_VERSION, MAX_RECOVERY_EXCEEDED};
use crate::engine::{ResultHub, RuntimeBuilder, WorkflowContext, WorkflowHandle};
use crate::errors::{classify_error, DurableError};
use crate::hashing::hash_value;
use crate::model::{ExecutionOutcome, NewExecution, StepRecord, WorkflowExecution};
use crate::registry::WorkflowRegistry;
use crate::store::WorkflowStore;

struct RuntimeInner<S> {
    store: Arc<S>,
    registry: Arc<WorkflowRegistry>,
    config: EngineConfig,
    executor_id: String,
    hub: Arc<ResultHub>,
    active: Mutex<HashSet<String>>,
    idle: Condvar,
    shutting_down: AtomicBool,
}

pub struct WorkflowRuntime<S: WorkflowStore + 'static> {
    inner: Arc<RuntimeInner<S>>,
}

impl<S: WorkflowStore + 'static> Clone for WorkflowRuntime<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// Saca el id del conjunto activo al terminar el hilo conductor, también si
/// el hilo termina por pánico.
struct ActiveGuard<S: WorkflowStore + 'static> {
    runtime: WorkflowRuntime<S>,
    id: String,
}

impl<S: WorkflowStore + 'static> Drop for ActiveGuard<S> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.runtime.inner.active.lock() {
            active.remove(&self.id);
        }
        self.runtime.inner.idle.notify_all();
    }
}

impl<S: WorkflowStore + 'static> WorkflowRuntime<S> {
    pub fn builder(store: Arc<S>) -> RuntimeBuilder<S> {
        RuntimeBuilder::new(store)
    }

    pub(crate) fn from_parts(store: Arc<S>, registry: WorkflowRegistry, config: EngineConfig) -> Self {
        let executor_id = config.executor_id.clone().unwrap_or_else(|| format!("ex-{}", Uuid::new_v4()));
        info!("workflow runtime {} launched as {} with {} workflow(s): {:?}",
              ENGINE_VERSION,
              executor_id,
              registry.len(),
              registry.names());
        Self { inner: Arc::new(RuntimeInner { store,
                                              registry: Arc::new(registry),
                                              config,
                                              executor_id,
                                              hub: Arc::new(ResultHub::new()),
                                              active: Mutex::new(HashSet::new()),
                                              idle: Condvar::new(),
                                              shutting_down: AtomicBool::new(false) }) }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Identidad con la que este runtime reclama ejecuciones.
    pub fn executor_id(&self) -> &str {
        &self.inner.executor_id
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Arranca (o se une a) la ejecución `id` del workflow `name`.
    ///
    /// - id nuevo: crea la fila `Pending` y la conduce en un hilo propio.
    /// - id existente no terminal: la conduce si nadie en este proceso lo
    ///   hace ya y ningún otro executor la tiene viva.
    /// - id existente terminal: no invoca nada, el handle devuelve el
    ///   resultado almacenado.
    ///
    /// Reutilizar un id con otro workflow o con otro input se rechaza.
    pub fn start<I, O>(&self, name: &str, input: &I, id: Option<String>) -> Result<WorkflowHandle<O>, DurableError>
        where I: Serialize,
              O: DeserializeOwned
    {
        if self.is_shutting_down() {
            return Err(DurableError::ShuttingDown);
        }
        self.inner.registry.lookup(name)?;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let input = serde_json::to_value(input)?;
        let fingerprint = hash_value(&input);
        let (row, created) = self.inner.store.create_execution_if_absent(NewExecution { id: id.clone(),
                                                                                        workflow_name: name.to_string(),
                                                                                        input })?;
        if row.workflow_name != name {
            return Err(DurableError::ConflictingWorkflow { id,
                                                           existing: row.workflow_name,
                                                           requested: name.to_string() });
        }
        if !row.input_hash.is_empty() && row.input_hash != fingerprint {
            return Err(DurableError::ConflictingInput { id });
        }
        if created {
            info!("execution {} of '{}' created", id, name);
        } else {
            debug!("execution {} of '{}' already exists with status {}", id, name, row.status);
        }
        if !row.is_terminal() {
            self.drive(&id)?;
        }
        Ok(self.handle(id))
    }

    /// Retoma una ejecución existente (camino de recuperación).
    pub fn resume(&self, execution: &WorkflowExecution) -> Result<WorkflowHandle<Value>, DurableError> {
        self.inner.registry.lookup(&execution.workflow_name)?;
        if !execution.is_terminal() {
            if self.is_shutting_down() {
                return Err(DurableError::ShuttingDown);
            }
            self.drive(&execution.id)?;
        }
        Ok(self.handle(execution.id.clone()))
    }

    /// Handle para una ejecución ya existente, sin conducirla.
    pub fn retrieve_handle<O: DeserializeOwned>(&self, id: &str) -> Result<WorkflowHandle<O>, DurableError> {
        match self.inner.store.get_execution(id)? {
            Some(_) => Ok(self.handle(id.to_string())),
            None => Err(DurableError::ExecutionNotFound(id.to_string())),
        }
    }

    pub fn get_execution(&self, id: &str) -> Result<WorkflowExecution, DurableError> {
        self.inner.store.get_execution(id)?.ok_or_else(|| DurableError::ExecutionNotFound(id.to_string()))
    }

    pub fn list_steps(&self, id: &str) -> Result<Vec<StepRecord>, DurableError> {
        Ok(self.inner.store.list_steps(id)?)
    }

    pub fn list_pending(&self) -> Result<Vec<WorkflowExecution>, DurableError> {
        Ok(self.inner.store.list_pending_executions()?)
    }

    /// Borrado explícito de una ejecución terminal y su log de steps.
    pub fn delete_execution(&self, id: &str) -> Result<(), DurableError> {
        let row = self.get_execution(id)?;
        if !row.is_terminal() {
            return Err(DurableError::ExecutionActive(id.to_string()));
        }
        if !self.inner.store.delete_execution(id)? {
            return Err(DurableError::ExecutionNotFound(id.to_string()));
        }
        info!("execution {} deleted", id);
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Deja de aceptar arranques y espera a los hilos conductores hasta
    /// `config.shutdown_timeout`. Devuelve `true` si todos terminaron.
    pub fn shutdown(&self) -> bool {
        self.shutdown_with_timeout(self.inner.config.shutdown_timeout)
    }

    pub fn shutdown_with_timeout(&self, timeout: Duration) -> bool {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        let Ok(mut active) = self.inner.active.lock() else {
            return false;
        };
        while !active.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                warn!("shutdown timed out with {} execution(s) still running", active.len());
                return false;
            }
            active = match self.inner.idle.wait_timeout(active, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
        info!("workflow runtime stopped");
        true
    }

    fn handle<O: DeserializeOwned>(&self, id: String) -> WorkflowHandle<O> {
        let store: Arc<dyn WorkflowStore> = self.inner.store.clone();
        WorkflowHandle::new(id, store, Arc::clone(&self.inner.hub), self.inner.config.result_poll_interval)
    }

    fn drive(&self, id: &str) -> Result<(), DurableError> {
        {
            let mut active = self.inner.active.lock().map_err(|_| DurableError::workflow("runtime state poisoned"))?;
            if !active.insert(id.to_string()) {
                debug!("execution {} already driven by this process", id);
                return Ok(());
            }
        }
        self.inner.hub.clear(id);
        let guard = ActiveGuard { runtime: self.clone(), id: id.to_string() };
        let spawned = thread::Builder::new().name(format!("wf-{}", short_id(id))).spawn(move || {
                                                                                      guard.runtime.execute(&guard.id);
                                                                                  });
        spawned.map(|_| ())
               .map_err(|e| DurableError::workflow(format!("could not spawn driver for {id}: {e}")))
    }

    fn execute(&self, id: &str) {
        if let Err(err) = self.run_to_outcome(id) {
            error!("execution {} interrupted without a terminal state ({}): {}", id, classify_error(&err).as_str(), err);
            self.inner.hub.notify_interrupted(id, err);
        }
    }

    fn run_to_outcome(&self, id: &str) -> Result<(), DurableError> {
        let inner = &self.inner;
        let (row, acquired) = inner.store.claim_execution(id, &inner.executor_id, inner.config.executor_lease)?;
        if row.is_terminal() {
            inner.hub.notify_finalized(id);
            return Ok(());
        }
        if !acquired {
            info!("execution {} is held by {}; waiting on the store instead of driving it",
                  id,
                  row.executor_id.as_deref().unwrap_or("?"));
            return Ok(());
        }
        if row.recovery_attempts > inner.config.max_recovery_attempts {
            warn!("execution {} claimed {} times; giving up", id, row.recovery_attempts);
            inner.store.finalize_execution(id, ExecutionOutcome::Error(MAX_RECOVERY_EXCEEDED.to_string()))?;
            inner.hub.notify_finalized(id);
            return Ok(());
        }
        let function = inner.registry.lookup(&row.workflow_name)?;
        info!("driving execution {} of '{}' (claim #{})", id, row.workflow_name, row.recovery_attempts);

        let mut ctx = WorkflowContext::new(&row.id, &row.workflow_name, &*inner.store, &inner.config);
        let beat = Beat::default();
        let result = thread::scope(|scope| {
            scope.spawn(|| self.keep_alive(id, &beat));
            let result = catch_unwind(AssertUnwindSafe(|| function(&mut ctx, row.input.clone())));
            beat.stop();
            result
        });
        let outcome = match result {
            Ok(Ok(output)) => ExecutionOutcome::Success(output),
            Ok(Err(err)) if err.is_persistence() => return Err(err),
            Ok(Err(err)) => {
                debug!("execution {} returned a {} error", id, classify_error(&err).as_str());
                ExecutionOutcome::Error(err.to_string())
            }
            Err(payload) => ExecutionOutcome::Error(format!("workflow panicked: {}", panic_message(payload.as_ref()))),
        };
        let stored = inner.store.finalize_execution(id, outcome)?;
        match &stored.error_detail {
            Some(detail) => info!("execution {} finished with ERROR: {}", id, detail),
            None => info!("execution {} finished with {}", id, stored.status),
        }
        inner.hub.notify_finalized(id);
        Ok(())
    }

    /// Renueva el latido hasta que `beat` se detenga o la fila deje de ser
    /// de este executor.
    fn keep_alive(&self, id: &str, beat: &Beat) {
        let interval = self.inner.config.heartbeat_interval();
        while !beat.wait(interval) {
            match self.inner.store.heartbeat(id, &self.inner.executor_id) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("execution {} is no longer held by {}", id, self.inner.executor_id);
                    return;
                }
                Err(err) => warn!("heartbeat for execution {} failed: {}", id, err),
            }
        }
    }
}

/// Señal de parada del hilo de latido.
#[derive(Default)]
struct Beat {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Beat {
    fn stop(&self) {
        if let Ok(mut stopped) = self.stopped.lock() {
            *stopped = true;
        }
        self.wake.notify_all();
    }

    /// Espera hasta `interval`; `true` si se pidió parar.
    fn wait(&self, interval: Duration) -> bool {
        let Ok(guard) = self.stopped.lock() else {
            return true;
        };
        match self.wake.wait_timeout_while(guard, interval, |stopped| !*stopped) {
            Ok((stopped, _)) => *stopped,
            Err(_) => true,
        }
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
