//! Handles de resultado y el hub que despierta a los que esperan.
//!
//! El store es la única fuente de verdad: un handle siempre decide leyendo la
//! fila de la ejecución. El `ResultHub` sólo sirve para no tener que esperar
//! al siguiente intervalo de sondeo cuando la ejecución termina en este
//! proceso.

use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::DurableError;
use crate::model::{ExecutionStatus, WorkflowExecution};
use crate::store::WorkflowStore;

#[derive(Debug, Clone)]
enum HubEvent {
    Finalized,
    /// El conductor abandonó la ejecución sin finalizarla (fallo de
    /// persistencia). Queda registrado hasta que se vuelva a conducir.
    Interrupted(DurableError),
}

#[derive(Debug, Default)]
struct SlotState {
    version: u64,
    last: Option<HubEvent>,
}

#[derive(Debug, Default)]
struct ResultSlot {
    state: Mutex<SlotState>,
    changed: Condvar,
}

impl ResultSlot {
    fn snapshot(&self) -> (u64, Option<DurableError>) {
        match self.state.lock() {
            Ok(st) => {
                let interrupted = match &st.last {
                    Some(HubEvent::Interrupted(e)) => Some(e.clone()),
                    _ => None,
                };
                (st.version, interrupted)
            }
            Err(_) => (0, None),
        }
    }

    fn publish(&self, event: HubEvent) {
        if let Ok(mut st) = self.state.lock() {
            st.version += 1;
            st.last = Some(event);
        }
        self.changed.notify_all();
    }

    /// Espera hasta que cambie la versión o venza `max_wait`.
    fn wait_change(&self, seen: u64, max_wait: Duration) {
        let Ok(guard) = self.state.lock() else {
            return;
        };
        let _ = self.changed.wait_timeout_while(guard, max_wait, |st| st.version == seen);
    }
}

#[derive(Debug, Default)]
pub struct ResultHub {
    slots: DashMap<String, Arc<ResultSlot>>,
}

impl ResultHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Arc<ResultSlot> {
        self.slots.entry(id.to_string()).or_default().clone()
    }

    /// La ejecución ya es terminal en el store.
    pub fn notify_finalized(&self, id: &str) {
        if let Some((_, slot)) = self.slots.remove(id) {
            slot.publish(HubEvent::Finalized);
        }
    }

    pub fn notify_interrupted(&self, id: &str, err: DurableError) {
        self.slot(id).publish(HubEvent::Interrupted(err));
    }

    /// Olvida una interrupción previa al volver a conducir la ejecución.
    pub fn clear(&self, id: &str) {
        let stale = self.slots
                        .get(id)
                        .map(|s| matches!(s.state.lock().map(|st| st.last.clone()), Ok(Some(HubEvent::Interrupted(_)))))
                        .unwrap_or(false);
        if stale {
            self.slots.remove(id);
        }
    }

    /// Descarta el slot si ya nadie lo espera.
    fn release(&self, id: &str) {
        self.slots.remove_if(id, |_, slot| {
                      Arc::strong_count(slot) == 1
                      && !matches!(slot.state.lock().map(|st| st.last.clone()), Ok(Some(HubEvent::Interrupted(_))))
                  });
    }

    pub fn waiting(&self) -> usize {
        self.slots.len()
    }
}

/// Handle a una ejecución. Clonable y enviable entre hilos; todas las copias
/// observan el mismo resultado terminal.
pub struct WorkflowHandle<O> {
    id: String,
    store: Arc<dyn WorkflowStore>,
    hub: Arc<ResultHub>,
    poll_interval: Duration,
    _output: PhantomData<fn() -> O>,
}

impl<O> Clone for WorkflowHandle<O> {
    fn clone(&self) -> Self {
        Self { id: self.id.clone(),
               store: Arc::clone(&self.store),
               hub: Arc::clone(&self.hub),
               poll_interval: self.poll_interval,
               _output: PhantomData }
    }
}

impl<O> std::fmt::Debug for WorkflowHandle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle").field("id", &self.id).finish()
    }
}

impl<O: DeserializeOwned> WorkflowHandle<O> {
    pub(crate) fn new(id: String, store: Arc<dyn WorkflowStore>, hub: Arc<ResultHub>, poll_interval: Duration) -> Self {
        Self { id,
               store,
               hub,
               poll_interval,
               _output: PhantomData }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> Result<ExecutionStatus, DurableError> {
        Ok(self.load()?.status)
    }

    /// Bloquea hasta que la ejecución sea terminal.
    pub fn get_result(&self) -> Result<O, DurableError> {
        self.wait(None)
    }

    /// Como `get_result` pero con plazo; al vencer devuelve `ResultTimeout`
    /// y la ejecución sigue su curso.
    pub fn get_result_timeout(&self, timeout: Duration) -> Result<O, DurableError> {
        self.wait(Some(Instant::now() + timeout))
    }

    fn load(&self) -> Result<WorkflowExecution, DurableError> {
        self.store.get_execution(&self.id)?.ok_or_else(|| DurableError::ExecutionNotFound(self.id.clone()))
    }

    /// Espera y, salga como salga, suelta el slot si nadie más lo usa.
    fn wait(&self, deadline: Option<Instant>) -> Result<O, DurableError> {
        let result = self.wait_terminal(deadline);
        self.hub.release(&self.id);
        result
    }

    fn wait_terminal(&self, deadline: Option<Instant>) -> Result<O, DurableError> {
        loop {
            let slot = self.hub.slot(&self.id);
            let (seen, interrupted) = slot.snapshot();
            let row = self.load()?;
            if row.is_terminal() {
                return decode(row);
            }
            if let Some(err) = interrupted {
                return Err(err);
            }
            let mut wait = self.poll_interval;
            if let Some(d) = deadline {
                let now = Instant::now();
                if now >= d {
                    return Err(DurableError::ResultTimeout(self.id.clone()));
                }
                wait = wait.min(d - now);
            }
            slot.wait_change(seen, wait);
        }
    }
}

fn decode<O: DeserializeOwned>(row: WorkflowExecution) -> Result<O, DurableError> {
    match row.status {
        ExecutionStatus::Success => {
            let raw = row.output.unwrap_or(Value::Null);
            serde_json::from_value(raw).map_err(|e| DurableError::Serialization(format!("execution {} output: {e}", row.id)))
        }
        _ => Err(DurableError::ExecutionFailed { id: row.id,
                                                 detail: row.error_detail.unwrap_or_default() }),
    }
}
