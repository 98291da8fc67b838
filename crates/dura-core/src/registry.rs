//! Registro explícito de funciones de workflow.
//!
//! Se construye antes de lanzar el runtime y se congela al entregarlo a
//! `WorkflowRuntime::builder(..).registry(..)`: a partir de ahí sólo se lee.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::engine::WorkflowContext;
use crate::errors::DurableError;

/// Función registrada, ya borrada de tipo (entrada y salida en JSON).
pub type WorkflowFn = Arc<dyn Fn(&mut WorkflowContext<'_>, Value) -> Result<Value, DurableError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct WorkflowRegistry {
    entries: IndexMap<String, WorkflowFn>,
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry").field("names", &self.names()).finish()
    }
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asocia `name` a una función tipada. La entrada se deserializa desde el
    /// JSON persistido en cada (re)ejecución; la salida se serializa al
    /// finalizar.
    pub fn register<I, O, F>(&mut self, name: &str, f: F) -> Result<(), DurableError>
        where I: DeserializeOwned,
              O: Serialize,
              F: Fn(&mut WorkflowContext<'_>, I) -> Result<O, DurableError> + Send + Sync + 'static
    {
        if self.entries.contains_key(name) {
            return Err(DurableError::DuplicateWorkflow(name.to_string()));
        }
        let wrapped: WorkflowFn = Arc::new(move |ctx: &mut WorkflowContext<'_>, raw: Value| {
            let input: I = serde_json::from_value(raw).map_err(|e| DurableError::Serialization(format!("input: {e}")))?;
            let output = f(ctx, input)?;
            serde_json::to_value(output).map_err(|e| DurableError::Serialization(format!("output: {e}")))
        });
        self.entries.insert(name.to_string(), wrapped);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<WorkflowFn, DurableError> {
        self.entries.get(name).cloned().ok_or_else(|| DurableError::UnknownWorkflow(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Nombres en orden de registro.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
