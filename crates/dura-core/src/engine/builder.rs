//! Builder del runtime: store obligatorio, registro y configuración.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::WorkflowRuntime;
use crate::registry::WorkflowRegistry;
use crate::store::WorkflowStore;

pub struct RuntimeBuilder<S: WorkflowStore + 'static> {
    pub(crate) store: Arc<S>,
    pub(crate) registry: WorkflowRegistry,
    pub(crate) config: EngineConfig,
}

impl<S: WorkflowStore + 'static> RuntimeBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store,
               registry: WorkflowRegistry::new(),
               config: EngineConfig::default() }
    }

    /// Registro ya poblado. El runtime lo toma por valor: después de
    /// `launch` no admite más registros.
    pub fn registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn launch(self) -> WorkflowRuntime<S> {
        WorkflowRuntime::from_parts(self.store, self.registry, self.config)
    }
}
