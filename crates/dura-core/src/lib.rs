//! dura-core: motor de workflows durables.
//!
//! Una función de workflow recibe un `WorkflowContext` y sólo produce efectos
//! a través de `run_step`. Cada step se memoiza por posición en un
//! `WorkflowStore`; tras un reinicio, `RecoveryManager` vuelve a ejecutar las
//! funciones pendientes desde el principio y los steps ya registrados se
//! reproducen sin invocar su cuerpo.
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod hashing;
pub mod model;
pub mod registry;
pub mod step;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use engine::{RecoveryManager, RecoveryReport, RecoverySummary, RuntimeBuilder, WorkflowContext, WorkflowHandle,
                 WorkflowRuntime};
pub use errors::{classify_error, DurableError, ErrorClass, StepError, StoreError};
pub use model::{lease_cutoff, ExecutionOutcome, ExecutionStatus, NewExecution, StepOutcome, StepRecord, StepStatus,
                WorkflowExecution};
pub use registry::{WorkflowFn, WorkflowRegistry};
pub use step::{RetryPolicy, StepAttempt, StepOptions};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
