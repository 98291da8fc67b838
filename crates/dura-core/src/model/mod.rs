//! Modelo persistido: ejecuciones y registros de step.

pub mod execution;
pub mod step;

pub use execution::{lease_cutoff, ExecutionOutcome, ExecutionStatus, NewExecution, WorkflowExecution};
pub use step::{StepOutcome, StepRecord, StepStatus};
