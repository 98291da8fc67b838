//! Runtime durable: contexto de workflow, conducción de ejecuciones,
//! handles de resultado y recuperación al arrancar.

pub mod builder;
pub mod context;
pub mod handle;
pub mod recovery;
pub mod runtime;

pub use builder::RuntimeBuilder;
pub use context::WorkflowContext;
pub use handle::{ResultHub, WorkflowHandle};
pub use recovery::{RecoveryManager, RecoveryReport, RecoverySummary};
pub use runtime::WorkflowRuntime;
