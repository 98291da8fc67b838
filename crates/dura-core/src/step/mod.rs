//! Ejecución memoizada de steps: política de reintentos, intento en curso y
//! el `StepRunner` que consulta y escribe el log de steps.

pub mod attempt;
pub mod policy;
pub mod runner;

pub use attempt::StepAttempt;
pub use policy::{RetryPolicy, StepOptions};
pub use runner::StepRunner;
