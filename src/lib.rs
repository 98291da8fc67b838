//! durachat: aplicación de chat sobre el motor de workflows durables.
//!
//! - `config`: `AppConfig` leída del entorno.
//! - `app`: registro + runtime + recuperación y las operaciones de chat.
//! - `cli`: parseo de argumentos del binario.

pub mod app;
pub mod cli;
pub mod config;

pub use app::{App, AppError, ExecutionReport};
pub use cli::{parse_args, CliError, Command, USAGE};
pub use config::AppConfig;
