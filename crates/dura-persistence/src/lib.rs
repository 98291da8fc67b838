//! dura-persistence
//!
//! Backend Postgres (Diesel) de los traits de almacenamiento:
//! `WorkflowStore` del motor y `ChatStore` del dominio de chat.
//!
//! Módulos:
//! - `pg`: pool, proveedor de conexiones y las dos implementaciones.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, DbRetry, PgChatStore, PgPool, PgWorkflowStore,
             PoolProvider};
