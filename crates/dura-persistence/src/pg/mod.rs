//! Implementaciones Postgres (Diesel) de los stores.
//!
//! - Cada operación corre en su propia transacción `read_write` y se confirma
//!   antes de volver (commit síncrono).
//! - Las transiciones de estado son `UPDATE ... WHERE status IN (...)`: si no
//!   afecta filas, se lee y devuelve la fila ganadora.
//! - La creación de un step bloquea la fila de la ejecución (`FOR UPDATE`)
//!   para serializar escritores concurrentes del mismo workflow.
//! - Errores transitorios (pool, serialización, desconexión) se reintentan con
//!   un backoff lineal corto en `with_retry`, según el `DbRetry` del proveedor.

mod chat_store;
mod workflow_store;

pub use chat_store::PgChatStore;
pub use workflow_store::PgWorkflowStore;

use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use diesel::result::Error as DieselError;
use log::{debug, error, info, warn};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

/// Pool r2d2 de conexiones Postgres. Se construye con `min_idle` y
/// `max_size`; al construirlo se aplican las migraciones pendientes.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real o un proveedor de test sin acoplar los
/// stores a r2d2. Debe devolver una conexión válida o
/// `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;

    /// Reintentos de errores transitorios por unidad de trabajo.
    fn retry(&self) -> DbRetry {
        DbRetry::default()
    }
}

/// Reintentos de una transacción: el intento `n` espera `base * n` antes de
/// repetirse, hasta `attempts` reintentos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRetry {
    pub attempts: u32,
    pub base: Duration,
}

impl Default for DbRetry {
    fn default() -> Self {
        Self { attempts: 3, base: Duration::from_millis(15) }
    }
}

/// `ConnectionProvider` respaldado por un `PgPool`.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
    pub retry: DbRetry,
}

impl PoolProvider {
    pub fn new(pool: PgPool, retry: DbRetry) -> Self {
        Self { pool, retry }
    }
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }

    fn retry(&self) -> DbRetry {
        self.retry
    }
}

/// Determina si un error es transitorio.
///
/// Además de los casos tipados, hace un match de texto sobre errores
/// desconocidos (deadlocks, desconexiones) sin acoplarse a SQLSTATE.
pub(crate) fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => is_transient_message(msg),
        _ => false,
    }
}

/// Mensajes de errores sin tipar que indican un fallo pasajero del servidor
/// o de la conexión.
pub(crate) fn is_transient_message(msg: &str) -> bool {
    let m = msg.to_lowercase();
    ["deadlock detected",
     "could not serialize access due to concurrent update",
     "terminating connection due to administrator command",
     "connection closed",
     "connection refused",
     "timeout"].iter()
               .any(|needle| m.contains(needle))
}

/// Repite la unidad de trabajo `f` mientras falle de forma transitoria y
/// queden reintentos en `retry`. Cada intento es una transacción completa.
pub(crate) fn with_retry<F, T>(retry: DbRetry, mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut done = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && done < retry.attempts => {
                done += 1;
                let delay = retry.base * done;
                warn!("retryable error (retry {}/{}): {:?} -> sleeping {:?}", done, retry.attempts, e, delay);
                std::thread::sleep(delay);
            }
            r => return r,
        }
    }
}

/// Ejecuta `f` en una transacción read-write con reintento de errores
/// transitorios. Cada intento toma una conexión nueva del proveedor.
pub(crate) fn run_tx<P, T, F>(provider: &P, op: &str, f: F) -> Result<T, PersistenceError>
    where P: ConnectionProvider + ?Sized,
          F: Fn(&mut PgConnection) -> Result<T, DieselError>
{
    debug!("{op}:start");
    let out = with_retry(provider.retry(), || {
        let mut conn = provider.connection()?;
        conn.build_transaction().read_write().run(|tx| f(tx)).map_err(PersistenceError::from)
    });
    match &out {
        Ok(_) => debug!("{op}:done"),
        Err(e) => error!("{op}:error {e}"),
    }
    out
}

/// Construye un pool a partir de URL y aplica migraciones.
///
/// Tamaños 0 se elevan a 1; si `min_size > max_size` se usa `min = max`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min.min(validated_max)))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    info!("postgres pool ready (min={}, max={})", validated_min.min(validated_max), validated_max);
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
