//! Configuración de conexión desde variables de entorno.
//! Convención `DATABASE_URL` más tamaños opcionales del pool y los
//! reintentos de transacciones (`DATABASE_RETRY_ATTEMPTS`,
//! `DATABASE_RETRY_BASE_MS`).

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;
use crate::pg::DbRetry;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        let min_connections = env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(2);
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(16);
        let defaults = DbRetry::default();
        let retry_attempts =
            env::var("DATABASE_RETRY_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.attempts);
        let retry_base_ms = env::var("DATABASE_RETRY_BASE_MS").ok()
                                                              .and_then(|v| v.parse().ok())
                                                              .unwrap_or(defaults.base.as_millis() as u64);
        Ok(Self { url,
                  min_connections,
                  max_connections,
                  retry_attempts,
                  retry_base_ms })
    }

    pub fn retry(&self) -> DbRetry {
        DbRetry { attempts: self.retry_attempts,
                  base: Duration::from_millis(self.retry_base_ms) }
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_settings_become_db_retry() {
        let cfg = DbConfig { url: "postgres://localhost/dura".into(),
                             min_connections: 1,
                             max_connections: 4,
                             retry_attempts: 5,
                             retry_base_ms: 40 };
        assert_eq!(cfg.retry(), DbRetry { attempts: 5, base: Duration::from_millis(40) });
    }
}
