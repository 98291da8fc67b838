//! Configuración del motor desde variables de entorno.
//!
//! Variables (todas opcionales):
//! - `DURA_STEP_MAX_ATTEMPTS`, `DURA_STEP_INITIAL_BACKOFF_MS`,
//!   `DURA_STEP_BACKOFF_FACTOR`, `DURA_STEP_MAX_BACKOFF_MS`: política por
//!   defecto de los steps.
//! - `DURA_RESULT_POLL_MS`: cota de espera entre relecturas del store en
//!   `get_result`.
//! - `DURA_MAX_RECOVERY_ATTEMPTS`: veces que una ejecución puede reclamarse
//!   antes de darla por fallida.
//! - `DURA_SHUTDOWN_TIMEOUT_MS`: espera máxima de `shutdown`.
//! - `DURA_EXECUTOR_LEASE_MS`: antigüedad del último latido a partir de la
//!   cual otra instancia puede reclamar una ejecución `Running`.
//! - `DURA_EXECUTOR_ID`: identidad fija del executor; si falta se genera
//!   una por runtime.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::constants::DEFAULT_MAX_RECOVERY_ATTEMPTS;
use crate::step::RetryPolicy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_retry: RetryPolicy,
    /// Políticas por clase de step (p.ej. `model_call`).
    pub step_classes: IndexMap<String, RetryPolicy>,
    pub result_poll_interval: Duration,
    pub max_recovery_attempts: i32,
    pub shutdown_timeout: Duration,
    pub executor_lease: Duration,
    pub executor_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { default_retry: RetryPolicy::default(),
               step_classes: IndexMap::new(),
               result_poll_interval: Duration::from_millis(500),
               max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
               shutdown_timeout: Duration::from_secs(5),
               executor_lease: Duration::from_secs(30),
               executor_id: None }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid value for {var}: '{value}'")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
}

fn parse_var<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim()
                      .parse::<T>()
                      .map(Some)
                      .map_err(|_| ConfigError { var: var.to_string(), value: raw }),
        Err(_) => Ok(None),
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        init_dotenv();
        let defaults = Self::default();
        let base = defaults.default_retry.clone();
        let max_attempts = parse_var::<u32>("DURA_STEP_MAX_ATTEMPTS")?.unwrap_or(base.max_attempts);
        let initial = parse_var::<u64>("DURA_STEP_INITIAL_BACKOFF_MS")?.map(Duration::from_millis)
                                                                      .unwrap_or(base.initial_backoff);
        let factor = parse_var::<f64>("DURA_STEP_BACKOFF_FACTOR")?.unwrap_or(base.backoff_factor);
        let max_backoff = parse_var::<u64>("DURA_STEP_MAX_BACKOFF_MS")?.map(Duration::from_millis)
                                                                      .unwrap_or(base.max_backoff);
        let poll = parse_var::<u64>("DURA_RESULT_POLL_MS")?.map(Duration::from_millis)
                                                          .unwrap_or(defaults.result_poll_interval);
        let max_recovery = parse_var::<i32>("DURA_MAX_RECOVERY_ATTEMPTS")?.unwrap_or(defaults.max_recovery_attempts);
        let shutdown = parse_var::<u64>("DURA_SHUTDOWN_TIMEOUT_MS")?.map(Duration::from_millis)
                                                                   .unwrap_or(defaults.shutdown_timeout);
        let lease = parse_var::<u64>("DURA_EXECUTOR_LEASE_MS")?.map(Duration::from_millis)
                                                              .unwrap_or(defaults.executor_lease);
        let executor_id = env::var("DURA_EXECUTOR_ID").ok().filter(|v| !v.trim().is_empty());
        Ok(Self { default_retry: base.with_max_attempts(max_attempts).with_backoff(initial, factor, max_backoff),
                  step_classes: IndexMap::new(),
                  result_poll_interval: poll,
                  max_recovery_attempts: max_recovery,
                  shutdown_timeout: shutdown,
                  executor_lease: lease,
                  executor_id })
    }

    /// Registra (o reemplaza) la política de una clase de step.
    pub fn with_step_class(mut self, class: impl Into<String>, policy: RetryPolicy) -> Self {
        self.step_classes.insert(class.into(), policy);
        self
    }

    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    pub fn with_result_poll_interval(mut self, interval: Duration) -> Self {
        self.result_poll_interval = interval;
        self
    }

    pub fn with_max_recovery_attempts(mut self, max: i32) -> Self {
        self.max_recovery_attempts = max;
        self
    }

    pub fn with_executor_lease(mut self, lease: Duration) -> Self {
        self.executor_lease = lease;
        self
    }

    pub fn with_executor_id(mut self, id: impl Into<String>) -> Self {
        self.executor_id = Some(id.into());
        self
    }

    /// Intervalo de latido: un tercio del lease, con un mínimo de 1ms.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.executor_lease / 3).max(Duration::from_millis(1))
    }

    /// Resuelve la política efectiva de un step.
    pub fn resolve_retry(&self, options: &crate::step::StepOptions) -> RetryPolicy {
        if let Some(p) = &options.retry {
            return p.clone();
        }
        options.class
               .as_ref()
               .and_then(|c| self.step_classes.get(c))
               .cloned()
               .unwrap_or_else(|| self.default_retry.clone())
    }
}
