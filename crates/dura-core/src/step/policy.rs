//! Política de reintentos de un step y opciones por clase de step.

use std::time::Duration;

/// Backoff exponencial acotado.
///
/// `max_attempts` cuenta intentos totales (no reintentos): con `3` el cuerpo
/// se invoca como máximo tres veces.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3,
               initial_backoff: Duration::from_millis(100),
               backoff_factor: 2.0,
               max_backoff: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    /// Un único intento.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, factor: f64, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.backoff_factor = if factor < 1.0 { 1.0 } else { factor };
        self.max_backoff = max;
        self
    }

    /// Espera antes del intento `attempt + 1`, tras fallar el intento
    /// `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn allows_another(&self, attempts_done: u32) -> bool {
        attempts_done < self.max_attempts
    }
}

/// Opciones de un `run_step`. Precedencia: `retry` explícito > clase
/// configurada en el `EngineConfig` > política por defecto.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOptions {
    pub class: Option<String>,
    pub retry: Option<RetryPolicy>,
}

impl StepOptions {
    pub fn class(name: impl Into<String>) -> Self {
        Self { class: Some(name.into()), retry: None }
    }

    pub fn retry(policy: RetryPolicy) -> Self {
        Self { class: None, retry: Some(policy) }
    }
}
