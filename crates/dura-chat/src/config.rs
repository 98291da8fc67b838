//! Configuración del cliente del modelo.
//!
//! - `MODEL_PROVIDER` (`openai`): `openai` para endpoints compatibles con
//!   OpenAI, `anthropic` para la API de mensajes de Anthropic
//! - `MODEL_BASE_URL` (`http://localhost:8000`, o `https://api.anthropic.com`)
//! - `MODEL_NAME` (`meta-llama/Meta-Llama-3.1-8B-Instruct`, o
//!   `claude-sonnet-4-20250514`)
//! - `MODEL_API_KEY` (opcional con `openai`; con `anthropic` se acepta
//!   también `ANTHROPIC_API_KEY` y es obligatoria)
//! - `MODEL_MAX_TOKENS` (4096), `MODEL_TEMPERATURE` (0.7)
//! - `MODEL_TIMEOUT_SECS` (120): timeout por petición
//! - `MODEL_MAX_ATTEMPTS` (5): intentos del step `generate_reply`

use std::env;
use std::time::Duration;

use dura_core::config::{init_dotenv, ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelProvider {
    #[default]
    OpenAiCompat,
    Anthropic,
}

impl ModelProvider {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compat" => Some(Self::OpenAiCompat),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { provider: ModelProvider::OpenAiCompat,
               base_url: "http://localhost:8000".into(),
               model: "meta-llama/Meta-Llama-3.1-8B-Instruct".into(),
               api_key: None,
               max_tokens: 4096,
               temperature: 0.7,
               timeout: Duration::from_secs(120),
               max_attempts: 5 }
    }
}

fn parsed<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError { var: var.into(), value: raw }),
        Err(_) => Ok(default),
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl ModelConfig {
    /// Valores por defecto para la API de Anthropic.
    pub fn anthropic() -> Self {
        Self { provider: ModelProvider::Anthropic,
               base_url: "https://api.anthropic.com".into(),
               model: "claude-sonnet-4-20250514".into(),
               ..Self::default() }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        init_dotenv();
        let provider = match env::var("MODEL_PROVIDER") {
            Ok(raw) => ModelProvider::parse(&raw).ok_or(ConfigError { var: "MODEL_PROVIDER".into(), value: raw })?,
            Err(_) => ModelProvider::default(),
        };
        let d = match provider {
            ModelProvider::OpenAiCompat => Self::default(),
            ModelProvider::Anthropic => Self::anthropic(),
        };
        let api_key = match provider {
            ModelProvider::OpenAiCompat => non_empty("MODEL_API_KEY"),
            ModelProvider::Anthropic => non_empty("MODEL_API_KEY").or_else(|| non_empty("ANTHROPIC_API_KEY")),
        };
        Ok(Self { provider,
                  base_url: env::var("MODEL_BASE_URL").unwrap_or(d.base_url),
                  model: env::var("MODEL_NAME").unwrap_or(d.model),
                  api_key,
                  max_tokens: parsed("MODEL_MAX_TOKENS", d.max_tokens)?,
                  temperature: parsed("MODEL_TEMPERATURE", d.temperature)?,
                  timeout: Duration::from_secs(parsed("MODEL_TIMEOUT_SECS", d.timeout.as_secs())?),
                  max_attempts: parsed("MODEL_MAX_ATTEMPTS", d.max_attempts)? })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}
