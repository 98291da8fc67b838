//! Cliente bloqueante para la API de mensajes de Anthropic (`/v1/messages`).

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use super::ChatModel;
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::models::Message;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicModel {
    config: ModelConfig,
    client: Client,
    key: HeaderValue,
}

impl AnthropicModel {
    /// Falla si no hay clave de API.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let raw = config.api_key
                        .as_deref()
                        .ok_or_else(|| ModelError::InvalidRequest("anthropic api key is required".into()))?;
        let key = HeaderValue::from_str(raw).map_err(|e| ModelError::InvalidRequest(e.to_string()))?;
        let client = Client::builder().timeout(config.timeout)
                                      .build()
                                      .map_err(|e| ModelError::InvalidRequest(format!("http client: {e}")))?;
        Ok(Self { config, client, key })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", self.key.clone());
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers
    }

    pub fn build_payload(&self, history: &[Message], user_message: &str) -> Value {
        let mut messages: Vec<Value> = history.iter()
                                              .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                                              .collect();
        messages.push(json!({ "role": "user", "content": user_message }));
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages,
            "temperature": self.config.temperature,
        })
    }
}

/// Concatena los bloques `text` de `content`. Un objeto `error` en el cuerpo
/// se trata como respuesta inválida.
pub fn parse_message(body: &str) -> Result<String, ModelError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let msg = err.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error");
        return Err(ModelError::InvalidResponse(format!("api error: {msg}")));
    }
    let blocks = value.get("content")
                      .and_then(|c| c.as_array())
                      .ok_or_else(|| ModelError::InvalidResponse("missing content".into()))?;
    let text: String = blocks.iter()
                             .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                             .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                             .collect();
    if text.is_empty() {
        return Err(ModelError::Empty);
    }
    Ok(text)
}

impl ChatModel for AnthropicModel {
    fn complete(&self, history: &[Message], user_message: &str) -> Result<String, ModelError> {
        let url = self.config.messages_url();
        debug!("model request: {} ({} history messages)", url, history.len());
        let response = self.client
                           .post(&url)
                           .headers(self.headers())
                           .json(&self.build_payload(history, user_message))
                           .send()
                           .map_err(|e| if e.is_timeout() { ModelError::Timeout } else { ModelError::Network(e.to_string()) })?;
        let status = response.status();
        let text = response.text().map_err(|e| ModelError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(ModelError::Status { status: status.as_u16(), body: text });
        }
        parse_message(&text)
    }
}
