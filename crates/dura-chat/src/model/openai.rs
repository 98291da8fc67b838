//! Cliente bloqueante para endpoints `/v1/chat/completions` compatibles con
//! OpenAI (vLLM, llama.cpp server, etc.).

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use super::ChatModel;
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::models::Message;

pub struct OpenAiCompatModel {
    config: ModelConfig,
    client: Client,
}

impl OpenAiCompatModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(config.timeout)
                                      .build()
                                      .map_err(|e| ModelError::InvalidRequest(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn headers(&self) -> Result<HeaderMap, ModelError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| ModelError::InvalidRequest(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    pub fn build_payload(&self, history: &[Message], user_message: &str) -> Value {
        let mut messages: Vec<Value> = history.iter()
                                              .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                                              .collect();
        messages.push(json!({ "role": "user", "content": user_message }));
        json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }
}

/// Extrae `choices[0].message.content`.
pub fn parse_completion(body: &str) -> Result<String, ModelError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
    let choices = value.get("choices")
                       .and_then(|c| c.as_array())
                       .ok_or_else(|| ModelError::InvalidResponse("missing choices".into()))?;
    let first = choices.first().ok_or(ModelError::Empty)?;
    first.get("message")
         .and_then(|m| m.get("content"))
         .and_then(|c| c.as_str())
         .map(|s| s.to_string())
         .ok_or_else(|| ModelError::InvalidResponse("missing message content".into()))
}

impl ChatModel for OpenAiCompatModel {
    fn complete(&self, history: &[Message], user_message: &str) -> Result<String, ModelError> {
        let url = self.config.completions_url();
        debug!("model request: {} ({} history messages)", url, history.len());
        let response = self.client
                           .post(&url)
                           .headers(self.headers()?)
                           .json(&self.build_payload(history, user_message))
                           .send()
                           .map_err(|e| if e.is_timeout() { ModelError::Timeout } else { ModelError::Network(e.to_string()) })?;
        let status = response.status();
        let text = response.text().map_err(|e| ModelError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(ModelError::Status { status: status.as_u16(), body: text });
        }
        parse_completion(&text)
    }
}
