//! Modelo local con respuestas programadas, para tests y uso sin red.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::ChatModel;
use crate::error::ModelError;
use crate::models::Message;

/// Devuelve en orden los resultados encolados con `push_*`; con la cola
/// vacía responde con un eco del mensaje.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: Mutex<usize>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Ok(reply.into()));
        }
        self
    }

    pub fn push_error(&self, err: ModelError) -> &Self {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Err(err));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

impl ChatModel for ScriptedModel {
    fn complete(&self, history: &[Message], user_message: &str) -> Result<String, ModelError> {
        if let Ok(mut c) = self.calls.lock() {
            *c += 1;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(format!("echo ({} previous): {}", history.len(), user_message)))
    }
}
