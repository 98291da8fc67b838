//! Configuración de la aplicación.
//! Junta las tres secciones que se leen del entorno (.env incluido): base de
//! datos, motor y cliente del modelo. La política de la clase `model_call` se
//! deriva de `MODEL_MAX_ATTEMPTS`.

use dura_chat::{ChatWorkflows, ModelConfig, MODEL_CALL_CLASS};
use dura_core::EngineConfig;
use dura_persistence::DbConfig;

use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DbConfig,
    pub engine: EngineConfig,
    pub model: ModelConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dura_persistence::init_dotenv();
        let database = DbConfig::from_env()?;
        let model = ModelConfig::from_env()?;
        let engine = with_model_policy(EngineConfig::from_env()?, &model);
        Ok(Self { database, engine, model })
    }
}

/// Registra la política de `model_call` salvo que ya exista una.
pub fn with_model_policy(engine: EngineConfig, model: &ModelConfig) -> EngineConfig {
    if engine.step_classes.contains_key(MODEL_CALL_CLASS) {
        return engine;
    }
    engine.with_step_class(MODEL_CALL_CLASS, ChatWorkflows::model_call_policy(model.max_attempts))
}
