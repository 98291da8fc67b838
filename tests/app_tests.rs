use std::sync::Arc;
use std::time::Duration;

use dura_chat::{ChatStore, InMemoryChatStore, ModelConfig, ModelError, Role, ScriptedModel, SendMessageInput,
                MODEL_CALL_CLASS, SEND_MESSAGE};
use dura_core::{EngineConfig, ExecutionStatus, InMemoryWorkflowStore, NewExecution, RetryPolicy, WorkflowStore};
use durachat::config::with_model_policy;
use durachat::{App, AppError};
use uuid::Uuid;

fn engine_config() -> EngineConfig {
    let quick = RetryPolicy::default().with_backoff(Duration::from_millis(1), 2.0, Duration::from_millis(2));
    let engine = EngineConfig::default().with_default_retry(quick).with_result_poll_interval(Duration::from_millis(10));
    let model = ModelConfig { max_attempts: 3, ..ModelConfig::default() };
    let engine = with_model_policy(engine, &model);
    let class = engine.step_classes[MODEL_CALL_CLASS].clone();
    engine.with_step_class(MODEL_CALL_CLASS,
                           class.with_backoff(Duration::from_millis(1), 2.0, Duration::from_millis(2)))
}

struct World {
    workflows: Arc<InMemoryWorkflowStore>,
    chat: Arc<InMemoryChatStore>,
}

impl World {
    fn new() -> Self {
        Self { workflows: Arc::new(InMemoryWorkflowStore::new()), chat: Arc::new(InMemoryChatStore::new()) }
    }

    /// Un "proceso": app nueva sobre los mismos stores.
    fn boot(&self, model: Arc<ScriptedModel>) -> App<InMemoryWorkflowStore> {
        App::new(self.workflows.clone(), self.chat.clone(), model, engine_config()).unwrap()
    }
}

#[test]
fn conversation_round_trip_through_the_app() {
    let world = World::new();
    let model = Arc::new(ScriptedModel::new());
    model.push_reply("¡hola!");
    let app = world.boot(model);

    let conv = app.create_conversation(None).unwrap();
    let out = app.send_message(conv.id, "hola", None).unwrap();
    assert_eq!(out.assistant_message.content, "¡hola!");

    let messages = app.list_messages(conv.id).unwrap();
    assert_eq!(messages.iter().map(|m| m.role).collect::<Vec<_>>(), vec![Role::User, Role::Assistant]);
    assert_eq!(app.list_conversations().unwrap(), vec![conv.clone()]);

    assert!(app.delete_conversation(conv.id, None).unwrap());
    assert!(app.list_conversations().unwrap().is_empty());
    assert!(matches!(app.list_messages(conv.id), Err(AppError::NotFound(_))));
    assert!(app.shutdown());
}

#[test]
fn input_is_validated_before_starting_a_workflow() {
    let world = World::new();
    let app = world.boot(Arc::new(ScriptedModel::new()));
    let conv = app.create_conversation(None).unwrap();

    let blank = app.send_message(conv.id, "  ", None).unwrap_err();
    assert_eq!(blank.exit_code(), 3);
    let missing = app.send_message(Uuid::new_v4(), "hola", None).unwrap_err();
    assert_eq!(missing.exit_code(), 4);
    // sólo existe la ejecución de create_conversation
    assert_eq!(world.workflows.execution_count(), 1);
}

#[test]
fn same_key_returns_the_recorded_reply() {
    let world = World::new();
    let model = Arc::new(ScriptedModel::new());
    model.push_reply("primera");
    let app = world.boot(model.clone());
    let conv = app.create_conversation(Some("conv-1".into())).unwrap();
    assert_eq!(app.create_conversation(Some("conv-1".into())).unwrap(), conv);

    let a = app.send_message(conv.id, "hola", Some("msg-1".into())).unwrap();
    let b = app.send_message(conv.id, "hola", Some("msg-1".into())).unwrap();
    assert_eq!(a, b);
    assert_eq!(model.calls(), 1);
    assert_eq!(app.list_messages(conv.id).unwrap().len(), 2);
}

#[test]
fn restart_resumes_an_interrupted_send() {
    let world = World::new();
    let conv = world.chat.create_conversation(Uuid::new_v4()).unwrap();
    // el proceso anterior registró la ejecución y murió antes de ejecutarla
    let input = SendMessageInput { conversation_id: conv.id, content: "¿sigues ahí?".into() };
    world.workflows
         .create_execution_if_absent(NewExecution { id: "send-1".into(),
                                                    workflow_name: SEND_MESSAGE.into(),
                                                    input: serde_json::to_value(&input).unwrap() })
         .unwrap();

    let model = Arc::new(ScriptedModel::new());
    model.push_error(ModelError::Status { status: 502, body: "gateway".into() }).push_reply("sí");
    let app = world.boot(model.clone());
    assert_eq!(app.pending().unwrap().len(), 1);

    let summary = app.recover_and_wait().unwrap();
    assert_eq!((summary.resumed, summary.succeeded), (1, 1));
    assert!(app.pending().unwrap().is_empty());
    assert_eq!(model.calls(), 2);

    let report = app.status("send-1").unwrap();
    assert_eq!(report.execution.status, ExecutionStatus::Success);
    assert_eq!(report.steps.len(), 4);
    assert_eq!(report.steps[2].attempt_count, 2);
    let contents: Vec<String> = app.list_messages(conv.id).unwrap().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["¿sigues ahí?", "sí"]);
}

#[test]
fn forget_only_removes_finished_executions() {
    let world = World::new();
    let app = world.boot(Arc::new(ScriptedModel::new()));
    world.workflows
         .create_execution_if_absent(NewExecution { id: "stuck".into(),
                                                    workflow_name: SEND_MESSAGE.into(),
                                                    input: serde_json::json!({}) })
         .unwrap();
    let rejected = app.forget("stuck").unwrap_err();
    assert_eq!(rejected.exit_code(), 4);
    assert!(matches!(app.forget("nope"), Err(AppError::NotFound(_))));

    app.create_conversation(Some("c".into())).unwrap();
    app.forget("c").unwrap();
    assert!(matches!(app.status("c"), Err(AppError::NotFound(_))));
}

#[test]
fn single_conversation_is_read_or_reported_missing() {
    let world = World::new();
    let app = world.boot(Arc::new(ScriptedModel::new()));
    let conv = app.create_conversation(None).unwrap();
    assert_eq!(app.get_conversation(conv.id).unwrap(), conv);

    let missing = app.get_conversation(Uuid::new_v4()).unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
    assert_eq!(missing.exit_code(), 4);
}

#[test]
fn key_reused_with_other_content_is_rejected() {
    let world = World::new();
    let model = Arc::new(ScriptedModel::new());
    model.push_reply("vale");
    let app = world.boot(model.clone());
    let conv = app.create_conversation(None).unwrap();
    app.send_message(conv.id, "hola", Some("msg-1".into())).unwrap();

    let err = app.send_message(conv.id, "adiós", Some("msg-1".into())).unwrap_err();
    assert!(matches!(err, AppError::Rejected(_)));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(model.calls(), 1);
    assert_eq!(app.list_messages(conv.id).unwrap().len(), 2);
}
