mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use dura_core::constants::MAX_RECOVERY_EXCEEDED;
use dura_core::{DurableError, EngineConfig, ExecutionOutcome, ExecutionStatus, InMemoryWorkflowStore, NewExecution,
                RecoveryManager, RecoverySummary, StepOutcome, StepRecord, StoreError, WorkflowExecution, WorkflowRuntime,
                WorkflowStore};
use serde_json::json;

#[test]
fn every_pending_execution_reaches_terminal_state() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    for i in 0..5 {
        crashed_after_first(&store, &format!("n{i}"), i);
    }
    let calls = Calls::default();
    let runtime = WorkflowRuntime::builder(store.clone()).registry(pipeline_registry(&calls))
                                                         .config(fast_config())
                                                         .launch();
    let summary = RecoveryManager::new(runtime.clone()).recover_and_wait().unwrap();
    assert_eq!(summary, RecoverySummary { resumed: 5, succeeded: 5, failed: 0, interrupted: 0, owned_elsewhere: 0 });
    assert_eq!(calls.count("first"), 0);
    assert_eq!(calls.count("second"), 5);
    assert!(runtime.list_pending().unwrap().is_empty());
    for i in 0..5i64 {
        let row = runtime.get_execution(&format!("n{i}")).unwrap();
        assert_eq!(row.output, Some(json!({"first": i + 1, "second": (i + 1) * 2})));
    }
}

#[test]
fn unregistered_name_aborts_recovery_before_resuming_anything() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    crashed_after_first(&store, "good", 1);
    simulate_crash(&store, "orphan", "ghost", json!(null), &[]);
    let calls = Calls::default();
    let runtime = WorkflowRuntime::builder(store).registry(pipeline_registry(&calls)).config(fast_config()).launch();

    let err = RecoveryManager::new(runtime.clone()).recover().unwrap_err();
    assert_eq!(err, DurableError::UnknownWorkflow("ghost".into()));
    assert_eq!(runtime.active_count(), 0);
    assert_eq!(runtime.get_execution("good").unwrap().status, ExecutionStatus::Running);
    assert_eq!(calls.count("second"), 0);
}

#[test]
fn execution_claimed_too_often_is_given_up() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    crashed_after_first(&store, "poison", 1);
    store.claim_execution("poison", CRASHED_EXECUTOR, LEASE).unwrap();
    expire_lease();
    let calls = Calls::default();
    let runtime = WorkflowRuntime::builder(store).registry(pipeline_registry(&calls))
                                                 .config(fast_config().with_max_recovery_attempts(2))
                                                 .launch();
    let summary = RecoveryManager::new(runtime.clone()).recover_and_wait().unwrap();
    assert_eq!(summary.failed, 1);
    let row = runtime.get_execution("poison").unwrap();
    assert_eq!(row.status, ExecutionStatus::Error);
    assert_eq!(row.error_detail.as_deref(), Some(MAX_RECOVERY_EXCEEDED));
    assert_eq!(calls.count("second"), 0);
}

#[test]
fn nothing_pending_means_empty_report() {
    let runtime = WorkflowRuntime::builder(Arc::new(InMemoryWorkflowStore::new())).config(EngineConfig::default()).launch();
    assert!(RecoveryManager::new(runtime).recover().unwrap().is_empty());
}

/// Store que falla al cerrar steps mientras `down` está activo.
struct FlakyStore {
    inner: InMemoryWorkflowStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) { Err(StoreError::Unavailable("connection lost".into())) } else { Ok(()) }
    }
}

impl WorkflowStore for FlakyStore {
    fn create_execution_if_absent(&self, new: NewExecution) -> Result<(WorkflowExecution, bool), StoreError> {
        self.inner.create_execution_if_absent(new)
    }
    fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>, StoreError> {
        self.inner.get_execution(id)
    }
    fn claim_execution(&self, id: &str, executor_id: &str, lease: Duration)
                       -> Result<(WorkflowExecution, bool), StoreError> {
        self.inner.claim_execution(id, executor_id, lease)
    }
    fn heartbeat(&self, id: &str, executor_id: &str) -> Result<bool, StoreError> {
        self.inner.heartbeat(id, executor_id)
    }
    fn finalize_execution(&self, id: &str, outcome: ExecutionOutcome) -> Result<WorkflowExecution, StoreError> {
        self.check()?;
        self.inner.finalize_execution(id, outcome)
    }
    fn list_pending_executions(&self) -> Result<Vec<WorkflowExecution>, StoreError> {
        self.inner.list_pending_executions()
    }
    fn get_step(&self, workflow_id: &str, step_number: i32) -> Result<Option<StepRecord>, StoreError> {
        self.inner.get_step(workflow_id, step_number)
    }
    fn begin_step(&self, workflow_id: &str, step_number: i32, step_name: &str) -> Result<StepRecord, StoreError> {
        self.inner.begin_step(workflow_id, step_number, step_name)
    }
    fn record_attempt(&self, workflow_id: &str, step_number: i32, attempt_count: i32) -> Result<StepRecord, StoreError> {
        self.inner.record_attempt(workflow_id, step_number, attempt_count)
    }
    fn complete_step(&self, workflow_id: &str, step_number: i32, outcome: StepOutcome) -> Result<StepRecord, StoreError> {
        self.check()?;
        self.inner.complete_step(workflow_id, step_number, outcome)
    }
    fn list_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        self.inner.list_steps(workflow_id)
    }
    fn delete_execution(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_execution(id)
    }
}

#[test]
fn store_outage_leaves_execution_recoverable() {
    let store = Arc::new(FlakyStore { inner: InMemoryWorkflowStore::new(), down: AtomicBool::new(true) });
    let calls = Calls::default();
    let runtime = WorkflowRuntime::builder(store.clone()).registry(pipeline_registry(&calls))
                                                         .config(fast_config())
                                                         .launch();
    let err = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 4}), Some("o".into()))
                     .unwrap()
                     .get_result()
                     .unwrap_err();
    assert!(matches!(err, DurableError::PersistenceFailure(StoreError::Unavailable(_))), "{err:?}");
    assert_eq!(runtime.get_execution("o").unwrap().status, ExecutionStatus::Running);
    assert!(runtime.shutdown());

    // "reinicio": nuevo runtime sobre el mismo store, ya disponible
    store.down.store(false, Ordering::SeqCst);
    expire_lease();
    let restarted = WorkflowRuntime::builder(store).registry(pipeline_registry(&calls)).config(fast_config()).launch();
    let summary = RecoveryManager::new(restarted.clone()).recover_and_wait().unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(restarted.get_execution("o").unwrap().output, Some(json!({"first": 5, "second": 10})));
    // el cuerpo de `first` llegó a ejecutarse pero su resultado nunca se
    // registró: se repite una vez
    assert_eq!(calls.count("first"), 2);
}

#[test]
fn recovery_leaves_live_execution_of_other_runtime_alone() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let calls = Calls::default();
    let (entered, release) = (Gate::default(), Gate::default());
    let config = fast_config().with_executor_lease(Duration::from_secs(5));
    let a = WorkflowRuntime::builder(store.clone()).registry(gated_pipeline_registry(&calls, &entered, &release))
                                                   .config(config.clone())
                                                   .launch();
    let b = WorkflowRuntime::builder(store.clone()).registry(gated_pipeline_registry(&calls, &entered, &release))
                                                   .config(config)
                                                   .launch();
    assert_ne!(a.executor_id(), b.executor_id());

    let handle = a.start::<_, PipelineOut>(PIPELINE, &json!({"base": 1}), Some("live".into())).unwrap();
    assert!(entered.wait(Duration::from_secs(5)));

    let summary = RecoveryManager::new(b.clone()).recover_and_wait().unwrap();
    assert_eq!(summary, RecoverySummary { owned_elsewhere: 1, ..Default::default() });

    // arrancar el mismo id desde B tampoco lo conduce: espera al resultado de A
    let attached = b.start::<_, PipelineOut>(PIPELINE, &json!({"base": 1}), Some("live".into())).unwrap();
    release.open();
    assert_eq!(handle.get_result().unwrap(), PipelineOut { first: 2, second: 4 });
    assert_eq!(attached.get_result().unwrap(), PipelineOut { first: 2, second: 4 });
    assert_eq!(calls.count("first"), 1);
    assert_eq!(calls.count("second"), 1);

    let row = a.get_execution("live").unwrap();
    assert_eq!(row.recovery_attempts, 1);
    assert_eq!(row.executor_id.as_deref(), Some(a.executor_id()));
}

#[test]
fn held_execution_is_taken_over_once_its_lease_expires() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    store.create_execution_if_absent(NewExecution { id: "late".into(),
                                                    workflow_name: PIPELINE.into(),
                                                    input: json!({"base": 2}) })
         .unwrap();
    let lease = Duration::from_millis(300);
    store.claim_execution("late", CRASHED_EXECUTOR, lease).unwrap();
    let calls = Calls::default();
    let runtime = WorkflowRuntime::builder(store).registry(pipeline_registry(&calls))
                                                 .config(fast_config().with_executor_lease(lease))
                                                 .launch();

    let report = RecoveryManager::new(runtime.clone()).recover().unwrap();
    assert!(report.is_empty());
    assert_eq!(report.owned_elsewhere, vec!["late".to_string()]);
    assert_eq!(calls.count("first"), 0);

    std::thread::sleep(lease + Duration::from_millis(50));
    let summary = RecoveryManager::new(runtime.clone()).recover_and_wait().unwrap();
    assert_eq!(summary.succeeded, 1);
    let row = runtime.get_execution("late").unwrap();
    assert_eq!(row.executor_id.as_deref(), Some(runtime.executor_id()));
    assert_eq!(row.recovery_attempts, 2);
    assert_eq!(calls.count("second"), 1);
}

#[test]
fn fixed_executor_id_reclaims_its_own_executions_at_once() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    store.create_execution_if_absent(NewExecution { id: "mine".into(),
                                                    workflow_name: PIPELINE.into(),
                                                    input: json!({"base": 3}) })
         .unwrap();
    store.claim_execution("mine", "ex-web-1", Duration::from_secs(60)).unwrap();
    let calls = Calls::default();
    let runtime = WorkflowRuntime::builder(store).registry(pipeline_registry(&calls))
                                                 .config(fast_config().with_executor_lease(Duration::from_secs(60))
                                                                      .with_executor_id("ex-web-1"))
                                                 .launch();
    let summary = RecoveryManager::new(runtime).recover_and_wait().unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.owned_elsewhere, 0);
}
