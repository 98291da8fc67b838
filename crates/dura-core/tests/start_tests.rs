mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use dura_core::{DurableError, ExecutionOutcome, ExecutionStatus, InMemoryWorkflowStore, NewExecution, WorkflowRegistry,
                WorkflowRuntime, WorkflowStore};
use serde_json::json;

fn launch(calls: &Calls) -> WorkflowRuntime<InMemoryWorkflowStore> {
    WorkflowRuntime::builder(Arc::new(InMemoryWorkflowStore::new())).registry(pipeline_registry(calls))
                                                                     .config(fast_config())
                                                                     .launch()
}

#[test]
fn starting_same_id_twice_runs_function_once() {
    let calls = Calls::default();
    let runtime = launch(&calls);
    let a = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 3}), Some("k".into())).unwrap();
    let b = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 3}), Some("k".into())).unwrap();
    assert_eq!(a.get_result().unwrap(), PipelineOut { first: 4, second: 8 });
    assert_eq!(b.get_result().unwrap(), PipelineOut { first: 4, second: 8 });
    assert_eq!(calls.count("first"), 1);
    assert_eq!(calls.count("second"), 1);
    assert_eq!(runtime.store().execution_count(), 1);
}

#[test]
fn generated_ids_are_distinct() {
    let calls = Calls::default();
    let runtime = launch(&calls);
    let a = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 1}), None).unwrap();
    let b = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 1}), None).unwrap();
    assert_ne!(a.id(), b.id());
    a.get_result().unwrap();
    b.get_result().unwrap();
    assert_eq!(calls.count("first"), 2);
}

#[test]
fn unknown_workflow_is_rejected_before_touching_store() {
    let calls = Calls::default();
    let runtime = launch(&calls);
    let err = runtime.start::<_, PipelineOut>("missing", &json!({}), Some("u".into())).unwrap_err();
    assert_eq!(err, DurableError::UnknownWorkflow("missing".into()));
    assert_eq!(runtime.store().execution_count(), 0);
}

#[test]
fn reusing_id_for_other_workflow_conflicts() {
    let calls = Calls::default();
    let mut registry = pipeline_registry(&calls);
    registry.register("other", |_ctx, n: i64| Ok::<_, DurableError>(n)).unwrap();
    let runtime = WorkflowRuntime::builder(Arc::new(InMemoryWorkflowStore::new())).registry(registry)
                                                                                   .config(fast_config())
                                                                                   .launch();
    runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 1}), Some("x".into())).unwrap().get_result().unwrap();
    let err = runtime.start::<_, i64>("other", &1, Some("x".into())).unwrap_err();
    assert!(matches!(err, DurableError::ConflictingWorkflow { ref existing, .. } if existing == PIPELINE));
}

#[test]
fn result_is_observable_from_many_threads() {
    let calls = Calls::default();
    let runtime = launch(&calls);
    let handle = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 5}), Some("t".into())).unwrap();
    let waiters: Vec<_> = (0..4).map(|_| {
                                    let h = handle.clone();
                                    thread::spawn(move || h.get_result())
                                })
                                .collect();
    for w in waiters {
        assert_eq!(w.join().unwrap().unwrap(), PipelineOut { first: 6, second: 12 });
    }
}

#[test]
fn concurrent_finalization_keeps_single_outcome() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    store.create_execution_if_absent(NewExecution { id: "f".into(), workflow_name: PIPELINE.into(), input: json!(null) })
         .unwrap();
    let racers: Vec<_> = (0..8).map(|i| {
                                   let s = store.clone();
                                   thread::spawn(move || {
                                       let outcome = if i % 2 == 0 {
                                           ExecutionOutcome::Success(json!(i))
                                       } else {
                                           ExecutionOutcome::Error(format!("racer {i}"))
                                       };
                                       s.finalize_execution("f", outcome).unwrap()
                                   })
                               })
                               .collect();
    let rows: Vec<_> = racers.into_iter().map(|r| r.join().unwrap()).collect();
    assert!(rows.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.get_execution("f").unwrap().unwrap(), rows[0]);
}

#[test]
fn business_error_and_panic_end_in_error_state() {
    let mut registry = WorkflowRegistry::new();
    registry.register("refuse", |_ctx, _: ()| Err::<(), _>(DurableError::workflow("not allowed"))).unwrap();
    registry.register("explode", |_ctx, _: ()| -> Result<(), DurableError> { panic!("kaboom") }).unwrap();
    let runtime = WorkflowRuntime::builder(Arc::new(InMemoryWorkflowStore::new())).registry(registry)
                                                                                   .config(fast_config())
                                                                                   .launch();

    let refused = runtime.start::<_, ()>("refuse", &(), Some("r".into())).unwrap().get_result().unwrap_err();
    assert_eq!(refused, DurableError::ExecutionFailed { id: "r".into(), detail: "not allowed".into() });

    let exploded = runtime.start::<_, ()>("explode", &(), Some("p".into())).unwrap().get_result().unwrap_err();
    assert!(matches!(exploded, DurableError::ExecutionFailed { ref detail, .. } if detail.contains("kaboom")));
    assert_eq!(runtime.get_execution("p").unwrap().status, ExecutionStatus::Error);
}

#[test]
fn delete_is_refused_until_execution_is_terminal() {
    let calls = Calls::default();
    let runtime = launch(&calls);
    runtime.store()
           .create_execution_if_absent(NewExecution { id: "d".into(), workflow_name: PIPELINE.into(), input: json!({"base": 1}) })
           .unwrap();
    assert_eq!(runtime.delete_execution("d"), Err(DurableError::ExecutionActive("d".into())));

    let handle = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 1}), Some("d".into())).unwrap();
    handle.get_result().unwrap();
    runtime.delete_execution("d").unwrap();
    assert!(runtime.list_steps("d").unwrap().is_empty());
    assert_eq!(runtime.delete_execution("d"), Err(DurableError::ExecutionNotFound("d".into())));
}

#[test]
fn shutdown_drains_and_rejects_new_starts() {
    let calls = Calls::default();
    let runtime = launch(&calls);
    let handle = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 2}), None).unwrap();
    assert!(runtime.shutdown_with_timeout(Duration::from_secs(5)));
    assert_eq!(runtime.active_count(), 0);
    assert_eq!(handle.get_result().unwrap(), PipelineOut { first: 3, second: 6 });
    let err = runtime.start::<_, PipelineOut>(PIPELINE, &json!({"base": 2}), None).unwrap_err();
    assert_eq!(err, DurableError::ShuttingDown);
}
