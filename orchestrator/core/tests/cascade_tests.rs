// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{flow_with, processor, service, GatedEngine};
use flowkeeper_core::domain::changes::TargetState;
use flowkeeper_core::domain::component::{ComponentId, GroupId, ProcessorState, ServiceState};
use flowkeeper_core::domain::config::{CascadeFailurePolicy, CoordinatorConfig, EngineSettings};
use flowkeeper_core::domain::engine::{EngineError, LifecycleAction};
use flowkeeper_core::domain::error::{ErrorKind, LifecycleError};
use flowkeeper_core::domain::events::LifecycleEvent;
use flowkeeper_core::domain::graph::ComponentRegistry;
use flowkeeper_core::infrastructure::InMemoryExecutionEngine;
use flowkeeper_core::LifecycleCoordinator;
use std::sync::Arc;
use std::time::Duration;

fn ids(values: &[&str]) -> Vec<ComponentId> {
    values.iter().map(|value| ComponentId::from(*value)).collect()
}

fn processor_state(flow: &common::Flow, id: &str) -> ProcessorState {
    let handle = flow
        .registry
        .find_processor(&GroupId::root(), &ComponentId::from(id))
        .unwrap();
    let state = handle.read().state();
    state
}

fn service_state(flow: &common::Flow, id: &str) -> ServiceState {
    let handle = flow.registry.find_controller_service(&ComponentId::from(id)).unwrap();
    let state = handle.read().state();
    state
}

fn engine_actions(engine: &InMemoryExecutionEngine) -> Vec<(ComponentId, LifecycleAction)> {
    engine
        .calls()
        .into_iter()
        .map(|call| (call.component_id, call.action))
        .collect()
}

/// Root `s1` (enabled), `s2 -> s1`, `s3 -> s2`, `p1 -> s3`, all else idle.
fn service_chain(engine: &InMemoryExecutionEngine) -> common::Flow {
    let flow = flow_with(Arc::new(engine.clone()), CoordinatorConfig::default());
    flow.registry
        .register_controller_service(service("s1", &[]).with_state(ServiceState::Enabled));
    flow.registry.register_controller_service(service("s2", &["s1"]));
    flow.registry.register_controller_service(service("s3", &["s2"]));
    flow.registry.register_processor(processor("p1", &["s3"]));
    flow
}

/// Root `s1` (enabled) referenced by running `p1`, `p2`, `p3`.
fn running_processors(engine: &InMemoryExecutionEngine, config: CoordinatorConfig) -> common::Flow {
    let flow = flow_with(Arc::new(engine.clone()), config);
    flow.registry
        .register_controller_service(service("s1", &[]).with_state(ServiceState::Enabled));
    for id in ["p1", "p2", "p3"] {
        flow.registry
            .register_processor(processor(id, &["s1"]).with_state(ProcessorState::Running));
    }
    flow
}

// ── Processor cascades ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_cascade_reports_failed_member_and_continues() {
    let engine = InMemoryExecutionEngine::default();
    let flow = running_processors(&engine, CoordinatorConfig::default());
    engine.reject("p2", LifecycleAction::Stop, "tasks did not drain");
    let mut events = flow.events.subscribe_component(ComponentId::from("s1"));

    let err = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("s1"), None, Some(ProcessorState::Stopped))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CascadeFailure);
    let failures = err.member_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, ComponentId::from("p2"));
    assert_eq!(failures[0].cause.kind(), ErrorKind::EngineRejection);
    match &err {
        LifecycleError::CascadeFailure { applied, .. } => assert_eq!(applied, &ids(&["p1", "p3"])),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(processor_state(&flow, "p1"), ProcessorState::Stopped);
    assert_eq!(processor_state(&flow, "p2"), ProcessorState::Running);
    assert_eq!(processor_state(&flow, "p3"), ProcessorState::Stopped);

    match events.recv().await.unwrap() {
        LifecycleEvent::CascadeFailed { applied, failed, .. } => {
            assert_eq!(applied, ids(&["p1", "p3"]));
            assert_eq!(failed, ids(&["p2"]));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_abort_policy_stops_at_first_failure() {
    let engine = InMemoryExecutionEngine::default();
    let mut config = CoordinatorConfig::default();
    config.cascade.failure_policy = CascadeFailurePolicy::AbortOnFirstFailure;
    let flow = running_processors(&engine, config);
    engine.reject("p1", LifecycleAction::Stop, "tasks did not drain");

    let err = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("s1"), None, Some(ProcessorState::Stopped))
        .await
        .unwrap_err();

    assert_eq!(err.member_failures().len(), 1);
    for id in ["p1", "p2", "p3"] {
        assert_eq!(processor_state(&flow, id), ProcessorState::Running);
    }
    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_stop_fails_cascade_after_engine_deadline() {
    let engine = InMemoryExecutionEngine::new(EngineSettings {
        ack_delay: Duration::from_secs(10),
        ack_deadline: Duration::from_secs(1),
    });
    let flow = flow_with(Arc::new(engine.clone()), CoordinatorConfig::default());
    flow.registry
        .register_controller_service(service("s1", &[]).with_state(ServiceState::Enabled));
    flow.registry
        .register_processor(processor("p1", &["s1"]).with_state(ProcessorState::Running));

    let err = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("s1"), None, Some(ProcessorState::Stopped))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CascadeFailure);
    let failures = err.member_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, ComponentId::from("p1"));
    match &failures[0].cause {
        LifecycleError::EngineRejection { action, source, .. } => {
            assert_eq!(*action, LifecycleAction::Stop);
            assert_eq!(*source, EngineError::Timeout(Duration::from_secs(1)));
        }
        other => panic!("unexpected cause: {other}"),
    }
    assert!(err.to_string().contains("No acknowledgement within 1s"));
    assert_eq!(processor_state(&flow, "p1"), ProcessorState::Running);
}

#[tokio::test]
async fn test_cascade_only_touches_members_in_source_state() {
    let engine = InMemoryExecutionEngine::default();
    let flow = flow_with(Arc::new(engine.clone()), CoordinatorConfig::default());
    flow.registry
        .register_controller_service(service("s1", &[]).with_state(ServiceState::Enabled));
    flow.registry
        .register_processor(processor("p1", &["s1"]).with_state(ProcessorState::Running));
    flow.registry.register_processor(processor("p2", &["s1"]));
    flow.registry
        .register_processor(processor("p3", &["s1"]).with_state(ProcessorState::Disabled));

    let result = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("s1"), None, Some(ProcessorState::Stopped))
        .await
        .unwrap();

    assert_eq!(result.target, TargetState::Processor(ProcessorState::Stopped));
    assert_eq!(result.planned, ids(&["p1"]));
    assert_eq!(result.applied, ids(&["p1"]));
    assert_eq!(result.components.len(), 3);
    assert_eq!(processor_state(&flow, "p3"), ProcessorState::Disabled);
}

#[tokio::test]
async fn test_start_cascade_refuses_invalid_member_before_touching_any() {
    let engine = InMemoryExecutionEngine::default();
    let flow = flow_with(Arc::new(engine.clone()), CoordinatorConfig::default());
    flow.registry
        .register_controller_service(service("s1", &[]).with_state(ServiceState::Enabled));
    flow.registry.register_processor(processor("p1", &["s1"]));
    let mut unconnected = processor("p2", &["s1"]);
    unconnected.auto_terminated_relationships.clear();
    flow.registry.register_processor(unconnected);

    let err = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("s1"), None, Some(ProcessorState::Running))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CascadeFailure);
    assert_eq!(err.member_failures()[0].id, ComponentId::from("p2"));
    assert!(engine.calls().is_empty());
    assert_eq!(processor_state(&flow, "p1"), ProcessorState::Stopped);
}

// ── Service cascades ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_service_cascade_follows_dependency_order() {
    let engine = InMemoryExecutionEngine::default();
    let flow = service_chain(&engine);
    let s1 = ComponentId::from("s1");

    let enabled = flow
        .coordinator
        .cascade_referencing(&s1, Some(ServiceState::Enabled), None)
        .await
        .unwrap();
    assert_eq!(enabled.applied, ids(&["s2", "s3"]));
    assert_eq!(service_state(&flow, "s3"), ServiceState::Enabled);
    // processors are left alone by a service target
    assert_eq!(processor_state(&flow, "p1"), ProcessorState::Stopped);

    let disabled = flow
        .coordinator
        .cascade_referencing(&s1, Some(ServiceState::Disabled), None)
        .await
        .unwrap();
    assert_eq!(disabled.applied, ids(&["s3", "s2"]));
    assert_eq!(service_state(&flow, "s1"), ServiceState::Enabled);

    assert_eq!(
        engine_actions(&engine),
        vec![
            (ComponentId::from("s2"), LifecycleAction::Enable),
            (ComponentId::from("s3"), LifecycleAction::Enable),
            (ComponentId::from("s3"), LifecycleAction::Disable),
            (ComponentId::from("s2"), LifecycleAction::Disable),
        ]
    );
}

#[tokio::test]
async fn test_disable_cascade_refused_while_processor_running() {
    let engine = InMemoryExecutionEngine::default();
    let flow = flow_with(Arc::new(engine.clone()), CoordinatorConfig::default());
    flow.registry
        .register_controller_service(service("s1", &[]).with_state(ServiceState::Enabled));
    flow.registry
        .register_controller_service(service("s2", &["s1"]).with_state(ServiceState::Enabled));
    flow.registry
        .register_processor(processor("p1", &["s2"]).with_state(ProcessorState::Running));

    let err = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("s1"), Some(ServiceState::Disabled), None)
        .await
        .unwrap_err();

    assert_eq!(err.member_failures()[0].id, ComponentId::from("s2"));
    assert!(err.to_string().contains("processor 'p1' is RUNNING"));
    assert_eq!(service_state(&flow, "s2"), ServiceState::Enabled);
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_verify_cascade_mutates_nothing() {
    let engine = InMemoryExecutionEngine::default();
    let flow = service_chain(&engine);
    let mut events = flow.events.subscribe();

    let result = flow
        .coordinator
        .verify_cascade(&ComponentId::from("s1"), Some(ServiceState::Enabled), None)
        .await
        .unwrap();

    assert_eq!(result.planned, ids(&["s2", "s3"]));
    assert!(result.applied.is_empty());
    assert!(!result.cancelled);
    assert_eq!(service_state(&flow, "s2"), ServiceState::Disabled);
    assert_eq!(service_state(&flow, "s3"), ServiceState::Disabled);
    assert!(engine.calls().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_completed_cascade_publishes_event() {
    let engine = InMemoryExecutionEngine::default();
    let flow = service_chain(&engine);
    let mut events = flow.events.subscribe_component(ComponentId::from("s1"));

    flow.coordinator
        .cascade_referencing(&ComponentId::from("s1"), Some(ServiceState::Enabled), None)
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        LifecycleEvent::CascadeCompleted { target, members, .. } => {
            assert_eq!(target, TargetState::Service(ServiceState::Enabled));
            assert_eq!(members, ids(&["s2", "s3"]));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cascade_arguments() {
    let engine = InMemoryExecutionEngine::default();
    let flow = service_chain(&engine);

    let missing = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("ghost"), Some(ServiceState::Enabled), None)
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let no_target = flow
        .coordinator
        .cascade_referencing(&ComponentId::from("s1"), None, None)
        .await
        .unwrap_err();
    assert_eq!(no_target.kind(), ErrorKind::InvalidField);

    let disabled_schedule = flow
        .coordinator
        .verify_cascade(&ComponentId::from("s1"), None, Some(ProcessorState::Disabled))
        .await
        .unwrap_err();
    assert_eq!(
        disabled_schedule.violations()[0].message,
        "Scheduled state: Value must be one of [RUNNING, STOPPED]"
    );
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_before_apply_leaves_closure_untouched() {
    let engine = InMemoryExecutionEngine::default();
    let flow = service_chain(&engine);

    let handle = flow
        .coordinator
        .spawn_cascade(&ComponentId::from("s1"), Some(ServiceState::Enabled), None)
        .await
        .unwrap();
    handle.cancel().unwrap();

    let result = handle.join().await.unwrap();
    assert!(result.cancelled);
    assert_eq!(result.planned, ids(&["s2", "s3"]));
    assert!(result.applied.is_empty());
    assert_eq!(service_state(&flow, "s2"), ServiceState::Disabled);
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_after_apply_begins_is_refused() {
    let engine = GatedEngine::new();
    let flow = flow_with(Arc::new(engine.clone()), CoordinatorConfig::default());
    flow.registry
        .register_controller_service(service("s1", &[]).with_state(ServiceState::Enabled));
    flow.registry.register_processor(processor("p1", &["s1"]));
    flow.registry.register_processor(processor("p2", &["s1"]));

    let handle = flow
        .coordinator
        .spawn_cascade(&ComponentId::from("s1"), None, Some(ProcessorState::Running))
        .await
        .unwrap();
    engine.wait_entered().await;

    let err = handle.cancel().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotCancellable);

    engine.release(2);
    let result = handle.join().await.unwrap();
    assert!(!result.cancelled);
    assert_eq!(result.applied, ids(&["p1", "p2"]));
    assert!(engine.inner.is_scheduled(&ComponentId::from("p2")));
}
