// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use async_trait::async_trait;
use flowkeeper_core::domain::component::{ComponentId, ControllerService, GroupId, Processor};
use flowkeeper_core::domain::config::CoordinatorConfig;
use flowkeeper_core::domain::engine::{EngineError, ExecutionEngine};
use flowkeeper_core::domain::property::{Properties, PropertyDescriptor};
use flowkeeper_core::infrastructure::{EventBus, InMemoryExecutionEngine, InMemoryFlowRegistry};
use flowkeeper_core::StandardLifecycleCoordinator;
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// Engine that holds every call until the test releases it.
#[derive(Clone)]
pub struct GatedEngine {
    pub inner: InMemoryExecutionEngine,
    gate: Arc<Semaphore>,
    entered: Arc<Notify>,
}

impl GatedEngine {
    pub fn new() -> Self {
        Self {
            inner: InMemoryExecutionEngine::default(),
            gate: Arc::new(Semaphore::new(0)),
            entered: Arc::new(Notify::new()),
        }
    }

    /// Resolves once a call is waiting at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let `calls` more engine calls through.
    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    async fn pass(&self) {
        self.entered.notify_one();
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
    }
}

#[async_trait]
impl ExecutionEngine for GatedEngine {
    async fn start_schedule(&self, processor: &Processor) -> Result<(), EngineError> {
        self.pass().await;
        self.inner.start_schedule(processor).await
    }

    async fn stop_schedule(&self, processor: &Processor) -> Result<(), EngineError> {
        self.pass().await;
        self.inner.stop_schedule(processor).await
    }

    async fn enable_service(&self, service: &ControllerService) -> Result<(), EngineError> {
        self.pass().await;
        self.inner.enable_service(service).await
    }

    async fn disable_service(&self, service: &ControllerService) -> Result<(), EngineError> {
        self.pass().await;
        self.inner.disable_service(service).await
    }
}

pub struct Flow {
    pub registry: Arc<InMemoryFlowRegistry>,
    pub events: Arc<EventBus>,
    pub coordinator: StandardLifecycleCoordinator,
}

pub fn flow_with(engine: Arc<dyn ExecutionEngine>, config: CoordinatorConfig) -> Flow {
    let registry = Arc::new(InMemoryFlowRegistry::new());
    let events = Arc::new(EventBus::from_config(&config));
    let coordinator = StandardLifecycleCoordinator::for_flow(registry.clone(), engine, events.clone(), config);
    Flow {
        registry,
        events,
        coordinator,
    }
}

pub fn references(service_ids: &[&str]) -> Properties {
    service_ids
        .iter()
        .enumerate()
        .fold(Properties::new(), |properties, (index, service_id)| {
            let name = format!("Service {}", index + 1);
            properties
                .with_descriptor(PropertyDescriptor::new(name.clone()).identifies_controller_service())
                .with_value(name, *service_id)
        })
}

/// A stopped processor whose only relationship is auto-terminated.
pub fn processor(id: &str, service_ids: &[&str]) -> Processor {
    let mut processor = Processor::new(GroupId::root(), ComponentId::from(id), id, "org.flowkeeper.standard.PutRecord")
        .with_relationship("success")
        .with_properties(references(service_ids));
    processor.auto_terminated_relationships.insert("success".to_string());
    processor
}

pub fn service(id: &str, service_ids: &[&str]) -> ControllerService {
    ControllerService::new(ComponentId::from(id), id, "org.flowkeeper.standard.RecordReader")
        .with_properties(references(service_ids))
}
