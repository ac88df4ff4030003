// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory execution engine
//!
//! Development and test stand-in for the real scheduler. It records every
//! call, keeps track of which processors are scheduled and which services are
//! enabled, and can be told to refuse specific actions.
//!
//! Acknowledgement is emulated with [`EngineSettings`]: each call waits
//! `ack_delay` before answering, bounded by `ack_deadline`. A delay longer
//! than the deadline yields [`EngineError::Timeout`].

use crate::domain::component::{ComponentId, ControllerService, Processor};
use crate::domain::config::EngineSettings;
use crate::domain::engine::{EngineError, ExecutionEngine, LifecycleAction};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// A call the engine received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub component_id: ComponentId,
    pub action: LifecycleAction,
}

#[derive(Default)]
struct EngineState {
    calls: Vec<EngineCall>,
    rejections: HashMap<(ComponentId, LifecycleAction), String>,
    /// Scheduled processors and their concurrent task count.
    scheduled: BTreeMap<ComponentId, usize>,
    enabled: BTreeSet<ComponentId>,
}

#[derive(Clone, Default)]
pub struct InMemoryExecutionEngine {
    settings: EngineSettings,
    task_capacity: Option<usize>,
    state: Arc<Mutex<EngineState>>,
}

impl InMemoryExecutionEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            task_capacity: None,
            state: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    /// Limit the total number of concurrent tasks across scheduled processors.
    pub fn with_task_capacity(mut self, capacity: usize) -> Self {
        self.task_capacity = Some(capacity);
        self
    }

    /// Refuse `action` on `component_id` with `message` until cleared.
    pub fn reject(&self, component_id: impl Into<ComponentId>, action: LifecycleAction, message: impl Into<String>) {
        self.state
            .lock()
            .rejections
            .insert((component_id.into(), action), message.into());
    }

    pub fn clear_rejection(&self, component_id: &ComponentId, action: LifecycleAction) {
        self.state.lock().rejections.remove(&(component_id.clone(), action));
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn is_scheduled(&self, component_id: &ComponentId) -> bool {
        self.state.lock().scheduled.contains_key(component_id)
    }

    pub fn is_enabled(&self, component_id: &ComponentId) -> bool {
        self.state.lock().enabled.contains(component_id)
    }

    async fn acknowledge(&self, component_id: &ComponentId, action: LifecycleAction) -> Result<(), EngineError> {
        self.state.lock().calls.push(EngineCall {
            component_id: component_id.clone(),
            action,
        });

        let delay = self.settings.ack_delay;
        let deadline = self.settings.ack_deadline;
        if !delay.is_zero() {
            tokio::time::timeout(deadline, tokio::time::sleep(delay))
                .await
                .map_err(|_| {
                    warn!(component_id = %component_id, %action, ?deadline, "Engine acknowledgement timed out");
                    EngineError::Timeout(deadline)
                })?;
        }

        if let Some(message) = self.state.lock().rejections.get(&(component_id.clone(), action)) {
            debug!(component_id = %component_id, %action, "Engine refusing request");
            return Err(EngineError::Rejected(message.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionEngine for InMemoryExecutionEngine {
    async fn start_schedule(&self, processor: &Processor) -> Result<(), EngineError> {
        self.acknowledge(&processor.id, LifecycleAction::Start).await?;

        let tasks = usize::try_from(processor.concurrent_tasks).unwrap_or(0);
        let mut state = self.state.lock();
        if let Some(capacity) = self.task_capacity {
            let in_use: usize = state.scheduled.values().sum();
            if in_use + tasks > capacity {
                return Err(EngineError::CapacityExhausted(format!(
                    "{} tasks requested, {} of {} in use",
                    tasks, in_use, capacity
                )));
            }
        }
        state.scheduled.insert(processor.id.clone(), tasks);
        Ok(())
    }

    async fn stop_schedule(&self, processor: &Processor) -> Result<(), EngineError> {
        self.acknowledge(&processor.id, LifecycleAction::Stop).await?;
        self.state.lock().scheduled.remove(&processor.id);
        Ok(())
    }

    async fn enable_service(&self, service: &ControllerService) -> Result<(), EngineError> {
        self.acknowledge(&service.id, LifecycleAction::Enable).await?;
        self.state.lock().enabled.insert(service.id.clone());
        Ok(())
    }

    async fn disable_service(&self, service: &ControllerService) -> Result<(), EngineError> {
        self.acknowledge(&service.id, LifecycleAction::Disable).await?;
        self.state.lock().enabled.remove(&service.id);
        Ok(())
    }
}
