// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Engine Boundary
//!
//! The engine schedules processors and brings services up or down on its own
//! concurrency domain. The coordinator awaits each call until the engine
//! acknowledges that the request has taken effect. Bounding that wait is the
//! engine's job: an engine that gives up reports [`EngineError::Timeout`].

use crate::domain::component::{ControllerService, Processor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The four engine-visible lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Start,
    Stop,
    Enable,
    Disable,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Rejected(String),

    #[error("Unable to schedule all tasks: {0}")]
    CapacityExhausted(String),

    #[error("No acknowledgement within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn start_schedule(&self, processor: &Processor) -> Result<(), EngineError>;

    /// Resolves once in-flight executions have drained.
    async fn stop_schedule(&self, processor: &Processor) -> Result<(), EngineError>;

    async fn enable_service(&self, service: &ControllerService) -> Result<(), EngineError>;

    async fn disable_service(&self, service: &ControllerService) -> Result<(), EngineError>;
}
