// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::changes::TargetState;
use crate::domain::component::{ComponentId, ComponentKind, GroupId, ProcessorState, ServiceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published after every successful mutation performed by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    ConfigurationApplied {
        kind: ComponentKind,
        component_id: ComponentId,
        applied_at: DateTime<Utc>,
    },
    ProcessorStateChanged {
        group_id: GroupId,
        processor_id: ComponentId,
        from: ProcessorState,
        to: ProcessorState,
        changed_at: DateTime<Utc>,
    },
    ServiceStateChanged {
        service_id: ComponentId,
        from: ServiceState,
        to: ServiceState,
        changed_at: DateTime<Utc>,
    },
    CascadeCompleted {
        service_id: ComponentId,
        target: TargetState,
        members: Vec<ComponentId>,
        completed_at: DateTime<Utc>,
    },
    CascadeFailed {
        service_id: ComponentId,
        target: TargetState,
        applied: Vec<ComponentId>,
        failed: Vec<ComponentId>,
        failed_at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// The component the event is about; the root service for cascades.
    pub fn component_id(&self) -> &ComponentId {
        match self {
            Self::ConfigurationApplied { component_id, .. } => component_id,
            Self::ProcessorStateChanged { processor_id, .. } => processor_id,
            Self::ServiceStateChanged { service_id, .. } => service_id,
            Self::CascadeCompleted { service_id, .. } => service_id,
            Self::CascadeFailed { service_id, .. } => service_id,
        }
    }
}
