// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reference closure cascades
//!
//! A cascade acts on every component that (transitively) references a
//! controller service, never on the service itself. The closure is captured
//! once when the cascade starts; components registered afterwards are not
//! picked up.
//!
//! Service targets are ordered by dependency: a service is enabled only after
//! the closure members it references, and disabled only after the closure
//! members that reference it. Processor targets only touch processors that
//! are in the matching source state (`STOPPED` for start, `RUNNING` for stop).

use crate::application::guard_context::ProjectedGuardContext;
use crate::domain::changes::TargetState;
use crate::domain::component::{
    ComponentHandle, ComponentId, ComponentKind, ComponentState, ComponentSummary, ProcessorState,
    ServiceState,
};
use crate::domain::engine::LifecycleAction;
use crate::domain::error::{LifecycleError, MemberFailure};
use crate::domain::graph::ReferenceGraph;
use crate::domain::guard::{admit, GuardContext};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Outcome of a cascade or of its verify-only variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureResult {
    pub service_id: ComponentId,
    pub target: TargetState,
    /// Every closure member, in closure order, as seen after the operation.
    pub components: Vec<ComponentSummary>,
    /// Members that needed a transition, in execution order.
    pub planned: Vec<ComponentId>,
    /// Members actually transitioned. Empty for verification.
    pub applied: Vec<ComponentId>,
    #[serde(default)]
    pub cancelled: bool,
}

/// One planned member transition.
#[derive(Debug, Clone)]
pub struct CascadeStep {
    pub id: ComponentId,
    pub handle: ComponentHandle,
    pub action: LifecycleAction,
}

impl CascadeStep {
    pub fn kind(&self) -> ComponentKind {
        self.handle.kind()
    }

    pub fn target_state(&self) -> ComponentState {
        match self.action {
            LifecycleAction::Start => ComponentState::Processor(ProcessorState::Running),
            LifecycleAction::Stop => ComponentState::Processor(ProcessorState::Stopped),
            LifecycleAction::Enable => ComponentState::Service(ServiceState::Enabled),
            LifecycleAction::Disable => ComponentState::Service(ServiceState::Disabled),
        }
    }
}

/// Breadth-first snapshot of everything that references `service_id`,
/// directly or through other services. The root is excluded and each member
/// appears once.
pub fn snapshot_closure(graph: &dyn ReferenceGraph, service_id: &ComponentId) -> Vec<ComponentHandle> {
    let mut seen = HashSet::from([service_id.clone()]);
    let mut queue = VecDeque::from([service_id.clone()]);
    let mut members = Vec::new();

    while let Some(current) = queue.pop_front() {
        for handle in graph.referencing_components(&current) {
            let id = handle.id();
            if !seen.insert(id.clone()) {
                continue;
            }
            if handle.kind() == ComponentKind::ControllerService {
                queue.push_back(id);
            }
            members.push(handle);
        }
    }

    members
}

/// Order the closure members that need to move towards `target`.
pub fn plan_steps(
    graph: &dyn ReferenceGraph,
    members: &[ComponentHandle],
    target: TargetState,
) -> Result<Vec<CascadeStep>, Vec<MemberFailure>> {
    match target {
        TargetState::Processor(state) => Ok(plan_processor_steps(members, state)),
        TargetState::Service(state) => plan_service_steps(graph, members, state),
    }
}

fn plan_processor_steps(members: &[ComponentHandle], target: ProcessorState) -> Vec<CascadeStep> {
    let (source, action) = match target {
        ProcessorState::Running => (ProcessorState::Stopped, LifecycleAction::Start),
        ProcessorState::Stopped => (ProcessorState::Running, LifecycleAction::Stop),
        ProcessorState::Disabled => return Vec::new(),
    };

    members
        .iter()
        .filter_map(|handle| match handle {
            ComponentHandle::Processor(processor) => {
                let processor = processor.read();
                (processor.state() == source).then(|| CascadeStep {
                    id: processor.id.clone(),
                    handle: handle.clone(),
                    action,
                })
            }
            ComponentHandle::ControllerService(_) => None,
        })
        .collect()
}

fn plan_service_steps(
    graph: &dyn ReferenceGraph,
    members: &[ComponentHandle],
    target: ServiceState,
) -> Result<Vec<CascadeStep>, Vec<MemberFailure>> {
    let (source, action) = match target {
        ServiceState::Enabled => (ServiceState::Disabled, LifecycleAction::Enable),
        ServiceState::Disabled => (ServiceState::Enabled, LifecycleAction::Disable),
        ServiceState::Enabling | ServiceState::Disabling => return Ok(Vec::new()),
    };

    let services: Vec<(ComponentId, ComponentHandle)> = members
        .iter()
        .filter(|handle| handle.kind() == ComponentKind::ControllerService)
        .map(|handle| (handle.id(), handle.clone()))
        .collect();
    let in_closure: HashSet<&ComponentId> = services.iter().map(|(id, _)| id).collect();

    // references each service has on other closure services
    let mut pending: Vec<(ComponentId, ComponentHandle, HashSet<ComponentId>)> = services
        .iter()
        .map(|(id, handle)| {
            let dependencies = graph
                .referenced_services(id)
                .iter()
                .map(|service| service.read().id.clone())
                .filter(|dependency| in_closure.contains(dependency))
                .collect();
            (id.clone(), handle.clone(), dependencies)
        })
        .collect();

    let mut ordered = Vec::with_capacity(pending.len());
    while let Some(position) = pending.iter().position(|(_, _, dependencies)| dependencies.is_empty()) {
        let (id, handle, _) = pending.remove(position);
        for (_, _, dependencies) in pending.iter_mut() {
            dependencies.remove(&id);
        }
        ordered.push((id, handle));
    }

    if !pending.is_empty() {
        return Err(pending
            .into_iter()
            .map(|(id, _, _)| MemberFailure {
                cause: LifecycleError::state_conflict(
                    ComponentKind::ControllerService,
                    &id,
                    "is part of a controller service reference cycle",
                ),
                id,
                kind: ComponentKind::ControllerService,
            })
            .collect());
    }

    if action == LifecycleAction::Disable {
        ordered.reverse();
    }

    Ok(ordered
        .into_iter()
        .filter(|(_, handle)| match handle {
            ComponentHandle::ControllerService(service) => service.read().state() == source,
            ComponentHandle::Processor(_) => false,
        })
        .map(|(id, handle)| CascadeStep { id, handle, action })
        .collect())
}

/// Run every step's guard against `ctx`, treating earlier steps as already
/// applied. Returns one failure per member that would be refused.
pub fn verify_steps(steps: &[CascadeStep], ctx: &dyn GuardContext) -> Vec<MemberFailure> {
    let mut projected = ProjectedGuardContext::new(ctx);
    let mut failures = Vec::new();

    for step in steps {
        let admitted = match &step.handle {
            ComponentHandle::Processor(handle) => {
                let processor = handle.read().clone();
                admit(&processor, step.action, &projected)
            }
            ComponentHandle::ControllerService(handle) => {
                let service = handle.read().clone();
                admit(&service, step.action, &projected)
            }
        };

        match admitted {
            Ok(()) => projected.project(step.id.clone(), step.target_state()),
            Err(cause) => failures.push(MemberFailure {
                id: step.id.clone(),
                kind: step.kind(),
                cause,
            }),
        }
    }

    failures
}

// ── Spawned cascades ─────────────────────────────────────────────────────────

const PENDING: u8 = 0;
const APPLYING: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared between a spawned cascade and its handle; decides whether a cancel
/// request arrives before or after application began.
#[derive(Debug, Clone, Default)]
pub struct CascadePhase(Arc<AtomicU8>);

impl CascadePhase {
    /// Move to applying. Returns `false` if the cascade was cancelled first.
    pub fn begin(&self) -> bool {
        match self.0.compare_exchange(PENDING, APPLYING, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => true,
            Err(current) => current == APPLYING,
        }
    }

    fn cancel(&self) -> Result<(), u8> {
        match self.0.compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(()),
            Err(CANCELLED) => Ok(()),
            Err(current) => Err(current),
        }
    }
}

/// A verified cascade running on the runtime. Dropping the handle does not
/// stop the cascade.
#[derive(Debug)]
pub struct CascadeHandle {
    service_id: ComponentId,
    phase: CascadePhase,
    task: JoinHandle<Result<ClosureResult, LifecycleError>>,
}

impl CascadeHandle {
    pub fn new(
        service_id: ComponentId,
        phase: CascadePhase,
        task: JoinHandle<Result<ClosureResult, LifecycleError>>,
    ) -> Self {
        Self {
            service_id,
            phase,
            task,
        }
    }

    pub fn service_id(&self) -> &ComponentId {
        &self.service_id
    }

    /// Cancel the cascade if no member has been touched yet.
    pub fn cancel(&self) -> Result<(), LifecycleError> {
        self.phase.cancel().map_err(|_| LifecycleError::NotCancellable {
            service_id: self.service_id.clone(),
        })
    }

    pub async fn join(self) -> Result<ClosureResult, LifecycleError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(LifecycleError::state_conflict(
                ComponentKind::ControllerService,
                &self.service_id,
                format!("cascade task did not complete: {}", e),
            )),
        }
    }
}
