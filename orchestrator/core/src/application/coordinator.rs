// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Coordinator
//!
//! Application service that admits, performs and propagates operational state
//! changes of processors and controller services.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Verify-then-act for configuration changes, state
//!   transitions and reference closure cascades
//! - **Collaborators:**
//!   - Domain: validation rules, transition guards, reference graph views
//!   - Infrastructure: ExecutionEngine, EventBus
//!
//! # Flow (single component)
//!
//! 1. Claim the component in the in-flight table (busy → `StateConflict`)
//! 2. Resolve it through the registry (`NotFound`)
//! 3. Validate the change set (batched `Validation`, or fail-fast
//!    `MalformedExpression`)
//! 4. `canUpdate` for modifications, then the transition guard evaluated on
//!    the configuration as it will be after the change
//! 5. Apply the patch, then perform the transition through the engine
//! 6. Publish a `LifecycleEvent`
//!
//! # Flow (cascade)
//!
//! 1. Snapshot the reference closure and claim the root plus every member
//! 2. Plan the member transitions in dependency order
//! 3. Verify every planned member; any refusal rejects the whole cascade
//!    before anything is touched
//! 4. Spawn the execution; each member is re-checked live, transitioned, and
//!    the engine's acknowledgement awaited before moving on
//!
//! Execution failures do not roll back members already transitioned. With
//! the default `continue_and_report` policy the remaining members are still
//! attempted and every failure is reported together.

use crate::application::applier::ConfigurationApplier;
use crate::application::cascade::{
    plan_steps, snapshot_closure, verify_steps, CascadeHandle, CascadePhase, CascadeStep, ClosureResult,
};
use crate::application::guard_context::FlowGuardContext;
use crate::application::transition_lock::{InFlightTransitions, TransitionPermit};
use crate::domain::changes::{ComponentChanges, ComponentRef, ProcessorPatch, ServicePatch, TargetState};
use crate::domain::component::{
    ComponentHandle, ComponentId, ComponentKind, ComponentSnapshot, ProcessorHandle, ProcessorState,
    ServiceHandle, ServiceState,
};
use crate::domain::config::{CascadeFailurePolicy, CoordinatorConfig};
use crate::domain::engine::{EngineError, ExecutionEngine, LifecycleAction};
use crate::domain::error::{FieldViolation, LifecycleError, MemberFailure};
use crate::domain::events::LifecycleEvent;
use crate::domain::graph::{ComponentRegistry, ConnectionIndex, ReferenceGraph};
use crate::domain::guard::{admit, Guard};
use crate::domain::validation::{validate_processor_changes, validate_service_changes};
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use std::iter;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait LifecycleCoordinator: Send + Sync {
    /// Run every check `apply_configuration` would run, without mutating.
    async fn propose_configuration(
        &self,
        component: &ComponentRef,
        changes: &ComponentChanges,
    ) -> Result<(), LifecycleError>;

    /// Validate, admit and apply a change set, performing the state
    /// transition it requests (if any).
    async fn apply_configuration(
        &self,
        component: &ComponentRef,
        changes: &ComponentChanges,
    ) -> Result<ComponentSnapshot, LifecycleError>;

    async fn request_state(
        &self,
        component: &ComponentRef,
        target: TargetState,
    ) -> Result<ComponentSnapshot, LifecycleError>;

    /// Transition every component referencing `service_id`. A service state
    /// targets referencing services; otherwise the scheduled state targets
    /// referencing processors.
    async fn cascade_referencing(
        &self,
        service_id: &ComponentId,
        service_state: Option<ServiceState>,
        scheduled_state: Option<ProcessorState>,
    ) -> Result<ClosureResult, LifecycleError>;

    /// Same checks as `cascade_referencing` across the whole closure; mutates
    /// nothing.
    async fn verify_cascade(
        &self,
        service_id: &ComponentId,
        service_state: Option<ServiceState>,
        scheduled_state: Option<ProcessorState>,
    ) -> Result<ClosureResult, LifecycleError>;

    /// Verify and start a cascade, returning once it is running. The cascade
    /// keeps going if the handle is dropped.
    async fn spawn_cascade(
        &self,
        service_id: &ComponentId,
        service_state: Option<ServiceState>,
        scheduled_state: Option<ProcessorState>,
    ) -> Result<CascadeHandle, LifecycleError>;

    /// Whether the owner may remove the component now.
    async fn verify_delete(&self, component: &ComponentRef) -> Result<(), LifecycleError>;
}

/// A change set that passed validation and every guard.
enum Admitted {
    Processor {
        handle: ProcessorHandle,
        patch: ProcessorPatch,
        action: Option<LifecycleAction>,
    },
    ControllerService {
        handle: ServiceHandle,
        patch: ServicePatch,
        action: Option<LifecycleAction>,
    },
}

/// A verified cascade holding claims on its root and members.
struct PreparedCascade {
    service_id: ComponentId,
    target: TargetState,
    members: Vec<ComponentHandle>,
    steps: Vec<CascadeStep>,
    _permits: Vec<TransitionPermit>,
}

impl PreparedCascade {
    fn result(&self, applied: Vec<ComponentId>, cancelled: bool) -> ClosureResult {
        ClosureResult {
            service_id: self.service_id.clone(),
            target: self.target,
            components: self.members.iter().map(|handle| handle.summary()).collect(),
            planned: self.steps.iter().map(|step| step.id.clone()).collect(),
            applied,
            cancelled,
        }
    }
}

/// Standard implementation of LifecycleCoordinator
#[derive(Clone)]
pub struct StandardLifecycleCoordinator {
    registry: Arc<dyn ComponentRegistry>,
    graph: Arc<dyn ReferenceGraph>,
    connections: Arc<dyn ConnectionIndex>,
    engine: Arc<dyn ExecutionEngine>,
    event_bus: Arc<EventBus>,
    in_flight: InFlightTransitions,
    config: CoordinatorConfig,
}

impl StandardLifecycleCoordinator {
    pub fn new(
        registry: Arc<dyn ComponentRegistry>,
        graph: Arc<dyn ReferenceGraph>,
        connections: Arc<dyn ConnectionIndex>,
        engine: Arc<dyn ExecutionEngine>,
        event_bus: Arc<EventBus>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            graph,
            connections,
            engine,
            event_bus,
            in_flight: InFlightTransitions::new(),
            config,
        }
    }

    /// Build a coordinator over a single object that provides all three flow
    /// views.
    pub fn for_flow<F>(
        flow: Arc<F>,
        engine: Arc<dyn ExecutionEngine>,
        event_bus: Arc<EventBus>,
        config: CoordinatorConfig,
    ) -> Self
    where
        F: ComponentRegistry + ReferenceGraph + ConnectionIndex + 'static,
    {
        Self::new(flow.clone(), flow.clone(), flow, engine, event_bus, config)
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn in_flight(&self) -> &InFlightTransitions {
        &self.in_flight
    }

    fn guard_context(&self) -> FlowGuardContext<'_> {
        FlowGuardContext::new(self.registry.as_ref(), self.graph.as_ref(), self.connections.as_ref())
    }

    fn resolve(&self, component: &ComponentRef) -> Result<ComponentHandle, LifecycleError> {
        match component {
            ComponentRef::Processor { group_id, id } => {
                self.registry.find_processor(group_id, id).map(ComponentHandle::Processor)
            }
            ComponentRef::ControllerService { id } => self
                .registry
                .find_controller_service(id)
                .map(ComponentHandle::ControllerService),
        }
    }

    fn rejected(&self, subject: &dyn std::fmt::Display, error: &LifecycleError) {
        warn!(subject = %subject, kind = error.kind().as_str(), error = %error, "Lifecycle request rejected");
        metrics::counter!("flowkeeper_rejections_total", "kind" => error.kind().as_str()).increment(1);
    }

    // ========================================================================
    // Admission
    // ========================================================================

    fn admit_changes(&self, component: &ComponentRef, changes: &ComponentChanges) -> Result<Admitted, LifecycleError> {
        match (self.resolve(component)?, changes) {
            (ComponentHandle::Processor(handle), ComponentChanges::Processor(changes)) => {
                let current = handle.read().clone();
                let patch = validate_processor_changes(&current, changes, self.connections.as_ref())?;
                let ctx = self.guard_context();

                if patch.is_modification() {
                    current.can_update(&ctx)?;
                }

                let action = patch
                    .state
                    .filter(|target| *target != current.state())
                    .map(|target| processor_action(current.state(), target));

                if let Some(action) = action {
                    let mut projected = current.clone();
                    ConfigurationApplier::apply_processor(&mut projected, &patch);
                    admit(&projected, action, &ctx)?;
                }

                debug!(component = %component, ?action, "Processor change set admitted");
                Ok(Admitted::Processor { handle, patch, action })
            }
            (ComponentHandle::ControllerService(handle), ComponentChanges::ControllerService(changes)) => {
                let current = handle.read().clone();
                let patch = validate_service_changes(&current, changes)?;
                let ctx = self.guard_context();

                if patch.is_modification() {
                    current.can_update(&ctx)?;
                }

                let action = patch
                    .state
                    .filter(|target| *target != current.state())
                    .map(service_action);

                if let Some(action) = action {
                    let mut projected = current.clone();
                    ConfigurationApplier::apply_service(&mut projected, &patch);
                    admit(&projected, action, &ctx)?;
                }

                debug!(component = %component, ?action, "Controller service change set admitted");
                Ok(Admitted::ControllerService { handle, patch, action })
            }
            (handle, changes) => Err(LifecycleError::Validation(vec![FieldViolation::invalid(
                "kind",
                format!(
                    "{} changes cannot be applied to {} '{}'",
                    changes.kind(),
                    handle.kind(),
                    component.id()
                ),
            )])),
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Re-evaluate `action`'s guard against the live flow.
    fn recheck(&self, guard: &dyn Guard, action: LifecycleAction) -> Result<(), LifecycleError> {
        let ctx = self.guard_context();
        admit(guard, action, &ctx)
    }

    fn engine_rejection(
        &self,
        kind: ComponentKind,
        id: &ComponentId,
        action: LifecycleAction,
        source: EngineError,
    ) -> LifecycleError {
        warn!(component_id = %id, %kind, %action, error = %source, "Execution engine rejected transition");
        LifecycleError::EngineRejection {
            kind,
            id: id.clone(),
            action,
            source,
        }
    }

    async fn transition_processor(&self, handle: &ProcessorHandle, action: LifecycleAction) -> Result<(), LifecycleError> {
        let before = handle.read().clone();
        let from = before.state();
        let kind = ComponentKind::Processor;

        match action {
            LifecycleAction::Start => {
                // must be visible as RUNNING before the re-check
                handle.write().set_state(ProcessorState::Running);
                if let Err(e) = self.recheck(&before, action) {
                    handle.write().set_state(from);
                    return Err(e);
                }
                let scheduled = handle.read().clone();
                if let Err(source) = self.engine.start_schedule(&scheduled).await {
                    handle.write().set_state(from);
                    return Err(self.engine_rejection(kind, &before.id, action, source));
                }
            }
            LifecycleAction::Stop => {
                self.recheck(&before, action)?;
                if let Err(source) = self.engine.stop_schedule(&before).await {
                    return Err(self.engine_rejection(kind, &before.id, action, source));
                }
                handle.write().set_state(ProcessorState::Stopped);
            }
            LifecycleAction::Enable => {
                self.recheck(&before, action)?;
                handle.write().set_state(ProcessorState::Stopped);
            }
            LifecycleAction::Disable => {
                self.recheck(&before, action)?;
                handle.write().set_state(ProcessorState::Disabled);
            }
        }

        let to = handle.read().state();
        info!(processor_id = %before.id, group_id = %before.group_id, %action, %from, %to, "Processor transitioned");
        metrics::counter!("flowkeeper_transitions_total", "kind" => kind.as_str(), "action" => action.as_str())
            .increment(1);
        self.event_bus.publish(LifecycleEvent::ProcessorStateChanged {
            group_id: before.group_id.clone(),
            processor_id: before.id.clone(),
            from,
            to,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    async fn transition_service(&self, handle: &ServiceHandle, action: LifecycleAction) -> Result<(), LifecycleError> {
        let before = handle.read().clone();
        let from = before.state();
        let kind = ComponentKind::ControllerService;

        let (transient, target) = match action {
            LifecycleAction::Enable => (ServiceState::Enabling, ServiceState::Enabled),
            LifecycleAction::Disable => (ServiceState::Disabling, ServiceState::Disabled),
            LifecycleAction::Start | LifecycleAction::Stop => {
                // guards refuse these for services
                return self.recheck(&before, action);
            }
        };

        handle.write().set_state(transient);
        if let Err(e) = self.recheck(&before, action) {
            handle.write().set_state(from);
            return Err(e);
        }

        let acknowledged = {
            let service = handle.read().clone();
            match action {
                LifecycleAction::Enable => self.engine.enable_service(&service).await,
                _ => self.engine.disable_service(&service).await,
            }
        };
        if let Err(source) = acknowledged {
            handle.write().set_state(from);
            return Err(self.engine_rejection(kind, &before.id, action, source));
        }
        handle.write().set_state(target);

        info!(service_id = %before.id, %action, %from, to = %target, "Controller service transitioned");
        metrics::counter!("flowkeeper_transitions_total", "kind" => kind.as_str(), "action" => action.as_str())
            .increment(1);
        self.event_bus.publish(LifecycleEvent::ServiceStateChanged {
            service_id: before.id.clone(),
            from,
            to: target,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    async fn perform(&self, component: &ComponentRef, admitted: Admitted) -> Result<ComponentSnapshot, LifecycleError> {
        match admitted {
            Admitted::Processor { handle, patch, action } => {
                if patch.is_modification() {
                    ConfigurationApplier::apply_processor(&mut handle.write(), &patch);
                    self.configuration_applied(ComponentKind::Processor, component.id());
                }
                if let Some(action) = action {
                    self.transition_processor(&handle, action).await?;
                }
                let snapshot = handle.read().clone();
                Ok(ComponentSnapshot::Processor(snapshot))
            }
            Admitted::ControllerService { handle, patch, action } => {
                if patch.is_modification() {
                    ConfigurationApplier::apply_service(&mut handle.write(), &patch);
                    self.configuration_applied(ComponentKind::ControllerService, component.id());
                }
                if let Some(action) = action {
                    self.transition_service(&handle, action).await?;
                }
                let snapshot = handle.read().clone();
                Ok(ComponentSnapshot::ControllerService(snapshot))
            }
        }
    }

    fn check_delete(&self, component: &ComponentRef) -> Result<(), LifecycleError> {
        if self.in_flight.is_in_flight(component.id()) {
            return Err(LifecycleError::state_conflict(
                component.kind(),
                component.id(),
                "a transition is in flight",
            ));
        }
        let ctx = self.guard_context();
        match self.resolve(component)? {
            ComponentHandle::Processor(handle) => {
                let processor = handle.read().clone();
                processor.can_delete(&ctx)
            }
            ComponentHandle::ControllerService(handle) => {
                let service = handle.read().clone();
                service.can_delete(&ctx)
            }
        }
    }

    fn configuration_applied(&self, kind: ComponentKind, id: &ComponentId) {
        info!(component_id = %id, %kind, "Configuration applied");
        self.event_bus.publish(LifecycleEvent::ConfigurationApplied {
            kind,
            component_id: id.clone(),
            applied_at: Utc::now(),
        });
    }

    // ========================================================================
    // Cascades
    // ========================================================================

    /// Snapshot, claim (when `reserve`), plan and verify a cascade.
    fn prepare_cascade(
        &self,
        service_id: &ComponentId,
        target: TargetState,
        reserve: bool,
    ) -> Result<PreparedCascade, LifecycleError> {
        self.registry.find_controller_service(service_id)?;

        let members = snapshot_closure(self.graph.as_ref(), service_id);
        let claims: Vec<(ComponentKind, ComponentId)> = iter::once((ComponentKind::ControllerService, service_id.clone()))
            .chain(members.iter().map(|handle| (handle.kind(), handle.id())))
            .collect();

        let permits = if reserve {
            self.in_flight
                .try_acquire_all(&claims, "cascade")
                .map_err(|failures| cascade_failure(service_id, failures, Vec::new()))?
        } else {
            let busy = self.in_flight.conflicts(&claims);
            if !busy.is_empty() {
                return Err(cascade_failure(service_id, busy, Vec::new()));
            }
            Vec::new()
        };

        let steps = plan_steps(self.graph.as_ref(), &members, target)
            .map_err(|failures| cascade_failure(service_id, failures, Vec::new()))?;

        let failures = verify_steps(&steps, &self.guard_context());
        if !failures.is_empty() {
            return Err(cascade_failure(service_id, failures, Vec::new()));
        }

        debug!(
            service_id = %service_id,
            %target,
            members = members.len(),
            planned = steps.len(),
            "Cascade verified"
        );

        Ok(PreparedCascade {
            service_id: service_id.clone(),
            target,
            members,
            steps,
            _permits: permits,
        })
    }

    async fn execute_cascade(&self, prepared: PreparedCascade, phase: CascadePhase) -> Result<ClosureResult, LifecycleError> {
        if !phase.begin() {
            info!(service_id = %prepared.service_id, "Cascade cancelled before it began applying");
            metrics::counter!("flowkeeper_cascades_total", "outcome" => "cancelled").increment(1);
            return Ok(prepared.result(Vec::new(), true));
        }

        let mut applied = Vec::new();
        let mut failures = Vec::new();

        for step in &prepared.steps {
            let outcome = match &step.handle {
                ComponentHandle::Processor(handle) => self.transition_processor(handle, step.action).await,
                ComponentHandle::ControllerService(handle) => self.transition_service(handle, step.action).await,
            };

            match outcome {
                Ok(()) => applied.push(step.id.clone()),
                Err(cause) => {
                    warn!(
                        service_id = %prepared.service_id,
                        member_id = %step.id,
                        action = %step.action,
                        error = %cause,
                        "Cascade member failed"
                    );
                    failures.push(MemberFailure {
                        id: step.id.clone(),
                        kind: step.kind(),
                        cause,
                    });
                    if self.config.cascade.failure_policy == CascadeFailurePolicy::AbortOnFirstFailure {
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            info!(
                service_id = %prepared.service_id,
                target = %prepared.target,
                applied = applied.len(),
                "Cascade completed"
            );
            metrics::counter!("flowkeeper_cascades_total", "outcome" => "completed").increment(1);
            self.event_bus.publish(LifecycleEvent::CascadeCompleted {
                service_id: prepared.service_id.clone(),
                target: prepared.target,
                members: applied.clone(),
                completed_at: Utc::now(),
            });
            Ok(prepared.result(applied, false))
        } else {
            metrics::counter!("flowkeeper_cascades_total", "outcome" => "failed").increment(1);
            self.event_bus.publish(LifecycleEvent::CascadeFailed {
                service_id: prepared.service_id.clone(),
                target: prepared.target,
                applied: applied.clone(),
                failed: failures.iter().map(|failure| failure.id.clone()).collect(),
                failed_at: Utc::now(),
            });
            Err(cascade_failure(&prepared.service_id, failures, applied))
        }
    }
}

#[async_trait]
impl LifecycleCoordinator for StandardLifecycleCoordinator {
    async fn propose_configuration(
        &self,
        component: &ComponentRef,
        changes: &ComponentChanges,
    ) -> Result<(), LifecycleError> {
        self.admit_changes(component, changes)
            .map(|_| ())
            .inspect_err(|e| self.rejected(component, e))
    }

    async fn apply_configuration(
        &self,
        component: &ComponentRef,
        changes: &ComponentChanges,
    ) -> Result<ComponentSnapshot, LifecycleError> {
        let result = async {
            let _permit = self
                .in_flight
                .try_acquire(component.kind(), component.id(), "state transition")?;
            let admitted = self.admit_changes(component, changes)?;
            self.perform(component, admitted).await
        }
        .await;

        result.inspect_err(|e| self.rejected(component, e))
    }

    async fn request_state(
        &self,
        component: &ComponentRef,
        target: TargetState,
    ) -> Result<ComponentSnapshot, LifecycleError> {
        info!(component = %component, %target, "State requested");
        self.apply_configuration(component, &ComponentChanges::state_only(target))
            .await
    }

    async fn cascade_referencing(
        &self,
        service_id: &ComponentId,
        service_state: Option<ServiceState>,
        scheduled_state: Option<ProcessorState>,
    ) -> Result<ClosureResult, LifecycleError> {
        let handle = self
            .spawn_cascade(service_id, service_state, scheduled_state)
            .await?;
        handle.join().await
    }

    async fn verify_cascade(
        &self,
        service_id: &ComponentId,
        service_state: Option<ServiceState>,
        scheduled_state: Option<ProcessorState>,
    ) -> Result<ClosureResult, LifecycleError> {
        let target = cascade_target(service_state, scheduled_state)?;
        self.prepare_cascade(service_id, target, false)
            .map(|prepared| prepared.result(Vec::new(), false))
            .inspect_err(|e| self.rejected(service_id, e))
    }

    async fn spawn_cascade(
        &self,
        service_id: &ComponentId,
        service_state: Option<ServiceState>,
        scheduled_state: Option<ProcessorState>,
    ) -> Result<CascadeHandle, LifecycleError> {
        let prepared = cascade_target(service_state, scheduled_state)
            .and_then(|target| self.prepare_cascade(service_id, target, true))
            .inspect_err(|e| self.rejected(service_id, e))?;

        info!(
            service_id = %service_id,
            target = %prepared.target,
            planned = prepared.steps.len(),
            "Starting cascade"
        );

        let phase = CascadePhase::default();
        let task_phase = phase.clone();
        let coordinator = self.clone();
        let task = tokio::spawn(async move { coordinator.execute_cascade(prepared, task_phase).await });

        Ok(CascadeHandle::new(service_id.clone(), phase, task))
    }

    async fn verify_delete(&self, component: &ComponentRef) -> Result<(), LifecycleError> {
        self.check_delete(component)
            .inspect_err(|e| self.rejected(component, e))
    }
}

fn processor_action(current: ProcessorState, target: ProcessorState) -> LifecycleAction {
    match (current, target) {
        (_, ProcessorState::Running) => LifecycleAction::Start,
        (ProcessorState::Running, ProcessorState::Stopped) => LifecycleAction::Stop,
        (_, ProcessorState::Stopped) => LifecycleAction::Enable,
        (_, ProcessorState::Disabled) => LifecycleAction::Disable,
    }
}

fn service_action(target: ServiceState) -> LifecycleAction {
    match target {
        ServiceState::Enabled | ServiceState::Enabling => LifecycleAction::Enable,
        ServiceState::Disabled | ServiceState::Disabling => LifecycleAction::Disable,
    }
}

/// A service state targets referencing services; otherwise the scheduled
/// state targets referencing processors.
fn cascade_target(
    service_state: Option<ServiceState>,
    scheduled_state: Option<ProcessorState>,
) -> Result<TargetState, LifecycleError> {
    match (service_state, scheduled_state) {
        (Some(state @ (ServiceState::Enabled | ServiceState::Disabled)), _) => Ok(TargetState::Service(state)),
        (Some(_), _) => Err(LifecycleError::Validation(vec![FieldViolation::invalid(
            "state",
            "Controller Service state: Value must be one of [ENABLED, DISABLED]",
        )])),
        (None, Some(state @ (ProcessorState::Running | ProcessorState::Stopped))) => {
            Ok(TargetState::Processor(state))
        }
        (None, Some(_)) => Err(LifecycleError::Validation(vec![FieldViolation::invalid(
            "scheduled_state",
            "Scheduled state: Value must be one of [RUNNING, STOPPED]",
        )])),
        (None, None) => Err(LifecycleError::Validation(vec![FieldViolation::invalid(
            "state",
            "Either a controller service state or a scheduled state is required",
        )])),
    }
}

fn cascade_failure(service_id: &ComponentId, failures: Vec<MemberFailure>, applied: Vec<ComponentId>) -> LifecycleError {
    LifecycleError::CascadeFailure {
        service_id: service_id.clone(),
        failures,
        applied,
    }
}
