// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transition Guards
//!
//! Each component kind decides for itself whether a lifecycle action is
//! admissible given its own state and a [`GuardContext`] view of the rest of
//! the flow. Guards are pure: they never mutate the component or the graph.
//!
//! The coordinator evaluates guards on snapshots. During a cascade it wraps
//! the live context in a projection so that members planned earlier in the
//! dependency order are seen in their *target* state.

use crate::domain::component::{
    ComponentId, ComponentKind, ComponentState, ComponentSummary, ControllerService, Processor,
    ProcessorState, ServiceState,
};
use crate::domain::engine::LifecycleAction;
use crate::domain::error::LifecycleError;
use crate::domain::graph::Connection;

/// What a guard may ask about the rest of the flow.
pub trait GuardContext {
    fn service_state(&self, id: &ComponentId) -> Option<ServiceState>;

    /// Components directly referencing the service, with their current state.
    fn referencing(&self, service_id: &ComponentId) -> Vec<ComponentSummary>;

    fn connections_for(&self, component_id: &ComponentId, relationship: &str) -> Vec<Connection>;

    fn has_connections(&self, component_id: &ComponentId) -> bool;
}

pub trait Guard {
    fn kind(&self) -> ComponentKind;

    fn component_id(&self) -> &ComponentId;

    /// Problems that block starting/enabling the component.
    fn validation_errors(&self, ctx: &dyn GuardContext) -> Vec<String>;

    fn can_start(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError>;

    fn can_stop(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError>;

    fn can_enable(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError>;

    fn can_disable(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError>;

    fn can_update(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError>;

    fn can_delete(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError>;

    fn conflict(&self, reason: impl Into<String>) -> LifecycleError
    where
        Self: Sized,
    {
        LifecycleError::state_conflict(self.kind(), self.component_id(), reason)
    }
}

/// Evaluate the guard that governs `action`.
pub fn admit(guard: &dyn Guard, action: LifecycleAction, ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
    match action {
        LifecycleAction::Start => guard.can_start(ctx),
        LifecycleAction::Stop => guard.can_stop(ctx),
        LifecycleAction::Enable => guard.can_enable(ctx),
        LifecycleAction::Disable => guard.can_disable(ctx),
    }
}

fn require_valid<G: Guard>(guard: &G, ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
    let errors = guard.validation_errors(ctx);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(guard.conflict(format!("is not valid: {}", errors.join("; "))))
    }
}

fn require_enabled_references(
    guard: &impl Guard,
    referenced: impl IntoIterator<Item = ComponentId>,
    ctx: &dyn GuardContext,
) -> Result<(), LifecycleError> {
    let not_enabled: Vec<String> = referenced
        .into_iter()
        .filter_map(|service_id| match ctx.service_state(&service_id) {
            Some(ServiceState::Enabled) => None,
            Some(state) => Some(format!("'{}' is {}", service_id, state)),
            None => Some(format!("'{}' does not exist", service_id)),
        })
        .collect();

    if not_enabled.is_empty() {
        Ok(())
    } else {
        Err(guard.conflict(format!(
            "referenced controller services are not enabled: {}",
            not_enabled.join(", ")
        )))
    }
}

// ── Processor ────────────────────────────────────────────────────────────────

impl Guard for Processor {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Processor
    }

    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn validation_errors(&self, ctx: &dyn GuardContext) -> Vec<String> {
        let mut errors = self
            .properties
            .validation_errors(|id| ctx.service_state(id).is_some());

        for relationship in &self.relationships {
            if !self.auto_terminated_relationships.contains(relationship)
                && ctx.connections_for(&self.id, relationship).is_empty()
            {
                errors.push(format!(
                    "Relationship '{}' is not connected to any component and is not auto-terminated",
                    relationship
                ));
            }
        }

        errors
    }

    fn can_start(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        match self.state() {
            ProcessorState::Stopped => {}
            ProcessorState::Running => return Err(self.conflict("is already running")),
            ProcessorState::Disabled => {
                return Err(self.conflict("is disabled and must be enabled (STOPPED) before it can be started"))
            }
        }
        require_valid(self, ctx)?;
        require_enabled_references(self, self.properties.referenced_services(), ctx)
    }

    fn can_stop(&self, _ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.state() == ProcessorState::Running {
            Ok(())
        } else {
            Err(self.conflict(format!("cannot be stopped because it is {}", self.state())))
        }
    }

    fn can_enable(&self, _ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.state() == ProcessorState::Disabled {
            Ok(())
        } else {
            Err(self.conflict(format!("cannot be enabled because it is {}", self.state())))
        }
    }

    fn can_disable(&self, _ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        match self.state() {
            ProcessorState::Stopped => Ok(()),
            ProcessorState::Running => Err(self.conflict("cannot be disabled while running")),
            ProcessorState::Disabled => Err(self.conflict("is already disabled")),
        }
    }

    fn can_update(&self, _ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.is_running() {
            Err(self.conflict("cannot be modified while running"))
        } else {
            Ok(())
        }
    }

    fn can_delete(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.is_running() {
            return Err(self.conflict("cannot be deleted while running"));
        }
        if ctx.has_connections(&self.id) {
            return Err(self.conflict("cannot be deleted while connections are attached"));
        }
        Ok(())
    }
}

// ── Controller Service ───────────────────────────────────────────────────────

impl Guard for ControllerService {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ControllerService
    }

    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn validation_errors(&self, ctx: &dyn GuardContext) -> Vec<String> {
        self.properties
            .validation_errors(|id| ctx.service_state(id).is_some())
    }

    fn can_start(&self, _ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        Err(self.conflict("controller services are enabled, not scheduled"))
    }

    fn can_stop(&self, _ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        Err(self.conflict("controller services are disabled, not stopped"))
    }

    fn can_enable(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.state() != ServiceState::Disabled {
            return Err(self.conflict(format!("cannot be enabled because it is {}", self.state())));
        }
        require_valid(self, ctx)?;
        require_enabled_references(self, self.properties.referenced_services(), ctx)
    }

    fn can_disable(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.state() != ServiceState::Enabled {
            return Err(self.conflict(format!("cannot be disabled because it is {}", self.state())));
        }

        let active: Vec<String> = ctx
            .referencing(&self.id)
            .into_iter()
            .filter(|summary| match summary.state {
                ComponentState::Service(state) => state.is_active(),
                ComponentState::Processor(state) => state == ProcessorState::Running,
            })
            .map(|summary| format!("{} '{}' is {}", summary.kind, summary.id, summary.state))
            .collect();

        if active.is_empty() {
            Ok(())
        } else {
            Err(self.conflict(format!("is still referenced by active components: {}", active.join(", "))))
        }
    }

    fn can_update(&self, _ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.state() == ServiceState::Disabled {
            Ok(())
        } else {
            Err(self.conflict(format!("cannot be modified while {}", self.state())))
        }
    }

    fn can_delete(&self, ctx: &dyn GuardContext) -> Result<(), LifecycleError> {
        if self.state() != ServiceState::Disabled {
            return Err(self.conflict(format!("cannot be deleted while {}", self.state())));
        }
        let referencing = ctx.referencing(&self.id);
        if !referencing.is_empty() {
            let names: Vec<String> = referencing
                .iter()
                .map(|summary| format!("{} '{}'", summary.kind, summary.id))
                .collect();
            return Err(self.conflict(format!("is still referenced by {}", names.join(", "))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::GroupId;
    use crate::domain::property::{Properties, PropertyDescriptor};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeContext {
        services: HashMap<ComponentId, ServiceState>,
        referencing: HashMap<ComponentId, Vec<ComponentSummary>>,
        connected: Vec<(ComponentId, String)>,
    }

    impl GuardContext for FakeContext {
        fn service_state(&self, id: &ComponentId) -> Option<ServiceState> {
            self.services.get(id).copied()
        }

        fn referencing(&self, service_id: &ComponentId) -> Vec<ComponentSummary> {
            self.referencing.get(service_id).cloned().unwrap_or_default()
        }

        fn connections_for(&self, component_id: &ComponentId, relationship: &str) -> Vec<Connection> {
            self.connected
                .iter()
                .filter(|(id, rel)| id == component_id && rel == relationship)
                .map(|(id, rel)| Connection::new("c", id.clone(), rel.clone(), ComponentId::from("down")))
                .collect()
        }

        fn has_connections(&self, component_id: &ComponentId) -> bool {
            self.connected.iter().any(|(id, _)| id == component_id)
        }
    }

    fn processor_using(service: &str) -> Processor {
        Processor::new(GroupId::root(), ComponentId::from("p1"), "Put", "PutSQL").with_properties(
            Properties::new()
                .with_descriptor(PropertyDescriptor::new("Pool").required().identifies_controller_service())
                .with_value("Pool", service),
        )
    }

    // ── Processor ─────────────────────────────────────────────────────────────

    #[test]
    fn test_processor_start_requires_enabled_service() {
        let mut ctx = FakeContext::default();
        ctx.services.insert(ComponentId::from("svc"), ServiceState::Disabled);
        let processor = processor_using("svc");

        let err = processor.can_start(&ctx).unwrap_err();
        assert!(err.to_string().contains("'svc' is DISABLED"));

        ctx.services.insert(ComponentId::from("svc"), ServiceState::Enabled);
        assert!(processor.can_start(&ctx).is_ok());
    }

    #[test]
    fn test_processor_start_requires_routed_relationships() {
        let ctx = FakeContext::default();
        let processor = Processor::new(GroupId::root(), ComponentId::from("p1"), "Log", "LogAttribute")
            .with_relationship("success");

        let err = processor.can_start(&ctx).unwrap_err();
        assert!(err.to_string().contains("Relationship 'success' is not connected"));

        let mut processor = processor;
        processor.auto_terminated_relationships.insert("success".to_string());
        assert!(processor.can_start(&ctx).is_ok());
    }

    #[test]
    fn test_disabled_processor_cannot_start_directly() {
        let ctx = FakeContext::default();
        let processor = Processor::new(GroupId::root(), ComponentId::from("p1"), "Log", "LogAttribute")
            .with_state(ProcessorState::Disabled);
        assert!(processor.can_start(&ctx).is_err());
        assert!(processor.can_enable(&ctx).is_ok());
        assert!(processor.can_disable(&ctx).is_err());
    }

    #[test]
    fn test_running_processor_guards() {
        let ctx = FakeContext::default();
        let processor = Processor::new(GroupId::root(), ComponentId::from("p1"), "Log", "LogAttribute")
            .with_state(ProcessorState::Running);
        assert!(processor.can_stop(&ctx).is_ok());
        assert!(processor.can_update(&ctx).is_err());
        assert!(processor.can_disable(&ctx).is_err());
        assert!(processor.can_delete(&ctx).is_err());
    }

    #[test]
    fn test_processor_delete_refused_with_connections() {
        let mut ctx = FakeContext::default();
        ctx.connected.push((ComponentId::from("p1"), "success".to_string()));
        let processor = Processor::new(GroupId::root(), ComponentId::from("p1"), "Log", "LogAttribute");
        assert!(processor.can_delete(&ctx).is_err());
    }

    // ── Controller Service ────────────────────────────────────────────────────

    #[test]
    fn test_service_disable_blocked_by_active_references() {
        let mut ctx = FakeContext::default();
        let service = ControllerService::new(ComponentId::from("svc"), "Pool", "DBCP")
            .with_state(ServiceState::Enabled);
        let mut dependent = ControllerService::new(ComponentId::from("dep"), "Lookup", "Lookup")
            .with_state(ServiceState::Enabled)
            .summary();
        ctx.referencing.insert(service.id.clone(), vec![dependent.clone()]);

        let err = service.can_disable(&ctx).unwrap_err();
        assert!(err.to_string().contains("controller_service 'dep' is ENABLED"));

        dependent.state = ComponentState::Service(ServiceState::Disabled);
        ctx.referencing.insert(service.id.clone(), vec![dependent]);
        assert!(service.can_disable(&ctx).is_ok());
    }

    #[test]
    fn test_service_update_and_delete_require_disabled() {
        let ctx = FakeContext::default();
        let enabled = ControllerService::new(ComponentId::from("svc"), "Pool", "DBCP")
            .with_state(ServiceState::Enabled);
        assert!(enabled.can_update(&ctx).is_err());
        assert!(enabled.can_delete(&ctx).is_err());
        assert!(enabled.can_start(&ctx).is_err());

        let disabled = ControllerService::new(ComponentId::from("svc"), "Pool", "DBCP");
        assert!(disabled.can_update(&ctx).is_ok());
        assert!(disabled.can_delete(&ctx).is_ok());
    }
}
