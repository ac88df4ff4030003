// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Guard contexts
//!
//! [`FlowGuardContext`] answers guard queries from the live registry,
//! reference graph and connection index. [`ProjectedGuardContext`] overlays
//! planned states on top of another context so a cascade can verify later
//! members as if earlier members had already transitioned.

use crate::domain::component::{ComponentId, ComponentState, ComponentSummary, ServiceState};
use crate::domain::graph::{ComponentRegistry, Connection, ConnectionIndex, ReferenceGraph};
use crate::domain::guard::GuardContext;
use std::collections::HashMap;

pub struct FlowGuardContext<'a> {
    registry: &'a dyn ComponentRegistry,
    graph: &'a dyn ReferenceGraph,
    connections: &'a dyn ConnectionIndex,
}

impl<'a> FlowGuardContext<'a> {
    pub fn new(
        registry: &'a dyn ComponentRegistry,
        graph: &'a dyn ReferenceGraph,
        connections: &'a dyn ConnectionIndex,
    ) -> Self {
        Self {
            registry,
            graph,
            connections,
        }
    }
}

impl GuardContext for FlowGuardContext<'_> {
    fn service_state(&self, id: &ComponentId) -> Option<ServiceState> {
        self.registry
            .find_controller_service(id)
            .ok()
            .map(|handle| handle.read().state())
    }

    fn referencing(&self, service_id: &ComponentId) -> Vec<ComponentSummary> {
        self.graph
            .referencing_components(service_id)
            .iter()
            .map(|handle| handle.summary())
            .collect()
    }

    fn connections_for(&self, component_id: &ComponentId, relationship: &str) -> Vec<Connection> {
        self.connections.connections_for(component_id, relationship)
    }

    fn has_connections(&self, component_id: &ComponentId) -> bool {
        !self.connections.connections_of(component_id).is_empty()
    }
}

pub struct ProjectedGuardContext<'a> {
    base: &'a dyn GuardContext,
    planned: HashMap<ComponentId, ComponentState>,
}

impl<'a> ProjectedGuardContext<'a> {
    pub fn new(base: &'a dyn GuardContext) -> Self {
        Self {
            base,
            planned: HashMap::new(),
        }
    }

    /// Record that `id` will be in `state` once the plan is applied.
    pub fn project(&mut self, id: ComponentId, state: ComponentState) {
        self.planned.insert(id, state);
    }
}

impl GuardContext for ProjectedGuardContext<'_> {
    fn service_state(&self, id: &ComponentId) -> Option<ServiceState> {
        match self.planned.get(id) {
            Some(ComponentState::Service(state)) => Some(*state),
            _ => self.base.service_state(id),
        }
    }

    fn referencing(&self, service_id: &ComponentId) -> Vec<ComponentSummary> {
        self.base
            .referencing(service_id)
            .into_iter()
            .map(|mut summary| {
                if let Some(state) = self.planned.get(&summary.id) {
                    summary.state = *state;
                }
                summary
            })
            .collect()
    }

    fn connections_for(&self, component_id: &ComponentId, relationship: &str) -> Vec<Connection> {
        self.base.connections_for(component_id, relationship)
    }

    fn has_connections(&self, component_id: &ComponentId) -> bool {
        self.base.has_connections(component_id)
    }
}
