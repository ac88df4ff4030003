// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Flow Graph Collaborator Interfaces
//!
//! Read-only views of the running flow consumed by the coordinator. The
//! coordinator never adds or removes components or connections through them.
//!
//! | Trait | Answers |
//! |-------|---------|
//! | [`ComponentRegistry`] | lookup of processors (per group) and controller services |
//! | [`ReferenceGraph`] | who references a service, and what a service references |
//! | [`ConnectionIndex`] | which connections are bound to a component's relationships |
//!
//! `infrastructure::registry::InMemoryFlowRegistry` implements all three.

use crate::domain::component::{ComponentHandle, ComponentId, GroupId, ProcessorHandle, ServiceHandle};
use crate::domain::error::LifecycleError;
use serde::{Deserialize, Serialize};

/// Binds a source component's named relationship to a downstream component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub source_id: ComponentId,
    pub relationship: String,
    pub destination_id: ComponentId,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        source_id: ComponentId,
        relationship: impl Into<String>,
        destination_id: ComponentId,
    ) -> Self {
        Self {
            id: id.into(),
            source_id,
            relationship: relationship.into(),
            destination_id,
        }
    }
}

pub trait ComponentRegistry: Send + Sync {
    fn find_processor(&self, group_id: &GroupId, id: &ComponentId) -> Result<ProcessorHandle, LifecycleError>;

    fn find_controller_service(&self, id: &ComponentId) -> Result<ServiceHandle, LifecycleError>;
}

pub trait ReferenceGraph: Send + Sync {
    /// Components whose configuration references `service_id`, in a stable order.
    fn referencing_components(&self, service_id: &ComponentId) -> Vec<ComponentHandle>;

    /// Services that `service_id` itself references.
    fn referenced_services(&self, service_id: &ComponentId) -> Vec<ServiceHandle>;
}

pub trait ConnectionIndex: Send + Sync {
    fn connections_for(&self, component_id: &ComponentId, relationship: &str) -> Vec<Connection>;

    /// Every connection that has the component as source or destination.
    fn connections_of(&self, component_id: &ComponentId) -> Vec<Connection>;
}
