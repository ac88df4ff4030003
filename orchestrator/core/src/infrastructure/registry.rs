// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory flow registry
//!
//! Holds the registered processors, controller services and connections of a
//! flow and implements the three read-only views the coordinator consumes:
//! [`ComponentRegistry`], [`ReferenceGraph`] and [`ConnectionIndex`].
//!
//! References are derived from component properties: a component references
//! service `B` when a service-identifying property holds `B`'s id. Results are
//! returned in id order so cascades are reproducible.
//!
//! Registration and removal are owner operations (the containing group or
//! service registry); the coordinator never calls them.

use crate::domain::component::{
    ComponentHandle, ComponentId, ComponentKind, ControllerService, GroupId, Processor,
    ProcessorHandle, ServiceHandle,
};
use crate::domain::error::LifecycleError;
use crate::domain::graph::{ComponentRegistry, Connection, ConnectionIndex, ReferenceGraph};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct InMemoryFlowRegistry {
    processors: Arc<RwLock<BTreeMap<ComponentId, ProcessorHandle>>>,
    services: Arc<RwLock<BTreeMap<ComponentId, ServiceHandle>>>,
    connections: Arc<RwLock<BTreeMap<String, Connection>>>,
}

impl InMemoryFlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_processor(&self, processor: Processor) -> ProcessorHandle {
        debug!(processor_id = %processor.id, group_id = %processor.group_id, "Registering processor");
        let id = processor.id.clone();
        let handle = Arc::new(RwLock::new(processor));
        self.processors.write().insert(id, handle.clone());
        handle
    }

    pub fn register_controller_service(&self, service: ControllerService) -> ServiceHandle {
        debug!(service_id = %service.id, "Registering controller service");
        let id = service.id.clone();
        let handle = Arc::new(RwLock::new(service));
        self.services.write().insert(id, handle.clone());
        handle
    }

    pub fn add_connection(&self, connection: Connection) {
        self.connections.write().insert(connection.id.clone(), connection);
    }

    pub fn remove_connection(&self, connection_id: &str) -> Option<Connection> {
        self.connections.write().remove(connection_id)
    }

    pub fn remove_processor(&self, id: &ComponentId) -> Option<ProcessorHandle> {
        self.processors.write().remove(id)
    }

    pub fn remove_controller_service(&self, id: &ComponentId) -> Option<ServiceHandle> {
        self.services.write().remove(id)
    }

    pub fn processor_count(&self) -> usize {
        self.processors.read().len()
    }

    pub fn controller_service_count(&self) -> usize {
        self.services.read().len()
    }
}

impl ComponentRegistry for InMemoryFlowRegistry {
    fn find_processor(&self, group_id: &GroupId, id: &ComponentId) -> Result<ProcessorHandle, LifecycleError> {
        self.processors
            .read()
            .get(id)
            .filter(|handle| &handle.read().group_id == group_id)
            .cloned()
            .ok_or_else(|| LifecycleError::not_found(ComponentKind::Processor, id))
    }

    fn find_controller_service(&self, id: &ComponentId) -> Result<ServiceHandle, LifecycleError> {
        self.services
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| LifecycleError::not_found(ComponentKind::ControllerService, id))
    }
}

impl ReferenceGraph for InMemoryFlowRegistry {
    fn referencing_components(&self, service_id: &ComponentId) -> Vec<ComponentHandle> {
        let services = self
            .services
            .read()
            .values()
            .filter(|handle| handle.read().properties.referenced_services().contains(service_id))
            .cloned()
            .map(ComponentHandle::ControllerService)
            .collect::<Vec<_>>();

        let processors = self
            .processors
            .read()
            .values()
            .filter(|handle| handle.read().properties.referenced_services().contains(service_id))
            .cloned()
            .map(ComponentHandle::Processor)
            .collect::<Vec<_>>();

        services.into_iter().chain(processors).collect()
    }

    fn referenced_services(&self, service_id: &ComponentId) -> Vec<ServiceHandle> {
        let Ok(service) = self.find_controller_service(service_id) else {
            return Vec::new();
        };
        let referenced = service.read().properties.referenced_services();

        let services = self.services.read();
        referenced
            .iter()
            .filter_map(|id| services.get(id).cloned())
            .collect()
    }
}

impl ConnectionIndex for InMemoryFlowRegistry {
    fn connections_for(&self, component_id: &ComponentId, relationship: &str) -> Vec<Connection> {
        self.connections
            .read()
            .values()
            .filter(|connection| &connection.source_id == component_id && connection.relationship == relationship)
            .cloned()
            .collect()
    }

    fn connections_of(&self, component_id: &ComponentId) -> Vec<Connection> {
        self.connections
            .read()
            .values()
            .filter(|connection| {
                &connection.source_id == component_id || &connection.destination_id == component_id
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::property::{Properties, PropertyDescriptor};

    fn referencing(service: &str) -> Properties {
        Properties::new()
            .with_descriptor(PropertyDescriptor::new("Service").identifies_controller_service())
            .with_value("Service", service)
    }

    #[test]
    fn test_find_processor_requires_matching_group() {
        let registry = InMemoryFlowRegistry::new();
        registry.register_processor(Processor::new(GroupId::from("g1"), ComponentId::from("p1"), "P", "T"));

        assert!(registry.find_processor(&GroupId::from("g1"), &ComponentId::from("p1")).is_ok());
        let err = registry
            .find_processor(&GroupId::from("g2"), &ComponentId::from("p1"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to find processor with id 'p1'");
    }

    #[test]
    fn test_reference_graph_is_derived_from_properties() {
        let registry = InMemoryFlowRegistry::new();
        registry.register_controller_service(ControllerService::new(ComponentId::from("base"), "Base", "T"));
        registry.register_controller_service(
            ControllerService::new(ComponentId::from("lookup"), "Lookup", "T").with_properties(referencing("base")),
        );
        registry.register_processor(
            Processor::new(GroupId::root(), ComponentId::from("p1"), "P", "T").with_properties(referencing("base")),
        );

        let referencing_ids: Vec<ComponentId> = registry
            .referencing_components(&ComponentId::from("base"))
            .iter()
            .map(|handle| handle.id())
            .collect();
        assert_eq!(referencing_ids, vec![ComponentId::from("lookup"), ComponentId::from("p1")]);

        let referenced = registry.referenced_services(&ComponentId::from("lookup"));
        assert_eq!(referenced.len(), 1);
        assert_eq!(referenced[0].read().id, ComponentId::from("base"));
    }

    #[test]
    fn test_connection_index() {
        let registry = InMemoryFlowRegistry::new();
        registry.add_connection(Connection::new(
            "c1",
            ComponentId::from("p1"),
            "success",
            ComponentId::from("p2"),
        ));

        assert_eq!(registry.connections_for(&ComponentId::from("p1"), "success").len(), 1);
        assert!(registry.connections_for(&ComponentId::from("p1"), "failure").is_empty());
        assert_eq!(registry.connections_of(&ComponentId::from("p2")).len(), 1);

        registry.remove_connection("c1");
        assert!(registry.connections_of(&ComponentId::from("p1")).is_empty());
    }
}
