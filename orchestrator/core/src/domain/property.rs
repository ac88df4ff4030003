// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Component Properties
//!
//! A component's configuration is a map of property name to string value plus
//! the descriptors its type declares. A key that is absent is *unset* (the
//! descriptor default applies); a key present with an empty string was
//! explicitly cleared.
//!
//! Descriptors flagged `identifies_controller_service` are what the reference
//! graph is built from: a component references service `B` when such a
//! property holds `B`'s id.

use crate::domain::component::ComponentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowableValue {
    pub value: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AllowableValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            display_name: value.clone(),
            value,
            description: None,
        }
    }
}

/// Declared shape of a single property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Empty means the value is unconstrained.
    #[serde(default)]
    pub allowable_values: Vec<AllowableValue>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub identifies_controller_service: bool,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: None,
            default_value: None,
            allowable_values: Vec::new(),
            required: false,
            sensitive: false,
            dynamic: false,
            identifies_controller_service: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn allowable_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowable_values = values.into_iter().map(AllowableValue::new).collect();
        self
    }

    pub fn identifies_controller_service(mut self) -> Self {
        self.identifies_controller_service = true;
        self
    }

    fn allows(&self, value: &str) -> bool {
        self.allowable_values.is_empty()
            || self.allowable_values.iter().any(|allowed| allowed.value == value)
    }
}

/// Property values together with the descriptors that govern them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    descriptors: BTreeMap<String, PropertyDescriptor>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_descriptor(mut self, descriptor: PropertyDescriptor) -> Self {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Explicitly configured value, ignoring descriptor defaults.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Configured value, falling back to the descriptor default when unset.
    pub fn effective_value(&self, name: &str) -> Option<&str> {
        self.value(name).or_else(|| {
            self.descriptors
                .get(name)
                .and_then(|descriptor| descriptor.default_value.as_deref())
        })
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.descriptors.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Ids of the controller services this configuration points at.
    pub fn referenced_services(&self) -> BTreeSet<ComponentId> {
        self.descriptors
            .values()
            .filter(|descriptor| descriptor.identifies_controller_service)
            .filter_map(|descriptor| self.effective_value(&descriptor.name))
            .filter(|value| !value.trim().is_empty())
            .map(ComponentId::new)
            .collect()
    }

    /// Descriptor-level problems that make the component invalid.
    ///
    /// `service_exists` answers whether a referenced service id is known.
    pub fn validation_errors(&self, service_exists: impl Fn(&ComponentId) -> bool) -> Vec<String> {
        let mut errors = Vec::new();

        for descriptor in self.descriptors.values() {
            let value = match self.effective_value(&descriptor.name) {
                Some(value) if !value.is_empty() => value,
                _ => {
                    if descriptor.required {
                        errors.push(format!("'{}' is required", descriptor.display_name));
                    }
                    continue;
                }
            };

            if !descriptor.allows(value) {
                let allowed = descriptor
                    .allowable_values
                    .iter()
                    .map(|allowed| allowed.value.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                errors.push(format!(
                    "'{}' value '{}' is not one of [{}]",
                    descriptor.display_name, value, allowed
                ));
            }

            if descriptor.identifies_controller_service && !service_exists(&ComponentId::new(value)) {
                errors.push(format!(
                    "'{}' references unknown controller service '{}'",
                    descriptor.display_name, value
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_properties() -> Properties {
        Properties::new()
            .with_descriptor(PropertyDescriptor::new("Connection Pool").required().identifies_controller_service())
            .with_descriptor(PropertyDescriptor::new("Mode").allowable_values(["fast", "safe"]).default_value("safe"))
    }

    #[test]
    fn test_effective_value_falls_back_to_default() {
        let mut props = pool_properties();
        assert_eq!(props.value("Mode"), None);
        assert_eq!(props.effective_value("Mode"), Some("safe"));

        props.set("Mode", "fast");
        assert_eq!(props.effective_value("Mode"), Some("fast"));

        props.remove("Mode");
        assert_eq!(props.effective_value("Mode"), Some("safe"));
    }

    #[test]
    fn test_referenced_services_from_identifying_descriptors() {
        let props = pool_properties().with_value("Connection Pool", "svc-1").with_value("Other", "svc-2");
        let refs = props.referenced_services();
        assert_eq!(refs.len(), 1);
        assert!(refs.contains(&ComponentId::from("svc-1")));
    }

    #[test]
    fn test_validation_errors() {
        let props = pool_properties();
        let errors = props.validation_errors(|_| true);
        assert_eq!(errors, vec!["'Connection Pool' is required".to_string()]);

        let props = pool_properties()
            .with_value("Connection Pool", "missing")
            .with_value("Mode", "reckless");
        let errors = props.validation_errors(|id| id.as_str() != "missing");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("unknown controller service 'missing'"));
        assert!(errors[1].contains("not one of [fast, safe]"));
    }

    #[test]
    fn test_explicitly_cleared_value_counts_as_missing() {
        let props = pool_properties().with_value("Connection Pool", "");
        assert!(props.referenced_services().is_empty());
        assert_eq!(props.validation_errors(|_| true).len(), 1);
    }
}
