// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration Applier
//!
//! Copies a validated patch onto a component. No decisions are made here: the
//! patch has already passed field validation and the coordinator has already
//! admitted the request.
//!
//! Processor fields are applied in a fixed order:
//!
//! 1. scheduling strategy
//! 2. comments, annotation data
//! 3. concurrent tasks, scheduling period, penalty, yield, run duration,
//!    bulletin level, loss tolerance
//! 4. properties (`None` removes, `Some` sets, unmentioned keys untouched)
//! 5. auto-terminated relationships (replaced, not merged)
//! 6. position, style
//! 7. name
//!
//! The operational state is never touched here; transitions belong to the
//! coordinator.

use crate::domain::changes::{ProcessorPatch, ServicePatch};
use crate::domain::component::{ControllerService, Processor};
use crate::domain::property::Properties;
use std::collections::BTreeMap;

pub struct ConfigurationApplier;

impl ConfigurationApplier {
    pub fn apply_processor(processor: &mut Processor, patch: &ProcessorPatch) {
        if let Some(strategy) = patch.scheduling_strategy {
            processor.scheduling_strategy = strategy;
        }

        if let Some(comments) = &patch.comments {
            processor.comments = comments.clone();
        }
        if let Some(annotation_data) = &patch.annotation_data {
            processor.annotation_data = Some(annotation_data.clone());
        }

        if let Some(tasks) = patch.concurrent_tasks {
            processor.concurrent_tasks = tasks;
        }
        if let Some(period) = &patch.scheduling_period {
            processor.scheduling_period = period.clone();
        }
        if let Some(penalty) = &patch.penalty_duration {
            processor.penalty_duration = penalty.clone();
        }
        if let Some(yield_duration) = &patch.yield_duration {
            processor.yield_duration = yield_duration.clone();
        }
        if let Some(run_duration) = patch.run_duration_millis {
            processor.run_duration_millis = run_duration;
        }
        if let Some(level) = patch.bulletin_level {
            processor.bulletin_level = level;
        }
        if let Some(loss_tolerant) = patch.loss_tolerant {
            processor.loss_tolerant = loss_tolerant;
        }

        if let Some(properties) = &patch.properties {
            apply_properties(&mut processor.properties, properties);
        }

        if let Some(relationships) = &patch.auto_terminated_relationships {
            processor.auto_terminated_relationships = relationships.clone();
        }

        if let Some(position) = patch.position {
            processor.position = position;
        }
        if let Some(style) = &patch.style {
            processor.style = style.clone();
        }

        if let Some(name) = &patch.name {
            processor.name = name.clone();
        }
    }

    pub fn apply_service(service: &mut ControllerService, patch: &ServicePatch) {
        if let Some(comments) = &patch.comments {
            service.comments = comments.clone();
        }
        if let Some(annotation_data) = &patch.annotation_data {
            service.annotation_data = Some(annotation_data.clone());
        }
        if let Some(properties) = &patch.properties {
            apply_properties(&mut service.properties, properties);
        }
        if let Some(name) = &patch.name {
            service.name = name.clone();
        }
    }
}

fn apply_properties(target: &mut Properties, changes: &BTreeMap<String, Option<String>>) {
    for (name, value) in changes {
        match value {
            Some(value) => target.set(name.clone(), value.clone()),
            None => {
                target.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{ComponentId, GroupId, Position, SchedulingStrategy};
    use std::collections::BTreeSet;

    fn processor() -> Processor {
        let mut processor = Processor::new(GroupId::root(), ComponentId::from("p1"), "Fetch", "FetchFile");
        processor.properties.set("Directory", "/in");
        processor.properties.set("Batch Size", "10");
        processor.auto_terminated_relationships.insert("failure".to_string());
        processor
    }

    #[test]
    fn test_empty_patch_is_a_no_op() {
        let original = processor();
        let mut updated = original.clone();
        ConfigurationApplier::apply_processor(&mut updated, &ProcessorPatch::default());
        assert_eq!(updated, original);
    }

    #[test]
    fn test_properties_are_set_removed_or_left_alone() {
        let mut processor = processor();
        let patch = ProcessorPatch {
            properties: Some(BTreeMap::from([
                ("Directory".to_string(), None),
                ("Recurse".to_string(), Some("true".to_string())),
            ])),
            ..Default::default()
        };
        ConfigurationApplier::apply_processor(&mut processor, &patch);

        assert_eq!(processor.properties.value("Directory"), None);
        assert_eq!(processor.properties.value("Recurse"), Some("true"));
        assert_eq!(processor.properties.value("Batch Size"), Some("10"));
    }

    #[test]
    fn test_auto_terminated_relationships_are_replaced() {
        let mut processor = processor();
        let patch = ProcessorPatch {
            auto_terminated_relationships: Some(BTreeSet::from(["success".to_string()])),
            ..Default::default()
        };
        ConfigurationApplier::apply_processor(&mut processor, &patch);
        assert_eq!(processor.auto_terminated_relationships, BTreeSet::from(["success".to_string()]));
    }

    #[test]
    fn test_scheduling_and_display_fields() {
        let mut processor = processor();
        let patch = ProcessorPatch {
            name: Some("Fetch Orders".to_string()),
            scheduling_strategy: Some(SchedulingStrategy::CronDriven),
            scheduling_period: Some("0 0 * * * ?".to_string()),
            position: Some(Position::new(10.0, 20.0)),
            ..Default::default()
        };
        ConfigurationApplier::apply_processor(&mut processor, &patch);

        assert_eq!(processor.scheduling_strategy, SchedulingStrategy::CronDriven);
        assert_eq!(processor.scheduling_period, "0 0 * * * ?");
        assert_eq!(processor.position, Position::new(10.0, 20.0));
        assert_eq!(processor.name, "Fetch Orders");
    }

    #[test]
    fn test_service_patch() {
        let mut service = ControllerService::new(ComponentId::from("s1"), "Pool", "DBCP");
        let patch = ServicePatch {
            comments: Some("primary".to_string()),
            properties: Some(BTreeMap::from([("URL".to_string(), Some("jdbc:h2:mem".to_string()))])),
            ..Default::default()
        };
        ConfigurationApplier::apply_service(&mut service, &patch);
        assert_eq!(service.comments, "primary");
        assert_eq!(service.properties.value("URL"), Some("jdbc:h2:mem"));
        assert_eq!(service.name, "Pool");
    }
}
