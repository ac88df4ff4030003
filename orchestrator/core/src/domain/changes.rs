// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Proposed Changes
//!
//! A request against a component arrives as a sparse field set: every field is
//! optional and an absent field is left untouched. Enumerated fields arrive as
//! raw strings so an unknown value is reported as a field violation rather
//! than failing deserialization.
//!
//! Validation turns a change set into a typed patch ([`ProcessorPatch`],
//! [`ServicePatch`]); only patches are ever applied.

use crate::domain::component::{
    BulletinLevel, ComponentId, ComponentKind, GroupId, Position, ProcessorState,
    SchedulingStrategy, ServiceState,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Addresses a registered component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentRef {
    Processor { group_id: GroupId, id: ComponentId },
    ControllerService { id: ComponentId },
}

impl ComponentRef {
    pub fn processor(group_id: impl Into<GroupId>, id: impl Into<ComponentId>) -> Self {
        Self::Processor {
            group_id: group_id.into(),
            id: id.into(),
        }
    }

    pub fn controller_service(id: impl Into<ComponentId>) -> Self {
        Self::ControllerService { id: id.into() }
    }

    pub fn id(&self) -> &ComponentId {
        match self {
            Self::Processor { id, .. } => id,
            Self::ControllerService { id } => id,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Processor { .. } => ComponentKind::Processor,
            Self::ControllerService { .. } => ComponentKind::ControllerService,
        }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.id())
    }
}

/// Requested target of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetState {
    Processor(ProcessorState),
    Service(ServiceState),
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processor(state) => state.fmt(f),
            Self::Service(state) => state.fmt(f),
        }
    }
}

/// Sparse processor field set.
///
/// In `properties`, a `None` value removes the property; keys not present are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorChanges {
    pub name: Option<String>,
    pub scheduling_strategy: Option<String>,
    pub scheduling_period: Option<String>,
    pub concurrent_tasks: Option<i32>,
    pub penalty_duration: Option<String>,
    pub yield_duration: Option<String>,
    pub run_duration_millis: Option<u64>,
    pub bulletin_level: Option<String>,
    pub loss_tolerant: Option<bool>,
    pub comments: Option<String>,
    pub annotation_data: Option<String>,
    pub properties: Option<BTreeMap<String, Option<String>>>,
    pub auto_terminated_relationships: Option<BTreeSet<String>>,
    pub position: Option<Position>,
    pub style: Option<BTreeMap<String, String>>,
    pub state: Option<String>,
}

impl ProcessorChanges {
    /// Whether any configuration field (anything but `state`) is present.
    pub fn is_modification(&self) -> bool {
        self.name.is_some()
            || self.scheduling_strategy.is_some()
            || self.scheduling_period.is_some()
            || self.concurrent_tasks.is_some()
            || self.penalty_duration.is_some()
            || self.yield_duration.is_some()
            || self.run_duration_millis.is_some()
            || self.bulletin_level.is_some()
            || self.loss_tolerant.is_some()
            || self.comments.is_some()
            || self.annotation_data.is_some()
            || self.properties.is_some()
            || self.auto_terminated_relationships.is_some()
            || self.position.is_some()
            || self.style.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceChanges {
    pub name: Option<String>,
    pub comments: Option<String>,
    pub annotation_data: Option<String>,
    pub properties: Option<BTreeMap<String, Option<String>>>,
    pub state: Option<String>,
}

impl ServiceChanges {
    pub fn is_modification(&self) -> bool {
        self.name.is_some()
            || self.comments.is_some()
            || self.annotation_data.is_some()
            || self.properties.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentChanges {
    Processor(ProcessorChanges),
    ControllerService(ServiceChanges),
}

impl ComponentChanges {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Processor(_) => ComponentKind::Processor,
            Self::ControllerService(_) => ComponentKind::ControllerService,
        }
    }

    pub fn is_modification(&self) -> bool {
        match self {
            Self::Processor(changes) => changes.is_modification(),
            Self::ControllerService(changes) => changes.is_modification(),
        }
    }

    /// A change set that only requests a state transition.
    pub fn state_only(target: TargetState) -> Self {
        match target {
            TargetState::Processor(state) => Self::Processor(ProcessorChanges {
                state: Some(state.as_str().to_string()),
                ..Default::default()
            }),
            TargetState::Service(state) => Self::ControllerService(ServiceChanges {
                state: Some(state.as_str().to_string()),
                ..Default::default()
            }),
        }
    }
}

/// Validated processor change set, ready for the applier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorPatch {
    pub name: Option<String>,
    pub scheduling_strategy: Option<SchedulingStrategy>,
    pub scheduling_period: Option<String>,
    pub concurrent_tasks: Option<i32>,
    pub penalty_duration: Option<String>,
    pub yield_duration: Option<String>,
    pub run_duration_millis: Option<u64>,
    pub bulletin_level: Option<BulletinLevel>,
    pub loss_tolerant: Option<bool>,
    pub comments: Option<String>,
    pub annotation_data: Option<String>,
    pub properties: Option<BTreeMap<String, Option<String>>>,
    pub auto_terminated_relationships: Option<BTreeSet<String>>,
    pub position: Option<Position>,
    pub style: Option<BTreeMap<String, String>>,
    pub state: Option<ProcessorState>,
}

impl ProcessorPatch {
    pub fn is_modification(&self) -> bool {
        self.name.is_some()
            || self.scheduling_strategy.is_some()
            || self.scheduling_period.is_some()
            || self.concurrent_tasks.is_some()
            || self.penalty_duration.is_some()
            || self.yield_duration.is_some()
            || self.run_duration_millis.is_some()
            || self.bulletin_level.is_some()
            || self.loss_tolerant.is_some()
            || self.comments.is_some()
            || self.annotation_data.is_some()
            || self.properties.is_some()
            || self.auto_terminated_relationships.is_some()
            || self.position.is_some()
            || self.style.is_some()
    }
}

/// Validated controller service change set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub comments: Option<String>,
    pub annotation_data: Option<String>,
    pub properties: Option<BTreeMap<String, Option<String>>>,
    pub state: Option<ServiceState>,
}

impl ServicePatch {
    pub fn is_modification(&self) -> bool {
        self.name.is_some()
            || self.comments.is_some()
            || self.annotation_data.is_some()
            || self.properties.is_some()
    }
}
