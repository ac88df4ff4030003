// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dataflow Components
//!
//! The two schedulable/referenceable aggregates whose operational state the
//! lifecycle coordinator governs:
//!
//! | Type | Lifecycle | States |
//! |------|-----------|--------|
//! | [`Processor`] | scheduled | `DISABLED`, `STOPPED`, `RUNNING` |
//! | [`ControllerService`] | enabled | `DISABLED`, `ENABLING`, `ENABLED`, `DISABLING` |
//!
//! Components are created by an external factory and handed over already
//! registered. The coordinator only reads and transitions them through the
//! shared [`ProcessorHandle`] / [`ServiceHandle`] wrappers.

use crate::domain::property::Properties;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// Value Objects
// ============================================================================

/// Opaque unique identifier of a processor or controller service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of the process group that contains a processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root group of a flow.
    pub fn root() -> Self {
        Self("root".to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GroupId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Processor,
    ControllerService,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processor => "processor",
            Self::ControllerService => "controller_service",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduled state of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorState {
    Disabled,
    Stopped,
    Running,
}

impl ProcessorState {
    pub const ALL: [ProcessorState; 3] = [Self::Running, Self::Stopped, Self::Disabled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Stopped => "STOPPED",
            Self::Running => "RUNNING",
        }
    }
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Value must be one of [{}]", joined(&Self::ALL)))
    }
}

/// Enablement state of a controller service.
///
/// `ENABLING` and `DISABLING` are only ever entered as a side effect of an
/// enable/disable action; they are never valid requested targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

impl ServiceState {
    pub const ALL: [ServiceState; 4] = [Self::Disabled, Self::Enabling, Self::Enabled, Self::Disabling];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Enabling => "ENABLING",
            Self::Enabled => "ENABLED",
            Self::Disabling => "DISABLING",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Enabling | Self::Disabling)
    }

    /// Whether the service is enabled or on its way there.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Enabling | Self::Enabled)
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::Disabled
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Value must be one of [{}]", joined(&Self::ALL)))
    }
}

/// Operational state of either component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentState {
    Processor(ProcessorState),
    Service(ServiceState),
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processor(state) => state.fmt(f),
            Self::Service(state) => state.fmt(f),
        }
    }
}

/// How a processor is triggered; governs which scheduling fields are
/// meaningful and how they are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulingStrategy {
    TimerDriven,
    EventDriven,
    CronDriven,
    PrimaryNodeOnly,
}

impl SchedulingStrategy {
    pub const ALL: [SchedulingStrategy; 4] = [
        Self::TimerDriven,
        Self::EventDriven,
        Self::CronDriven,
        Self::PrimaryNodeOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimerDriven => "TIMER_DRIVEN",
            Self::EventDriven => "EVENT_DRIVEN",
            Self::CronDriven => "CRON_DRIVEN",
            Self::PrimaryNodeOnly => "PRIMARY_NODE_ONLY",
        }
    }
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        Self::TimerDriven
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("Value must be one of [{}]", joined(&Self::ALL)))
    }
}

/// Minimum severity at which a processor emits bulletins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulletinLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    None,
}

impl BulletinLevel {
    pub const ALL: [BulletinLevel; 7] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
        Self::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::None => "NONE",
        }
    }
}

impl Default for BulletinLevel {
    fn default() -> Self {
        Self::Warn
    }
}

impl fmt::Display for BulletinLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulletinLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("Value must be one of [{}]", joined(&Self::ALL)))
    }
}

fn joined<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Canvas position of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// A schedulable dataflow component with named output relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor {
    pub id: ComponentId,
    pub group_id: GroupId,
    pub name: String,
    pub component_type: String,
    state: ProcessorState,
    pub scheduling_strategy: SchedulingStrategy,
    pub scheduling_period: String,
    pub concurrent_tasks: i32,
    pub penalty_duration: String,
    pub yield_duration: String,
    pub run_duration_millis: u64,
    pub bulletin_level: BulletinLevel,
    pub loss_tolerant: bool,
    pub comments: String,
    pub annotation_data: Option<String>,
    pub properties: Properties,
    /// Relationships the processor declares.
    pub relationships: BTreeSet<String>,
    pub auto_terminated_relationships: BTreeSet<String>,
    pub position: Position,
    pub style: BTreeMap<String, String>,
}

impl Processor {
    pub fn new(
        group_id: GroupId,
        id: ComponentId,
        name: impl Into<String>,
        component_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            group_id,
            name: name.into(),
            component_type: component_type.into(),
            state: ProcessorState::Stopped,
            scheduling_strategy: SchedulingStrategy::TimerDriven,
            scheduling_period: "0 sec".to_string(),
            concurrent_tasks: 1,
            penalty_duration: "30 sec".to_string(),
            yield_duration: "1 sec".to_string(),
            run_duration_millis: 0,
            bulletin_level: BulletinLevel::Warn,
            loss_tolerant: false,
            comments: String::new(),
            annotation_data: None,
            properties: Properties::default(),
            relationships: BTreeSet::new(),
            auto_terminated_relationships: BTreeSet::new(),
            position: Position::default(),
            style: BTreeMap::new(),
        }
    }

    pub fn with_relationship(mut self, name: impl Into<String>) -> Self {
        self.relationships.insert(name.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Set the initial state handed over by the component factory.
    pub fn with_state(mut self, state: ProcessorState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ProcessorState) {
        self.state = state;
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessorState::Running
    }

    pub fn summary(&self) -> ComponentSummary {
        ComponentSummary {
            id: self.id.clone(),
            group_id: Some(self.group_id.clone()),
            kind: ComponentKind::Processor,
            name: self.name.clone(),
            state: ComponentState::Processor(self.state),
        }
    }
}

/// A shared, referenceable resource component with its own enable/disable
/// lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerService {
    pub id: ComponentId,
    pub name: String,
    pub component_type: String,
    state: ServiceState,
    pub comments: String,
    pub annotation_data: Option<String>,
    pub properties: Properties,
}

impl ControllerService {
    pub fn new(id: ComponentId, name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            component_type: component_type.into(),
            state: ServiceState::Disabled,
            comments: String::new(),
            annotation_data: None,
            properties: Properties::default(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Set the initial state handed over by the component factory.
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ServiceState) {
        self.state = state;
    }

    pub fn summary(&self) -> ComponentSummary {
        ComponentSummary {
            id: self.id.clone(),
            group_id: None,
            kind: ComponentKind::ControllerService,
            name: self.name.clone(),
            state: ComponentState::Service(self.state),
        }
    }
}

// ============================================================================
// Shared handles and read models
// ============================================================================

/// Registry-owned processor; the coordinator borrows it for the duration of a
/// request and never holds the lock across an engine call.
pub type ProcessorHandle = Arc<RwLock<Processor>>;

/// Registry-owned controller service.
pub type ServiceHandle = Arc<RwLock<ControllerService>>;

#[derive(Debug, Clone)]
pub enum ComponentHandle {
    Processor(ProcessorHandle),
    ControllerService(ServiceHandle),
}

impl ComponentHandle {
    pub fn id(&self) -> ComponentId {
        match self {
            Self::Processor(handle) => handle.read().id.clone(),
            Self::ControllerService(handle) => handle.read().id.clone(),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Processor(_) => ComponentKind::Processor,
            Self::ControllerService(_) => ComponentKind::ControllerService,
        }
    }

    pub fn summary(&self) -> ComponentSummary {
        match self {
            Self::Processor(handle) => handle.read().summary(),
            Self::ControllerService(handle) => handle.read().summary(),
        }
    }

    pub fn snapshot(&self) -> ComponentSnapshot {
        match self {
            Self::Processor(handle) => ComponentSnapshot::Processor(handle.read().clone()),
            Self::ControllerService(handle) => {
                ComponentSnapshot::ControllerService(handle.read().clone())
            }
        }
    }
}

/// Lightweight view of a component used when reporting references and
/// cascade results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: ComponentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub kind: ComponentKind,
    pub name: String,
    pub state: ComponentState,
}

/// Point-in-time copy of a component returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentSnapshot {
    Processor(Processor),
    ControllerService(ControllerService),
}

impl ComponentSnapshot {
    pub fn id(&self) -> &ComponentId {
        match self {
            Self::Processor(processor) => &processor.id,
            Self::ControllerService(service) => &service.id,
        }
    }

    pub fn state(&self) -> ComponentState {
        match self {
            Self::Processor(processor) => ComponentState::Processor(processor.state()),
            Self::ControllerService(service) => ComponentState::Service(service.state()),
        }
    }

    pub fn as_processor(&self) -> Option<&Processor> {
        match self {
            Self::Processor(processor) => Some(processor),
            Self::ControllerService(_) => None,
        }
    }

    pub fn as_service(&self) -> Option<&ControllerService> {
        match self {
            Self::Processor(_) => None,
            Self::ControllerService(service) => Some(service),
        }
    }
}
