// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle Rejections
//!
//! Every coordinator operation fails with a [`LifecycleError`]. The variants
//! map onto the rejection taxonomy exposed to the transport layer through
//! [`LifecycleError::kind`]:
//!
//! | Kind | Raised when |
//! |------|-------------|
//! | `NotFound` | the registry does not know the id |
//! | `InvalidField` | a field breaks its format/enum/range rule (batched) |
//! | `MalformedExpression` | a cron scheduling period does not parse (fail fast) |
//! | `StateConflict` | illegal transition, failed guard, or a transition already in flight |
//! | `StructuralConflict` | auto-termination of a relationship with a live connection (batched) |
//! | `CascadeFailure` | one or more closure members failed verification or execution |
//! | `EngineRejection` | the execution engine refused a start/stop/enable/disable |
//! | `NotCancellable` | cancellation requested after a cascade began applying |

use crate::domain::component::{ComponentId, ComponentKind};
use crate::domain::engine::{EngineError, LifecycleAction};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidField,
    MalformedExpression,
    StateConflict,
    StructuralConflict,
    CascadeFailure,
    EngineRejection,
    NotCancellable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidField => "invalid_field",
            Self::MalformedExpression => "malformed_expression",
            Self::StateConflict => "state_conflict",
            Self::StructuralConflict => "structural_conflict",
            Self::CascadeFailure => "cascade_failure",
            Self::EngineRejection => "engine_rejection",
            Self::NotCancellable => "not_cancellable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    InvalidField,
    StructuralConflict,
}

/// A single field-level problem collected into a validation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl FieldViolation {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ViolationKind::InvalidField,
            message: message.into(),
        }
    }

    pub fn structural(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ViolationKind::StructuralConflict,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Why one member of a reference closure could not be transitioned.
#[derive(Debug, Clone)]
pub struct MemberFailure {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub cause: LifecycleError,
}

impl fmt::Display for MemberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({})", self.kind, self.id, self.cause)
    }
}

#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error("Unable to find {kind} with id '{id}'")]
    NotFound { kind: ComponentKind, id: ComponentId },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<FieldViolation>),

    #[error("{field} '{expression}' is not a valid cron expression: {reason}")]
    MalformedExpression {
        field: String,
        expression: String,
        reason: String,
    },

    #[error("{kind} '{id}': {reason}")]
    StateConflict {
        kind: ComponentKind,
        id: ComponentId,
        reason: String,
    },

    #[error("Cascade on controller service '{service_id}' failed: {}", join(.failures))]
    CascadeFailure {
        service_id: ComponentId,
        failures: Vec<MemberFailure>,
        /// Members already transitioned before the failure was reported.
        applied: Vec<ComponentId>,
    },

    #[error("Execution engine rejected {action} of {kind} '{id}': {source}")]
    EngineRejection {
        kind: ComponentKind,
        id: ComponentId,
        action: LifecycleAction,
        source: EngineError,
    },

    #[error("Cascade on controller service '{service_id}' has already begun applying and cannot be cancelled")]
    NotCancellable { service_id: ComponentId },
}

impl LifecycleError {
    pub fn not_found(kind: ComponentKind, id: &ComponentId) -> Self {
        Self::NotFound { kind, id: id.clone() }
    }

    pub fn state_conflict(kind: ComponentKind, id: &ComponentId, reason: impl Into<String>) -> Self {
        Self::StateConflict {
            kind,
            id: id.clone(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(violations) => {
                if violations.iter().any(|v| v.kind == ViolationKind::InvalidField) {
                    ErrorKind::InvalidField
                } else {
                    ErrorKind::StructuralConflict
                }
            }
            Self::MalformedExpression { .. } => ErrorKind::MalformedExpression,
            Self::StateConflict { .. } => ErrorKind::StateConflict,
            Self::CascadeFailure { .. } => ErrorKind::CascadeFailure,
            Self::EngineRejection { .. } => ErrorKind::EngineRejection,
            Self::NotCancellable { .. } => ErrorKind::NotCancellable,
        }
    }

    /// Field violations carried by a validation rejection.
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::Validation(violations) => violations,
            _ => &[],
        }
    }

    /// Members that failed, for a cascade rejection.
    pub fn member_failures(&self) -> &[MemberFailure] {
        match self {
            Self::CascadeFailure { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|item| item.to_string()).collect::<Vec<_>>().join("; ")
}
