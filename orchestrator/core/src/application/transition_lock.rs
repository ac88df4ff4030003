// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-flight transition table
//!
//! At most one mutating request (single-component or cascade) may be in flight
//! per component. Acquisition never waits: a component that is already
//! claimed yields an immediate `StateConflict`. The claim is released when the
//! returned [`TransitionPermit`] is dropped.

use crate::domain::component::{ComponentId, ComponentKind};
use crate::domain::error::{LifecycleError, MemberFailure};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct InFlightTransitions {
    claims: Arc<DashMap<ComponentId, &'static str>>,
}

impl InFlightTransitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for `operation`, or fail if another request holds it.
    pub fn try_acquire(
        &self,
        kind: ComponentKind,
        id: &ComponentId,
        operation: &'static str,
    ) -> Result<TransitionPermit, LifecycleError> {
        match self.claims.entry(id.clone()) {
            Entry::Occupied(claim) => Err(LifecycleError::state_conflict(
                kind,
                id,
                format!("a {} is already in flight", claim.get()),
            )),
            Entry::Vacant(slot) => {
                slot.insert(operation);
                debug!(component_id = %id, operation, "Transition claimed");
                Ok(TransitionPermit {
                    claims: self.claims.clone(),
                    id: id.clone(),
                })
            }
        }
    }

    /// Claim every member or none of them. All busy members are reported.
    pub fn try_acquire_all(
        &self,
        members: &[(ComponentKind, ComponentId)],
        operation: &'static str,
    ) -> Result<Vec<TransitionPermit>, Vec<MemberFailure>> {
        let mut permits = Vec::with_capacity(members.len());
        let mut failures = Vec::new();

        for (kind, id) in members {
            match self.try_acquire(*kind, id, operation) {
                Ok(permit) => permits.push(permit),
                Err(cause) => failures.push(MemberFailure {
                    id: id.clone(),
                    kind: *kind,
                    cause,
                }),
            }
        }

        if failures.is_empty() {
            Ok(permits)
        } else {
            // dropping `permits` releases the partial claim
            Err(failures)
        }
    }

    /// Busy members among `members`, without claiming anything.
    pub fn conflicts(&self, members: &[(ComponentKind, ComponentId)]) -> Vec<MemberFailure> {
        members
            .iter()
            .filter_map(|(kind, id)| {
                self.claims.get(id).map(|claim| MemberFailure {
                    id: id.clone(),
                    kind: *kind,
                    cause: LifecycleError::state_conflict(
                        *kind,
                        id,
                        format!("a {} is already in flight", claim.value()),
                    ),
                })
            })
            .collect()
    }

    pub fn is_in_flight(&self, id: &ComponentId) -> bool {
        self.claims.contains_key(id)
    }
}

/// Exclusive claim on one component; released on drop.
pub struct TransitionPermit {
    claims: Arc<DashMap<ComponentId, &'static str>>,
    id: ComponentId,
}

impl TransitionPermit {
    pub fn component_id(&self) -> &ComponentId {
        &self.id
    }
}

impl Drop for TransitionPermit {
    fn drop(&mut self) {
        self.claims.remove(&self.id);
    }
}

impl std::fmt::Debug for TransitionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionPermit").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;

    #[test]
    fn test_second_claim_conflicts_until_release() {
        let table = InFlightTransitions::new();
        let id = ComponentId::from("p1");

        let permit = table.try_acquire(ComponentKind::Processor, &id, "state transition").unwrap();
        let err = table.try_acquire(ComponentKind::Processor, &id, "state transition").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert!(err.to_string().contains("a state transition is already in flight"));

        drop(permit);
        assert!(!table.is_in_flight(&id));
        assert!(table.try_acquire(ComponentKind::Processor, &id, "state transition").is_ok());
    }

    #[test]
    fn test_acquire_all_is_all_or_nothing() {
        let table = InFlightTransitions::new();
        let busy = ComponentId::from("busy");
        let _held = table.try_acquire(ComponentKind::Processor, &busy, "state transition").unwrap();

        let members = vec![
            (ComponentKind::Processor, ComponentId::from("free")),
            (ComponentKind::Processor, busy.clone()),
        ];
        let failures = table.try_acquire_all(&members, "cascade").unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, busy);
        assert!(!table.is_in_flight(&ComponentId::from("free")));
        assert_eq!(table.conflicts(&members).len(), 1);
    }
}
