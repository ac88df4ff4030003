// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod applier;
pub mod cascade;
pub mod coordinator;
pub mod guard_context;
pub mod transition_lock;

pub use cascade::{CascadeHandle, ClosureResult};
pub use coordinator::{LifecycleCoordinator, StandardLifecycleCoordinator};
