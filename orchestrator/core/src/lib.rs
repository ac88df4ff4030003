// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Flowkeeper core
//!
//! Admission, transition and cascade logic for the components of a running
//! dataflow graph.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Decide whether and how a processor or controller service
//!   may change its operational state, and propagate the consequences to
//!   every component that references it

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::coordinator::{LifecycleCoordinator, StandardLifecycleCoordinator};
pub use domain::*;
