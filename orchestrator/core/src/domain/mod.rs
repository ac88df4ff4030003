// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: components, their configuration, the rules that govern
//! their lifecycle, and the collaborator boundaries the coordinator talks to.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure lifecycle model; no I/O and no runtime dependencies

pub mod changes;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod guard;
pub mod property;
pub mod validation;
