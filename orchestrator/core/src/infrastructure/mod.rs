// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod engine;
pub mod event_bus;
pub mod registry;

pub use engine::InMemoryExecutionEngine;
pub use event_bus::EventBus;
pub use registry::InMemoryFlowRegistry;
