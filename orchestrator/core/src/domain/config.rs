// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration
//
// YAML-loadable settings for the lifecycle coordinator and the in-memory
// execution engine:
// - event bus buffering
// - cascade failure policy
// - engine acknowledgement emulation (delay and deadline)

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How many lifecycle events the bus buffers before slow subscribers lag.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    #[serde(default)]
    pub cascade: CascadeConfig,

    #[serde(default)]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default)]
    pub failure_policy: CascadeFailurePolicy,
}

/// What a cascade does with the remaining members once one of them fails
/// during execution. Verification failures always abort before anything is
/// applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeFailurePolicy {
    #[default]
    ContinueAndReport,
    AbortOnFirstFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Time the in-memory engine takes to acknowledge a request.
    #[serde(with = "humantime_serde", default)]
    pub ack_delay: Duration,

    /// Upper bound the engine places on its own acknowledgement wait.
    #[serde(with = "humantime_serde", default = "default_ack_deadline")]
    pub ack_deadline: Duration,
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_ack_deadline() -> Duration {
    Duration::from_secs(30)
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ack_delay: Duration::ZERO,
            ack_deadline: default_ack_deadline(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            cascade: CascadeConfig::default(),
            engine: EngineSettings::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read coordinator config at {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid coordinator config at {:?}", path))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse coordinator config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.event_bus_capacity == 0 {
            anyhow::bail!("event_bus_capacity must be greater than 0");
        }
        if self.engine.ack_deadline.is_zero() {
            anyhow::bail!("engine.ack_deadline must be greater than 0");
        }
        Ok(())
    }
}
