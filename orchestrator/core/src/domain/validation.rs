// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Field Validation Rules
//!
//! Pure checks applied to a proposed change set before anything is mutated.
//! Scheduling-dependent rules are evaluated against the *effective* strategy:
//! the proposed one when it parses, otherwise the component's current one.
//!
//! All violations are collected into one [`LifecycleError::Validation`] batch,
//! with a single exception: a `CRON_DRIVEN` scheduling period that does not
//! parse aborts immediately with [`LifecycleError::MalformedExpression`] and
//! discards anything collected so far.
//!
//! | Field | Rule |
//! |-------|------|
//! | penalty / yield duration | `<integer> <unit>` |
//! | bulletin level | one of [`BulletinLevel::ALL`] |
//! | concurrent tasks | `> 0` timer/primary-node, `>= 0` event driven |
//! | scheduling period | duration (timer/primary-node) or Quartz cron (cron driven) |
//! | auto-terminated relationships | no live connection on the relationship |

use crate::domain::changes::{ProcessorChanges, ProcessorPatch, ServiceChanges, ServicePatch};
use crate::domain::component::{
    BulletinLevel, ControllerService, Processor, ProcessorState, SchedulingStrategy, ServiceState,
};
use crate::domain::error::{FieldViolation, LifecycleError};
use crate::domain::graph::ConnectionIndex;
use cron::Schedule;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

const DURATION_HINT: &str = "is not a valid time duration (ie 30 sec, 5 min)";

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d+)\s*(ns|nanos?|nanoseconds?|ms|millis?|milliseconds?|s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?|d|days?)$",
    )
    .unwrap_or_else(|_| panic!("static duration pattern failed to compile"))
});

/// Whether `value` matches the `<integer> <unit>` duration grammar.
pub fn is_valid_duration(value: &str) -> bool {
    DURATION_PATTERN.is_match(value)
}

/// Parse a duration string such as `30 sec` or `5 mins`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let captures = DURATION_PATTERN.captures(value)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let duration = match captures.get(2)?.as_str() {
        "ns" | "nano" | "nanos" | "nanosecond" | "nanoseconds" => Duration::from_nanos(amount),
        "ms" | "milli" | "millis" | "millisecond" | "milliseconds" => Duration::from_millis(amount),
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::from_secs(amount),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::from_secs(amount.checked_mul(60)?),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::from_secs(amount.checked_mul(3_600)?),
        "d" | "day" | "days" => Duration::from_secs(amount.checked_mul(86_400)?),
        _ => return None,
    };
    Some(duration)
}

static DAY_OF_MONTH_SPECIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(L(-([1-9]|[12]\d|30))?|LW|([1-9]|[12]\d|3[01])W)$")
        .unwrap_or_else(|_| panic!("static day-of-month pattern failed to compile"))
});

static DAY_OF_WEEK_SPECIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(L|([1-7]|SUN|MON|TUE|WED|THU|FRI|SAT)(L|#[1-5]))$")
        .unwrap_or_else(|_| panic!("static day-of-week pattern failed to compile"))
});

const DAY_OF_MONTH: usize = 3;
const DAY_OF_WEEK: usize = 5;

/// Validate a Quartz cron expression (seconds first, optional year).
///
/// Exactly one of day-of-month and day-of-week must be `?`. The day fields
/// also take the Quartz specials `L`, `L-n`, `nW` and `LW` (day of month) and
/// `L`, `nL` and `n#k` (day of week). Everything else is checked by
/// [`cron::Schedule`].
pub fn validate_cron(expression: &str) -> Result<(), String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if !(6..=7).contains(&fields.len()) {
        return Err(format!("expected 6 or 7 fields, found {}", fields.len()));
    }

    if let Some(position) = fields
        .iter()
        .enumerate()
        .position(|(index, field)| field.contains('?') && index != DAY_OF_MONTH && index != DAY_OF_WEEK)
    {
        return Err(format!("'?' is not allowed in field {}", position + 1));
    }

    let day_of_month = fields[DAY_OF_MONTH];
    let day_of_week = fields[DAY_OF_WEEK];
    match (day_of_month == "?", day_of_week == "?") {
        (true, true) => {
            return Err("'?' can only be specified for day-of-month or day-of-week, not both".to_string())
        }
        (false, false) => {
            return Err("specifying both a day-of-month and a day-of-week is not supported".to_string())
        }
        _ => {}
    }

    let structural: Vec<&str> = fields
        .iter()
        .enumerate()
        .map(|(index, field)| match index {
            DAY_OF_MONTH if *field == "?" || DAY_OF_MONTH_SPECIAL.is_match(field) => "*",
            DAY_OF_WEEK if *field == "?" || DAY_OF_WEEK_SPECIAL.is_match(field) => "*",
            _ => *field,
        })
        .collect();

    Schedule::from_str(&structural.join(" "))
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn check_duration(field: &str, label: &str, value: Option<&String>, violations: &mut Vec<FieldViolation>) {
    if let Some(value) = value {
        if !is_valid_duration(value) {
            violations.push(FieldViolation::invalid(field, format!("{} {}", label, DURATION_HINT)));
        }
    }
}

/// Validate a processor change set against the processor's current
/// configuration and live connections.
pub fn validate_processor_changes(
    current: &Processor,
    changes: &ProcessorChanges,
    connections: &dyn ConnectionIndex,
) -> Result<ProcessorPatch, LifecycleError> {
    let mut violations = Vec::new();

    check_duration(
        "penalty_duration",
        "Penalty duration",
        changes.penalty_duration.as_ref(),
        &mut violations,
    );
    check_duration(
        "yield_duration",
        "Yield duration",
        changes.yield_duration.as_ref(),
        &mut violations,
    );

    let bulletin_level = match changes.bulletin_level.as_deref() {
        Some(raw) => match BulletinLevel::from_str(raw) {
            Ok(level) => Some(level),
            Err(message) => {
                violations.push(FieldViolation::invalid("bulletin_level", format!("Bulletin level: {}", message)));
                None
            }
        },
        None => None,
    };

    let mut effective_strategy = current.scheduling_strategy;
    let scheduling_strategy = match changes.scheduling_strategy.as_deref() {
        Some(raw) => match SchedulingStrategy::from_str(raw) {
            Ok(strategy) => {
                effective_strategy = strategy;
                Some(strategy)
            }
            Err(message) => {
                violations.push(FieldViolation::invalid(
                    "scheduling_strategy",
                    format!("Scheduling strategy: {}", message),
                ));
                None
            }
        },
        None => None,
    };

    if let Some(tasks) = changes.concurrent_tasks {
        match effective_strategy {
            SchedulingStrategy::TimerDriven | SchedulingStrategy::PrimaryNodeOnly if tasks <= 0 => {
                violations.push(FieldViolation::invalid(
                    "concurrent_tasks",
                    "Concurrent tasks must be greater than 0.",
                ));
            }
            SchedulingStrategy::EventDriven if tasks < 0 => {
                violations.push(FieldViolation::invalid(
                    "concurrent_tasks",
                    "Concurrent tasks must be greater or equal to 0.",
                ));
            }
            _ => {}
        }
    }

    if let Some(period) = changes.scheduling_period.as_deref() {
        match effective_strategy {
            SchedulingStrategy::TimerDriven | SchedulingStrategy::PrimaryNodeOnly => {
                if !is_valid_duration(period) {
                    violations.push(FieldViolation::invalid(
                        "scheduling_period",
                        format!("Scheduling period {}", DURATION_HINT),
                    ));
                }
            }
            SchedulingStrategy::CronDriven => {
                if let Err(reason) = validate_cron(period) {
                    return Err(LifecycleError::MalformedExpression {
                        field: "Scheduling Period".to_string(),
                        expression: period.to_string(),
                        reason,
                    });
                }
            }
            SchedulingStrategy::EventDriven => {}
        }
    }

    if let Some(relationships) = &changes.auto_terminated_relationships {
        for relationship in relationships {
            if !connections.connections_for(&current.id, relationship).is_empty() {
                violations.push(FieldViolation::structural(
                    "auto_terminated_relationships",
                    format!(
                        "Cannot Auto-Terminate '{}' relationship because a Connection already exists with this relationship",
                        relationship
                    ),
                ));
            }
        }
    }

    let state = match changes.state.as_deref() {
        Some(raw) => match ProcessorState::from_str(raw) {
            Ok(state) => Some(state),
            Err(message) => {
                violations.push(FieldViolation::invalid("state", format!("Processor state: {}", message)));
                None
            }
        },
        None => None,
    };

    if !violations.is_empty() {
        return Err(LifecycleError::Validation(violations));
    }

    Ok(ProcessorPatch {
        name: changes.name.clone(),
        scheduling_strategy,
        scheduling_period: changes.scheduling_period.clone(),
        concurrent_tasks: changes.concurrent_tasks,
        penalty_duration: changes.penalty_duration.clone(),
        yield_duration: changes.yield_duration.clone(),
        run_duration_millis: changes.run_duration_millis,
        bulletin_level,
        loss_tolerant: changes.loss_tolerant,
        comments: changes.comments.clone(),
        annotation_data: changes.annotation_data.clone(),
        properties: changes.properties.clone(),
        auto_terminated_relationships: changes.auto_terminated_relationships.clone(),
        position: changes.position,
        style: changes.style.clone(),
        state,
    })
}

/// Validate a controller service change set. Only the stable states are
/// addressable targets.
pub fn validate_service_changes(
    _current: &ControllerService,
    changes: &ServiceChanges,
) -> Result<ServicePatch, LifecycleError> {
    let state = match changes.state.as_deref() {
        Some(raw) => match ServiceState::from_str(raw) {
            Ok(state @ (ServiceState::Enabled | ServiceState::Disabled)) => Some(state),
            _ => {
                return Err(LifecycleError::Validation(vec![FieldViolation::invalid(
                    "state",
                    format!(
                        "Controller Service state: Value must be one of [{}, {}]",
                        ServiceState::Enabled,
                        ServiceState::Disabled
                    ),
                )]))
            }
        },
        None => None,
    };

    Ok(ServicePatch {
        name: changes.name.clone(),
        comments: changes.comments.clone(),
        annotation_data: changes.annotation_data.clone(),
        properties: changes.properties.clone(),
        state,
    })
}
