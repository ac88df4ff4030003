// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Lifecycle Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Observers (audit, UI refresh, bulletins) subscribe to every lifecycle event
// or to the events of a single component.
//
// Events are not persisted; a subscriber that falls behind by more than the
// channel capacity loses the oldest events.

use crate::domain::component::ComponentId;
use crate::domain::config::CoordinatorConfig;
use crate::domain::events::LifecycleEvent;
use futures::stream::{self, Stream};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to lifecycle events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<LifecycleEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.event_bus_capacity)
    }

    /// Publish a lifecycle event to all subscribers
    pub fn publish(&self, event: LifecycleEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all lifecycle events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of one component (for cascades, the root
    /// service)
    pub fn subscribe_component(&self, component_id: ComponentId) -> ComponentEventReceiver {
        ComponentEventReceiver {
            receiver: self.sender.subscribe(),
            component_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all lifecycle events
pub struct EventReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Stream of events that ends when the bus is dropped. Lag is reported
    /// in-band and the stream keeps going.
    pub fn into_stream(self) -> impl Stream<Item = Result<LifecycleEvent, EventBusError>> {
        stream::unfold(self, |mut receiver| async move {
            match receiver.recv().await {
                Err(EventBusError::Closed) => None,
                result => Some((result, receiver)),
            }
        })
    }
}

/// Receiver filtered to a single component
pub struct ComponentEventReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    component_id: ComponentId,
}

impl ComponentEventReceiver {
    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.component_id() == &self.component_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
