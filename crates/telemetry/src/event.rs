//! Event bus for action lifecycle events.
//!
//! Built on [`tokio::sync::broadcast`]: every subscriber sees every event,
//! and an event nobody listens to is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use quasar_core::ActionId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Something observable happened to an Action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEvent {
    /// The phase moved.
    PhaseChanged {
        /// The action.
        action_id: ActionId,
        /// Previous phase.
        from: String,
        /// New phase.
        to: String,
    },
    /// A render pass expanded one or more nesting levels.
    RenderProgressed {
        /// The action.
        action_id: ActionId,
        /// Fixpoint iterations completed so far.
        iterations: usize,
        /// Steps still waiting for expansion.
        pending: usize,
    },
    /// A render attempt failed.
    RenderFailed {
        /// The action.
        action_id: ActionId,
        /// Error text.
        error: String,
        /// Whether the attempt will be repeated.
        retryable: bool,
    },
    /// The rendered workflow was handed to the execution backend.
    Submitted {
        /// The action.
        action_id: ActionId,
        /// Backend handle.
        handle: String,
    },
    /// The execution reached an end state.
    Finished {
        /// The action.
        action_id: ActionId,
        /// Whether the backend reported success.
        succeeded: bool,
        /// Time from submission to the final status.
        duration: Duration,
    },
    /// A cancel request was seen.
    CancelRequested {
        /// The action.
        action_id: ActionId,
        /// Phase the action was in.
        phase: String,
    },
}

impl ActionEvent {
    /// The action the event is about.
    #[must_use]
    pub fn action_id(&self) -> ActionId {
        match self {
            Self::PhaseChanged { action_id, .. }
            | Self::RenderProgressed { action_id, .. }
            | Self::RenderFailed { action_id, .. }
            | Self::Submitted { action_id, .. }
            | Self::Finished { action_id, .. }
            | Self::CancelRequested { action_id, .. } => *action_id,
        }
    }
}

/// Broadcast-based event bus.
///
/// ```
/// use quasar_core::ActionId;
/// use quasar_telemetry::{ActionEvent, EventBus};
///
/// let bus = EventBus::new(64);
/// let mut sub = bus.subscribe();
///
/// bus.emit(ActionEvent::Submitted {
///     action_id: ActionId::v4(),
///     handle: "exec-1".into(),
/// });
///
/// assert!(sub.try_recv().is_some());
/// assert_eq!(bus.total_emitted(), 1);
/// ```
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ActionEvent>,
    emitted: AtomicU64,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    ///
    /// A subscriber that falls further behind skips the oldest events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            emitted: AtomicU64::new(0),
        }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: ActionEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Total number of events emitted since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiving end of an [`EventBus`] subscription.
#[derive(Debug)]
pub struct EventSubscriber {
    receiver: broadcast::Receiver<ActionEvent>,
}

impl EventSubscriber {
    /// Wait for the next event.
    ///
    /// Lagged events are skipped. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<ActionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ActionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain every buffered event about `action_id`, dropping the rest.
    pub fn drain_for(&mut self, action_id: ActionId) -> Vec<ActionEvent> {
        std::iter::from_fn(|| self.try_recv())
            .filter(|e| e.action_id() == action_id)
            .collect()
    }
}
