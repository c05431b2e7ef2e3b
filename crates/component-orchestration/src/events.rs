//! State change bus.
//!
//! Providers publish a [`StateChange`] after every reconciliation pass.
//! Anything interested (dependent-service mirrors, the CLI watch command)
//! subscribes and receives every change keyed by component name, without
//! holding a reference to the publishing provider.

use crate::state::{ComponentState, InstallationState};
use chrono::{DateTime, Utc};
use installer_services::RunningState;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// One component state change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Name of the component that changed
    pub component: String,
    /// New installation state
    pub installation: InstallationState,
    /// New running state
    pub running: RunningState,
    /// When the change was published
    pub timestamp: DateTime<Utc>,
}

impl StateChange {
    /// Build a notification from a component's state snapshot
    pub fn from_state(component: impl Into<String>, state: &ComponentState) -> Self {
        Self {
            component: component.into(),
            installation: state.installation,
            running: state.running,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast bus for component state changes
#[derive(Clone, Default)]
pub struct StateBus {
    subscribers: Arc<Mutex<Vec<async_channel::Sender<StateChange>>>>,
}

impl StateBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every future state change
    pub fn subscribe(&self) -> async_channel::Receiver<StateChange> {
        let (tx, rx) = async_channel::unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Publish a change to every live subscriber.
    ///
    /// Subscribers whose receiver was dropped are pruned on the way through.
    pub fn publish(&self, change: StateChange) {
        trace!(
            component = %change.component,
            installation = ?change.installation,
            running = ?change.running,
            "publishing state change"
        );
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.try_send(change.clone()).is_ok());
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(component: &str) -> StateChange {
        StateChange {
            component: component.to_string(),
            installation: InstallationState::InstalledWithNewestVersion,
            running: RunningState::Running,
            timestamp: Utc::now(),
        }
    }

    #[smol_potat::test]
    async fn test_every_subscriber_sees_every_change() {
        let bus = StateBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(change("acme-site"));

        assert_eq!(first.recv().await.unwrap().component, "acme-site");
        assert_eq!(second.recv().await.unwrap().component, "acme-site");
    }

    #[smol_potat::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = StateBus::new();
        let keep = bus.subscribe();
        {
            let _dropped = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(change("acme-db"));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.recv().await.unwrap().component, "acme-db");
    }
}
