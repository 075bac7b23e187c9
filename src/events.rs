//! Typed notification bus for device managers.
//!
//! Each manager owns one [`EventBus`] built on `tokio::sync::broadcast`.
//! Publishing never blocks and works from any thread, including the polling
//! thread, which has no runtime. A subscriber that falls behind by more than
//! the channel capacity loses the oldest events; [`Subscription::recv`] logs
//! the gap and carries on with the next event.
//!
//! Subscriptions are scoped: dropping a [`Subscription`] unsubscribes.

use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::core::DeviceKind;
use crate::error::DeviceError;

/// Notification published by a device manager.
#[derive(Debug, Clone)]
pub enum DeviceEvent<K: DeviceKind> {
    /// A fresh status snapshot. Default snapshot after a disconnect.
    StatusUpdate(Arc<K::Status>),
    /// Parameters read at connect, or the disconnected defaults.
    ParametersUpdate(Arc<K::Parameters>),
    /// Capabilities read at connect, or the capability-free defaults.
    CapabilitiesUpdate(Arc<K::Capabilities>),
    /// Clamped step count of a focuser move the device accepted.
    MoveAmountUpdate(i32),
    /// A focuser halt was forwarded.
    MoveCompleted,
    /// The polling thread hit a fatal read error. A disconnect follows.
    PollingException(Arc<DeviceError>),
    /// Teardown finished; the manager is disconnected.
    Disconnected,
}

impl<K: DeviceKind> DeviceEvent<K> {
    /// Short event name, used in logs and the CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceEvent::StatusUpdate(_) => "status",
            DeviceEvent::ParametersUpdate(_) => "parameters",
            DeviceEvent::CapabilitiesUpdate(_) => "capabilities",
            DeviceEvent::MoveAmountUpdate(_) => "move_amount",
            DeviceEvent::MoveCompleted => "move_completed",
            DeviceEvent::PollingException(_) => "polling_exception",
            DeviceEvent::Disconnected => "disconnected",
        }
    }
}

/// Broadcast channel for one manager's events.
pub struct EventBus<K: DeviceKind> {
    sender: broadcast::Sender<DeviceEvent<K>>,
}

impl<K: DeviceKind> EventBus<K> {
    /// Create a bus buffering up to `capacity` events per subscriber.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: DeviceEvent<K>) {
        let _ = self.sender.send(event);
    }

    /// Start receiving events published from now on.
    pub fn subscribe(&self) -> Subscription<K> {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<K: DeviceKind> fmt::Debug for EventBus<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("kind", &K::NAME)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving end of an [`EventBus`]. Dropping it unsubscribes.
pub struct Subscription<K: DeviceKind> {
    receiver: broadcast::Receiver<DeviceEvent<K>>,
}

impl<K: DeviceKind> Subscription<K> {
    /// Wait for the next event.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<DeviceEvent<K>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{} event subscriber lagged, {} events dropped", K::NAME, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<DeviceEvent<K>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("{} event subscriber lagged, {} events dropped", K::NAME, skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Block the current thread until the next event.
    ///
    /// Must not be called from inside an async context.
    pub fn blocking_recv(&mut self) -> Option<DeviceEvent<K>> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{} event subscriber lagged, {} events dropped", K::NAME, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focuser::Focuser;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::<Focuser>::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(DeviceEvent::MoveAmountUpdate(250));

        assert!(matches!(
            first.recv().await,
            Some(DeviceEvent::MoveAmountUpdate(250))
        ));
        assert!(matches!(
            second.recv().await,
            Some(DeviceEvent::MoveAmountUpdate(250))
        ));
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let bus = EventBus::<Focuser>::new(8);
        let subscription = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(bus.subscriber_count(), 0);

        // no subscribers is not an error
        bus.publish(DeviceEvent::Disconnected);
    }

    #[test]
    fn test_lagging_subscriber_skips_to_newest() {
        let bus = EventBus::<Focuser>::new(2);
        let mut subscription = bus.subscribe();
        for amount in 0..5 {
            bus.publish(DeviceEvent::MoveAmountUpdate(amount));
        }

        assert!(matches!(
            subscription.try_recv(),
            Some(DeviceEvent::MoveAmountUpdate(3))
        ));
        assert!(matches!(
            subscription.try_recv(),
            Some(DeviceEvent::MoveAmountUpdate(4))
        ));
        assert!(subscription.try_recv().is_none());
    }

    #[test]
    fn test_closed_bus_ends_subscription() {
        let bus = EventBus::<Focuser>::new(4);
        let mut subscription = bus.subscribe();
        drop(bus);
        assert!(subscription.blocking_recv().is_none());
    }
}
