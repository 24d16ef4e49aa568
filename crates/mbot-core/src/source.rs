//! Event source abstraction.
//!
//! An [`EventSource`] hands out [`Subscription`]s: ordered, unbounded,
//! non-restartable sequences of [`WebSocketEvent`]s. The host takes one
//! dedicated subscription per activated Watcher and MentionHandler role, so
//! a slow entry point only ever stalls its own stream.
//!
//! Producers push into the [`EventSink`] half and stop once the subscriber
//! closes or drops its half.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::TransportResult;
use crate::model::WebSocketEvent;

/// Source of event subscriptions.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Opens a new, independent subscription.
    ///
    /// The subscription receives every event the transport delivers after
    /// this call returns, in transport order.
    async fn subscribe(&self) -> TransportResult<Subscription>;
}

/// Consumer half of a subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Arc<WebSocketEvent>>,
    closed: CancellationToken,
}

/// Producer half of a subscription.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Arc<WebSocketEvent>>,
    closed: CancellationToken,
}

impl Subscription {
    /// Creates a connected sink/subscription pair.
    pub fn channel() -> (EventSink, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        (
            EventSink {
                tx,
                closed: closed.clone(),
            },
            Subscription { rx, closed },
        )
    }

    /// Waits for the next event. `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Arc<WebSocketEvent>> {
        self.rx.recv().await
    }

    /// Closes the subscription and tells the producer to stop.
    pub fn close(&mut self) {
        self.closed.cancel();
        self.rx.close();
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl EventSink {
    /// Pushes an event. Returns `false` if the subscriber is gone.
    pub fn send(&self, event: Arc<WebSocketEvent>) -> bool {
        !self.closed.is_cancelled() && self.tx.send(event).is_ok()
    }

    /// Returns `true` once the subscriber closed or dropped its half.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the subscriber closes its half.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

// =============================================================================
// BroadcastEventSource
// =============================================================================

/// In-process event source fanning published events out to every live
/// subscription.
///
/// Useful for embedding the host behind another transport and for tests.
#[derive(Debug, Default)]
pub struct BroadcastEventSource {
    sinks: Mutex<Vec<EventSink>>,
}

impl BroadcastEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every live subscription. Returns how many
    /// subscriptions received it.
    pub fn publish(&self, event: WebSocketEvent) -> usize {
        let event = Arc::new(event);
        let mut sinks = self.sinks.lock();
        sinks.retain(|sink| sink.send(Arc::clone(&event)));
        sinks.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut sinks = self.sinks.lock();
        sinks.retain(|sink| !sink.is_closed());
        sinks.len()
    }

    /// Ends every subscription, as a lost connection would.
    pub fn disconnect_all(&self) {
        self.sinks.lock().clear();
    }
}

#[async_trait]
impl EventSource for BroadcastEventSource {
    async fn subscribe(&self) -> TransportResult<Subscription> {
        let (sink, subscription) = Subscription::channel();
        self.sinks.lock().push(sink);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_subscription_sees_every_event_in_order() {
        let source = BroadcastEventSource::new();
        let mut first = source.subscribe().await.unwrap();
        let mut second = source.subscribe().await.unwrap();

        for seq in 1..=3 {
            let mut event = WebSocketEvent::new("posted");
            event.seq = seq;
            assert_eq!(source.publish(event), 2);
        }

        for sub in [&mut first, &mut second] {
            for seq in 1..=3 {
                assert_eq!(sub.next().await.unwrap().seq, seq);
            }
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let source = BroadcastEventSource::new();
        source.publish(WebSocketEvent::new("early"));

        let mut sub = source.subscribe().await.unwrap();
        source.publish(WebSocketEvent::new("late"));
        assert_eq!(sub.next().await.unwrap().event, "late");
    }

    #[tokio::test]
    async fn test_closed_subscription_is_pruned() {
        let source = BroadcastEventSource::new();
        let mut sub = source.subscribe().await.unwrap();
        let _other = source.subscribe().await.unwrap();

        sub.close();
        assert!(sub.is_closed());
        assert_eq!(source.publish(WebSocketEvent::new("posted")), 1);
        assert_eq!(source.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let source = BroadcastEventSource::new();
        let mut sub = source.subscribe().await.unwrap();
        source.disconnect_all();
        assert!(sub.next().await.is_none());
    }
}
