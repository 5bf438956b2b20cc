//! Extraction Event Channel
//!
//! Events produced while an APK is streamed out of the device, and the
//! single-slot sink that hands them to whoever is currently listening.
//!
//! A stream is zero or more `Progress` events with non-decreasing fractions,
//! then exactly one terminal `Complete` or `Error`.

use std::sync::Arc;
use std::time::Duration;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

/// An event on the extraction stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExtractionEvent {
    /// Fraction of the backing file read so far, in `0.0..=1.0`
    Progress { fraction: f64 },
    /// The whole backing file
    Complete { payload: Vec<u8> },
    /// Extraction stopped
    Error { code: String, message: String },
}

impl ExtractionEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ExtractionEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// No event follows a terminal one
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExtractionEvent::Progress { .. })
    }
}

/// Receiving end handed to the current listener
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<ExtractionEvent>,
    wake: Arc<Notify>,
}

impl EventSubscription {
    /// Receive the next event (blocking). Fails once the subscription was replaced and drained.
    pub fn recv(&self) -> Result<ExtractionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<ExtractionEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait at most `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ExtractionEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Get an iterator over events
    pub fn iter(&self) -> impl Iterator<Item = ExtractionEvent> + '_ {
        self.receiver.iter()
    }

    /// Wait for the next event without blocking the async runtime.
    ///
    /// Cancel safe: an event is only taken off the channel when it is returned.
    pub async fn next(&self) -> Option<ExtractionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => self.wake.notified().await,
            }
        }
    }
}

struct Subscriber {
    sender: Sender<ExtractionEvent>,
    wake: Arc<Notify>,
}

impl Subscriber {
    /// Drop the sender and wake a pending `next` so it sees the disconnect
    fn close(self) {
        drop(self.sender);
        self.wake.notify_one();
    }
}

/// Holds at most one subscriber. A new `listen` silently replaces the old one.
pub struct EventSink {
    slot: RwLock<Option<Subscriber>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Register a new subscriber, disconnecting the previous one
    pub fn listen(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        let wake = Arc::new(Notify::new());
        let previous = self.slot.write().replace(Subscriber {
            sender,
            wake: Arc::clone(&wake),
        });
        if let Some(previous) = previous {
            debug!("Replacing previous extraction subscriber");
            previous.close();
        }
        EventSubscription { receiver, wake }
    }

    /// Clear the slot
    pub fn cancel(&self) {
        let previous = self.slot.write().take();
        if let Some(previous) = previous {
            debug!("Extraction subscriber cancelled");
            previous.close();
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Deliver an event to the current subscriber.
    ///
    /// Best effort: with no subscriber, or one that dropped its receiver, the
    /// event is dropped and `false` is returned.
    pub fn emit(&self, event: ExtractionEvent) -> bool {
        let slot = self.slot.read();
        match slot.as_ref() {
            Some(subscriber) => match subscriber.sender.send(event) {
                Ok(()) => {
                    subscriber.wake.notify_one();
                    true
                }
                Err(err) => {
                    debug!("Subscriber went away, dropping {:?}", kind(&err.0));
                    false
                }
            },
            None => {
                debug!("No subscriber, dropping {:?}", kind(&event));
                false
            }
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

// Payloads can be megabytes; keep them out of the logs.
fn kind(event: &ExtractionEvent) -> &'static str {
    match event {
        ExtractionEvent::Progress { .. } => "progress",
        ExtractionEvent::Complete { .. } => "complete",
        ExtractionEvent::Error { .. } => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscriber_drops() {
        let sink = EventSink::new();
        assert!(!sink.has_subscriber());
        assert!(!sink.emit(ExtractionEvent::Progress { fraction: 0.5 }));
    }

    #[test]
    fn test_second_listener_replaces_first() {
        let sink = EventSink::new();
        let first = sink.listen();
        assert!(sink.emit(ExtractionEvent::Progress { fraction: 0.25 }));

        let second = sink.listen();
        assert!(sink.emit(ExtractionEvent::Progress { fraction: 0.5 }));

        assert_eq!(first.try_recv().unwrap(), ExtractionEvent::Progress { fraction: 0.25 });
        // Drained and disconnected: nothing after the replacement reaches it
        assert!(matches!(first.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(second.try_recv().unwrap(), ExtractionEvent::Progress { fraction: 0.5 });
    }

    #[test]
    fn test_cancel_clears_slot() {
        let sink = EventSink::new();
        let subscription = sink.listen();
        sink.cancel();

        assert!(!sink.has_subscriber());
        assert!(!sink.emit(ExtractionEvent::Complete { payload: vec![] }));
        assert!(matches!(subscription.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_abandoned_next_keeps_following_event() {
        let sink = EventSink::new();
        let subscription = sink.listen();

        for i in 0..20 {
            let waited = tokio::time::timeout(Duration::from_millis(2), subscription.next()).await;
            assert!(waited.is_err());

            let event = ExtractionEvent::Progress { fraction: i as f64 / 20.0 };
            assert!(sink.emit(event.clone()));
            assert_eq!(subscription.recv_timeout(Duration::from_millis(100)).unwrap(), event);
        }
    }

    #[tokio::test]
    async fn test_next_wakes_on_emit_and_on_cancel() {
        let sink = Arc::new(EventSink::new());
        let subscription = sink.listen();

        let emitter = Arc::clone(&sink);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            emitter.emit(ExtractionEvent::Progress { fraction: 0.5 });
            tokio::time::sleep(Duration::from_millis(10)).await;
            emitter.cancel();
        });

        let first = tokio::time::timeout(Duration::from_secs(5), subscription.next()).await.unwrap();
        assert_eq!(first, Some(ExtractionEvent::Progress { fraction: 0.5 }));
        let closed = tokio::time::timeout(Duration::from_secs(5), subscription.next()).await.unwrap();
        assert_eq!(closed, None);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!ExtractionEvent::Progress { fraction: 1.0 }.is_terminal());
        assert!(ExtractionEvent::Complete { payload: vec![1] }.is_terminal());
        assert!(ExtractionEvent::error("FILE_NOT_FOUND", "APK file not found").is_terminal());
    }

    #[test]
    fn test_wire_form() {
        let json = serde_json::to_value(ExtractionEvent::Progress { fraction: 0.5 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "progress", "fraction": 0.5}));

        let json = serde_json::to_value(ExtractionEvent::error("EXTRACTION_ERROR", "boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "EXTRACTION_ERROR");
    }
}
