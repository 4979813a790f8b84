//! Detection events and their fan-out to subscribers

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::dsp::spectrum::Spectrum;

/// A profile chosen by the matcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedWord {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

/// Something a listener may want to react to
#[derive(Debug, Clone)]
pub enum DetectionEvent {
    /// The best-matching profile changed
    WordDetected {
        previous: Option<MatchedWord>,
        current: MatchedWord,
    },
    /// A new live spectrum was computed
    SpectrumChanged { spectrum: Arc<Spectrum> },
}

/// Broadcasts events to every live subscriber
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<DetectionEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener
    pub fn subscribe(&mut self) -> Receiver<DetectionEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Send `event` to every subscriber, forgetting those that hung up
    pub fn publish(&mut self, event: DetectionEvent) {
        let before = self.subscribers.len();
        self.subscribers
            .retain(|sender| sender.send(event.clone()).is_ok());

        let dropped = before - self.subscribers.len();
        if dropped > 0 {
            debug!("Dropped {} disconnected subscribers", dropped);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(index: usize, label: &str) -> MatchedWord {
        MatchedWord {
            index,
            label: label.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let mut bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(DetectionEvent::WordDetected {
            previous: None,
            current: word(1, "Go"),
        });

        for receiver in [&first, &second] {
            match receiver.try_recv().unwrap() {
                DetectionEvent::WordDetected { previous, current } => {
                    assert!(previous.is_none());
                    assert_eq!(current.label, "Go");
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_dropped_subscribers_are_removed() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(DetectionEvent::SpectrumChanged {
            spectrum: Arc::new(Spectrum::zeroed(4)),
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
