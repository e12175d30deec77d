//! Player event broadcasting
//!
//! `EventBus` fans out [`PlayerEvent`]s to any number of subscribers.
//! Subscribers that drop their receiver are pruned on the next emit.

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::types::PlayerEvent;

pub struct EventBus {
    subscribers: Mutex<Vec<Sender<PlayerEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to events. Returns a receiver that will get all future events.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Emit an event to all subscribers. Removes disconnected subscribers.
    pub fn emit(&self, event: PlayerEvent) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::VolumeLevel;

    fn subscriber_count(bus: &EventBus) -> usize {
        bus.subscribers.lock().unwrap().len()
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.emit(PlayerEvent::Playing);
        assert_eq!(subscriber_count(&bus), 0);
    }

    #[test]
    fn every_subscriber_gets_every_event() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(PlayerEvent::Playing);
        bus.emit(PlayerEvent::VolumeChanged(VolumeLevel::new(3)));

        for rx in [a, b] {
            assert_eq!(rx.try_recv().unwrap(), PlayerEvent::Playing);
            assert_eq!(
                rx.try_recv().unwrap(),
                PlayerEvent::VolumeChanged(VolumeLevel::new(3))
            );
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.emit(PlayerEvent::Paused);
        let rx = bus.subscribe();
        bus.emit(PlayerEvent::Resumed);
        assert_eq!(rx.try_recv().unwrap(), PlayerEvent::Resumed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        let gone = bus.subscribe();
        drop(gone);

        bus.emit(PlayerEvent::Reset);
        assert_eq!(subscriber_count(&bus), 1);
        assert_eq!(keep.try_recv().unwrap(), PlayerEvent::Reset);
    }
}
