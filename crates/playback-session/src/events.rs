//! Session event fan-out for UI layers.

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;

use playback_types::{PlaybackEndReason, PositionSnapshot};

/// Notifications emitted as transitions complete.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// A worker began output at `position`.
    Started { position: PositionSnapshot },
    /// The worker stopped at `position`, with the reason.
    Finished {
        position: PositionSnapshot,
        reason: PlaybackEndReason,
    },
    /// The current track index changed (user intent or auto-advance);
    /// UI layers refresh displayed metadata from the catalog on this.
    TrackChanged { track_index: usize },
}

/// Subscriber registry; senders that went away are pruned on emit.
#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_types::PlayerState;

    #[test]
    fn subscribers_receive_emitted_events() {
        let hub = EventHub::default();
        let rx = hub.subscribe();

        hub.emit(SessionEvent::TrackChanged { track_index: 2 });

        match rx.try_recv().unwrap() {
            SessionEvent::TrackChanged { track_index } => assert_eq!(track_index, 2),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = EventHub::default();
        let rx = hub.subscribe();
        drop(rx);

        hub.emit(SessionEvent::Started {
            position: PositionSnapshot {
                track_index: 0,
                frame_offset: 0,
                state: PlayerState::Playing,
            },
        });
        assert!(hub.subscribers.lock().unwrap().is_empty());
    }
}
