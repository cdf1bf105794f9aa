//! Shared session status, readable from any thread.
//!
//! The control thread publishes `(index, offset, state)` only when a
//! transition has fully completed, so readers never observe a mid-transition
//! value. While a worker is playing, the frame offset is served from its
//! live counter instead of the stored value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use playback_types::{PlayerState, PositionSnapshot};

struct StatusInner {
    track_index: usize,
    frame_offset: u64,
    state: PlayerState,
    live_frames: Option<Arc<AtomicU64>>,
}

/// Mutex-protected status store shared between session handle and control
/// thread.
pub struct SessionStatus {
    inner: Mutex<StatusInner>,
}

impl SessionStatus {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(StatusInner {
                track_index: 0,
                frame_offset: 0,
                state: PlayerState::Stopped,
                live_frames: None,
            }),
        })
    }

    /// Current position snapshot.
    pub fn snapshot(&self) -> PositionSnapshot {
        let g = self.inner.lock().unwrap();
        let frame_offset = g
            .live_frames
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(g.frame_offset);
        PositionSnapshot {
            track_index: g.track_index,
            frame_offset,
            state: g.state,
        }
    }

    pub(crate) fn publish(
        &self,
        track_index: usize,
        frame_offset: u64,
        state: PlayerState,
        live_frames: Option<Arc<AtomicU64>>,
    ) {
        let mut g = self.inner.lock().unwrap();
        g.track_index = track_index;
        g.frame_offset = frame_offset;
        g.state = state;
        g.live_frames = live_frames;
    }
}
