//! Thread-safe bounded queue for interleaved audio samples.
//!
//! The queue is the handoff point between the decoding worker and the output
//! device callback:
//! - worker pushes decoded (and possibly resampled) `f32` samples, blocking
//!   while the queue is full; this is what paces decode to device speed
//! - the CPAL callback drains it without blocking
//!
//! `close()` makes shutdown deterministic: it wakes any blocked pusher and
//! lets the callback drain whatever is buffered.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Bounded queue of interleaved `f32` samples.
///
/// Samples are stored interleaved:
/// `frame0[ch0], frame0[ch1], ..., frame1[ch0], frame1[ch1], ...`
///
/// The `closed` flag is stored under the same mutex as the buffer to avoid
/// races between closing and a blocked push; a single [`Condvar`] serves as a
/// general "state changed" signal.
pub struct SampleQueue {
    channels: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct QueueInner {
    buf: VecDeque<f32>,
    closed: bool,
}

/// Compute a queue capacity in **samples** for a `(rate, channels, seconds)`
/// target.
///
/// If `buffer_seconds` is non-finite or `<= 0.0`, a safe fallback is used.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SampleQueue {
    /// Create a new bounded queue. `max_buffered_samples` is a cap in
    /// **samples** (not frames); see [`calc_max_buffered_samples`].
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        Self {
            channels,
            inner: Mutex::new(QueueInner {
                buf: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Maximum buffered frames (capacity) for this queue.
    pub fn max_frames(&self) -> usize {
        self.max_buffered_samples / self.channels
    }

    /// Current buffered frames (best-effort snapshot).
    pub fn len_frames(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.buf.len() / self.channels
    }

    /// Whether the queue has been closed.
    ///
    /// A closed queue may still hold buffered samples until drained.
    pub fn is_closed(&self) -> bool {
        let g = self.inner.lock().unwrap();
        g.closed
    }

    /// Close the queue and wake all waiters.
    ///
    /// After this, pushes return `false` immediately and drain waits resolve
    /// once the buffer empties. Idempotent and callable from any thread.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns `false` once the queue is closed; remaining samples are
    /// dropped in that case. Callers should push whole frames.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();

            while g.buf.len() >= self.max_buffered_samples && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return false;
            }

            let mut pushed_any = false;
            while offset < samples.len() && g.buf.len() < self.max_buffered_samples {
                g.buf.push_back(samples[offset]);
                offset += 1;
                pushed_any = true;
            }

            drop(g);
            if pushed_any {
                self.cv.notify_all();
            }
        }

        true
    }

    /// Pop up to `max_frames` whole frames without blocking.
    ///
    /// Returns `None` when no complete frame is buffered. Used by the output
    /// callback, which must never wait.
    pub fn pop_frames(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();

        let available_frames = g.buf.len() / self.channels;
        let take_samples = available_frames.min(max_frames) * self.channels;
        if take_samples == 0 {
            return None;
        }

        let mut out = Vec::with_capacity(take_samples);
        for _ in 0..take_samples {
            out.push(g.buf.pop_front().unwrap_or(0.0));
        }

        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Block until the queue is closed and fully drained, or `cancel` flips.
    ///
    /// Returns `true` if the buffer drained normally, `false` if cancelled.
    /// Used after natural end-of-stream to let buffered audio play out.
    pub fn wait_drained(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.inner.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.closed && g.buf.is_empty() {
                return true;
            }

            let (ng, _timeout) = self.cv.wait_timeout(g, Duration::from_millis(50)).unwrap();
            g = ng;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn calc_max_buffered_samples_fallbacks() {
        assert_eq!(calc_max_buffered_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, -1.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::NAN), 192_000);
    }

    #[test]
    fn pop_frames_empty_returns_none() {
        let q = SampleQueue::new(2, 16);
        assert!(q.pop_frames(4).is_none());
    }

    #[test]
    fn pop_frames_returns_whole_frames_only() {
        let q = SampleQueue::new(2, 64);
        assert!(q.push_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0]));

        let out = q.pop_frames(8).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn push_returns_false_after_close() {
        let q = SampleQueue::new(1, 16);
        q.close();
        assert!(!q.push_blocking(&[1.0]));
    }

    #[test]
    fn close_unblocks_full_queue_push() {
        let q = Arc::new(SampleQueue::new(1, 2));
        assert!(q.push_blocking(&[1.0, 2.0]));

        let q_push = q.clone();
        let handle = thread::spawn(move || q_push.push_blocking(&[3.0, 4.0]));

        // Pusher is blocked on a full queue until close wakes it.
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn wait_drained_resolves_after_close_and_empty() {
        let q = Arc::new(SampleQueue::new(1, 16));
        assert!(q.push_blocking(&[1.0, 2.0]));
        q.close();

        let q_pop = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            q_pop.pop_frames(8)
        });

        let cancel = AtomicBool::new(false);
        assert!(q.wait_drained(&cancel));
        assert!(handle.join().unwrap().is_some());
    }

    #[test]
    fn wait_drained_respects_cancel() {
        let q = SampleQueue::new(1, 16);
        assert!(q.push_blocking(&[1.0]));

        let cancel = AtomicBool::new(true);
        assert!(!q.wait_drained(&cancel));
    }
}
