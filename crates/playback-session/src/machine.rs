//! Player state transition table.
//!
//! Three mutually exclusive states, six intents, eighteen cells. The table
//! is a pure function so every cell is enumerable in tests; the session
//! executes the returned [`Step`] and only then publishes the new state.

use playback_types::PlayerState;

/// The six user intents a session accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Play,
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
}

/// Which way a track jump moves through the playlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Side effect the session executes for a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Defined transition to self; observable only via diagnostics, never
    /// an error.
    Ignore,
    /// Start the worker at frame zero on the current track.
    StartFromZero,
    /// Restart the worker at the frame captured when playback paused.
    ResumeFromCaptured,
    /// Stop the worker, capturing the frame for a later resume.
    HaltCapture,
    /// Stop any worker and reset the offset to zero.
    HaltReset,
    /// Stop any worker, move the index (wrapping), and start at zero.
    Jump(Direction),
}

/// The full `(state, intent)` → `(state, step)` table.
pub fn transition(state: PlayerState, intent: Intent) -> (PlayerState, Step) {
    use PlayerState::{Paused, Playing, Stopped};

    match (state, intent) {
        (Stopped, Intent::Play) => (Playing, Step::StartFromZero),
        (Stopped, Intent::Pause | Intent::Resume | Intent::Stop) => (Stopped, Step::Ignore),
        (Stopped, Intent::Next) => (Playing, Step::Jump(Direction::Forward)),
        (Stopped, Intent::Previous) => (Playing, Step::Jump(Direction::Backward)),

        (Playing, Intent::Play | Intent::Resume) => (Playing, Step::Ignore),
        (Playing, Intent::Pause) => (Paused, Step::HaltCapture),
        (Playing, Intent::Stop) => (Stopped, Step::HaltReset),
        (Playing, Intent::Next) => (Playing, Step::Jump(Direction::Forward)),
        (Playing, Intent::Previous) => (Playing, Step::Jump(Direction::Backward)),

        (Paused, Intent::Play | Intent::Resume) => (Playing, Step::ResumeFromCaptured),
        (Paused, Intent::Pause) => (Paused, Step::Ignore),
        (Paused, Intent::Stop) => (Stopped, Step::HaltReset),
        (Paused, Intent::Next) => (Playing, Step::Jump(Direction::Forward)),
        (Paused, Intent::Previous) => (Playing, Step::Jump(Direction::Backward)),
    }
}

/// Next playlist index, wrapping past the end. `len` must be non-zero,
/// which playlist construction guarantees.
pub fn advance_index(index: usize, len: usize) -> usize {
    (index + 1) % len
}

/// Previous playlist index, wrapping below zero to the last track.
pub fn retreat_index(index: usize, len: usize) -> usize {
    (index + len - 1) % len
}
