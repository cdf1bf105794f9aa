//! Playback session coordination: state machine, worker lifecycle, and the
//! process-wide session handle UI code talks to.

pub mod events;
pub mod machine;
pub mod session;
pub mod status;
mod worker;

pub use session::{PlaybackSession, get_or_create};
