//! First-writer-wins contract of the process-wide accessor.
//!
//! Lives in its own integration binary so the process-global state is
//! isolated from the other suites.

use playback_session::get_or_create;
use playback_types::{PlayerState, Playlist, Track};

#[test]
fn get_or_create_returns_the_first_session_unchanged() {
    let first = get_or_create(Playlist::new(vec![Track::new(vec![0u8; 4])]).unwrap());
    let second = get_or_create(
        Playlist::new(vec![Track::new(vec![1u8; 4]), Track::new(vec![2u8; 4])]).unwrap(),
    );

    // Same instance; the later call's playlist is ignored.
    assert!(std::ptr::eq(first, second));
    assert_eq!(first.track_index(), 0);
    assert_eq!(first.state(), PlayerState::Stopped);
}
