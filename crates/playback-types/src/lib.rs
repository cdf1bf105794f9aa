//! Shared plain-data types for the playback core.
//!
//! These are the shapes UI layers and the catalog side of the application
//! consume; they carry no audio machinery of their own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One track of a playlist: an immutable, opaque compressed-audio byte buffer.
///
/// Tracks are cheap to clone (`Arc`-backed) and read-only for their entire
/// lifetime; the decoder only ever borrows the bytes.
#[derive(Clone)]
pub struct Track {
    bytes: Arc<[u8]>,
}

impl Track {
    /// Wrap a fully-materialized compressed audio stream.
    ///
    /// No format validation happens here; malformed audio surfaces as
    /// [`PlayerError::Decode`] when the first frame is decoded.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into().into(),
        }
    }

    /// Raw compressed stream bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the compressed stream in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for Track {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track").field("len", &self.bytes.len()).finish()
    }
}

/// An ordered, never-empty sequence of tracks.
///
/// Insertion order defines next/previous. A playlist is replaced wholesale,
/// never mutated element-by-element while playback is active; the non-empty
/// invariant is enforced at construction so index-wrap arithmetic downstream
/// never divides by zero.
#[derive(Clone, Debug)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    /// Build a playlist, rejecting empty input with [`PlayerError::EmptyPlaylist`]
    /// before any session state can be touched.
    pub fn new(tracks: Vec<Track>) -> Result<Self, PlayerError> {
        if tracks.is_empty() {
            return Err(PlayerError::EmptyPlaylist);
        }
        Ok(Self { tracks })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false; construction rejects empty playlists.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Track at `index`. Panics on out-of-range index; session code only
    /// derives indices via wrap arithmetic over `len()`.
    pub fn track(&self, index: usize) -> &Track {
        &self.tracks[index]
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

/// The three mutually exclusive playback states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

/// Reason a playback worker stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of the compressed stream.
    EndOfStream,
    /// Playback was explicitly stopped, paused, or redirected by a command.
    Stopped,
    /// The decoder hit malformed or truncated data mid-stream.
    DecodeFailed,
}

/// Snapshot of `(track index, frame offset, state)` for progress rendering.
///
/// Reflects the most recently completed transition; the frame offset is live
/// (monotonically increasing) while a worker is playing and frozen while
/// paused or stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub track_index: usize,
    pub frame_offset: u64,
    pub state: PlayerState,
}

/// Error taxonomy of the playback core.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// No output device could be acquired; fatal to starting playback of
    /// that track, the session keeps its previous state.
    #[error("audio output device unavailable")]
    DeviceUnavailable(#[source] anyhow::Error),

    /// Malformed or truncated audio, wrapping the underlying decoder cause.
    #[error("audio decode failed")]
    Decode(#[source] anyhow::Error),

    /// Playlists must contain at least one track.
    #[error("playlist is empty")]
    EmptyPlaylist,

    /// The session control thread or a starting worker went away.
    #[error("playback control channel closed")]
    ControlClosed,
}

impl PlayerError {
    pub fn device_unavailable(cause: impl Into<anyhow::Error>) -> Self {
        Self::DeviceUnavailable(cause.into())
    }

    pub fn decode(cause: impl Into<anyhow::Error>) -> Self {
        Self::Decode(cause.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_playlist_is_rejected() {
        let err = Playlist::new(Vec::new()).unwrap_err();
        assert!(matches!(err, PlayerError::EmptyPlaylist));
    }

    #[test]
    fn playlist_preserves_insertion_order() {
        let playlist = Playlist::new(vec![
            Track::new(vec![1u8]),
            Track::new(vec![2u8, 2]),
            Track::new(vec![3u8, 3, 3]),
        ])
        .unwrap();

        assert_eq!(playlist.len(), 3);
        assert_eq!(playlist.track(0).len(), 1);
        assert_eq!(playlist.track(2).len(), 3);
    }

    #[test]
    fn track_clones_share_bytes() {
        let track = Track::new(vec![7u8; 64]);
        let clone = track.clone();
        assert_eq!(track.bytes().as_ptr(), clone.bytes().as_ptr());
    }

    #[test]
    fn player_state_serializes_snake_case() {
        let json = serde_json::to_string(&PlayerState::Playing).unwrap();
        assert_eq!(json, "\"playing\"");
        let json = serde_json::to_string(&PlaybackEndReason::EndOfStream).unwrap();
        assert_eq!(json, "\"end_of_stream\"");
    }
}
