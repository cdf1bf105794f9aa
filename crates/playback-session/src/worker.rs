//! Background playback worker: one thread, one engine, one track.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crossbeam_channel::Sender;

use playback_engine::config::PlaybackConfig;
use playback_engine::engine::{EngineCloseHandle, EngineOptions, PlaybackEngine};
use playback_engine::sink::SinkFactory;
use playback_types::{PlaybackEndReason, PlayerError, Track};

use crate::session::Command;

/// Startup outcome, reported over the rendezvous channel before any audio
/// plays. `Ok(None)` means the track itself was unreadable: the session
/// treats it like a spent stream and moves on rather than wedging.
pub(crate) type Ready = Result<Option<EngineCloseHandle>, PlayerError>;

/// Drive one track from `from_frame` until it ends or is closed.
///
/// Probe, device acquisition, and the initial seek all complete before
/// `ready` is answered, so the caller returns with the published position
/// already at `from_frame`. Natural completion and decode failure are
/// reported as [`Command::TrackEnded`]; an external close reports nothing,
/// since the control thread initiated it and already knows.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    track: Track,
    from_frame: u64,
    factory: Arc<dyn SinkFactory>,
    config: PlaybackConfig,
    live_frames: Arc<AtomicU64>,
    epoch: u64,
    ready: Sender<Ready>,
    commands: Sender<Command>,
) {
    let mut engine = match PlaybackEngine::open(
        track,
        factory.as_ref(),
        &config,
        EngineOptions {
            live_frames: Some(live_frames),
        },
    ) {
        Ok(engine) => engine,
        Err(err @ PlayerError::DeviceUnavailable(_)) => {
            let _ = ready.send(Err(err));
            return;
        }
        Err(err) => {
            tracing::warn!(error = %err, "track failed to open; reporting decode failure");
            let _ = ready.send(Ok(None));
            let _ = commands.send(Command::TrackEnded {
                epoch,
                reason: PlaybackEndReason::DecodeFailed,
                last_frame: 0,
            });
            return;
        }
    };

    if let Err(err) = engine.skip_frames(from_frame) {
        tracing::warn!(error = %err, from_frame, "seek failed; reporting decode failure");
        let last_frame = engine.last_frame();
        engine.close();
        let _ = ready.send(Ok(None));
        let _ = commands.send(Command::TrackEnded {
            epoch,
            reason: PlaybackEndReason::DecodeFailed,
            last_frame,
        });
        return;
    }

    let _ = ready.send(Ok(Some(engine.close_handle())));

    let reason = match engine.play_frames(u64::MAX) {
        Ok(false) => Some(PlaybackEndReason::EndOfStream),
        Ok(true) if engine.is_closed() => None,
        Ok(true) => Some(PlaybackEndReason::EndOfStream),
        Err(err) => {
            tracing::warn!(error = %err, "decode failed mid-stream; skipping rest of track");
            Some(PlaybackEndReason::DecodeFailed)
        }
    };

    let last_frame = engine.last_frame();
    match reason {
        Some(reason) => {
            engine.finish();
            let _ = commands.send(Command::TrackEnded {
                epoch,
                reason,
                last_frame,
            });
        }
        // Closed externally: discard buffered audio and release immediately.
        None => engine.close(),
    }
}
