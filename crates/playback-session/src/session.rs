//! Process-wide playback session.
//!
//! [`PlaybackSession`] is the single coordination point GUI code talks to:
//! it owns the playlist, the current position, the player state, and the
//! lifetime of the one background worker. All mutations run on a dedicated
//! control thread; callers rendezvous with it per operation, which
//! serializes every stop/start sequence while keeping decode and device
//! I/O off the control path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use playback_engine::config::PlaybackConfig;
use playback_engine::engine::EngineCloseHandle;
use playback_engine::sink::{DeviceSinkFactory, SinkFactory};
use playback_types::{
    PlaybackEndReason, PlayerError, PlayerState, Playlist, PositionSnapshot,
};

use crate::events::{EventHub, SessionEvent};
use crate::machine::{self, Direction, Intent, Step};
use crate::status::SessionStatus;
use crate::worker;

/// Commands processed by the control thread.
pub(crate) enum Command {
    Intent {
        intent: Intent,
        reply: Sender<Result<(), PlayerError>>,
    },
    SeekToFrame {
        frame: u64,
        reply: Sender<Result<(), PlayerError>>,
    },
    ReplacePlaylist {
        playlist: Playlist,
        reply: Sender<Result<(), PlayerError>>,
    },
    /// Sent by a worker whose engine stopped on its own (end of stream or
    /// decode failure). Externally closed workers send nothing.
    TrackEnded {
        epoch: u64,
        reason: PlaybackEndReason,
        last_frame: u64,
    },
    Shutdown,
}

/// Handle to the session control thread.
///
/// Cheap accessors read a published snapshot; everything else is forwarded
/// to the control thread and answered synchronously.
pub struct PlaybackSession {
    commands: Sender<Command>,
    status: Arc<SessionStatus>,
    events: Arc<EventHub>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackSession {
    /// Build a session over `playlist`, initially stopped.
    ///
    /// The playlist type guarantees at least one track, so index-wrap
    /// arithmetic is always defined.
    pub fn new(playlist: Playlist, factory: Arc<dyn SinkFactory>, config: PlaybackConfig) -> Self {
        let (commands, rx) = unbounded();
        let status = SessionStatus::new();
        let events = Arc::new(EventHub::default());

        let control = Control {
            playlist,
            index: 0,
            offset: 0,
            state: PlayerState::Stopped,
            worker: None,
            epoch: 0,
            failed_streak: 0,
            factory,
            config,
            status: status.clone(),
            events: events.clone(),
            commands: commands.clone(),
        };
        let handle = std::thread::spawn(move || control.run(rx));

        Self {
            commands,
            status,
            events,
            control: Mutex::new(Some(handle)),
        }
    }

    /// Begin playback of the current track from frame zero.
    pub fn play(&self) -> Result<(), PlayerError> {
        self.intent(Intent::Play)
    }

    /// Pause, capturing the exact frame for a later resume.
    pub fn pause(&self) -> Result<(), PlayerError> {
        self.intent(Intent::Pause)
    }

    /// Resume from the captured pause frame.
    pub fn resume(&self) -> Result<(), PlayerError> {
        self.intent(Intent::Resume)
    }

    /// Stop playback and reset the frame offset to zero.
    pub fn stop(&self) -> Result<(), PlayerError> {
        self.intent(Intent::Stop)
    }

    /// Advance to the next track (wrapping) and play it from the start.
    pub fn next(&self) -> Result<(), PlayerError> {
        self.intent(Intent::Next)
    }

    /// Step back to the previous track (wrapping) and play it from the start.
    pub fn previous(&self) -> Result<(), PlayerError> {
        self.intent(Intent::Previous)
    }

    /// Restart playback of the current track at `frame` (scrubbing).
    pub fn seek_to_frame(&self, frame: u64) -> Result<(), PlayerError> {
        let (reply, answer) = bounded(1);
        self.commands
            .send(Command::SeekToFrame { frame, reply })
            .map_err(|_| PlayerError::ControlClosed)?;
        answer.recv().map_err(|_| PlayerError::ControlClosed)?
    }

    /// Swap the repertoire: forces Stopped, joins any live worker, and
    /// resets index and offset to zero. The only way to change playlists
    /// after construction.
    pub fn replace_playlist(&self, playlist: Playlist) -> Result<(), PlayerError> {
        let (reply, answer) = bounded(1);
        self.commands
            .send(Command::ReplacePlaylist { playlist, reply })
            .map_err(|_| PlayerError::ControlClosed)?;
        answer.recv().map_err(|_| PlayerError::ControlClosed)?
    }

    /// Current `(track index, frame offset, state)`; safe from any thread.
    pub fn position(&self) -> PositionSnapshot {
        self.status.snapshot()
    }

    pub fn state(&self) -> PlayerState {
        self.position().state
    }

    pub fn track_index(&self) -> usize {
        self.position().track_index
    }

    pub fn frame_offset(&self) -> u64 {
        self.position().frame_offset
    }

    /// Subscribe to started/finished/track-changed notifications.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn intent(&self, intent: Intent) -> Result<(), PlayerError> {
        let (reply, answer) = bounded(1);
        self.commands
            .send(Command::Intent { intent, reply })
            .map_err(|_| PlayerError::ControlClosed)?;
        answer.recv().map_err(|_| PlayerError::ControlClosed)?
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.control.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

static SESSION: OnceLock<PlaybackSession> = OnceLock::new();

/// Process-wide session accessor with an explicit first-writer-wins
/// contract: the first call constructs the session over `playlist` with the
/// default output device; every later call returns the existing session
/// unchanged and its argument is ignored. Changing repertoire afterwards
/// goes through [`PlaybackSession::replace_playlist`].
pub fn get_or_create(playlist: Playlist) -> &'static PlaybackSession {
    SESSION.get_or_init(|| {
        PlaybackSession::new(
            playlist,
            Arc::new(DeviceSinkFactory::new(None)),
            PlaybackConfig::default(),
        )
    })
}

/// One live worker: close handle, live frame counter, join handle, and the
/// epoch used to match its completion signal.
struct Worker {
    close: Option<EngineCloseHandle>,
    frames: Arc<AtomicU64>,
    join: JoinHandle<()>,
    epoch: u64,
}

struct Control {
    playlist: Playlist,
    index: usize,
    offset: u64,
    state: PlayerState,
    worker: Option<Worker>,
    epoch: u64,
    /// Consecutive auto-advance decode failures; at playlist length the
    /// session stops instead of spinning through a fully unreadable list.
    failed_streak: usize,
    factory: Arc<dyn SinkFactory>,
    config: PlaybackConfig,
    status: Arc<SessionStatus>,
    events: Arc<EventHub>,
    commands: Sender<Command>,
}

impl Control {
    fn run(mut self, rx: Receiver<Command>) {
        while let Ok(cmd) = rx.recv() {
            match cmd {
                Command::Intent { intent, reply } => {
                    self.failed_streak = 0;
                    let _ = reply.send(self.handle_intent(intent));
                }
                Command::SeekToFrame { frame, reply } => {
                    self.failed_streak = 0;
                    let _ = reply.send(self.handle_seek(frame));
                }
                Command::ReplacePlaylist { playlist, reply } => {
                    self.failed_streak = 0;
                    let _ = reply.send(self.handle_replace(playlist));
                }
                Command::TrackEnded {
                    epoch,
                    reason,
                    last_frame,
                } => self.handle_track_ended(epoch, reason, last_frame),
                Command::Shutdown => {
                    self.stop_worker();
                    break;
                }
            }
        }
    }

    fn handle_intent(&mut self, intent: Intent) -> Result<(), PlayerError> {
        let (next_state, step) = machine::transition(self.state, intent);
        match step {
            Step::Ignore => {
                tracing::debug!(state = ?self.state, ?intent, "intent is a no-op in this state");
                Ok(())
            }
            Step::StartFromZero => {
                self.stop_worker();
                self.offset = 0;
                self.start_and_publish(0, next_state)
            }
            Step::ResumeFromCaptured => {
                let from = self.offset;
                self.start_and_publish(from, next_state)
            }
            Step::HaltCapture => {
                if let Some(captured) = self.stop_worker() {
                    self.offset = captured;
                }
                self.state = next_state;
                self.publish();
                Ok(())
            }
            Step::HaltReset => {
                self.stop_worker();
                self.offset = 0;
                self.state = next_state;
                self.publish();
                Ok(())
            }
            Step::Jump(direction) => {
                self.stop_worker();
                self.index = match direction {
                    Direction::Forward => machine::advance_index(self.index, self.playlist.len()),
                    Direction::Backward => machine::retreat_index(self.index, self.playlist.len()),
                };
                self.offset = 0;
                self.events.emit(SessionEvent::TrackChanged {
                    track_index: self.index,
                });
                self.start_and_publish(0, next_state)
            }
        }
    }

    /// Stop, reposition, and restart at `frame` on the current track.
    fn handle_seek(&mut self, frame: u64) -> Result<(), PlayerError> {
        self.stop_worker();
        self.offset = frame;
        self.start_and_publish(frame, PlayerState::Playing)
    }

    fn handle_replace(&mut self, playlist: Playlist) -> Result<(), PlayerError> {
        self.stop_worker();
        self.playlist = playlist;
        self.index = 0;
        self.offset = 0;
        self.state = PlayerState::Stopped;
        self.publish();
        self.events.emit(SessionEvent::TrackChanged { track_index: 0 });
        tracing::info!(tracks = self.playlist.len(), "playlist replaced");
        Ok(())
    }

    /// Auto-advance: a worker finished on its own. Lands in the same place
    /// as a user "next" without passing through the intent surface.
    fn handle_track_ended(&mut self, epoch: u64, reason: PlaybackEndReason, last_frame: u64) {
        if self.worker.as_ref().map(|w| w.epoch) != Some(epoch) {
            tracing::debug!(epoch, "stale completion signal ignored");
            return;
        }
        let Some(w) = self.worker.take() else {
            return;
        };
        if w.join.join().is_err() {
            tracing::error!("worker thread panicked");
        }

        if reason == PlaybackEndReason::DecodeFailed {
            self.failed_streak += 1;
            tracing::warn!(track = self.index, "decode failure; skipping track");
        } else {
            self.failed_streak = 0;
        }

        self.events.emit(SessionEvent::Finished {
            position: PositionSnapshot {
                track_index: self.index,
                frame_offset: last_frame,
                state: self.state,
            },
            reason,
        });

        if self.failed_streak >= self.playlist.len() {
            tracing::warn!("every track failed to decode; stopping");
            self.offset = 0;
            self.state = PlayerState::Stopped;
            self.publish();
            return;
        }

        self.index = machine::advance_index(self.index, self.playlist.len());
        self.offset = 0;
        self.events.emit(SessionEvent::TrackChanged {
            track_index: self.index,
        });
        if let Err(err) = self.start_and_publish(0, PlayerState::Playing) {
            tracing::warn!(error = %err, "auto-advance failed; stopping");
        }
    }

    /// Start a worker and, on success, publish `next_state` and emit the
    /// started notification. On failure the previous state stands, except
    /// that a failed start after the old worker was already torn down
    /// cannot keep claiming Playing and falls back to Stopped.
    fn start_and_publish(
        &mut self,
        from_frame: u64,
        next_state: PlayerState,
    ) -> Result<(), PlayerError> {
        match self.start_worker(from_frame) {
            Ok(()) => {
                self.state = next_state;
                self.publish();
                self.events.emit(SessionEvent::Started {
                    position: PositionSnapshot {
                        track_index: self.index,
                        frame_offset: from_frame,
                        state: next_state,
                    },
                });
                Ok(())
            }
            Err(err) => {
                if self.state == PlayerState::Playing {
                    self.state = PlayerState::Stopped;
                }
                self.publish();
                Err(err)
            }
        }
    }

    /// Spawn the worker for the current track and wait for its startup
    /// report. When this returns `Ok`, the engine is past probe, device
    /// acquisition, and the initial seek; the live counter reads
    /// `from_frame`.
    fn start_worker(&mut self, from_frame: u64) -> Result<(), PlayerError> {
        self.epoch += 1;
        let epoch = self.epoch;
        let frames = Arc::new(AtomicU64::new(from_frame));
        let track = self.playlist.track(self.index).clone();
        let factory = self.factory.clone();
        let config = self.config.clone();
        let commands = self.commands.clone();
        let (ready, startup) = bounded(1);

        let frames_worker = frames.clone();
        let join = std::thread::spawn(move || {
            worker::run(
                track,
                from_frame,
                factory,
                config,
                frames_worker,
                epoch,
                ready,
                commands,
            )
        });

        match startup.recv() {
            Ok(Ok(close)) => {
                self.worker = Some(Worker {
                    close,
                    frames,
                    join,
                    epoch,
                });
                tracing::info!(track = self.index, from_frame, "worker started");
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = join.join();
                Err(err)
            }
            Err(_) => {
                let _ = join.join();
                Err(PlayerError::ControlClosed)
            }
        }
    }

    /// Close and join any live worker, returning the frame it stopped at.
    ///
    /// No stale worker can touch the output device once this returns; a new
    /// worker is only ever started afterwards.
    fn stop_worker(&mut self) -> Option<u64> {
        let w = self.worker.take()?;
        if let Some(close) = &w.close {
            close.close();
        }
        if w.join.join().is_err() {
            tracing::error!("worker thread panicked");
        }
        let captured = w.frames.load(Ordering::Relaxed);
        tracing::info!(track = self.index, frame = captured, "worker stopped");
        self.events.emit(SessionEvent::Finished {
            position: PositionSnapshot {
                track_index: self.index,
                frame_offset: captured,
                state: self.state,
            },
            reason: PlaybackEndReason::Stopped,
        });
        Some(captured)
    }

    /// Publish the completed transition for readers on other threads.
    fn publish(&self) {
        let live = if self.state == PlayerState::Playing {
            self.worker.as_ref().map(|w| w.frames.clone())
        } else {
            None
        };
        self.status.publish(self.index, self.offset, self.state, live);
    }
}
