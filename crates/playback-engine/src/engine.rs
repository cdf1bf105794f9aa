//! Packet-granular streaming decode engine.
//!
//! [`PlaybackEngine`] decodes one compressed frame (Symphonia packet) at a
//! time from an in-memory byte stream and writes the samples to an
//! exclusively-owned output sink. Frames can also be skipped without
//! decoding payload, which is what makes pause/resume and scrubbing cheap.
//!
//! Exactly one thread drives `play_frames`/`skip_frames` on an engine; any
//! thread may request shutdown through the [`EngineCloseHandle`], after
//! which the drive loop winds down gracefully at the next frame boundary.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::anyhow;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::PlaybackConfig;
use crate::sink::{OutputSink, SinkCloser, SinkFactory};
use playback_types::{PlayerError, Track};

/// Optional wiring for a single engine instance.
#[derive(Default)]
pub struct EngineOptions {
    /// Shared counter mirroring the current frame position, for live
    /// progress reads from other threads.
    pub live_frames: Option<Arc<AtomicU64>>,
}

/// Thread-safe, idempotent shutdown handle for a running engine.
#[derive(Clone)]
pub struct EngineCloseHandle {
    closed: Arc<AtomicBool>,
    closer: Arc<dyn SinkCloser>,
}

impl EngineCloseHandle {
    /// Request shutdown: flips the closed flag and unblocks any in-progress
    /// sink write. Safe to call from any thread, any number of times.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closer.close();
            tracing::debug!("engine close requested");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Streaming decoder bound to one track and one output sink.
pub struct PlaybackEngine {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: SignalSpec,
    sink: Box<dyn OutputSink>,
    handle: EngineCloseHandle,
    current_frame: u64,
    live_frames: Option<Arc<AtomicU64>>,
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("track_id", &self.track_id)
            .field("current_frame", &self.current_frame)
            .finish_non_exhaustive()
    }
}

impl PlaybackEngine {
    /// Probe the track's byte stream, build a decoder, and acquire an output
    /// sink from `factory`.
    ///
    /// Fails with [`PlayerError::DeviceUnavailable`] when no sink can be
    /// acquired and [`PlayerError::Decode`] when the container cannot be
    /// probed.
    pub fn open(
        track: Track,
        factory: &dyn SinkFactory,
        config: &PlaybackConfig,
        opts: EngineOptions,
    ) -> Result<Self, PlayerError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(track)), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(PlayerError::decode)?;
        let reader = probed.format;

        let (track_id, codec_params) = {
            let stream = reader
                .default_track()
                .ok_or_else(|| PlayerError::decode(anyhow!("no default audio track")))?;
            (stream.id, stream.codec_params.clone())
        };

        let channels = codec_params
            .channels
            .ok_or_else(|| PlayerError::decode(anyhow!("unknown channel layout")))?;
        let rate = codec_params
            .sample_rate
            .ok_or_else(|| PlayerError::decode(anyhow!("unknown sample rate")))?;
        let spec = SignalSpec::new(rate, channels);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(PlayerError::decode)?;

        let sink = factory.open(spec, config)?;
        let handle = EngineCloseHandle {
            closed: Arc::new(AtomicBool::new(false)),
            closer: sink.closer(),
        };

        if let Some(live) = &opts.live_frames {
            live.store(0, Ordering::Relaxed);
        }

        Ok(Self {
            reader,
            decoder,
            track_id,
            spec,
            sink,
            handle,
            current_frame: 0,
            live_frames: opts.live_frames,
        })
    }

    /// Decode and output up to `max_frames` frames.
    ///
    /// Returns `Ok(false)` on natural end of stream and `Ok(true)` while
    /// more data remains, including when the run was cut short by a
    /// concurrent close, which is not an error. Decode failures leave the
    /// engine's resources intact until [`close`](Self::close).
    pub fn play_frames(&mut self, max_frames: u64) -> Result<bool, PlayerError> {
        let mut played: u64 = 0;

        while played < max_frames {
            if self.handle.is_closed() {
                return Ok(true);
            }

            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(PlayerError::decode(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self.decoder.decode(&packet).map_err(PlayerError::decode)?;
            if decoded.frames() > 0 {
                let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
                buf.copy_interleaved_ref(decoded);
                if !self.sink.write(buf.samples()) {
                    // Closed mid-write; the interrupted frame does not count.
                    return Ok(true);
                }
            }

            self.advance(1);
            played += 1;
        }

        Ok(true)
    }

    /// Advance the packet reader by `n` frames without decoding payload.
    ///
    /// Skipping past end of stream is benign; the position simply stops at
    /// the end and the next play reports natural completion.
    pub fn skip_frames(&mut self, n: u64) -> Result<(), PlayerError> {
        let mut skipped: u64 = 0;

        while skipped < n {
            if self.handle.is_closed() {
                return Ok(());
            }

            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(());
                }
                Err(SymphoniaError::ResetRequired) => return Ok(()),
                Err(e) => return Err(PlayerError::decode(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            self.advance(1);
            skipped += 1;
        }

        Ok(())
    }

    /// `skip_frames(start)` followed by `play_frames(end - start)`.
    pub fn play_range(&mut self, start: u64, end: u64) -> Result<bool, PlayerError> {
        self.skip_frames(start)?;
        self.play_frames(end.saturating_sub(start))
    }

    /// Current frame counter; valid at any time, including after close.
    pub fn last_frame(&self) -> u64 {
        self.current_frame
    }

    /// Signal spec of the decoded stream.
    pub fn spec(&self) -> SignalSpec {
        self.spec
    }

    /// Handle for closing this engine from another thread.
    pub fn close_handle(&self) -> EngineCloseHandle {
        self.handle.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Let buffered audio play out, then release everything.
    ///
    /// Used on natural completion; a concurrent close cancels the drain.
    pub fn finish(&mut self) {
        self.sink.drain(&self.handle.closed);
        self.close();
    }

    /// Idempotent teardown: releases the output device and drops the byte
    /// stream. Close failures of the underlying stream have nowhere to go
    /// and are swallowed rather than masking a primary error.
    pub fn close(&mut self) {
        self.handle.close();
        self.sink.release();
    }

    fn advance(&mut self, n: u64) {
        self.current_frame += n;
        if let Some(live) = &self.live_frames {
            live.store(self.current_frame, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn wav_track(samples: usize) -> Track {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..samples {
                writer.write_sample((i % 512) as i16 - 256).unwrap();
            }
            writer.finalize().unwrap();
        }
        Track::new(cursor.into_inner())
    }

    struct FlagCloser {
        closed: Arc<AtomicBool>,
    }

    impl SinkCloser for FlagCloser {
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct CaptureSink {
        samples: Arc<Mutex<Vec<f32>>>,
        closed: Arc<AtomicBool>,
    }

    impl OutputSink for CaptureSink {
        fn write(&mut self, samples: &[f32]) -> bool {
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }
            self.samples.lock().unwrap().extend_from_slice(samples);
            true
        }

        fn drain(&mut self, _cancel: &AtomicBool) -> bool {
            true
        }

        fn closer(&self) -> Arc<dyn SinkCloser> {
            Arc::new(FlagCloser {
                closed: self.closed.clone(),
            })
        }

        fn release(&mut self) {}
    }

    struct CaptureFactory {
        samples: Arc<Mutex<Vec<f32>>>,
    }

    impl CaptureFactory {
        fn new() -> (Self, Arc<Mutex<Vec<f32>>>) {
            let samples = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    samples: samples.clone(),
                },
                samples,
            )
        }
    }

    impl SinkFactory for CaptureFactory {
        fn open(
            &self,
            _spec: SignalSpec,
            _config: &PlaybackConfig,
        ) -> Result<Box<dyn OutputSink>, PlayerError> {
            Ok(Box::new(CaptureSink {
                samples: self.samples.clone(),
                closed: Arc::new(AtomicBool::new(false)),
            }))
        }
    }

    struct NoDeviceFactory;

    impl SinkFactory for NoDeviceFactory {
        fn open(
            &self,
            _spec: SignalSpec,
            _config: &PlaybackConfig,
        ) -> Result<Box<dyn OutputSink>, PlayerError> {
            Err(PlayerError::device_unavailable(anyhow!(
                "no devices in test"
            )))
        }
    }

    fn play_all(track: &Track) -> Vec<f32> {
        let (factory, samples) = CaptureFactory::new();
        let mut engine = PlaybackEngine::open(
            track.clone(),
            &factory,
            &PlaybackConfig::default(),
            EngineOptions::default(),
        )
        .unwrap();
        assert!(!engine.play_frames(u64::MAX).unwrap());
        engine.finish();
        let out = samples.lock().unwrap().clone();
        out
    }

    #[test]
    fn plays_whole_stream_to_natural_end() {
        let track = wav_track(2_000);
        let samples = play_all(&track);
        assert_eq!(samples.len(), 2_000);
    }

    #[test]
    fn pause_resume_split_loses_no_frames() {
        let track = wav_track(16_000);
        let full = play_all(&track);

        // Head: play one frame, remember where we stopped.
        let (factory, head) = CaptureFactory::new();
        let mut engine = PlaybackEngine::open(
            track.clone(),
            &factory,
            &PlaybackConfig::default(),
            EngineOptions::default(),
        )
        .unwrap();
        engine.play_frames(1).unwrap();
        let paused_at = engine.last_frame();
        assert_eq!(paused_at, 1);
        engine.close();

        // Tail: skip exactly that many frames without decoding, play the rest.
        let (factory, tail) = CaptureFactory::new();
        let mut engine = PlaybackEngine::open(
            track.clone(),
            &factory,
            &PlaybackConfig::default(),
            EngineOptions::default(),
        )
        .unwrap();
        engine.play_range(paused_at, u64::MAX).unwrap();
        engine.finish();

        let mut recombined = head.lock().unwrap().clone();
        recombined.extend_from_slice(&tail.lock().unwrap());
        assert_eq!(recombined, full);
    }

    #[test]
    fn live_counter_follows_skip_and_play() {
        let track = wav_track(16_000);
        let counter = Arc::new(AtomicU64::new(0));
        let (factory, _samples) = CaptureFactory::new();
        let mut engine = PlaybackEngine::open(
            track,
            &factory,
            &PlaybackConfig::default(),
            EngineOptions {
                live_frames: Some(counter.clone()),
            },
        )
        .unwrap();

        engine.skip_frames(1).unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert_eq!(engine.last_frame(), 1);

        engine.play_frames(1).unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), engine.last_frame());
    }

    #[test]
    fn close_handle_stops_playback_gracefully() {
        let track = wav_track(16_000);
        let (factory, samples) = CaptureFactory::new();
        let mut engine = PlaybackEngine::open(
            track,
            &factory,
            &PlaybackConfig::default(),
            EngineOptions::default(),
        )
        .unwrap();

        let handle = engine.close_handle();
        handle.close();
        handle.close();

        // More data remained, so the short run reports true, not an error.
        assert!(engine.play_frames(u64::MAX).unwrap());
        assert!(samples.lock().unwrap().is_empty());
        engine.close();
    }

    #[test]
    fn skipping_past_end_is_benign() {
        let track = wav_track(2_000);
        let (factory, _samples) = CaptureFactory::new();
        let mut engine = PlaybackEngine::open(
            track,
            &factory,
            &PlaybackConfig::default(),
            EngineOptions::default(),
        )
        .unwrap();

        engine.skip_frames(u64::MAX / 2).unwrap();
        assert!(!engine.play_frames(1).unwrap());
    }

    #[test]
    fn corrupt_stream_fails_probe_with_decode_error() {
        let track = Track::new(b"definitely not an audio container".to_vec());
        let (factory, _samples) = CaptureFactory::new();
        let err = PlaybackEngine::open(
            track,
            &factory,
            &PlaybackConfig::default(),
            EngineOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn missing_device_surfaces_as_device_unavailable() {
        let track = wav_track(2_000);
        let err = PlaybackEngine::open(
            track,
            &NoDeviceFactory,
            &PlaybackConfig::default(),
            EngineOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PlayerError::DeviceUnavailable(_)));
    }
}
