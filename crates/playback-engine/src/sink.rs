//! Output sink seam between the decode loop and the audio device.
//!
//! The engine writes decoded interleaved `f32` through [`OutputSink`]; the
//! production implementation owns a CPAL stream fed by a bounded
//! [`SampleQueue`]. Sinks are confined to the worker thread (CPAL streams
//! are not `Send`); shutdown from other threads goes through the
//! [`SinkCloser`] handle, which unblocks any in-progress write.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use cpal::traits::StreamTrait;
use symphonia::core::audio::SignalSpec;

use crate::config::PlaybackConfig;
use crate::queue::{SampleQueue, calc_max_buffered_samples};
use crate::resample::StreamResampler;
use crate::{device, output};
use playback_types::PlayerError;

/// Cross-thread closer for an output sink.
///
/// `close` must be idempotent and must release any writer currently blocked
/// in [`OutputSink::write`].
pub trait SinkCloser: Send + Sync {
    fn close(&self);
}

impl SinkCloser for SampleQueue {
    fn close(&self) {
        SampleQueue::close(self)
    }
}

/// Destination for decoded interleaved `f32` samples at the source rate.
pub trait OutputSink {
    /// Blocking write of whole frames. Returns `false` once the sink is
    /// closed; remaining samples are dropped.
    fn write(&mut self, samples: &[f32]) -> bool;

    /// Let buffered audio play out after the final write.
    ///
    /// Returns `false` if `cancel` flipped before the drain finished.
    fn drain(&mut self, cancel: &AtomicBool) -> bool;

    /// Handle that closes this sink from any thread.
    fn closer(&self) -> Arc<dyn SinkCloser>;

    /// Release the output device. Idempotent; buffered audio is discarded.
    fn release(&mut self);
}

/// Acquires an [`OutputSink`] for a given stream spec.
///
/// Shared with worker threads, so implementations must be `Send + Sync`;
/// the sinks they produce are used only on the opening thread.
pub trait SinkFactory: Send + Sync {
    fn open(
        &self,
        spec: SignalSpec,
        config: &PlaybackConfig,
    ) -> Result<Box<dyn OutputSink>, PlayerError>;
}

/// CPAL-backed sink: bounded queue feeding an output stream callback, with
/// inline resampling when the device cannot run at the source rate.
pub struct DeviceSink {
    queue: Arc<SampleQueue>,
    resampler: Option<StreamResampler>,
    stream: Option<cpal::Stream>,
}

impl OutputSink for DeviceSink {
    fn write(&mut self, samples: &[f32]) -> bool {
        let queue = &self.queue;
        match &mut self.resampler {
            Some(rs) => match rs.process(samples, &mut |chunk| queue.push_blocking(chunk)) {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("resampler error: {e:#}");
                    queue.close();
                    false
                }
            },
            None => queue.push_blocking(samples),
        }
    }

    fn drain(&mut self, cancel: &AtomicBool) -> bool {
        let queue = &self.queue;
        if let Some(rs) = &mut self.resampler {
            match rs.flush(&mut |chunk| queue.push_blocking(chunk)) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    tracing::error!("resampler flush error: {e:#}");
                }
            }
        }
        self.queue.close();
        self.queue.wait_drained(cancel)
    }

    fn closer(&self) -> Arc<dyn SinkCloser> {
        self.queue.clone()
    }

    fn release(&mut self) {
        self.queue.close();
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
        }
    }
}

/// Factory for [`DeviceSink`]s on the default host.
pub struct DeviceSinkFactory {
    device_name: Option<String>,
}

impl DeviceSinkFactory {
    /// Select the default output device, or the first one whose name
    /// contains `device_name` (case-insensitive).
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl SinkFactory for DeviceSinkFactory {
    fn open(
        &self,
        spec: SignalSpec,
        config: &PlaybackConfig,
    ) -> Result<Box<dyn OutputSink>, PlayerError> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device_name.as_deref())
            .map_err(PlayerError::device_unavailable)?;
        let supported = device::pick_output_config(&device, Some(spec.rate))
            .map_err(PlayerError::device_unavailable)?;

        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }

        let channels = spec.channels.count();
        let dst_rate = stream_config.sample_rate;
        let queue = Arc::new(SampleQueue::new(
            channels,
            calc_max_buffered_samples(dst_rate, channels, config.buffer_seconds),
        ));

        let resampler = if spec.rate != dst_rate {
            tracing::info!(from_hz = spec.rate, to_hz = dst_rate, "resampling");
            Some(
                StreamResampler::new(spec.rate, dst_rate, channels, config.chunk_frames)
                    .map_err(PlayerError::device_unavailable)?,
            )
        } else {
            tracing::info!(rate_hz = dst_rate, "resample skipped");
            None
        };

        let stream = output::build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            &queue,
            config.refill_max_frames,
        )
        .map_err(PlayerError::device_unavailable)?;
        stream.play().map_err(PlayerError::device_unavailable)?;

        Ok(Box::new(DeviceSink {
            queue,
            resampler,
            stream: Some(stream),
        }))
    }
}
