//! Streaming sample-rate conversion.
//!
//! Wraps Rubato's streaming sinc resampler for the case where the output
//! device cannot run at the source rate. The engine pushes decoded packets
//! of arbitrary size; this stage buffers them into fixed input chunks and
//! emits converted interleaved `f32` audio through a caller-supplied sink
//! closure.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Streaming resampler between the decoder and the sample queue.
pub struct StreamResampler {
    resampler: Async<f32>,
    channels: usize,
    chunk_frames: usize,
    pending: Vec<f32>,
    out_buf: Vec<f32>,
}

impl StreamResampler {
    /// Create a converter from `src_rate` to `dst_rate`.
    ///
    /// `chunk_frames` is the fixed input chunk size fed to Rubato; incoming
    /// packets are buffered until a full chunk is available.
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        let f_ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let chunk_frames = chunk_frames.max(1);
        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .context("resampler init")?;

        Ok(Self {
            resampler,
            channels,
            chunk_frames,
            pending: Vec::new(),
            out_buf: vec![0.0; channels * chunk_frames * 3],
        })
    }

    /// Feed interleaved source-rate samples, emitting converted chunks.
    ///
    /// `emit` returns `false` to reject further output (downstream closed);
    /// that verdict is passed through. Samples that do not fill a whole
    /// chunk stay buffered until the next call or [`flush`](Self::flush).
    pub fn process(&mut self, input: &[f32], emit: &mut dyn FnMut(&[f32]) -> bool) -> Result<bool> {
        self.pending.extend_from_slice(input);

        let chunk_samples = self.chunk_frames * self.channels;
        while self.pending.len() >= chunk_samples {
            let chunk: Vec<f32> = self.pending.drain(..chunk_samples).collect();
            let produced = self.convert(&chunk, None)?;
            if produced > 0 && !emit(&self.out_buf[..produced]) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Convert and emit whatever partial chunk is still buffered.
    pub fn flush(&mut self, emit: &mut dyn FnMut(&[f32]) -> bool) -> Result<bool> {
        let tail_frames = self.pending.len() / self.channels;
        if tail_frames == 0 {
            return Ok(true);
        }

        let tail: Vec<f32> = self.pending.drain(..).collect();
        let produced = self.convert(&tail, Some(tail_frames))?;
        if produced > 0 && !emit(&self.out_buf[..produced]) {
            return Ok(false);
        }
        Ok(true)
    }

    /// Run one Rubato conversion over `input`, returning produced samples.
    fn convert(&mut self, input: &[f32], partial_len: Option<usize>) -> Result<usize> {
        let in_frames = input.len() / self.channels;
        let input_adapter = InterleavedSlice::new(input, self.channels, in_frames)
            .context("interleaved slice (input)")?;

        let out_capacity_frames = self.out_buf.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.out_buf, self.channels, out_capacity_frames)
                .context("interleaved slice (output)")?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .context("resampler process")?;

        Ok(nbr_out * self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsamples_roughly_by_ratio() {
        let mut rs = StreamResampler::new(44_100, 48_000, 1, 1024).unwrap();
        let input = vec![0.1f32; 8192];

        let mut out = Vec::new();
        let mut emit = |chunk: &[f32]| {
            out.extend_from_slice(chunk);
            true
        };
        assert!(rs.process(&input, &mut emit).unwrap());
        assert!(rs.flush(&mut emit).unwrap());

        let expected = 8192.0 * 48_000.0 / 44_100.0;
        assert!((out.len() as f64) > expected * 0.75);
        assert!((out.len() as f64) < expected * 1.25);
    }

    #[test]
    fn partial_chunks_stay_buffered_until_flush() {
        let mut rs = StreamResampler::new(48_000, 44_100, 2, 1024).unwrap();

        let mut out = Vec::new();
        {
            let mut emit = |chunk: &[f32]| {
                out.extend_from_slice(chunk);
                true
            };
            // Half a chunk: nothing can be converted yet.
            assert!(rs.process(&vec![0.0f32; 1024], &mut emit).unwrap());
        }
        assert!(out.is_empty());

        let mut emit = |chunk: &[f32]| {
            out.extend_from_slice(chunk);
            true
        };
        assert!(rs.flush(&mut emit).unwrap());
        assert!(!out.is_empty());
    }

    #[test]
    fn emit_rejection_stops_processing() {
        let mut rs = StreamResampler::new(44_100, 48_000, 1, 256).unwrap();
        let mut emit = |_: &[f32]| false;
        assert!(!rs.process(&vec![0.0f32; 2048], &mut emit).unwrap());
    }
}
