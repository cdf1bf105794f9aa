//! CPAL output stream construction.
//!
//! The real-time callback refills a small local buffer from the shared
//! sample queue without blocking, applies basic channel mapping
//! (mono↔stereo, best-effort otherwise), and converts `f32` samples to the
//! device sample format. Underruns are filled with silence.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::SampleQueue;

/// Build a CPAL output stream that plays interleaved `f32` audio from `queue`.
///
/// `queue` must already carry samples at the device sample rate.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    refill_max_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, refill_max_frames),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, refill_max_frames),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, refill_max_frames),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, refill_max_frames),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    refill_max_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;

    let state = Arc::new(Mutex::new(CallbackState {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    }));

    let refill_max_frames = refill_max_frames.max(1);
    let queue_cb = queue.clone();
    let state_cb = state.clone();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut st = state_cb.lock().unwrap();

            let frames = data.len() / channels_out;
            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match queue_cb.pop_frames(refill_max_frames) {
                        Some(v) => st.src = v,
                        None => {
                            // No audio ready; the rest of this period is silence.
                            for idx in (frame * channels_out)..data.len() {
                                data[idx] = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            }
                            return;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample_f32 = next_sample_mapped(&mut st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample_f32);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local buffer state for the output callback.
///
/// A small Vec of interleaved samples fetched from the queue lets the
/// callback run without locking the queue for every sample.
struct CallbackState {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: clamp to available channels
///
/// `st.pos` advances once per destination frame (after the last channel).
fn next_sample_mapped(st: &mut CallbackState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize, st: &CallbackState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, 1) => get_src(0, st),
        (2, 2) => get_src(dst_ch.min(1), st),
        (2, 1) => 0.5 * (get_src(0, st) + get_src(1, st)),
        (1, 2) => get_src(0, st),
        _ => get_src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(src_channels: usize, src: Vec<f32>) -> CallbackState {
        CallbackState {
            pos: 0,
            src_channels,
            src,
        }
    }

    #[test]
    fn mono_to_stereo_duplicates_channel_zero() {
        let mut st = state(1, vec![0.5, -0.5]);
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.5);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), 0.5);
        assert_eq!(next_sample_mapped(&mut st, 2, 0), -0.5);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), -0.5);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut st = state(2, vec![1.0, 0.0]);
        assert_eq!(next_sample_mapped(&mut st, 1, 0), 0.5);
    }

    #[test]
    fn exhausted_source_yields_silence() {
        let mut st = state(1, vec![0.25]);
        assert_eq!(next_sample_mapped(&mut st, 1, 0), 0.25);
        assert_eq!(next_sample_mapped(&mut st, 1, 0), 0.0);
    }
}
