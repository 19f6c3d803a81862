//! Sample rate conversion using rubato
//!
//! Decoded clips are converted once to the output device rate before they are
//! handed to the mixer.

use crate::error::{AudioError, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Resample interleaved `input` from `input_rate` to `output_rate`.
///
/// Returns a copy when the rates already match.
pub fn resample(input: &[f32], input_rate: u32, output_rate: u32, channels: u16) -> Result<Vec<f32>> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if input_rate == 0 || output_rate == 0 || channels == 0 {
        return Err(AudioError::Playback(format!(
            "Cannot resample {} Hz -> {} Hz ({} channels)",
            input_rate, output_rate, channels
        )));
    }

    let planar = deinterleave(input, channels);
    let input_frames = planar[0].len();

    // One chunk covering the whole clip
    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        channels as usize,
    )
    .map_err(|e| AudioError::Playback(format!("Failed to create resampler: {}", e)))?;

    let output = resampler
        .process(&planar, None)
        .map_err(|e| AudioError::Playback(format!("Resampling failed: {}", e)))?;
    let interleaved = interleave(output);

    debug!(
        "Resampled {} frames at {} Hz to {} frames at {} Hz",
        input_frames,
        input_rate,
        interleaved.len() / channels as usize,
        output_rate
    );
    Ok(interleaved)
}

/// [L, R, L, R, ...] → [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let channels = channels as usize;
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }
    planar
}

/// [[L, L, ...], [R, R, ...]] → [L, R, L, R, ...]
fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut out = Vec::with_capacity(frames * planar.len());
    for idx in 0..frames {
        for channel in &planar {
            out.push(channel[idx]);
        }
    }
    out
}
