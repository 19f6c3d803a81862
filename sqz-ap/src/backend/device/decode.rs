//! Whole-clip decoding using symphonia
//!
//! Clips are short (sound effects, menu loops), so they are decoded fully into
//! memory before playback. Output is interleaved stereo f32:
//! - Mono files are duplicated to stereo
//! - Multi-channel files are downmixed (even channels left, odd channels right)

use crate::error::{AudioError, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decoded clip: interleaved stereo samples at `sample_rate`
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Decode an entire file. Blocking; run on a blocking thread.
pub fn decode_file(path: &Path) -> Result<DecodedClip> {
    let asset = path.display().to_string();
    let file = File::open(path).map_err(|e| AudioError::asset_load(&asset, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::asset_load(&asset, format!("unsupported format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::asset_load(&asset, "no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::asset_load(&asset, format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::asset_load(&asset, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("Skipping corrupt packet in {}: {}", asset, msg);
                continue;
            }
            Err(e) => return Err(AudioError::asset_load(&asset, e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        sample_rate = spec.rate;

        let needed = decoded.capacity() * channels;
        if buffer.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            buffer = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            push_stereo(&mut samples, buf.samples(), channels);
        }
    }

    if samples.is_empty() {
        return Err(AudioError::asset_load(&asset, "no audio frames"));
    }

    debug!(
        "Decoded {} ({} frames at {} Hz)",
        asset,
        samples.len() / 2,
        sample_rate
    );
    Ok(DecodedClip {
        samples: samples.into(),
        sample_rate,
    })
}

/// Append interleaved `input` with `channels` channels to `out` as stereo
fn push_stereo(out: &mut Vec<f32>, input: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            out.reserve(input.len() * 2);
            for &sample in input {
                out.push(sample);
                out.push(sample);
            }
        }
        2 => out.extend_from_slice(input),
        _ => {
            let per_side = channels as f32 / 2.0;
            for frame in input.chunks_exact(channels) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for (idx, sample) in frame.iter().enumerate() {
                    if idx % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                out.push(left / per_side);
                out.push(right / per_side);
            }
        }
    }
}
