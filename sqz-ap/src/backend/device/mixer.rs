//! Voice mixer for the output callback
//!
//! Each playing handle owns a [`Voice`]. The output callback sums all active
//! voices frame by frame. Voice parameters are atomics so handles can change
//! them without taking the mixer lock.

use crate::backend::HandleStatus;
use cpal::{FromSample, Sample};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// One clip being played
pub struct Voice {
    /// Interleaved stereo at the output rate
    samples: Arc<[f32]>,
    /// Next frame index
    position: AtomicUsize,
    volume: AtomicU32,
    looping: AtomicBool,
    active: AtomicBool,
    ended: AtomicBool,
    status: Arc<watch::Sender<HandleStatus>>,
}

impl Voice {
    pub fn new(
        samples: Arc<[f32]>,
        volume: f32,
        looping: bool,
        status: Arc<watch::Sender<HandleStatus>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            samples,
            position: AtomicUsize::new(0),
            volume: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
            looping: AtomicBool::new(looping),
            active: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            status,
        })
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// Pause (false) or resume (true) without losing the position
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    fn next_frame(&self) -> Option<(f32, f32)> {
        if !self.active.load(Ordering::Relaxed) {
            return None;
        }
        let mut pos = self.position.load(Ordering::Relaxed);
        if pos >= self.frames() {
            if self.looping.load(Ordering::Relaxed) && self.frames() > 0 {
                pos = 0;
            } else {
                self.active.store(false, Ordering::SeqCst);
                self.ended.store(true, Ordering::SeqCst);
                return None;
            }
        }
        self.position.store(pos + 1, Ordering::Relaxed);
        let volume = self.volume();
        Some((self.samples[pos * 2] * volume, self.samples[pos * 2 + 1] * volume))
    }

    /// Report natural end unless the handle already moved on
    fn finish(&self) {
        self.status.send_if_modified(|status| {
            if *status == HandleStatus::Playing {
                *status = HandleStatus::Ended;
                true
            } else {
                false
            }
        });
    }
}

/// Set of voices rendered by the output stream
#[derive(Default)]
pub struct Mixer {
    voices: Mutex<Vec<Arc<Voice>>>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, voice: Arc<Voice>) {
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(voice);
    }

    pub fn remove(&self, voice: &Arc<Voice>) {
        voice.set_active(false);
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|v| !Arc::ptr_eq(v, voice));
    }

    pub fn voice_count(&self) -> usize {
        self.voices.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Fill an interleaved output buffer. Called on the audio thread.
    ///
    /// Never blocks: if a handle holds the lock, this buffer is silence.
    pub fn render<T>(&self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        let Ok(mut voices) = self.voices.try_lock() else {
            data.fill(T::EQUILIBRIUM);
            return;
        };
        if channels == 0 {
            return;
        }

        for frame in data.chunks_mut(channels) {
            let (mut left, mut right) = (0.0f32, 0.0f32);
            for voice in voices.iter() {
                if let Some((l, r)) = voice.next_frame() {
                    left += l;
                    right += r;
                }
            }
            let left = left.clamp(-1.0, 1.0);
            let right = right.clamp(-1.0, 1.0);

            if channels == 1 {
                frame[0] = T::from_sample((left + right) * 0.5);
                continue;
            }
            frame[0] = T::from_sample(left);
            frame[1] = T::from_sample(right);
            for sample in frame.iter_mut().skip(2) {
                *sample = T::EQUILIBRIUM;
            }
        }

        voices.retain(|voice| {
            if voice.ended.load(Ordering::SeqCst) {
                voice.finish();
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(samples: &[f32], looping: bool) -> (Arc<Voice>, watch::Receiver<HandleStatus>) {
        let (tx, rx) = watch::channel(HandleStatus::Playing);
        (Voice::new(samples.into(), 1.0, looping, Arc::new(tx)), rx)
    }

    #[test]
    fn test_voices_are_summed() {
        let mixer = Mixer::new();
        let (a, _rx_a) = voice(&[0.25, 0.25, 0.25, 0.25], false);
        let (b, _rx_b) = voice(&[0.5, -0.5, 0.5, -0.5], false);
        mixer.add(a);
        mixer.add(b);

        let mut out = vec![0.0f32; 4];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![0.75, -0.25, 0.75, -0.25]);
    }

    #[test]
    fn test_end_reports_ended_and_removes_voice() {
        let mixer = Mixer::new();
        let (a, rx) = voice(&[0.1, 0.1], false);
        mixer.add(a);

        let mut out = vec![0.0f32; 6];
        mixer.render(&mut out, 2);
        assert_eq!(out[2], 0.0);
        assert_eq!(*rx.borrow(), HandleStatus::Ended);
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn test_looping_voice_wraps() {
        let mixer = Mixer::new();
        let (a, rx) = voice(&[0.1, 0.1, 0.2, 0.2], true);
        mixer.add(a);

        let mut out = vec![0.0f32; 10];
        mixer.render(&mut out, 2);
        assert_eq!(out[4], 0.1);
        assert_eq!(out[6], 0.2);
        assert_eq!(*rx.borrow(), HandleStatus::Playing);
        assert_eq!(mixer.voice_count(), 1);
    }

    #[test]
    fn test_paused_voice_is_silent() {
        let mixer = Mixer::new();
        let (a, _rx) = voice(&[0.5, 0.5], false);
        a.set_active(false);
        mixer.add(Arc::clone(&a));

        let mut out = vec![1.0f32; 2];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![0.0, 0.0]);
        assert_eq!(mixer.voice_count(), 1);
    }

    #[test]
    fn test_volume_and_integer_output() {
        let mixer = Mixer::new();
        let (a, _rx) = voice(&[1.0, 1.0], false);
        a.set_volume(0.5);
        mixer.add(a);

        let mut out = vec![0i16; 2];
        mixer.render(&mut out, 2);
        assert!(out[0] > 16_000 && out[0] < 16_500);
    }

    #[test]
    fn test_stopped_handle_does_not_become_ended() {
        let mixer = Mixer::new();
        let (tx, rx) = watch::channel(HandleStatus::Stopped);
        let a = Voice::new(Arc::from(vec![0.1f32, 0.1]), 1.0, false, Arc::new(tx));
        mixer.add(a);

        let mut out = vec![0.0f32; 4];
        mixer.render(&mut out, 2);
        assert_eq!(*rx.borrow(), HandleStatus::Stopped);
    }
}
