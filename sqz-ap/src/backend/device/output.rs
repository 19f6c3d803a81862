//! Audio output using cpal
//!
//! The cpal stream is not `Send` on every platform, so it lives on a dedicated
//! thread for its whole life. The thread reports the negotiated format back
//! once the stream is playing and then parks until shutdown.

use super::mixer::Mixer;
use crate::error::{AudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Negotiated output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Owner of the output stream thread
pub struct OutputThread {
    info: OutputInfo,
    shutdown: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl OutputThread {
    /// Open the device and start rendering `mixer`. Blocks until the stream runs.
    pub fn spawn(device_name: Option<String>, mixer: Arc<Mixer>) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<OutputInfo>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name("sqz-audio-out".to_string())
            .spawn(move || match open_stream(device_name, mixer) {
                Ok((stream, info)) => {
                    let _ = ready_tx.send(Ok(info));
                    // Returns on shutdown or when the sender is dropped
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    debug!("Audio output thread exiting");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| AudioError::Output(format!("Failed to spawn output thread: {}", e)))?;

        let info = ready_rx
            .recv()
            .map_err(|_| AudioError::Output("Output thread exited during startup".to_string()))??;

        info!(
            "Audio output running on {} ({} Hz, {} channels)",
            info.device_name, info.sample_rate, info.channels
        );
        Ok(Self {
            info,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }

    pub fn info(&self) -> &OutputInfo {
        &self.info
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Check that an output device can be selected without opening a stream
pub fn probe_device(device_name: Option<&str>) -> Result<String> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    device
        .default_output_config()
        .map_err(|e| AudioError::Output(format!("Failed to get default config: {}", e)))?;
    Ok(device.name().unwrap_or_else(|_| "Unknown".to_string()))
}

/// Requested device by name, falling back to the default device
fn select_device(host: &Host, device_name: Option<&str>) -> Result<Device> {
    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| AudioError::Output(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| AudioError::Output("No default output device found".to_string()))
}

fn open_stream(device_name: Option<String>, mixer: Arc<Mixer>) -> Result<(Stream, OutputInfo)> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name.as_deref())?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Output(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config = supported.config();
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
        other => {
            return Err(AudioError::Output(format!("Unsupported sample format: {:?}", other)));
        }
    };
    stream
        .play()
        .map_err(|e| AudioError::Output(format!("Failed to start stream: {}", e)))?;

    Ok((
        stream,
        OutputInfo {
            device_name: name,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        },
    ))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, mixer: Arc<Mixer>) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| mixer.render(data, channels),
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Output(format!("Failed to build stream: {}", e)))
}
