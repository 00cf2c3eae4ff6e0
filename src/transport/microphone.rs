//! Microphone permission probing via cpal.
//!
//! The probe opens an input stream on the capture device and drops it right
//! away. Nothing is recorded and the device is never held open.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

/// Checks that audio capture is currently possible.
#[async_trait]
pub trait MicrophoneProbe: Send + Sync {
    /// Acquire and immediately release the capture device.
    async fn probe(&self) -> Result<()>;
}

pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// Probe the default input device, or the device called `device_name`.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn open_and_release(device_name: Option<&str>) -> Result<()> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .context("Failed to enumerate input devices")?
                .find(|device| device.name().map(|n| n == name).unwrap_or(false))
                .with_context(|| format!("Input device {name:?} not found"))?,
            None => host
                .default_input_device()
                .context("No input device available")?,
        };

        let supported = device
            .default_input_config()
            .context("Input device refused a capture configuration")?;
        let config: cpal::StreamConfig = supported.config();

        info!(
            "Probing microphone: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        match supported.sample_format() {
            cpal::SampleFormat::F32 => open_stream::<f32>(&device, &config),
            cpal::SampleFormat::I16 => open_stream::<i16>(&device, &config),
            cpal::SampleFormat::U16 => open_stream::<u16>(&device, &config),
            other => Err(anyhow!("Unsupported sample format {other:?}")),
        }
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new(None)
    }
}

fn open_stream<T>(device: &cpal::Device, config: &cpal::StreamConfig) -> Result<()>
where
    T: cpal::SizedSample,
{
    let err_fn = |err| error!("Microphone probe stream error: {}", err);
    let stream = device.build_input_stream(
        config,
        move |_data: &[T], _: &cpal::InputCallbackInfo| {},
        err_fn,
        None,
    )?;
    stream.play()?;

    debug!("Microphone probe stream opened, releasing");
    drop(stream);
    Ok(())
}

#[async_trait]
impl MicrophoneProbe for CpalMicrophone {
    async fn probe(&self) -> Result<()> {
        let device_name = self.device_name.clone();
        tokio::task::spawn_blocking(move || Self::open_and_release(device_name.as_deref()))
            .await
            .context("Microphone probe task failed")?
    }
}
