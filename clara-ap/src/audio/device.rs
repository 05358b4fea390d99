//! Sound card output using cpal
//!
//! The cpal stream is created and owned by a dedicated thread (cpal streams
//! are not `Send` on every platform). The render callback mixes the shared
//! timeline; the output clock is the number of frames the callback has
//! rendered.

use crate::audio::output::{AudioOutput, OutputStatus, ScheduledSource, SourceId};
use crate::audio::timeline::Timeline;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Flags shared between the owner, the stream thread and the callback
struct DeviceFlags {
    suspended: AtomicBool,
    /// Set by the stream error callback
    failed: AtomicBool,
    closed: AtomicBool,
}

/// cpal-backed output
pub struct DeviceOutput {
    timeline: Arc<Mutex<Timeline>>,
    flags: Arc<DeviceFlags>,
    thread: Mutex<Option<JoinHandle<()>>>,
    sample_rate: u32,
    device_name: String,
}

impl DeviceOutput {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open a device (None = default) and start its stream
    ///
    /// Falls back to the default device when the named one is missing.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let flags = Arc::new(DeviceFlags {
            suspended: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let timeline = Arc::new(Mutex::new(Timeline::new(1)));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, String)>>();

        let thread_flags = Arc::clone(&flags);
        let thread_timeline = Arc::clone(&timeline);
        let thread = std::thread::Builder::new()
            .name("clara-audio-out".to_string())
            .spawn(move || {
                let opened = open_stream(device_name, &thread_timeline, &thread_flags);
                let stream = match opened {
                    Ok((stream, rate, name)) => {
                        let _ = ready_tx.send(Ok((rate, name)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive until the output is closed
                while !thread_flags.closed.load(Ordering::SeqCst) {
                    std::thread::park_timeout(Duration::from_millis(100));
                }

                if let Err(e) = stream.pause() {
                    warn!("Failed to pause audio stream: {}", e);
                }
                drop(stream);
                debug!("Audio output thread exiting");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let (sample_rate, name) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during startup".to_string()))??;

        info!(device = %name, sample_rate, "Audio output started");
        Ok(Self {
            timeline,
            flags,
            thread: Mutex::new(Some(thread)),
            sample_rate,
            device_name: name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stop advancing the clock; the callback writes silence meanwhile
    pub fn suspend(&self) {
        self.flags.suspended.store(true, Ordering::SeqCst);
    }
}

impl AudioOutput for DeviceOutput {
    fn current_time(&self) -> f64 {
        self.timeline.lock().current_time()
    }

    fn status(&self) -> OutputStatus {
        if self.flags.closed.load(Ordering::SeqCst) || self.flags.failed.load(Ordering::SeqCst) {
            OutputStatus::Closed
        } else if self.flags.suspended.load(Ordering::SeqCst) {
            OutputStatus::Suspended
        } else {
            OutputStatus::Running
        }
    }

    fn resume(&self) -> Result<()> {
        if self.status() == OutputStatus::Closed {
            return Err(Error::AudioOutput(format!(
                "Device '{}' is no longer available",
                self.device_name
            )));
        }
        self.flags.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn schedule(&self, source: ScheduledSource) -> Result<SourceId> {
        if self.status() == OutputStatus::Closed {
            return Err(Error::AudioOutput(format!(
                "Device '{}' is no longer available",
                self.device_name
            )));
        }
        Ok(self.timeline.lock().add(source))
    }

    fn stop_source(&self, id: SourceId) -> Result<()> {
        if self.timeline.lock().remove(id) {
            Ok(())
        } else {
            Err(Error::AudioOutput(format!("Source {:?} already finished", id)))
        }
    }

    fn close(&self) -> Result<()> {
        if self.flags.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.timeline.lock().clear();

        if let Some(thread) = self.thread.lock().take() {
            thread.thread().unpark();
            thread
                .join()
                .map_err(|_| Error::AudioOutput("Audio thread panicked".to_string()))?;
        }
        info!(device = %self.device_name, "Audio output closed");
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing audio output: {}", e);
        }
    }
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<(Device, String)> {
    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok((device, name.to_string()));
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    Ok((device, name))
}

fn open_stream(
    device_name: Option<String>,
    timeline: &Arc<Mutex<Timeline>>,
    flags: &Arc<DeviceFlags>,
) -> Result<(Stream, u32, String)> {
    let host = cpal::default_host();
    let (device, name) = select_device(&host, device_name.as_deref())?;

    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let sample_rate = config.sample_rate.0;

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        sample_rate, config.channels, sample_format
    );

    *timeline.lock() = Timeline::new(sample_rate);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, timeline, flags, |s| s)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, timeline, flags, |s| {
            (s * i16::MAX as f32) as i16
        })?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, timeline, flags, |s| {
            ((s + 1.0) * 32767.5) as u16
        })?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((stream, sample_rate, name))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    timeline: &Arc<Mutex<Timeline>>,
    flags: &Arc<DeviceFlags>,
    convert: fn(f32) -> T,
) -> Result<Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let channels = config.channels as usize;
    let timeline = Arc::clone(timeline);
    let callback_flags = Arc::clone(flags);
    let error_flags = Arc::clone(flags);
    let mut mix: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mix.resize(data.len(), 0.0);
                if callback_flags.suspended.load(Ordering::Relaxed) {
                    timeline.lock().render_silence(&mut mix);
                } else {
                    timeline.lock().render(&mut mix, channels);
                }
                for (out, &sample) in data.iter_mut().zip(mix.iter()) {
                    *out = convert(sample);
                }
            },
            move |err| {
                error!("Audio stream error: {} - marking output closed", err);
                error_flags.failed.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
