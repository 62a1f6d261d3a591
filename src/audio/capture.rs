//! Microphone access via cpal.
//!
//! The device is opened fresh for each capture and every supported sample
//! format is normalized to mono f32 up front, so the rest of the pipeline
//! stays format-agnostic. Dropping a stream releases the device.

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use thiserror::Error;
use tracing::debug;

/// Frames queued between the audio callback and the capture loop.
const FRAME_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),

    #[error("audio stream closed unexpectedly")]
    StreamClosed,

    #[error("no samples captured; check microphone permissions and availability")]
    NoSamples,
}

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    /// Open a device, optionally by name so users can pick the right
    /// microphone when the machine exposes several inputs.
    pub fn open(preferred_device: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoDevice)?,
        };
        Ok(Self { device })
    }

    /// Whether the default host exposes any input device at all.
    pub fn input_device_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string())
    }

    /// Record mono f32 audio at the device rate for a fixed duration.
    /// Returns the samples together with the device sample rate.
    pub fn record_for(&self, duration: Duration) -> Result<(Vec<f32>, u32), CaptureError> {
        let supported = self.device.default_input_config()?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = usize::from(config.channels.max(1));

        let expected = (duration.as_secs_f64() * f64::from(sample_rate)).ceil() as usize;
        let buffer = Arc::new(Mutex::new(Vec::<f32>::with_capacity(expected)));

        let err_fn = |err| debug!("audio stream error: {err}");
        let stream = match format {
            SampleFormat::F32 => {
                let buffer = buffer.clone();
                self.device.build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        if let Ok(mut buf) = buffer.lock() {
                            append_downmixed(&mut buf, data, channels, |sample| sample);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let buffer = buffer.clone();
                self.device.build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        if let Ok(mut buf) = buffer.lock() {
                            append_downmixed(&mut buf, data, channels, |sample| {
                                f32::from(sample) / 32_768.0
                            });
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let buffer = buffer.clone();
                self.device.build_input_stream(
                    &config,
                    move |data: &[u16], _| {
                        if let Ok(mut buf) = buffer.lock() {
                            append_downmixed(&mut buf, data, channels, |sample| {
                                (f32::from(sample) - 32_768.0) / 32_768.0
                            });
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };

        stream.play()?;
        std::thread::sleep(duration);
        if let Err(err) = stream.pause() {
            debug!("failed to pause audio stream: {err}");
        }
        drop(stream);

        let samples = buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default();
        if samples.is_empty() {
            return Err(CaptureError::NoSamples);
        }
        Ok((samples, sample_rate))
    }

    /// Stream mono f32 frames of `frame_ms` to the returned handle until it
    /// is dropped.
    pub fn stream_frames(&self, frame_ms: u64) -> Result<FrameStream, CaptureError> {
        let supported = self.device.default_input_config()?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = usize::from(config.channels.max(1));
        let frame_len = ((u64::from(sample_rate) * frame_ms) / 1000).max(1) as usize;

        let (sender, receiver) = sync_channel::<Vec<f32>>(FRAME_CHANNEL_CAPACITY);
        let chunker = Arc::new(Mutex::new(FrameChunker::new(frame_len, sender)));

        let err_fn = |err| debug!("audio stream error: {err}");
        let stream = match format {
            SampleFormat::F32 => {
                let chunker = chunker.clone();
                self.device.build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        if let Ok(mut chunker) = chunker.lock() {
                            chunker.push(data, channels, |sample| sample);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let chunker = chunker.clone();
                self.device.build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        if let Ok(mut chunker) = chunker.lock() {
                            chunker.push(data, channels, |sample| {
                                f32::from(sample) / 32_768.0
                            });
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let chunker = chunker.clone();
                self.device.build_input_stream(
                    &config,
                    move |data: &[u16], _| {
                        if let Ok(mut chunker) = chunker.lock() {
                            chunker.push(data, channels, |sample| {
                                (f32::from(sample) - 32_768.0) / 32_768.0
                            });
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };

        stream.play()?;
        Ok(FrameStream {
            receiver,
            sample_rate,
            _stream: stream,
        })
    }
}

/// RAII handle over a running input stream. Dropping it stops the stream
/// and releases the device.
pub struct FrameStream {
    receiver: Receiver<Vec<f32>>,
    sample_rate: u32,
    _stream: cpal::Stream,
}

impl FrameStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn next_frame(&self, timeout: Duration) -> Result<Vec<f32>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Downmix interleaved samples to mono f32 and append them to `buf`.
pub(crate) fn append_downmixed<T: Copy>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    to_f32: impl Fn(T) -> f32,
) {
    for frame in data.chunks(channels.max(1)) {
        let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
        buf.push(sum / frame.len() as f32);
    }
}

/// Splits the callback's arbitrarily sized buffers into fixed frames.
struct FrameChunker {
    frame_len: usize,
    pending: Vec<f32>,
    sender: SyncSender<Vec<f32>>,
}

impl FrameChunker {
    fn new(frame_len: usize, sender: SyncSender<Vec<f32>>) -> Self {
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len),
            sender,
        }
    }

    fn push<T: Copy>(&mut self, data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) {
        append_downmixed(&mut self.pending, data, channels, to_f32);
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let full = std::mem::replace(&mut self.pending, rest);
            // The audio callback must never block; drop the frame when the
            // consumer is behind.
            let _ = self.sender.try_send(full);
        }
    }
}
