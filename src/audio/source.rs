//! The utterance seam between the HTTP handler and the hardware.

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use tracing::{debug, info};

use super::calibrate::calibrate;
use super::capture::{CaptureError, Recorder};
use super::listen::{FrameLabel, ListenConfig, PhraseBuffer, PhraseTracker, StopReason};
use super::resample::resample_linear;
use crate::config::MicrophoneConfig;

/// One captured phrase: mono f32 PCM plus its sample rate. Owned by a
/// single request and discarded once recognition finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

/// Produces one utterance per call. The production implementation records
/// from the local microphone; tests substitute scripted sources.
pub trait UtteranceSource: Send + Sync {
    fn capture_utterance(&self) -> Result<Utterance, CaptureError>;
}

/// Records from the machine's own input device: open, calibrate against
/// ambient noise, listen until the speaker pauses, resample for the
/// recognizer. The device is released before any network work starts.
pub struct MicrophoneSource {
    cfg: ListenConfig,
    target_rate: u32,
}

impl MicrophoneSource {
    pub fn new(cfg: &MicrophoneConfig, target_rate: u32) -> Self {
        Self {
            cfg: cfg.into(),
            target_rate,
        }
    }
}

impl UtteranceSource for MicrophoneSource {
    fn capture_utterance(&self) -> Result<Utterance, CaptureError> {
        let recorder = Recorder::open(self.cfg.device.as_deref())?;
        info!("listening on '{}'", recorder.device_name());

        let profile = calibrate(&recorder, &self.cfg)?;

        let stream = recorder.stream_frames(self.cfg.frame_ms)?;
        let device_rate = stream.sample_rate();
        let mut tracker = PhraseTracker::new(&self.cfg);
        let mut buffer = PhraseBuffer::new(&self.cfg);
        let wait = Duration::from_millis(self.cfg.frame_ms.saturating_mul(4).max(20));

        let stop = loop {
            match stream.next_frame(wait) {
                Ok(frame) => {
                    let label = if profile.is_speech(&frame) {
                        FrameLabel::Speech
                    } else {
                        FrameLabel::Silence
                    };
                    buffer.push(frame, label);
                    if let Some(reason) = tracker.on_frame(label) {
                        break reason;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(reason) = tracker.on_timeout() {
                        break reason;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break StopReason::StreamClosed,
            }
        };
        drop(stream);

        debug!(
            "capture stopped: reason={} total_ms={} speech_ms={}",
            stop.label(),
            tracker.total_ms(),
            tracker.speech_ms()
        );

        if stop == StopReason::StreamClosed && !tracker.heard_speech() {
            return Err(CaptureError::StreamClosed);
        }
        if !tracker.heard_speech() {
            return Ok(Utterance {
                samples: Vec::new(),
                sample_rate: self.target_rate,
            });
        }

        let samples = buffer.into_samples(stop);
        let samples = resample_linear(&samples, device_rate, self.target_rate);
        Ok(Utterance {
            samples,
            sample_rate: self.target_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_utterance_reports_zero_duration() {
        let utterance = Utterance {
            samples: Vec::new(),
            sample_rate: 16_000,
        };
        assert!(utterance.is_empty());
        assert_eq!(utterance.duration_ms(), 0);
    }

    #[test]
    fn duration_follows_the_sample_rate() {
        let utterance = Utterance {
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
        };
        assert_eq!(utterance.duration_ms(), 500);
    }

    #[test]
    fn microphone_source_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MicrophoneSource>();
    }
}
