//! Microphone capture pipeline: device access, ambient-noise calibration,
//! and record-until-pause phrase capture.

pub mod calibrate;
pub mod capture;
pub mod listen;
pub mod resample;
pub mod source;

pub use capture::{CaptureError, Recorder};
pub use source::{MicrophoneSource, Utterance, UtteranceSource};
