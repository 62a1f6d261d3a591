//! Ambient-noise calibration.
//!
//! A short listening pass measures the room's noise floor and derives the
//! energy threshold that separates speech from background noise during the
//! capture that follows.

use std::time::Duration;

use tracing::debug;

use super::capture::{CaptureError, Recorder};
use super::listen::ListenConfig;

/// Level reported for an empty or fully silent buffer.
pub const SILENCE_FLOOR_DB: f32 = -90.0;

/// Result of one calibration pass. Built fresh for every capture; nothing
/// is shared across requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseProfile {
    pub ambient_db: f32,
    pub threshold_db: f32,
}

impl NoiseProfile {
    pub fn is_speech(&self, frame: &[f32]) -> bool {
        rms_db(frame) > self.threshold_db
    }
}

pub fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENCE_FLOOR_DB;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}

pub fn derive_threshold(ambient_db: f32, cfg: &ListenConfig) -> f32 {
    (ambient_db + cfg.threshold_margin_db).clamp(cfg.threshold_floor_db, cfg.threshold_ceiling_db)
}

/// Listen to the room for `calibration_ms` and derive the speech threshold.
pub fn calibrate(recorder: &Recorder, cfg: &ListenConfig) -> Result<NoiseProfile, CaptureError> {
    let (samples, _rate) = recorder.record_for(Duration::from_millis(cfg.calibration_ms))?;
    let ambient_db = rms_db(&samples);
    let profile = NoiseProfile {
        ambient_db,
        threshold_db: derive_threshold(ambient_db, cfg),
    };
    debug!(
        "calibrated: ambient={:.1} dBFS threshold={:.1} dBFS",
        profile.ambient_db, profile.threshold_db
    );
    Ok(profile)
}
