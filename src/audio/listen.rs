//! Record-until-pause phrase capture.
//!
//! Tracks the capture loop's progress frame by frame: speech has to start
//! before the start timeout, and a phrase ends once the speaker pauses for
//! the configured tail or the hard cap is reached.

use crate::config::MicrophoneConfig;

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub device: Option<String>,
    pub calibration_ms: u64,
    pub frame_ms: u64,
    pub pause_ms: u64,
    pub max_phrase_ms: u64,
    pub start_timeout_ms: u64,
    pub threshold_margin_db: f32,
    pub threshold_floor_db: f32,
    pub threshold_ceiling_db: f32,
}

impl From<&MicrophoneConfig> for ListenConfig {
    fn from(cfg: &MicrophoneConfig) -> Self {
        Self {
            device: cfg.device.clone(),
            calibration_ms: cfg.calibration_ms,
            frame_ms: cfg.frame_ms.clamp(5, 120),
            pause_ms: cfg.pause_ms,
            max_phrase_ms: cfg.max_phrase_ms,
            start_timeout_ms: cfg.start_timeout_ms,
            threshold_margin_db: cfg.threshold_margin_db,
            threshold_floor_db: cfg.threshold_floor_db,
            threshold_ceiling_db: cfg.threshold_ceiling_db,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLabel {
    Speech,
    Silence,
}

/// Why a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Silence tail after speech.
    Pause,
    /// Hard phrase cap.
    MaxPhrase,
    /// Nobody spoke before the start timeout.
    StartTimeout,
    StreamClosed,
}

impl StopReason {
    pub fn label(self) -> &'static str {
        match self {
            StopReason::Pause => "pause",
            StopReason::MaxPhrase => "max_phrase",
            StopReason::StartTimeout => "start_timeout",
            StopReason::StreamClosed => "stream_closed",
        }
    }
}

/// Tracks phrase progress and decides when capture ends.
///
/// Silence only ends a phrase after speech has been heard, so a quiet room
/// does not cut the capture short before anyone talks.
pub struct PhraseTracker<'a> {
    cfg: &'a ListenConfig,
    speech_ms: u64,
    silence_streak_ms: u64,
    total_ms: u64,
}

impl<'a> PhraseTracker<'a> {
    pub fn new(cfg: &'a ListenConfig) -> Self {
        Self {
            cfg,
            speech_ms: 0,
            silence_streak_ms: 0,
            total_ms: 0,
        }
    }

    /// Advance by one labeled frame; a stop reason ends the capture.
    pub fn on_frame(&mut self, label: FrameLabel) -> Option<StopReason> {
        match label {
            FrameLabel::Speech => {
                self.speech_ms = self.speech_ms.saturating_add(self.cfg.frame_ms);
                self.silence_streak_ms = 0;
            }
            FrameLabel::Silence => {
                self.silence_streak_ms = self.silence_streak_ms.saturating_add(self.cfg.frame_ms);
            }
        }
        self.total_ms = self.total_ms.saturating_add(self.cfg.frame_ms);
        self.decide()
    }

    /// Advance when the device produced no frame in time.
    pub fn on_timeout(&mut self) -> Option<StopReason> {
        self.silence_streak_ms = self.silence_streak_ms.saturating_add(self.cfg.frame_ms);
        self.total_ms = self.total_ms.saturating_add(self.cfg.frame_ms);
        self.decide()
    }

    fn decide(&self) -> Option<StopReason> {
        if self.speech_ms == 0 {
            if self.total_ms >= self.cfg.start_timeout_ms {
                return Some(StopReason::StartTimeout);
            }
            return None;
        }
        if self.total_ms >= self.cfg.max_phrase_ms {
            return Some(StopReason::MaxPhrase);
        }
        if self.silence_streak_ms >= self.cfg.pause_ms {
            return Some(StopReason::Pause);
        }
        None
    }

    pub fn heard_speech(&self) -> bool {
        self.speech_ms > 0
    }

    pub fn speech_ms(&self) -> u64 {
        self.speech_ms
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }
}

/// Accumulates labeled frames and trims the silence tail when the phrase
/// ends on a pause.
pub struct PhraseBuffer {
    frames: Vec<(Vec<f32>, FrameLabel)>,
    tail_keep_frames: usize,
}

impl PhraseBuffer {
    pub fn new(cfg: &ListenConfig) -> Self {
        // Keep half the pause tail so the phrase boundary survives the trim.
        let tail_keep_frames = ((cfg.pause_ms / 2) / cfg.frame_ms.max(1)) as usize;
        Self {
            frames: Vec::new(),
            tail_keep_frames,
        }
    }

    pub fn push(&mut self, samples: Vec<f32>, label: FrameLabel) {
        self.frames.push((samples, label));
    }

    pub fn into_samples(mut self, stop: StopReason) -> Vec<f32> {
        if stop == StopReason::Pause {
            self.trim_trailing_silence();
        }
        let total: usize = self.frames.iter().map(|(frame, _)| frame.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for (frame, _) in self.frames {
            samples.extend(frame);
        }
        samples
    }

    fn trim_trailing_silence(&mut self) {
        let trailing = self
            .frames
            .iter()
            .rev()
            .take_while(|(_, label)| *label == FrameLabel::Silence)
            .count();
        let excess = trailing.saturating_sub(self.tail_keep_frames);
        self.frames.truncate(self.frames.len() - excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> ListenConfig {
        ListenConfig {
            device: None,
            calibration_ms: 100,
            frame_ms: 30,
            pause_ms: 90,
            max_phrase_ms: 600,
            start_timeout_ms: 150,
            threshold_margin_db: 6.0,
            threshold_floor_db: -60.0,
            threshold_ceiling_db: -10.0,
        }
    }

    fn drive(tracker: &mut PhraseTracker, labels: &[FrameLabel]) -> Option<StopReason> {
        for label in labels {
            if let Some(reason) = tracker.on_frame(*label) {
                return Some(reason);
            }
        }
        None
    }

    #[test]
    fn pause_after_speech_stops_the_capture() {
        use FrameLabel::{Silence, Speech};
        let cfg = test_cfg();
        let mut tracker = PhraseTracker::new(&cfg);

        // Leading silence does not count as a pause
        let stop = drive(
            &mut tracker,
            &[Silence, Silence, Speech, Speech, Silence, Silence, Silence],
        );
        assert_eq!(stop, Some(StopReason::Pause));
        assert_eq!(tracker.speech_ms(), 60);
    }

    #[test]
    fn speech_resets_the_silence_streak() {
        use FrameLabel::{Silence, Speech};
        let cfg = test_cfg();
        let mut tracker = PhraseTracker::new(&cfg);

        let stop = drive(
            &mut tracker,
            &[Speech, Silence, Silence, Speech, Silence, Silence],
        );
        assert_eq!(stop, None);
    }

    #[test]
    fn quiet_room_times_out_without_speech() {
        let cfg = test_cfg();
        let mut tracker = PhraseTracker::new(&cfg);

        let stop = drive(&mut tracker, &[FrameLabel::Silence; 10]);
        assert_eq!(stop, Some(StopReason::StartTimeout));
        assert!(!tracker.heard_speech());
    }

    #[test]
    fn device_timeouts_count_toward_the_start_timeout() {
        let cfg = test_cfg();
        let mut tracker = PhraseTracker::new(&cfg);

        let mut stop = None;
        for _ in 0..10 {
            stop = tracker.on_timeout();
            if stop.is_some() {
                break;
            }
        }
        assert_eq!(stop, Some(StopReason::StartTimeout));
    }

    #[test]
    fn long_speech_hits_the_phrase_cap() {
        let cfg = test_cfg();
        let mut tracker = PhraseTracker::new(&cfg);

        let stop = drive(&mut tracker, &[FrameLabel::Speech; 40]);
        assert_eq!(stop, Some(StopReason::MaxPhrase));
    }

    #[test]
    fn pause_trims_the_silence_tail() {
        use FrameLabel::{Silence, Speech};
        let cfg = test_cfg();
        // tail_keep = (90 / 2) / 30 = 1 frame
        let mut buffer = PhraseBuffer::new(&cfg);
        for label in [Speech, Speech, Silence, Silence, Silence] {
            buffer.push(vec![0.1; 480], label);
        }

        let samples = buffer.into_samples(StopReason::Pause);
        assert_eq!(samples.len(), 3 * 480);
    }

    #[test]
    fn phrase_cap_keeps_everything() {
        use FrameLabel::{Silence, Speech};
        let cfg = test_cfg();
        let mut buffer = PhraseBuffer::new(&cfg);
        for label in [Speech, Silence, Silence, Silence] {
            buffer.push(vec![0.1; 480], label);
        }

        let samples = buffer.into_samples(StopReason::MaxPhrase);
        assert_eq!(samples.len(), 4 * 480);
    }
}
