use std::collections::VecDeque;
use std::time::Duration;

use crate::config::DetectorConfig;

/// Speech detection states
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VadState {
    Silence,
    PossibleSpeech,
    Speech,
    PossibleSilence,
}

/// Audio segment containing speech
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
    pub start_time: f64,
    pub end_time: f64,
    pub sample_rate: usize,
}

impl SpeechSegment {
    pub fn duration_secs(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Derived detector parameters in sample units
#[derive(Debug, Clone)]
pub struct DetectorParams {
    /// Mean absolute amplitude at or above which a frame counts as speech
    pub threshold: f32,
    /// Size of analysis frames in samples
    pub frame_size: usize,
    /// Audio sample rate in Hz
    pub sample_rate: usize,
    /// Loud frames required before confirming speech
    pub hangbefore_frames: usize,
    /// Silent frames required after speech before closing a segment
    pub hangover_frames: usize,
    /// Segments shorter than this many samples are discarded
    pub min_speech_samples: usize,
    /// Rolling buffer cap in samples
    pub max_buffer_samples: usize,
    /// Samples retained when the rolling buffer is trimmed
    pub keep_samples: usize,
}

impl DetectorParams {
    pub fn from_config(config: &DetectorConfig, frame_size: usize, sample_rate: usize) -> Self {
        Self {
            threshold: config.silence_threshold,
            frame_size,
            sample_rate,
            hangbefore_frames: config.hangbefore_frames.max(1),
            hangover_frames: config.hangover_frames.max(1),
            min_speech_samples: (config.min_speech_secs * sample_rate as f32) as usize,
            max_buffer_samples: (config.max_buffer_secs * sample_rate as f32) as usize,
            keep_samples: (config.keep_secs * sample_rate as f32) as usize,
        }
    }
}

/// Amplitude-threshold speech detector over fixed-size frames.
///
/// A frame is silent when its mean absolute amplitude falls below the
/// configured threshold. Frames drive a four-state machine with hangbefore
/// and hangover counts so brief pops and pauses do not open or close
/// segments. Samples accumulate in a rolling buffer that is trimmed to
/// `keep_samples` whenever it grows past `max_buffer_samples`, which bounds
/// memory on long silent stretches.
pub struct SpeechDetector {
    params: DetectorParams,
    frame_queue: VecDeque<f32>,
    sample_buffer: Vec<f32>,
    segments: Vec<SpeechSegment>,
    current_state: VadState,
    frames_in_state: usize,
    current_time: f64,
    time_offset: f64,
    speech_start_time: Option<f64>,
    sample_rate_f64: f64,
}

impl SpeechDetector {
    pub fn new(params: DetectorParams) -> Self {
        let sample_rate_f64 = params.sample_rate as f64;
        let frame_capacity = params.frame_size * 2;
        let buffer_capacity = params.max_buffer_samples;

        Self {
            params,
            frame_queue: VecDeque::with_capacity(frame_capacity),
            sample_buffer: Vec::with_capacity(buffer_capacity),
            segments: Vec::new(),
            current_state: VadState::Silence,
            frames_in_state: 0,
            current_time: 0.0,
            time_offset: 0.0,
            speech_start_time: None,
            sample_rate_f64,
        }
    }

    /// Reset all detector state
    pub fn reset(&mut self) {
        self.frame_queue.clear();
        self.sample_buffer.clear();
        self.segments.clear();
        self.current_state = VadState::Silence;
        self.frames_in_state = 0;
        self.current_time = 0.0;
        self.time_offset = 0.0;
        self.speech_start_time = None;
    }

    /// Mean absolute amplitude of a frame
    fn frame_energy(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        frame.iter().map(|s| s.abs()).sum::<f32>() / frame.len() as f32
    }

    /// Feed a batch of samples, returning any segments closed by it
    pub fn process_audio(&mut self, samples: &[f32]) -> Vec<SpeechSegment> {
        if samples.is_empty() {
            return Vec::new();
        }

        let frame_size = self.params.frame_size;
        self.frame_queue.extend(samples);

        let mut frame = Vec::with_capacity(frame_size);
        while self.frame_queue.len() >= frame_size {
            frame.clear();
            frame.extend(self.frame_queue.drain(0..frame_size));
            self.process_frame(&frame);
        }

        self.trim_buffer_if_needed();

        std::mem::take(&mut self.segments)
    }

    fn process_frame(&mut self, frame: &[f32]) {
        let is_loud = Self::frame_energy(frame) >= self.params.threshold;
        self.update_state(is_loud);

        self.sample_buffer.extend_from_slice(frame);
        self.current_time += frame.len() as f64 / self.sample_rate_f64;
    }

    fn update_state(&mut self, is_loud: bool) {
        let hangbefore = self.params.hangbefore_frames;
        let hangover = self.params.hangover_frames;
        let frame_secs = self.params.frame_size as f64 / self.sample_rate_f64;

        match self.current_state {
            VadState::Silence => {
                if is_loud {
                    self.current_state = VadState::PossibleSpeech;
                    self.frames_in_state = 1;
                }
            }
            VadState::PossibleSpeech => {
                if is_loud {
                    self.frames_in_state += 1;
                    if self.frames_in_state >= hangbefore {
                        // Count the hangbefore frames as part of the segment
                        let lead = self.frames_in_state as f64 * frame_secs;
                        self.speech_start_time = Some((self.current_time - lead).max(0.0));
                        self.current_state = VadState::Speech;
                        self.frames_in_state = 0;
                    }
                } else {
                    self.current_state = VadState::Silence;
                    self.frames_in_state = 0;
                }
            }
            VadState::Speech => {
                if !is_loud {
                    self.current_state = VadState::PossibleSilence;
                    self.frames_in_state = 1;
                }
            }
            VadState::PossibleSilence => {
                if is_loud {
                    self.current_state = VadState::Speech;
                    self.frames_in_state = 0;
                } else {
                    self.frames_in_state += 1;
                    if self.frames_in_state >= hangover {
                        self.current_state = VadState::Silence;
                        self.frames_in_state = 0;
                        self.finalize_speech_segment();
                    }
                }
            }
        }
    }

    /// Close the active segment, discarding it if below the minimum duration
    fn finalize_speech_segment(&mut self) {
        if let Some(start_time) = self.speech_start_time.take() {
            let end_time = self.current_time;
            let min_secs = self.params.min_speech_samples as f64 / self.sample_rate_f64;
            if end_time - start_time < min_secs {
                return;
            }

            let samples = self.extract_speech_segment(start_time, end_time);
            if !samples.is_empty() {
                self.segments.push(SpeechSegment {
                    samples,
                    start_time,
                    end_time,
                    sample_rate: self.params.sample_rate,
                });
            }
        }
    }

    /// Extract speech samples from the rolling buffer, with a short lead-in
    /// so segments do not open mid-word
    fn extract_speech_segment(&self, start_time: f64, end_time: f64) -> Vec<f32> {
        let lead_in_secs = 0.1;

        let adjusted_start = (start_time - self.time_offset - lead_in_secs).max(0.0);
        let adjusted_end = (end_time - self.time_offset).max(0.0);

        let start_idx =
            ((adjusted_start * self.sample_rate_f64) as usize).min(self.sample_buffer.len());
        let end_idx =
            ((adjusted_end * self.sample_rate_f64) as usize).min(self.sample_buffer.len());

        if start_idx >= end_idx {
            return Vec::new();
        }

        self.sample_buffer[start_idx..end_idx].to_vec()
    }

    /// Drop old audio once the rolling buffer exceeds its cap
    fn trim_buffer_if_needed(&mut self) {
        if self.sample_buffer.len() <= self.params.max_buffer_samples {
            return;
        }

        let excess = self.sample_buffer.len() - self.params.keep_samples;
        let time_trimmed = excess as f64 / self.sample_rate_f64;
        let new_time_offset = self.time_offset + time_trimmed;

        // Audio belonging to an in-progress segment is about to be dropped;
        // emit what we have and restart the segment at the trim boundary
        if let Some(start_time) = self.speech_start_time {
            if start_time < new_time_offset {
                let samples = self.extract_speech_segment(start_time, new_time_offset);
                let min_secs = self.params.min_speech_samples as f64 / self.sample_rate_f64;
                if !samples.is_empty() && new_time_offset - start_time >= min_secs {
                    self.segments.push(SpeechSegment {
                        samples,
                        start_time,
                        end_time: new_time_offset,
                        sample_rate: self.params.sample_rate,
                    });
                }
                self.speech_start_time = Some(new_time_offset);
            }
        }

        self.sample_buffer.drain(0..excess);
        self.time_offset = new_time_offset;
    }

    /// Get current detector state
    #[inline]
    pub fn get_state(&self) -> VadState {
        self.current_state
    }

    /// Check if currently in a speech state
    #[inline]
    pub fn is_speaking(&self) -> bool {
        self.current_state == VadState::Speech || self.current_state == VadState::PossibleSpeech
    }

    /// Samples currently held in the rolling buffer
    #[inline]
    pub fn buffered_samples(&self) -> usize {
        self.sample_buffer.len()
    }

    /// Duration of the in-progress speech, if any
    #[inline]
    pub fn current_speech_duration(&self) -> Option<Duration> {
        self.speech_start_time
            .map(|start| Duration::from_secs_f64(self.current_time - start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: usize = 16000;
    const FRAME: usize = 160; // 10 ms

    fn detector() -> SpeechDetector {
        let config = DetectorConfig {
            silence_threshold: 0.1,
            min_speech_secs: 0.04,
            hangbefore_frames: 2,
            hangover_frames: 3,
            max_buffer_secs: 2.0,
            keep_secs: 1.0,
        };
        SpeechDetector::new(DetectorParams::from_config(&config, FRAME, SAMPLE_RATE))
    }

    fn loud(frames: usize) -> Vec<f32> {
        vec![0.5; frames * FRAME]
    }

    fn quiet(frames: usize) -> Vec<f32> {
        vec![0.0; frames * FRAME]
    }

    #[test]
    fn silence_produces_nothing() {
        let mut det = detector();
        let segments = det.process_audio(&quiet(50));
        assert!(segments.is_empty());
        assert_eq!(det.get_state(), VadState::Silence);
        assert!(!det.is_speaking());
    }

    #[test]
    fn speech_burst_yields_one_segment() {
        let mut det = detector();
        let mut segments = det.process_audio(&quiet(5));
        segments.extend(det.process_audio(&loud(30)));
        assert!(det.is_speaking());
        segments.extend(det.process_audio(&quiet(10)));

        assert_eq!(segments.len(), 1);
        let seg = &segments[0];
        assert!(seg.start_time < seg.end_time);
        assert!(seg.duration_secs() >= 0.05);
        assert!(!seg.samples.is_empty());
        assert_eq!(seg.sample_rate, SAMPLE_RATE);
        assert_eq!(det.get_state(), VadState::Silence);
    }

    #[test]
    fn short_pop_is_discarded() {
        let mut det = detector();
        let config = DetectorConfig {
            silence_threshold: 0.1,
            min_speech_secs: 0.5,
            hangbefore_frames: 2,
            hangover_frames: 3,
            max_buffer_secs: 2.0,
            keep_secs: 1.0,
        };
        let mut strict =
            SpeechDetector::new(DetectorParams::from_config(&config, FRAME, SAMPLE_RATE));

        let mut segments = strict.process_audio(&loud(3));
        segments.extend(strict.process_audio(&quiet(10)));
        assert!(segments.is_empty());

        // The lenient detector keeps the same burst
        let mut segments = det.process_audio(&loud(3));
        segments.extend(det.process_audio(&quiet(10)));
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn single_loud_frame_never_confirms() {
        let mut det = detector();
        for _ in 0..20 {
            det.process_audio(&loud(1));
            let segments = det.process_audio(&quiet(1));
            assert!(segments.is_empty());
        }
        assert_eq!(det.get_state(), VadState::Silence);
    }

    #[test]
    fn pause_within_hangover_does_not_split() {
        let mut det = detector();
        let mut segments = det.process_audio(&loud(20));
        // 2 silent frames is under the hangover of 3, so speech continues
        segments.extend(det.process_audio(&quiet(2)));
        segments.extend(det.process_audio(&loud(20)));
        segments.extend(det.process_audio(&quiet(10)));

        assert_eq!(segments.len(), 1);
        // Both bursts plus the pause are inside the one segment
        assert!(segments[0].duration_secs() >= 0.4);
    }

    #[test]
    fn rolling_buffer_is_bounded() {
        let mut det = detector();
        // 10 seconds of silence against a 2 second cap
        for _ in 0..10 {
            det.process_audio(&quiet(100));
        }
        let max = (2.0 * SAMPLE_RATE as f32) as usize;
        assert!(det.buffered_samples() <= max);
    }

    #[test]
    fn reset_clears_everything() {
        let mut det = detector();
        det.process_audio(&loud(30));
        assert!(det.is_speaking());
        det.reset();
        assert_eq!(det.get_state(), VadState::Silence);
        assert_eq!(det.buffered_samples(), 0);
        assert!(det.current_speech_duration().is_none());
    }

    #[test]
    fn frame_energy_is_mean_abs() {
        assert_eq!(SpeechDetector::frame_energy(&[]), 0.0);
        let e = SpeechDetector::frame_energy(&[0.5, -0.5, 0.5, -0.5]);
        assert!((e - 0.5).abs() < 1e-6);
        let e = SpeechDetector::frame_energy(&[0.2, -0.4]);
        assert!((e - 0.3).abs() < 1e-6);
    }
}
