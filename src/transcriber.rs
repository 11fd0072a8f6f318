//! Whisper transcription wrapper via whisper-rs bindings.

use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::path::Path;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState};

use crate::config::WhisperConfig;

/// Unified error type for transcription operations
#[derive(Debug, Clone)]
pub enum TranscriptionError {
    /// Model not loaded or initialization failed
    ModelNotAvailable(String),

    /// Inference error from the model
    InferenceError(String),

    /// Invalid audio format or parameters
    InvalidAudio(String),

    /// Configuration error
    ConfigurationError(String),

    /// I/O error (model loading, etc.)
    IoError(String),
}

impl fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionError::ModelNotAvailable(msg) => {
                write!(f, "Model not available: {}", msg)
            }
            TranscriptionError::InferenceError(msg) => {
                write!(f, "Inference error: {}", msg)
            }
            TranscriptionError::InvalidAudio(msg) => {
                write!(f, "Invalid audio: {}", msg)
            }
            TranscriptionError::ConfigurationError(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            TranscriptionError::IoError(msg) => {
                write!(f, "I/O error: {}", msg)
            }
        }
    }
}

impl Error for TranscriptionError {}

impl From<std::io::Error> for TranscriptionError {
    fn from(err: std::io::Error) -> Self {
        TranscriptionError::IoError(err.to_string())
    }
}

/// Transcripts below this length are treated as noise
pub const MIN_TRANSCRIPT_CHARS: usize = 3;

/// Filler outputs the model produces on near-silence
const FILLER_TRANSCRIPTS: [&str; 5] = ["thank you.", "thanks.", "hmm.", "uh.", "um."];

/// Whether a transcript carries enough content to act on
pub fn is_meaningful(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TRANSCRIPT_CHARS {
        return false;
    }
    !FILLER_TRANSCRIPTS.contains(&trimmed.to_lowercase().as_str())
}

/// Whisper model wrapper
pub struct Transcriber {
    /// The underlying whisper-rs context (holds loaded model)
    context: WhisperContext,

    /// Reusable state for transcription (eliminates per-call allocation overhead)
    state: Mutex<WhisperState>,

    config: WhisperConfig,
}

impl Transcriber {
    /// Load a GGML model file and prepare a reusable decoding state
    pub fn new(
        model_path: impl AsRef<Path>,
        config: &WhisperConfig,
    ) -> Result<Self, TranscriptionError> {
        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu = config.gpu_enabled;

        let model_path_str = model_path.as_ref().to_str().ok_or_else(|| {
            TranscriptionError::ConfigurationError("Invalid model path encoding".to_string())
        })?;

        let context = WhisperContext::new_with_params(model_path_str, ctx_params).map_err(|e| {
            TranscriptionError::ModelNotAvailable(format!("Failed to load GGML model: {:?}", e))
        })?;

        println!("Whisper model loaded from {}", model_path_str);

        let state = context.create_state().map_err(|e| {
            TranscriptionError::ModelNotAvailable(format!("Failed to create whisper state: {:?}", e))
        })?;

        Ok(Self {
            context,
            state: Mutex::new(state),
            config: config.clone(),
        })
    }

    pub fn is_multilingual(&self) -> bool {
        self.context.is_multilingual()
    }

    /// Transcribe mono 16 kHz samples.
    ///
    /// Returns the trimmed transcript, which may be empty when the model
    /// hears nothing.
    pub fn transcribe(&self, samples: &[f32], language: &str) -> Result<String, TranscriptionError> {
        if samples.is_empty() {
            return Err(TranscriptionError::InvalidAudio(
                "Empty sample buffer".to_string(),
            ));
        }

        let mut state = self.state.lock();

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.config.threads as i32);
        params.set_language(Some(language));

        // Console output is ours to manage
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params.set_suppress_blank(self.config.suppress_blank);
        params.set_no_speech_thold(self.config.no_speech_threshold);
        params.set_no_context(true);

        state.full(params, samples).map_err(|e| {
            TranscriptionError::InferenceError(format!("Transcription failed: {:?}", e))
        })?;

        let mut full_text = String::new();
        for segment in state.as_iter() {
            let segment_text = segment.to_str().map_err(|e| {
                TranscriptionError::InferenceError(format!(
                    "Failed to extract segment text: {:?}",
                    e
                ))
            })?;
            full_text.push_str(segment_text);
        }

        Ok(full_text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_transcripts_are_noise() {
        assert!(!is_meaningful(""));
        assert!(!is_meaningful("  "));
        assert!(!is_meaningful("ok"));
        assert!(is_meaningful("what is a mutex?"));
    }

    #[test]
    fn fillers_are_noise() {
        assert!(!is_meaningful("Thank you."));
        assert!(!is_meaningful("  hmm.  "));
        assert!(!is_meaningful("UM."));
        // Filler as part of a longer sentence is fine
        assert!(is_meaningful("thank you for the summary"));
    }
}
