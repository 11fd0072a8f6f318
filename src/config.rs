use serde::{Deserialize, Serialize};

/// General application settings shared by every entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Language for transcription ("en" or "hi")
    pub language: String,
    /// Audio sample rate in Hz used for transcription
    /// Capture is resampled to this rate before hitting the model
    pub sample_rate: usize,
    /// Audio processing block size in samples
    pub buffer_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            sample_rate: 16000,
            buffer_size: 1024,
        }
    }
}

/// Whisper model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    /// Model name, resolved to a GGML file under the model cache
    /// (e.g. "base" -> ggml-base.bin)
    /// Multilingual sizes are required for Hindi transcription
    pub model: String,
    /// Number of CPU threads for inference
    pub threads: usize,
    /// Whether to enable GPU acceleration if available
    pub gpu_enabled: bool,
    /// Probability above which a segment is treated as non-speech
    pub no_speech_threshold: f32,
    /// Suppress blank outputs at the start of sampling
    pub suppress_blank: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            threads: num_cpus::get().min(4),
            gpu_enabled: false,
            no_speech_threshold: 0.6,
            suppress_blank: true,
        }
    }
}

/// Configuration for the amplitude-based speech detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Mean absolute amplitude below which a frame counts as silent
    pub silence_threshold: f32,
    /// Minimum seconds of speech for a segment to be kept
    pub min_speech_secs: f32,
    /// Number of loud frames before confirming speech
    pub hangbefore_frames: usize,
    /// Number of silent frames after speech before closing a segment
    pub hangover_frames: usize,
    /// Maximum seconds of audio retained in the rolling buffer
    pub max_buffer_secs: f32,
    /// Seconds of audio kept when the rolling buffer is trimmed
    pub keep_secs: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.015,
            min_speech_secs: 1.5,
            hangbefore_frames: 3,
            hangover_frames: 15,
            max_buffer_secs: 30.0,
            keep_secs: 10.0,
        }
    }
}

/// Settings for the locally hosted generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of the generation server
    pub base_url: String,
    /// Model name to request
    pub model: String,
    /// Sampling temperature for meeting-help answers
    pub temperature: f32,
    /// Maximum tokens to generate
    pub num_predict: u32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "gemma:2b".to_string(),
            temperature: 0.3,
            num_predict: 200,
            top_p: 0.9,
            timeout_secs: 30,
        }
    }
}

/// Bounds for the rolling conversation state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum utterances retained in the rolling log
    pub max_utterances: usize,
    /// Number of recent utterances included in a help prompt
    pub context_utterances: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_utterances: 20,
            context_utterances: 8,
        }
    }
}

/// HTTP endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            // 25 MB is roughly 13 minutes of 16 kHz 16-bit mono WAV
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Settings specific to the interactive voice surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Seconds of buffered audio per chat-loop transcription chunk
    pub chunk_secs: f32,
    /// Recording length for the one-shot question in seconds
    pub question_secs: f32,
    /// Recording length for the microphone test in seconds
    pub mic_test_secs: f32,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            chunk_secs: 2.0,
            question_secs: 5.0,
            mic_test_secs: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub whisper: WhisperConfig,
    pub detector: DetectorConfig,
    pub generation: GenerationConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub assist: AssistConfig,
}

/// Helper function to read the application configuration
pub fn read_app_config() -> AppConfig {
    match std::fs::read_to_string("config.toml") {
        Ok(config_str) => match toml::from_str(&config_str) {
            Ok(config) => config,
            Err(e) => {
                println!(
                    "Failed to parse config.toml: {}. Using default configuration.",
                    e
                );
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

/// Languages the transcription surfaces accept
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "hi"];

pub fn is_supported_language(lang: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.general.sample_rate, 16000);
        assert_eq!(config.generation.model, "gemma:2b");
        assert_eq!(config.conversation.max_utterances, 20);
        assert!(config.detector.keep_secs < config.detector.max_buffer_secs);
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [general]
            language = "hi"

            [generation]
            model = "llama3:8b"
            "#,
        )
        .unwrap();

        assert_eq!(config.general.language, "hi");
        assert_eq!(config.generation.model, "llama3:8b");
        // Untouched sections keep their defaults
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.detector.silence_threshold, 0.015);
    }

    #[test]
    fn language_validation() {
        assert!(is_supported_language("en"));
        assert!(is_supported_language("hi"));
        assert!(!is_supported_language("fr"));
        assert!(!is_supported_language(""));
    }
}
