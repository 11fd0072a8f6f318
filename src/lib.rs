pub mod assistant;
pub mod audio_capture;
pub mod audio_processor;
pub mod config;
pub mod conversation;
pub mod download;
pub mod ollama;
pub mod pcm;
pub mod server;
pub mod speech_detector;
pub mod transcriber;
pub mod transcription_processor;
pub mod ui;

// Re-export key components for easier access
pub use assistant::{AssistCommand, AssistEvent, MeetingAssistant};
pub use audio_capture::AudioCapture;
pub use config::{read_app_config, AppConfig};
pub use conversation::{ChatHistory, ConversationLog, Utterance};
pub use ollama::OllamaClient;
pub use speech_detector::SpeechDetector;
pub use transcriber::Transcriber;
