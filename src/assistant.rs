use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

use crate::audio_capture::{self, AudioCapture};
use crate::audio_processor::AudioProcessor;
use crate::config::AppConfig;
use crate::conversation::{
    meeting_help_prompt, ConversationLog, SpeakerCycle, Utterance, NO_CONTEXT_NOTICE,
};
use crate::ollama::OllamaClient;
use crate::pcm;
use crate::speech_detector::{DetectorParams, SpeechDetector, SpeechSegment};
use crate::transcriber::Transcriber;
use crate::transcription_processor::TranscriptionProcessor;

pub const STATUS_LISTENING: &str = "Listening to conversation...";
pub const STATUS_PAUSED: &str = "Paused. Press Space to resume.";
pub const STATUS_CONSULTING: &str = "Analyzing recent conversation...";
pub const STATUS_TESTING: &str = "Testing microphone, speak now...";

/// Updates flowing from the pipeline to whichever surface renders them.
///
/// The surface drains these on its own schedule; the pipeline never touches
/// UI state directly.
#[derive(Debug, Clone)]
pub enum AssistEvent {
    /// A new conversation line was transcribed
    Utterance(Utterance),
    /// Status line changed
    Status(String),
    /// Speech is currently being detected
    Speaking(bool),
    /// An assistant answer arrived
    Answer(String),
    /// Conversation and answer were cleared
    Cleared,
}

/// Requests flowing from the surface into the pipeline
#[derive(Debug, Clone, Copy)]
pub enum AssistCommand {
    /// Summarize the recent conversation
    RequestHelp,
    /// Drop the conversation log and the last answer
    Clear,
    /// Record a short clip and show its transcription
    MicTest,
    /// Flip the transcription language between en and hi
    ToggleLanguage,
    /// Pause or resume listening
    ToggleListening,
}

/// Coordinates the continuous listening pipeline: capture, speech detection,
/// transcription, and on-demand help generation.
///
/// All mutable session state (the listening flags, the pending-help guard,
/// the conversation log) lives here rather than in globals.
pub struct MeetingAssistant {
    config: AppConfig,
    model_path: PathBuf,

    running: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
    help_in_flight: Arc<AtomicBool>,

    transcriber: Arc<Mutex<Option<Transcriber>>>,
    language: Arc<RwLock<String>>,
    ollama: Arc<OllamaClient>,
    log: Arc<Mutex<ConversationLog>>,

    audio_capture: AudioCapture,

    event_tx: mpsc::UnboundedSender<AssistEvent>,
    command_tx: mpsc::UnboundedSender<AssistCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<AssistCommand>>,

    tx: mpsc::Sender<Vec<f32>>,
    rx: Option<mpsc::Receiver<Vec<f32>>>,
    segment_tx: mpsc::Sender<SpeechSegment>,
    segment_rx: Option<mpsc::Receiver<SpeechSegment>>,
    transcript_tx: broadcast::Sender<String>,

    task_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl MeetingAssistant {
    /// Creates the assistant and the event stream its surface will drain
    pub fn new(
        config: AppConfig,
        model_path: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<AssistEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(400);
        let (segment_tx, segment_rx) = mpsc::channel(400);
        let (transcript_tx, _) = broadcast::channel(100);

        let assistant = Self {
            language: Arc::new(RwLock::new(config.general.language.clone())),
            ollama: Arc::new(OllamaClient::new(config.generation.clone())),
            log: Arc::new(Mutex::new(ConversationLog::new(
                config.conversation.max_utterances,
            ))),
            config,
            model_path,
            running: Arc::new(AtomicBool::new(true)),
            recording: Arc::new(AtomicBool::new(true)),
            help_in_flight: Arc::new(AtomicBool::new(false)),
            transcriber: Arc::new(Mutex::new(None)),
            audio_capture: AudioCapture::new(),
            event_tx,
            command_tx,
            command_rx: Some(command_rx),
            tx,
            rx: Some(rx),
            segment_tx,
            segment_rx: Some(segment_rx),
            transcript_tx,
            task_handles: Vec::new(),
        };

        (assistant, event_rx)
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn recording(&self) -> Arc<AtomicBool> {
        self.recording.clone()
    }

    pub fn command_sender(&self) -> mpsc::UnboundedSender<AssistCommand> {
        self.command_tx.clone()
    }

    /// Starts the pipeline tasks. Returns once capture is live.
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::Relaxed);
        self.recording.store(true, Ordering::Relaxed);

        let capture_rate = self.audio_capture.start(
            self.tx.clone(),
            self.running.clone(),
            self.recording.clone(),
        )?;
        println!("Capturing at {} Hz", capture_rate);

        self.spawn_model_loader();
        self.spawn_preflight();

        let detector = Arc::new(Mutex::new(SpeechDetector::new(DetectorParams::from_config(
            &self.config.detector,
            self.config.general.buffer_size,
            capture_rate as usize,
        ))));

        let (speaking_tx, speaking_rx) = watch::channel(false);

        let audio_processor = AudioProcessor::new(
            self.running.clone(),
            self.recording.clone(),
            detector,
            self.segment_tx.clone(),
            speaking_tx,
        );

        let transcription_processor = TranscriptionProcessor::new(
            self.transcriber.clone(),
            self.language.clone(),
            self.running.clone(),
            self.config.general.sample_rate,
        );

        let (rx, segment_rx, command_rx) = match (
            self.rx.take(),
            self.segment_rx.take(),
            self.command_rx.take(),
        ) {
            (Some(rx), Some(segment_rx), Some(command_rx)) => (rx, segment_rx, command_rx),
            _ => return Err(anyhow::anyhow!("Assistant pipeline already started")),
        };

        self.task_handles.push(audio_processor.start(rx));
        self.task_handles
            .push(transcription_processor.start(segment_rx, self.transcript_tx.clone()));
        self.spawn_transcript_consumer();
        self.spawn_speaking_forwarder(speaking_rx);
        self.spawn_command_processor(command_rx);

        let _ = self
            .event_tx
            .send(AssistEvent::Status(STATUS_LISTENING.to_string()));
        Ok(())
    }

    /// Loads the Whisper model off the hot path; transcription starts
    /// flowing once it lands
    fn spawn_model_loader(&mut self) {
        let transcriber = self.transcriber.clone();
        let whisper_config = self.config.whisper.clone();
        let model_path = self.model_path.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let _ = event_tx.send(AssistEvent::Status(
                "Loading transcription model...".to_string(),
            ));

            let load = tokio::task::spawn_blocking(move || {
                Transcriber::new(&model_path, &whisper_config)
            })
            .await;

            match load {
                Ok(Ok(t)) => {
                    *transcriber.lock() = Some(t);
                    let _ = event_tx.send(AssistEvent::Status(STATUS_LISTENING.to_string()));
                }
                Ok(Err(e)) => {
                    let _ = event_tx.send(AssistEvent::Status(format!(
                        "Failed to load transcription model: {}",
                        e
                    )));
                }
                Err(e) => {
                    let _ = event_tx.send(AssistEvent::Status(format!(
                        "Model loader panicked: {:?}",
                        e
                    )));
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Generation-server check; a failure is reported and listening continues
    fn spawn_preflight(&mut self) {
        let ollama = self.ollama.clone();
        let event_tx = self.event_tx.clone();
        let model = self.config.generation.model.clone();

        let handle = tokio::spawn(async move {
            match ollama.check_connection().await {
                Ok(true) => {
                    println!("Generation server ready (model '{}')", model);
                }
                Ok(false) => {
                    let msg = format!(
                        "Generation server is up but model '{}' was not found. Run: ollama pull {}",
                        model, model
                    );
                    eprintln!("{}", msg);
                    let _ = event_tx.send(AssistEvent::Status(msg));
                }
                Err(e) => {
                    let msg = format!("{}. Help requests will fail until it is running.", e);
                    eprintln!("{}", msg);
                    let _ = event_tx.send(AssistEvent::Status(msg));
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Labels transcripts with alternating speakers and appends them to the
    /// rolling log
    fn spawn_transcript_consumer(&mut self) {
        let mut transcript_rx = self.transcript_tx.subscribe();
        let running = self.running.clone();
        let log = self.log.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut speakers = SpeakerCycle::new();

            loop {
                tokio::select! {
                    received = transcript_rx.recv() => {
                        match received {
                            Ok(text) => {
                                let utterance = Utterance::new(speakers.next(), text);
                                log.lock().push(utterance.clone());
                                let _ = event_tx.send(AssistEvent::Utterance(utterance));
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                eprintln!("Transcript consumer lagged, skipped {}", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    fn spawn_speaking_forwarder(&mut self, mut speaking_rx: watch::Receiver<bool>) {
        let running = self.running.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                tokio::select! {
                    changed = speaking_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let speaking = *speaking_rx.borrow_and_update();
                        let _ = event_tx.send(AssistEvent::Speaking(speaking));
                    }
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
            }
        });
        self.task_handles.push(handle);
    }

    fn spawn_command_processor(&mut self, mut command_rx: mpsc::UnboundedReceiver<AssistCommand>) {
        let running = self.running.clone();
        let recording = self.recording.clone();
        let help_in_flight = self.help_in_flight.clone();
        let log = self.log.clone();
        let ollama = self.ollama.clone();
        let transcriber = self.transcriber.clone();
        let language = self.language.clone();
        let event_tx = self.event_tx.clone();
        let context_utterances = self.config.conversation.context_utterances;
        let mic_test_secs = self.config.assist.mic_test_secs;
        let model_sample_rate = self.config.general.sample_rate;

        let handle = tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    cmd = command_rx.recv() => {
                        match cmd {
                            Some(cmd) => cmd,
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        continue;
                    }
                };

                match command {
                    AssistCommand::RequestHelp => {
                        if help_in_flight.swap(true, Ordering::SeqCst) {
                            continue;
                        }

                        let prompt = {
                            let log = log.lock();
                            if log.is_empty() {
                                None
                            } else {
                                Some(meeting_help_prompt(&log.recent(context_utterances)))
                            }
                        };

                        let Some(prompt) = prompt else {
                            let _ = event_tx
                                .send(AssistEvent::Answer(NO_CONTEXT_NOTICE.to_string()));
                            help_in_flight.store(false, Ordering::SeqCst);
                            continue;
                        };

                        let _ = event_tx
                            .send(AssistEvent::Status(STATUS_CONSULTING.to_string()));

                        let ollama = ollama.clone();
                        let event_tx = event_tx.clone();
                        let help_in_flight = help_in_flight.clone();
                        let recording = recording.clone();
                        tokio::spawn(async move {
                            let answer = match ollama.generate(&prompt).await {
                                Ok(text) if text.is_empty() => {
                                    "Sorry, couldn't generate a helpful response.".to_string()
                                }
                                Ok(text) => text,
                                Err(e) => format!("Error connecting to AI: {}", e),
                            };
                            let _ = event_tx.send(AssistEvent::Answer(answer));
                            let status = if recording.load(Ordering::Relaxed) {
                                STATUS_LISTENING
                            } else {
                                STATUS_PAUSED
                            };
                            let _ = event_tx.send(AssistEvent::Status(status.to_string()));
                            help_in_flight.store(false, Ordering::SeqCst);
                        });
                    }
                    AssistCommand::Clear => {
                        log.lock().clear();
                        let _ = event_tx.send(AssistEvent::Cleared);
                    }
                    AssistCommand::MicTest => {
                        let _ = event_tx.send(AssistEvent::Status(STATUS_TESTING.to_string()));

                        let transcriber = transcriber.clone();
                        let lang = language.read().clone();
                        let event_tx = event_tx.clone();
                        let recording = recording.clone();
                        tokio::spawn(async move {
                            let result = tokio::task::spawn_blocking(move || {
                                let clip = audio_capture::record_clip(mic_test_secs)?;
                                let peak = clip
                                    .samples
                                    .iter()
                                    .fold(0.0f32, |acc, s| acc.max(s.abs()));
                                if peak < 0.003 {
                                    return Ok::<Option<String>, anyhow::Error>(None);
                                }

                                let clip = pcm::to_rate(clip, model_sample_rate as u32)?;
                                let guard = transcriber.lock();
                                let text = match guard.as_ref() {
                                    Some(t) => t
                                        .transcribe(&clip.samples, &lang)
                                        .map_err(anyhow::Error::from)?,
                                    None => String::new(),
                                };
                                Ok(Some(text))
                            })
                            .await;

                            match result {
                                Ok(Ok(Some(text))) if !text.is_empty() => {
                                    let _ = event_tx.send(AssistEvent::Utterance(
                                        Utterance::new("Test", format!("Transcription: {}", text)),
                                    ));
                                }
                                Ok(Ok(Some(_))) => {
                                    let _ = event_tx.send(AssistEvent::Utterance(Utterance::new(
                                        "Test",
                                        "Audio captured but no speech detected",
                                    )));
                                }
                                Ok(Ok(None)) => {
                                    let _ = event_tx.send(AssistEvent::Status(
                                        "No audio detected, check the microphone".to_string(),
                                    ));
                                }
                                Ok(Err(e)) => {
                                    let _ = event_tx.send(AssistEvent::Status(format!(
                                        "Audio test failed: {}",
                                        e
                                    )));
                                }
                                Err(e) => {
                                    let _ = event_tx.send(AssistEvent::Status(format!(
                                        "Audio test worker panicked: {:?}",
                                        e
                                    )));
                                }
                            }

                            let status = if recording.load(Ordering::Relaxed) {
                                STATUS_LISTENING
                            } else {
                                STATUS_PAUSED
                            };
                            let _ = event_tx.send(AssistEvent::Status(status.to_string()));
                        });
                    }
                    AssistCommand::ToggleLanguage => {
                        let new_lang = {
                            let mut lang = language.write();
                            *lang = if *lang == "en" {
                                "hi".to_string()
                            } else {
                                "en".to_string()
                            };
                            lang.clone()
                        };
                        let _ = event_tx.send(AssistEvent::Status(format!(
                            "Transcription language: {}",
                            new_lang
                        )));
                    }
                    AssistCommand::ToggleListening => {
                        let was_recording = recording.load(Ordering::Relaxed);
                        recording.store(!was_recording, Ordering::Relaxed);
                        let status = if was_recording {
                            STATUS_PAUSED
                        } else {
                            STATUS_LISTENING
                        };
                        let _ = event_tx.send(AssistEvent::Status(status.to_string()));
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Stops the pipeline and waits for the workers to exit
    pub async fn shutdown(&mut self) {
        println!("Shutting down assistant...");
        self.running.store(false, Ordering::Relaxed);
        self.recording.store(false, Ordering::Relaxed);

        self.audio_capture.join();

        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                eprintln!("Pipeline task panicked: {:?}", e);
            }
        }

        *self.transcriber.lock() = None;
        println!("Assistant stopped.");
    }
}
