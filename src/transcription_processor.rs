use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::pcm;
use crate::speech_detector::SpeechSegment;
use crate::transcriber::{is_meaningful, Transcriber};

/// Handles the processing of audio segments for transcription.
///
/// Segments arrive from the speech detector, are resampled to the model rate
/// when the capture rate differs, and run through the model on a blocking
/// worker. Meaningful transcripts are broadcast to subscribers.
pub struct TranscriptionProcessor {
    transcriber: Arc<Mutex<Option<Transcriber>>>,
    language: Arc<RwLock<String>>,
    running: Arc<AtomicBool>,
    model_sample_rate: usize,
}

impl TranscriptionProcessor {
    pub fn new(
        transcriber: Arc<Mutex<Option<Transcriber>>>,
        language: Arc<RwLock<String>>,
        running: Arc<AtomicBool>,
        model_sample_rate: usize,
    ) -> Self {
        Self {
            transcriber,
            language,
            running,
            model_sample_rate,
        }
    }

    /// Transcribe one segment, resampling to the model rate if needed
    fn transcribe_segment(
        transcriber: &Arc<Mutex<Option<Transcriber>>>,
        segment: &SpeechSegment,
        language: &str,
        model_sample_rate: usize,
    ) -> String {
        let samples = if segment.sample_rate != model_sample_rate {
            match pcm::resample(
                &segment.samples,
                segment.sample_rate as u32,
                model_sample_rate as u32,
            ) {
                Ok(resampled) => resampled,
                Err(e) => {
                    eprintln!("Failed to resample segment: {}", e);
                    return String::new();
                }
            }
        } else {
            segment.samples.clone()
        };

        let transcriber_lock = transcriber.lock();
        let Some(transcriber_ref) = transcriber_lock.as_ref() else {
            eprintln!("Transcription model still loading, dropping segment");
            return String::new();
        };

        match transcriber_ref.transcribe(&samples, language) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Transcription error: {}", e);
                String::new()
            }
        }
    }

    pub fn start(
        &self,
        mut segment_rx: mpsc::Receiver<SpeechSegment>,
        transcript_tx: broadcast::Sender<String>,
    ) -> tokio::task::JoinHandle<()> {
        let transcriber = self.transcriber.clone();
        let language = self.language.clone();
        let running = self.running.clone();
        let model_sample_rate = self.model_sample_rate;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_segment = segment_rx.recv() => {
                        let Some(segment) = maybe_segment else {
                            break;
                        };

                        let transcriber = transcriber.clone();
                        let language = language.read().clone();
                        let tx = transcript_tx.clone();

                        let join = tokio::task::spawn_blocking(move || {
                            Self::transcribe_segment(
                                &transcriber,
                                &segment,
                                &language,
                                model_sample_rate,
                            )
                        });

                        match join.await {
                            Ok(text) => {
                                if is_meaningful(&text) {
                                    if let Err(e) = tx.send(text) {
                                        eprintln!("Failed to send transcription: {}", e);
                                    }
                                }
                            }
                            Err(e) => {
                                eprintln!("Transcription worker panicked: {:?}", e);
                            }
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
        })
    }
}
