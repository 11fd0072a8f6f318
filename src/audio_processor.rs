use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

use crate::speech_detector::{SpeechDetector, SpeechSegment};

/// Drives the speech detector from the capture channel.
///
/// Closed segments are forwarded for transcription; the speaking flag is
/// published through a watch channel for the UI.
pub struct AudioProcessor {
    running: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
    detector: Arc<Mutex<SpeechDetector>>,
    segment_tx: mpsc::Sender<SpeechSegment>,
    speaking_tx: watch::Sender<bool>,
}

impl AudioProcessor {
    pub fn new(
        running: Arc<AtomicBool>,
        recording: Arc<AtomicBool>,
        detector: Arc<Mutex<SpeechDetector>>,
        segment_tx: mpsc::Sender<SpeechSegment>,
        speaking_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            running,
            recording,
            detector,
            segment_tx,
            speaking_tx,
        }
    }

    /// Starts audio processing
    pub fn start(&self, mut rx: mpsc::Receiver<Vec<f32>>) -> tokio::task::JoinHandle<()> {
        let running = self.running.clone();
        let recording = self.recording.clone();
        let detector = self.detector.clone();
        let segment_tx = self.segment_tx.clone();
        let speaking_tx = self.speaking_tx.clone();

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                if !recording.load(Ordering::Relaxed) {
                    let _ = speaking_tx.send(false);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }

                match tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
                    Ok(Some(samples)) => {
                        let (segments, is_speaking) = {
                            let mut det = detector.lock();
                            let segments = det.process_audio(&samples);
                            (segments, det.is_speaking())
                        };

                        let _ = speaking_tx.send(is_speaking);

                        for segment in segments {
                            if let Err(e) = segment_tx.try_send(segment) {
                                eprintln!("Failed to send audio segment: {}", e);
                            }
                        }
                    }
                    Ok(None) => {
                        println!("Audio channel disconnected");
                        break;
                    }
                    Err(_) => {
                        // Timeout, check the flags again
                        continue;
                    }
                }
            }
        })
    }
}
