use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::pcm::PcmAudio;

/// Preferred capture rate; the device may not support it, in which case the
/// pipeline resamples
const TARGET_SAMPLE_RATE: u32 = 16000;

/// Manages microphone capture on a dedicated thread.
///
/// The audio stream is not movable across threads, so the stream lives on a
/// worker thread for its whole life. Capture blocks are forwarded as mono
/// f32 samples over a bounded channel; the `recording` flag gates forwarding
/// and the `running` flag ends the worker.
pub struct AudioCapture {
    worker: Option<thread::JoinHandle<()>>,
    samples_sent: Arc<AtomicUsize>,
    dropped_blocks: Arc<AtomicUsize>,
    capture_rate: Option<u32>,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self {
            worker: None,
            samples_sent: Arc::new(AtomicUsize::new(0)),
            dropped_blocks: Arc::new(AtomicUsize::new(0)),
            capture_rate: None,
        }
    }

    /// Starts audio capture.
    ///
    /// Returns the actual capture sample rate, which may differ from 16 kHz
    /// when the input device does not support it.
    pub fn start(
        &mut self,
        tx: mpsc::Sender<Vec<f32>>,
        running: Arc<AtomicBool>,
        recording: Arc<AtomicBool>,
    ) -> Result<u32> {
        if self.worker.is_some() {
            return self
                .capture_rate
                .ok_or_else(|| anyhow!("Capture already started but rate unknown"));
        }

        let samples_sent = self.samples_sent.clone();
        let dropped_blocks = self.dropped_blocks.clone();
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<u32>>();

        let handle = thread::spawn(move || {
            let setup = || -> Result<(cpal::Stream, u32)> {
                let device = default_input_device()?;
                let supported = pick_input_config(&device)?;
                let rate = supported.config().sample_rate.0;

                let recording = recording.clone();
                let on_block: Box<dyn FnMut(Vec<f32>) + Send> = Box::new(move |mono| {
                    if !recording.load(Ordering::Relaxed) {
                        return;
                    }
                    match tx.try_send(mono) {
                        Ok(_) => {
                            samples_sent.fetch_add(1, Ordering::Release);
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            let total = dropped_blocks.fetch_add(1, Ordering::Relaxed) + 1;
                            eprintln!("Audio channel full, dropped block (total: {})", total);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            eprintln!("Failed to send samples: channel closed");
                        }
                    }
                });

                let stream = build_input_stream(&device, &supported, on_block)?;
                stream.play().context("Failed to start audio stream")?;
                Ok((stream, rate))
            };

            match setup() {
                Ok((stream, rate)) => {
                    let _ = init_tx.send(Ok(rate));
                    // Keep the stream alive until shutdown
                    while running.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(100));
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                }
            }
        });

        let rate = init_rx
            .recv_timeout(Duration::from_secs(5))
            .context("Audio capture thread did not report readiness")??;

        self.worker = Some(handle);
        self.capture_rate = Some(rate);
        Ok(rate)
    }

    /// Number of sample blocks forwarded so far
    pub fn samples_sent(&self) -> usize {
        self.samples_sent.load(Ordering::Acquire)
    }

    /// Number of sample blocks dropped because the channel was full
    pub fn dropped_blocks(&self) -> usize {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    /// Actual capture sample rate, once started
    pub fn capture_rate(&self) -> Option<u32> {
        self.capture_rate
    }

    /// Waits for the capture worker to exit. The caller is expected to have
    /// cleared the `running` flag first.
    pub fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                eprintln!("Audio capture thread panicked");
            }
        }
    }
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Record a fixed-length clip from the default microphone.
///
/// Blocks for `seconds` plus device startup time. Used by the one-shot
/// question flow and the microphone test.
pub fn record_clip(seconds: f32) -> Result<PcmAudio> {
    let device = default_input_device()?;
    let supported = pick_input_config(&device)?;
    let rate = supported.config().sample_rate.0;

    let collected = Arc::new(Mutex::new(Vec::<f32>::with_capacity(
        (seconds * rate as f32) as usize,
    )));
    let sink = collected.clone();

    let on_block: Box<dyn FnMut(Vec<f32>) + Send> = Box::new(move |mono| {
        sink.lock().extend_from_slice(&mono);
    });

    let stream = build_input_stream(&device, &supported, on_block)?;
    stream.play().context("Failed to start audio stream")?;
    thread::sleep(Duration::from_secs_f32(seconds));
    drop(stream);

    let samples = std::mem::take(&mut *collected.lock());
    Ok(PcmAudio {
        samples,
        sample_rate: rate,
    })
}

fn default_input_device() -> Result<Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| anyhow!("No default input device found"))
}

/// Prefer a configuration that can run at 16 kHz directly; otherwise fall
/// back to the device default and let the pipeline resample
fn pick_input_config(device: &Device) -> Result<SupportedStreamConfig> {
    if let Ok(ranges) = device.supported_input_configs() {
        let mut candidates: Vec<_> = ranges
            .filter(|r| {
                r.min_sample_rate().0 <= TARGET_SAMPLE_RATE
                    && TARGET_SAMPLE_RATE <= r.max_sample_rate().0
            })
            .collect();
        // Fewer channels means less downmix work
        candidates.sort_by_key(|r| r.channels());
        if let Some(range) = candidates.into_iter().next() {
            return Ok(range.with_sample_rate(SampleRate(TARGET_SAMPLE_RATE)));
        }
    }

    device
        .default_input_config()
        .context("Failed to get default input configuration")
}

/// Build an input stream that forwards mono f32 blocks to `on_block`
fn build_input_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    on_block: Box<dyn FnMut(Vec<f32>) + Send>,
) -> Result<cpal::Stream> {
    let config: StreamConfig = supported.config();
    match supported.sample_format() {
        SampleFormat::F32 => build_typed_stream::<f32>(device, &config, on_block),
        SampleFormat::I16 => build_typed_stream::<i16>(device, &config, on_block),
        SampleFormat::U16 => build_typed_stream::<u16>(device, &config, on_block),
        other => Err(anyhow!("Unsupported input sample format: {:?}", other)),
    }
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut on_block: Box<dyn FnMut(Vec<f32>) + Send>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = if channels <= 1 {
                    data.iter()
                        .map(|&s| {
                            let v: f32 = cpal::Sample::from_sample(s);
                            v
                        })
                        .collect()
                } else {
                    data.chunks(channels)
                        .map(|frame| {
                            frame
                                .iter()
                                .map(|&s| {
                                    let v: f32 = cpal::Sample::from_sample(s);
                                    v
                                })
                                .sum::<f32>()
                                / channels as f32
                        })
                        .collect()
                };
                on_block(mono);
            },
            |err| {
                eprintln!("Audio stream error: {}", err);
            },
            None,
        )
        .context("Failed to open input stream")?;

    Ok(stream)
}
