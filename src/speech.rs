//! Offline speech recognition with [`vosk`], fed by [`cpal`].
//!
//! [`Transcriber`] owns the loaded model and turns mono `i16` samples into
//! text; it is shared with the Telegram bridge for voice notes.
//! [`SpeechRecognizer`] adds a microphone and records short phrases,
//! stopping early once the speaker goes quiet.
//!
//! The microphone is picked by `MIC_INDEX` (position in the device list),
//! then by `MIC_NAME_KEYWORD` (case-insensitive name match), then the
//! host's default input device.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use vosk::{Model, Recognizer};

use crate::config::Config;

/// Amplitude above which a chunk counts as speech.
const SILENCE_THRESHOLD: i16 = 500;
/// Quiet time after speech that ends a capture.
const SILENCE_TIMEOUT: Duration = Duration::from_millis(800);
const MIN_CAPTURE: Duration = Duration::from_millis(1000);

/// A loaded Vosk model.
pub struct Transcriber {
    model: Model,
}

impl Transcriber {
    pub fn new(model_path: &str) -> Result<Self> {
        let model = Model::new(model_path)
            .ok_or_else(|| anyhow!("failed to load Vosk model from '{model_path}'"))?;
        Ok(Self { model })
    }

    /// Recognise mono 16-bit samples recorded at `sample_rate`.
    pub fn transcribe(&self, samples: &[i16], sample_rate: f32) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }
        let mut recogniser = Recognizer::new(&self.model, sample_rate)
            .ok_or_else(|| anyhow!("failed to create Vosk recogniser"))?;
        recogniser.set_words(false);
        recogniser.set_max_alternatives(0);
        recogniser
            .accept_waveform(samples)
            .map_err(|e| anyhow!("Vosk rejected the audio: {e:?}"))?;
        Ok(recogniser
            .final_result()
            .single()
            .map(|single| single.text.to_string())
            .unwrap_or_default())
    }
}

pub struct SpeechRecognizer {
    transcriber: Arc<Transcriber>,
    device: cpal::Device,
}

impl SpeechRecognizer {
    pub fn new(config: &Config, transcriber: Arc<Transcriber>) -> Result<Self> {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .context("failed to enumerate input audio devices")?
            .collect();

        let by_index = config.mic_index.and_then(|i| devices.get(i).cloned());
        let by_name = || {
            let keyword = config.mic_name_keyword.as_ref()?.to_lowercase();
            devices
                .iter()
                .find(|d| d.name().map_or(false, |n| n.to_lowercase().contains(&keyword)))
                .cloned()
        };
        let device = by_index
            .or_else(by_name)
            .or_else(|| host.default_input_device())
            .ok_or_else(|| anyhow!("no input audio device found"))?;
        if let Ok(name) = device.name() {
            log::info!("Using microphone: {name}");
        }

        Ok(Self {
            transcriber,
            device,
        })
    }

    /// Record up to `duration` and return the transcript, empty when nothing
    /// was said. Blocks the calling thread.
    pub fn listen_for_phrase(&self, duration: Duration) -> Result<String> {
        let config = self
            .device
            .default_input_config()
            .context("failed to get default input configuration")?;
        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let (tx, rx) = mpsc::channel::<Vec<i16>>();
        let err_fn = |err| log::error!("Input audio stream error: {err}");

        // Interleaved frames; keep the first channel of each.
        let stream = match config.sample_format() {
            SampleFormat::I16 => self.device.build_input_stream(
                &config.into(),
                move |data: &[i16], _| {
                    let _ = tx.send(data.chunks(channels).map(|f| f[0]).collect());
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &config.into(),
                move |data: &[u16], _| {
                    let _ = tx.send(data.chunks(channels).map(|f| (f[0] as i32 - 32768) as i16).collect());
                },
                err_fn,
                None,
            )?,
            SampleFormat::F32 => self.device.build_input_stream(
                &config.into(),
                move |data: &[f32], _| {
                    let _ = tx.send(
                        data.chunks(channels)
                            .map(|f| (f[0] * 32768.0).clamp(-32768.0, 32767.0) as i16)
                            .collect(),
                    );
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };
        stream.play().context("failed to start audio input stream")?;

        let start = Instant::now();
        let mut samples: Vec<i16> = Vec::new();
        let mut last_speech = Instant::now();
        let mut speech_started = false;
        while start.elapsed() < duration {
            let remaining = duration.saturating_sub(start.elapsed());
            match rx.recv_timeout(remaining) {
                Ok(chunk) => {
                    samples.extend_from_slice(&chunk);
                    if chunk.iter().any(|s| s.wrapping_abs() > SILENCE_THRESHOLD) {
                        speech_started = true;
                        last_speech = Instant::now();
                    }
                    if speech_started
                        && start.elapsed() > MIN_CAPTURE
                        && last_speech.elapsed() > SILENCE_TIMEOUT
                    {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        drop(stream);

        self.transcriber.transcribe(&samples, sample_rate)
    }
}
