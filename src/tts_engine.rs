//! Speech synthesis.
//!
//! The default engine is the operating system's synthesiser through the
//! [`tts`] crate (Speech Dispatcher, SAPI, AVFoundation). Setting
//! `VOICE_ENGINE=espeak` pipes text into `espeak-ng` with the Brazilian
//! Portuguese voice instead, which is often the only Portuguese voice on a
//! bare Linux install.

use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tts::Tts;

use crate::config::Config;

/// espeak-ng words per minute at rate 1.0.
const ESPEAK_BASE_WPM: f32 = 175.0;

enum Engine {
    System(Tts),
    Espeak {
        voice: String,
        wpm: u32,
        child: Option<Child>,
    },
}

pub struct TtsEngine {
    engine: Engine,
}

impl TtsEngine {
    pub fn new(config: &Config) -> Result<Self> {
        let engine = if config.voice_engine == "espeak" {
            Engine::Espeak {
                voice: config.voice_name.clone().unwrap_or_else(|| "pt-br".to_string()),
                wpm: (ESPEAK_BASE_WPM * config.voice_rate).round().max(80.0) as u32,
                child: None,
            }
        } else {
            let mut tts = Tts::default().context("failed to initialise text-to-speech engine")?;
            if let Err(e) = tts.set_rate(tts.normal_rate() * config.voice_rate) {
                log::debug!("Speech rate not supported: {e:?}");
            }
            Engine::System(tts)
        };
        let system = matches!(engine, Engine::System(_));
        let mut this = Self { engine };
        if let (true, Some(name)) = (system, &config.voice_name) {
            match this.set_voice_by_name(name) {
                Ok(()) => log::info!("Using voice: {name}"),
                Err(e) => log::warn!("Failed to set voice '{name}': {e}. Falling back to default."),
            }
        }
        Ok(this)
    }

    /// Pick the first voice whose name contains `name`, case-insensitively.
    pub fn set_voice_by_name(&mut self, name: &str) -> Result<()> {
        let Engine::System(tts) = &mut self.engine else {
            return Ok(());
        };
        let target = name.to_lowercase();
        let voice = tts
            .voices()
            .context("failed to enumerate voices")?
            .into_iter()
            .find(|v| v.name().to_lowercase().contains(&target))
            .ok_or_else(|| anyhow!("no voice matching '{name}' found"))?;
        tts.set_voice(&voice).context("failed to set TTS voice")?;
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        match &mut self.engine {
            Engine::System(tts) => {
                tts.stop().map_err(|e| anyhow!("failed to stop TTS: {e:?}"))?;
            }
            Engine::Espeak { child, .. } => {
                if let Some(mut c) = child.take() {
                    let _ = c.kill().await;
                }
            }
        }
        Ok(())
    }

    /// Speak `text`, interrupting anything still playing. Resolves when the
    /// utterance has been handed over (system) or finished (espeak).
    pub async fn speak(&mut self, text: &str) -> Result<()> {
        match &mut self.engine {
            Engine::System(tts) => {
                let text = text.to_owned();
                let mut tts = tts.clone();
                tokio::task::spawn_blocking(move || {
                    let _ = tts.stop();
                    tts.speak(&text, true)
                        .map(|_| ())
                        .map_err(|e| anyhow!("TTS speak failed: {e:?}"))
                })
                .await
                .context("failed to join blocking TTS task")??;
            }
            Engine::Espeak { voice, wpm, child } => {
                if let Some(mut previous) = child.take() {
                    let _ = previous.kill().await;
                }
                let mut spawned = Command::new("espeak-ng")
                    .args(["-v", voice.as_str(), "-s", &wpm.to_string()])
                    .stdin(Stdio::piped())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .context("failed to spawn espeak-ng")?;
                if let Some(mut stdin) = spawned.stdin.take() {
                    stdin
                        .write_all(text.as_bytes())
                        .await
                        .context("failed to write to espeak-ng")?;
                    stdin.shutdown().await.ok();
                }
                let finished = child.insert(spawned).wait().await;
                *child = None;
                finished.context("espeak-ng failed")?;
            }
        }
        Ok(())
    }
}
