//! Microphone front-end: wake word, conversation mode, spoken replies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::Config;
use crate::jarvis_io::{JarvisIO, Status};
use crate::listening::{Heard, Listener, SLEEP_REPLY, WAKE_REPLY};
use crate::llm::clean_for_speech;
use crate::speech::{SpeechRecognizer, Transcriber};
use crate::tts_engine::TtsEngine;
use crate::worker::AgentHandle;

/// Speak `text`, stopping early when `jarvis.status` reads `canceled`.
async fn speak(tts: &mut TtsEngine, io: &JarvisIO, text: &str) {
    let text = clean_for_speech(text);
    if text.is_empty() {
        return;
    }
    io.write_spoken(&text);
    io.write_status(Status::Speaking);

    let mut canceled = false;
    {
        let speaking = tts.speak(&text);
        tokio::pin!(speaking);
        let mut cancel_check = tokio::time::interval(Duration::from_millis(200));
        loop {
            tokio::select! {
                res = &mut speaking => {
                    if let Err(e) = res {
                        log::warn!("Speech failed: {e:#}");
                    }
                    break;
                }
                _ = cancel_check.tick() => {
                    if io.is_canceled() {
                        canceled = true;
                        break;
                    }
                }
            }
        }
    }
    if canceled {
        log::info!("Speech canceled");
        tts.stop().await.ok();
        io.cancel_tts();
        sleep(Duration::from_millis(500)).await;
    }
}

async fn handle_command(
    handle: &AgentHandle,
    announcements: &mut mpsc::Receiver<String>,
    tts: &mut TtsEngine,
    io: &JarvisIO,
    command: &str,
) -> Result<bool> {
    log::info!("User command: {command}");
    io.write_heard(command);
    io.write_status(Status::Processing);

    let ask = handle.ask(command);
    tokio::pin!(ask);
    let outcome = loop {
        tokio::select! {
            outcome = &mut ask => break outcome?,
            Some(message) = announcements.recv() => speak(tts, io, &message).await,
        }
    };
    if let Some(detail) = &outcome.detail {
        println!("{detail}");
    }
    speak(tts, io, &outcome.text).await;
    Ok(outcome.shutdown)
}

/// Run until shutdown. Recognition blocks a worker thread per capture.
pub async fn run(
    config: &Config,
    transcriber: Arc<Transcriber>,
    handle: AgentHandle,
    mut announcements: mpsc::Receiver<String>,
    io: JarvisIO,
) -> Result<()> {
    let recogniser = SpeechRecognizer::new(config, transcriber)?;
    let mut tts = TtsEngine::new(config)?;
    let mut listener = Listener::new(&config.trigger_word, config.conversation_timeout);

    io.write_status(Status::Idle);
    log::info!("Jarvis initialised. Waiting for wake word '{}'.", config.trigger_word);

    while !handle.is_shut_down() {
        while let Ok(message) = announcements.try_recv() {
            speak(&mut tts, &io, &message).await;
        }

        let window = listener.window();
        let heard = match tokio::task::block_in_place(|| recogniser.listen_for_phrase(window)) {
            Ok(transcript) => {
                log::debug!("Recognised: {transcript}");
                listener.hear(&transcript)
            }
            Err(e) => {
                log::warn!("Speech recognition error: {e:#}");
                listener.failed_at(Instant::now())
            }
        };

        match heard {
            Heard::Nothing => {}
            Heard::Wake(rest) => {
                log::info!("Wake word detected");
                speak(&mut tts, &io, WAKE_REPLY).await;
                io.write_status(Status::Listening);
                if !rest.is_empty()
                    && handle_command(&handle, &mut announcements, &mut tts, &io, &rest).await?
                {
                    break;
                }
                io.write_status(Status::Listening);
            }
            Heard::Sleep => {
                speak(&mut tts, &io, SLEEP_REPLY).await;
                io.write_status(Status::Idle);
            }
            Heard::TimedOut => {
                log::info!("Conversation timeout. Returning to idle mode.");
                io.write_status(Status::Idle);
            }
            Heard::Command(command) => {
                if handle_command(&handle, &mut announcements, &mut tts, &io, &command).await? {
                    break;
                }
                io.write_status(Status::Listening);
            }
        }
    }
    io.write_status(Status::Idle);
    Ok(())
}
