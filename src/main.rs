//! Entry point for the `jarvis` binary.
//!
//! Loads `.env`, builds the agent and hands it to a worker task, then runs
//! the selected front-end (microphone or console) on the main task. The
//! Telegram bridge runs alongside when `TELEGRAM_TOKEN` is set. Ctrl-C or
//! the shutdown protocol stops everything.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;

use jarvis_assistant::agent::Agent;
use jarvis_assistant::config::{Config, InputMode};
use jarvis_assistant::console;
use jarvis_assistant::desktop::{Desktop, SystemDesktop};
use jarvis_assistant::jarvis_io::{JarvisIO, Status};
use jarvis_assistant::llm::{build_model, build_vision_model};
use jarvis_assistant::memory::MemoryStore;
use jarvis_assistant::telegram::TelegramBridge;
use jarvis_assistant::worker::{self, Announcer};

/// Conversations older than this are dropped at startup.
const MEMORY_RETENTION_DAYS: u32 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    for problem in config.validate() {
        log::warn!("{problem}");
    }

    let io = match JarvisIO::new() {
        Ok(io) => {
            io.set_pid();
            io.write_status(Status::Idle);
            Some(io)
        }
        Err(e) => {
            log::warn!("Status files disabled: {e:#}");
            None
        }
    };

    let memory = match MemoryStore::open(&config.memory_db) {
        Ok(memory) => {
            match memory.cleanup_old_data(MEMORY_RETENTION_DAYS) {
                Ok(0) => {}
                Ok(n) => log::info!("Removed {n} old memory rows"),
                Err(e) => log::warn!("Memory cleanup failed: {e}"),
            }
            Some(memory)
        }
        Err(e) => {
            log::error!("Memory store unavailable ({}): {e}", config.memory_db.display());
            None
        }
    };

    let model = build_model(&config);
    match &model {
        Some(m) => log::info!("Language model: {}", m.name()),
        None => log::warn!("No language model configured; only local commands will work"),
    }

    let desktop: Arc<dyn Desktop> = Arc::new(SystemDesktop::new());
    let (announcer, announcements) = Announcer::channel(32);
    let mut agent = Agent::new(config.clone(), desktop.clone())
        .with_model(model)
        .with_vision_model(build_vision_model(&config))
        .with_memory(memory)
        .with_announcer(announcer.clone());
    if let Some(io) = &io {
        agent = agent.with_status_files(io.clone());
    }
    log::info!("Session {}", agent.session_id());
    let (handle, worker_task) = worker::spawn(agent, 16);

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        let mut stopped = ctrl_c.shutdown_signal();
        tokio::select! {
            res = signal::ctrl_c() => match res {
                Ok(()) => {
                    log::info!("Received Ctrl-C, shutting down");
                    ctrl_c.request_shutdown();
                }
                Err(e) => log::error!("Failed to listen for Ctrl-C: {e}"),
            },
            _ = stopped.changed() => {}
        }
    });

    #[cfg(feature = "voice")]
    let transcriber = config.vosk_model_path.as_deref().and_then(|path| {
        match jarvis_assistant::speech::Transcriber::new(path) {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                log::error!("Speech recognition unavailable: {e:#}");
                None
            }
        }
    });

    let telegram = config.telegram_token.as_deref().map(|token| {
        let bridge = TelegramBridge::new(
            token,
            handle.clone(),
            desktop.clone(),
            &config.workspace,
            announcer.clone(),
            config.enable_system_actions,
        );
        #[cfg(feature = "voice")]
        let bridge = match &transcriber {
            Some(t) => bridge.with_transcriber(t.clone()),
            None => bridge,
        };
        tokio::spawn(bridge.run(handle.shutdown_signal()))
    });

    let front_end = match config.input_mode {
        #[cfg(feature = "voice")]
        InputMode::Voice => match (&io, &transcriber) {
            (Some(io), Some(t)) => {
                jarvis_assistant::voice::run(&config, t.clone(), handle.clone(), announcements, io.clone())
                    .await
            }
            _ => {
                log::warn!("Voice mode needs ~/.jarvis and a Vosk model; using the console");
                console::run(handle.clone(), announcements, io.clone()).await
            }
        },
        _ => console::run(handle.clone(), announcements, io.clone()).await,
    };
    if let Err(e) = &front_end {
        log::error!("Front-end stopped: {e:#}");
    }

    handle.request_shutdown();
    if let Some(task) = telegram {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            log::warn!("Telegram bridge did not stop in time");
        }
    }
    drop(handle);
    if tokio::time::timeout(Duration::from_secs(5), worker_task).await.is_err() {
        log::warn!("Agent worker did not stop in time");
    }

    if let Some(io) = &io {
        io.write_status(Status::Idle);
        io.clear_pid();
    }
    log::info!("Jarvis encerrado.");
    front_end
}
