//! Telegram bridge.
//!
//! The first chat that talks to the bot becomes its only authorised chat;
//! the binding is kept in `<workspace>/telegram_auth.json`. Text messages
//! go through the same agent as the local front-ends, and every reply is
//! also announced locally so the person at the desk hears what the phone
//! asked for.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::utils::command::BotCommands;
use tokio::sync::watch;

use crate::desktop::Desktop;
use crate::vision;
use crate::worker::{AgentHandle, Announcer};

pub const AUTH_FILE: &str = "telegram_auth.json";

const UNAUTHORISED: &str = "⚠️ Acesso não autorizado.";
const SYSTEM_ACTIONS_DISABLED: &str = "Ações do sistema estão desativadas, mestre.";
const COMMAND_LIST: &str = "Comandos disponíveis:\n\
/start - Inicializa o bot\n\
/print - Captura tela do PC\n\
/status - Status do sistema\n\
\nEnvie comandos de texto ou áudio para controlar o Jarvis!";

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Comandos do Jarvis:")]
pub enum Command {
    #[command(description = "inicializa o bot")]
    Start,
    #[command(description = "captura a tela do PC")]
    Print,
    #[command(description = "status do sistema")]
    Status,
}

#[derive(Serialize, Deserialize)]
struct AuthRecord {
    chat_id: i64,
    authorized_at: String,
}

/// How a chat relates to the bound chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    /// This chat was just bound.
    Bound,
    Denied,
}

/// Single-chat authorisation persisted to disk.
pub struct ChatAuth {
    path: PathBuf,
    chat_id: Mutex<Option<i64>>,
}

impl ChatAuth {
    pub fn load(workspace: &Path) -> Self {
        let path = workspace.join(AUTH_FILE);
        let chat_id = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<AuthRecord>(&text).ok())
            .map(|record| record.chat_id);
        if let Some(id) = chat_id {
            log::info!("Authorised Telegram chat loaded: {id}");
        }
        Self {
            path,
            chat_id: Mutex::new(chat_id),
        }
    }

    pub fn authorised_chat(&self) -> Option<i64> {
        self.chat_id.lock().ok().and_then(|id| *id)
    }

    pub fn check(&self, chat_id: i64) -> Access {
        let Ok(mut bound) = self.chat_id.lock() else {
            return Access::Denied;
        };
        match *bound {
            Some(id) if id == chat_id => Access::Owner,
            Some(_) => Access::Denied,
            None => {
                let record = AuthRecord {
                    chat_id,
                    authorized_at: Local::now().to_rfc3339(),
                };
                match serde_json::to_string_pretty(&record)
                    .map_err(anyhow::Error::from)
                    .and_then(|json| std::fs::write(&self.path, json).map_err(Into::into))
                {
                    Ok(()) => log::info!("Telegram chat {chat_id} authorised"),
                    Err(e) => log::error!("Could not persist Telegram authorisation: {e}"),
                }
                *bound = Some(chat_id);
                Access::Bound
            }
        }
    }
}

pub fn status_text(auth: &ChatAuth, chat_id: i64, voice_notes: bool) -> String {
    let bound = auth
        .authorised_chat()
        .map_or_else(|| "nenhum".to_string(), |id| id.to_string());
    format!(
        "🤖 Status Jarvis Mobile Bridge\n\n\
📅 Data/Hora: {}\n\
🔐 Chat Autorizado: {bound}\n\
📱 Seu Chat ID: {chat_id}\n\
🎤 Transcrição de Áudio: {}\n\
📸 Captura de Tela: ✅ Ativa\n\
🤖 Jarvis Conectado: Sim\n\n{COMMAND_LIST}",
        Local::now().format("%d/%m/%Y %H:%M:%S"),
        if voice_notes { "✅ Ativa" } else { "❌ Indisponível" },
    )
}

struct BridgeState {
    handle: AgentHandle,
    desktop: Arc<dyn Desktop>,
    auth: ChatAuth,
    announcer: Announcer,
    /// `ENABLE_SYSTEM_ACTIONS`; screenshots count as a desktop action.
    system_actions: bool,
    #[cfg(feature = "voice")]
    transcriber: Option<Arc<crate::speech::Transcriber>>,
}

impl BridgeState {
    fn voice_notes(&self) -> bool {
        #[cfg(feature = "voice")]
        {
            self.transcriber.is_some()
        }
        #[cfg(not(feature = "voice"))]
        {
            false
        }
    }
}

pub struct TelegramBridge {
    bot: Bot,
    state: Arc<BridgeState>,
}

impl TelegramBridge {
    pub fn new(
        token: &str,
        handle: AgentHandle,
        desktop: Arc<dyn Desktop>,
        workspace: &Path,
        announcer: Announcer,
        system_actions: bool,
    ) -> Self {
        let state = BridgeState {
            handle,
            desktop,
            auth: ChatAuth::load(workspace),
            announcer,
            system_actions,
            #[cfg(feature = "voice")]
            transcriber: None,
        };
        Self {
            bot: Bot::new(token),
            state: Arc::new(state),
        }
    }

    /// Enable voice notes with an already loaded model.
    #[cfg(feature = "voice")]
    pub fn with_transcriber(mut self, transcriber: Arc<crate::speech::Transcriber>) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.transcriber = Some(transcriber);
        }
        self
    }

    /// Serve updates until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!("Starting Telegram bridge...");
        let handler = Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(on_command),
            )
            .branch(dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(on_voice))
            .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(on_text));

        let mut dispatcher = Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.state])
            .default_handler(|_| async {})
            .build();

        let token = dispatcher.shutdown_token();
        tokio::spawn(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            if let Ok(stopping) = token.shutdown() {
                stopping.await;
            }
        });

        dispatcher.dispatch().await;
        log::info!("Telegram bridge stopped");
    }
}

/// Returns false (after telling the user) when the chat may not talk to Jarvis.
async fn authorised(bot: &Bot, msg: &Message, state: &BridgeState) -> Result<bool> {
    if state.auth.check(msg.chat.id.0) == Access::Denied {
        log::warn!("Rejected Telegram chat {}", msg.chat.id);
        bot.send_message(msg.chat.id, UNAUTHORISED).await?;
        return Ok(false);
    }
    Ok(true)
}

async fn on_command(bot: Bot, msg: Message, cmd: Command, state: Arc<BridgeState>) -> Result<()> {
    let chat = msg.chat.id;
    match cmd {
        Command::Start => match state.auth.check(chat.0) {
            Access::Denied => {
                bot.send_message(
                    chat,
                    "⚠️ Acesso não autorizado. Este bot está vinculado a apenas um usuário.",
                )
                .await?;
            }
            Access::Bound => {
                bot.send_message(
                    chat,
                    format!(
                        "🔐 Dispositivo autorizado com sucesso!\n\n\
Você agora é o único usuário autorizado a controlar o Jarvis remotamente.\n\n{COMMAND_LIST}"
                    ),
                )
                .await?;
            }
            Access::Owner => {
                bot.send_message(chat, format!("🤖 Jarvis Mobile Bridge ativado!\n\n{COMMAND_LIST}"))
                    .await?;
            }
        },
        Command::Print => {
            if !authorised(&bot, &msg, &state).await? {
                return Ok(());
            }
            if state.system_actions {
                bot.send_message(chat, "📸 Capturando tela do PC...").await?;
            }
            match screen_for_print(&state).await {
                Ok(png) => {
                    let caption = format!("📸 Screenshot capturado em {}", Local::now().format("%H:%M:%S"));
                    bot.send_photo(chat, InputFile::memory(png).file_name("screenshot.png"))
                        .caption(caption)
                        .await?;
                }
                Err(reply) => {
                    bot.send_message(chat, reply).await?;
                }
            }
        }
        Command::Status => {
            if !authorised(&bot, &msg, &state).await? {
                return Ok(());
            }
            bot.send_message(chat, status_text(&state.auth, chat.0, state.voice_notes()))
                .await?;
        }
    }
    Ok(())
}

/// PNG for `/print`, or the reply to send instead.
async fn screen_for_print(state: &BridgeState) -> std::result::Result<Vec<u8>, String> {
    if !state.system_actions {
        return Err(SYSTEM_ACTIONS_DISABLED.to_string());
    }
    let desktop = state.desktop.clone();
    match tokio::task::spawn_blocking(move || vision::capture_png(desktop.as_ref())).await {
        Ok(Ok(png)) => Ok(png),
        Ok(Err(e)) => Err(format!("Erro ao capturar tela: {e}")),
        Err(e) => Err(format!("Erro ao capturar tela: {e}")),
    }
}

async fn forward(bot: &Bot, chat: ChatId, state: &BridgeState, command: &str) -> Result<()> {
    log::info!("📱 Telegram command: {command}");
    match state.handle.ask(command).await {
        Ok(outcome) => {
            state.announcer.announce(format!("📱 {}", outcome.text));
            bot.send_message(chat, format!("🤖 Jarvis: {}", outcome.text)).await?;
            if let Some(detail) = outcome.detail {
                for part in split_message(&detail) {
                    bot.send_message(chat, part).await?;
                }
            }
        }
        Err(e) => {
            bot.send_message(chat, format!("Erro ao processar comando: {e}")).await?;
        }
    }
    Ok(())
}

async fn on_text(bot: Bot, msg: Message, state: Arc<BridgeState>) -> Result<()> {
    if !authorised(&bot, &msg, &state).await? {
        return Ok(());
    }
    let Some(text) = msg.text() else { return Ok(()) };
    bot.send_message(msg.chat.id, "🔄 Processando comando...").await?;
    forward(&bot, msg.chat.id, &state, text).await
}

async fn on_voice(bot: Bot, msg: Message, state: Arc<BridgeState>) -> Result<()> {
    if !authorised(&bot, &msg, &state).await? {
        return Ok(());
    }
    #[cfg(feature = "voice")]
    if let (Some(transcriber), Some(voice)) = (state.transcriber.clone(), msg.voice()) {
        bot.send_message(msg.chat.id, "🎤 Processando áudio...").await?;
        match transcribe_voice_note(&bot, voice, transcriber).await {
            Ok(text) if !text.trim().is_empty() => {
                bot.send_message(msg.chat.id, format!("📝 Transcrição: '{text}'")).await?;
                return forward(&bot, msg.chat.id, &state, &text).await;
            }
            Ok(_) => {
                bot.send_message(msg.chat.id, "Não foi possível transcrever o áudio.").await?;
            }
            Err(e) => {
                log::error!("Voice note failed: {e:#}");
                bot.send_message(msg.chat.id, format!("Erro ao processar áudio: {e}")).await?;
            }
        }
        return Ok(());
    }
    bot.send_message(
        msg.chat.id,
        "🎤 Transcrição de áudio indisponível. Envie o comando em texto, mestre.",
    )
    .await?;
    Ok(())
}

/// Download the note, decode it to 16 kHz mono PCM with ffmpeg and run Vosk.
#[cfg(feature = "voice")]
async fn transcribe_voice_note(
    bot: &Bot,
    voice: &teloxide::types::Voice,
    transcriber: Arc<crate::speech::Transcriber>,
) -> Result<String> {
    use anyhow::Context;
    use teloxide::net::Download;

    let dir = tempfile_dir()?;
    let ogg = dir.join(format!("voice_{}.ogg", Local::now().format("%Y%m%d_%H%M%S_%3f")));
    let file = bot.get_file(voice.file.id.clone()).await?;
    {
        let mut dst = tokio::fs::File::create(&ogg)
            .await
            .with_context(|| format!("failed to create {}", ogg.display()))?;
        bot.download_file(&file.path, &mut dst).await?;
    }

    let output = tokio::process::Command::new("ffmpeg")
        .args(["-loglevel", "error", "-y", "-i"])
        .arg(&ogg)
        .args(["-ar", "16000", "-ac", "1", "-f", "s16le", "-"])
        .output()
        .await
        .context("failed to run ffmpeg");
    let _ = tokio::fs::remove_file(&ogg).await;
    let output = output?;
    if !output.status.success() {
        anyhow::bail!(
            "ffmpeg failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let samples: Vec<i16> = output
        .stdout
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    tokio::task::spawn_blocking(move || transcriber.transcribe(&samples, 16_000.0))
        .await
        .context("transcription task panicked")?
}

#[cfg(feature = "voice")]
fn tempfile_dir() -> Result<PathBuf> {
    use anyhow::Context;

    let dir = std::env::temp_dir().join("jarvis_telegram");
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Telegram rejects messages over 4096 characters.
pub fn split_message(text: &str) -> Vec<String> {
    const LIMIT: usize = 4000;
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(LIMIT)
        .map(|chunk| chunk.iter().collect())
        .filter(|s: &String| !s.trim().is_empty())
        .collect()
}
