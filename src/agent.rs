//! The command pipeline shared by every front-end.
//!
//! A command first feeds the fact extractor, then goes through the routing
//! table. Routed intents run locally; everything else becomes a persona
//! prompt for the language model, enriched with the memory store and the
//! last few exchanges of this session. A screenshot rides along when the
//! user asks Jarvis to look at the screen.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use serde_json::json;
use tokio::time::timeout;

use crate::actions::{Actions, Outcome, SessionState};
use crate::config::Config;
use crate::desktop::Desktop;
use crate::jarvis_io::JarvisIO;
use crate::llm::{strip_think_block, LanguageModel};
use crate::memory::MemoryStore;
use crate::persona;
use crate::router::{self, RouteContext};
use crate::vision;
use crate::worker::Announcer;

/// Exchanges kept in the prompt's short-term history.
const HISTORY_LEN: usize = 5;

const NO_MODEL: &str = "IA não disponível. Configure a API key.";
const EMPTY_ANSWER: &str = "Não consegui gerar uma resposta, mestre.";
const MODEL_FAILURE: &str = "Desculpe, tive um problema ao processar seu pedido.";

/// Owns everything a command may touch. Lives on the worker task.
pub struct Agent {
    config: Config,
    model: Option<Arc<dyn LanguageModel>>,
    vision_model: Option<Arc<dyn LanguageModel>>,
    desktop: Arc<dyn Desktop>,
    memory: Option<MemoryStore>,
    session_id: String,
    history: VecDeque<(String, String)>,
    state: SessionState,
    announcer: Announcer,
    io: Option<JarvisIO>,
}

impl Agent {
    pub fn new(config: Config, desktop: Arc<dyn Desktop>) -> Self {
        let state = SessionState::new(&config.workspace);
        Self {
            config,
            model: None,
            vision_model: None,
            desktop,
            memory: None,
            session_id: Local::now().format("session_%Y%m%d_%H%M%S").to_string(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            state,
            announcer: Announcer::silent(),
            io: None,
        }
    }

    pub fn with_model(mut self, model: Option<Arc<dyn LanguageModel>>) -> Self {
        self.model = model;
        self
    }

    /// Model used for screenshots; the chat model is used when unset.
    pub fn with_vision_model(mut self, model: Option<Arc<dyn LanguageModel>>) -> Self {
        self.vision_model = model;
        self
    }

    pub fn with_memory(mut self, memory: Option<MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_announcer(mut self, announcer: Announcer) -> Self {
        self.announcer = announcer;
        self
    }

    /// Write the model's reasoning blocks to `~/.jarvis/jarvis.think`.
    pub fn with_status_files(mut self, io: JarvisIO) -> Self {
        self.io = Some(io);
        self
    }

    /// Skip the pauses that wait for windows to appear.
    pub fn without_delays(mut self) -> Self {
        self.state.no_delays = true;
        self
    }

    /// Run the cleanup protocol against `temp_dir` only, without touching
    /// other processes.
    pub fn with_cleanup_sandbox(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.state.cleanup_sandbox = Some(temp_dir.into());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn memory(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    /// Run one command through the pipeline. Never fails: problems come
    /// back as a sentence for the user.
    pub async fn handle(&mut self, command: &str) -> Outcome {
        let command = command.trim();
        log::info!("Command: {command}");

        if let Some(memory) = &self.memory {
            match memory.auto_extract_and_store(command) {
                Ok(facts) if !facts.is_empty() => log::info!("Learned {} new fact(s)", facts.len()),
                Ok(_) => {}
                Err(e) => log::warn!("Fact extraction failed: {e}"),
            }
        }

        let ctx = RouteContext {
            pending_code: self.state.pending_code.is_some(),
            roll: rand::random::<f64>(),
        };
        if let Some(intent) = router::route(command, &ctx) {
            log::debug!("Routed to {intent:?}");
            let mut actions = Actions {
                config: &self.config,
                desktop: self.desktop.as_ref(),
                model: self.model.as_ref(),
                vision_model: self.vision_model.as_ref(),
                memory: self.memory.as_ref(),
                announcer: &self.announcer,
                state: &mut self.state,
            };
            let outcome = actions.execute(intent).await;
            self.store_exchange(command, &outcome.text, None);
            return outcome;
        }

        let Some(model) = self.model.clone() else {
            return Outcome::say(NO_MODEL);
        };
        match self.ask_model(model.as_ref(), command).await {
            Ok(text) => Outcome::say(text),
            Err(e) => {
                log::error!("Model request failed: {e:#}");
                Outcome::say(MODEL_FAILURE)
            }
        }
    }

    async fn ask_model(&mut self, model: &dyn LanguageModel, command: &str) -> Result<String> {
        let visual = vision::is_visual_question(command);
        let screenshot = if visual {
            match vision::capture_png(self.desktop.as_ref()) {
                Ok(png) => Some(png),
                Err(e) => {
                    log::error!("Screenshot for visual question failed: {e:#}");
                    return Ok(format!("Não consegui capturar a tela: {e}"));
                }
            }
        } else {
            None
        };

        let memory_context = match &self.memory {
            Some(memory) => memory
                .context_for_prompt(Some(self.session_id.as_str()))
                .unwrap_or_else(|e| {
                    log::warn!("Memory context unavailable: {e}");
                    String::new()
                }),
            None => String::new(),
        };
        let prompt = persona::assistant_prompt(&memory_context, &self.history_text(), command);
        log::debug!("LLM prompt: {prompt}");

        let request = async {
            match &screenshot {
                Some(png) => model.generate_with_image(&prompt, png).await,
                None => model.generate(&prompt).await,
            }
        };
        let raw = timeout(self.config.llm_timeout, request)
            .await
            .map_err(|_| anyhow!("no answer from {} in {:?}", model.name(), self.config.llm_timeout))?
            .with_context(|| format!("{} request failed", model.name()))?;
        log::debug!("Raw LLM response: {raw}");

        let (answer, think) = strip_think_block(&raw);
        if let (Some(io), Some(think)) = (&self.io, think) {
            io.write_think(&think);
        }
        if answer.trim().is_empty() {
            return Ok(EMPTY_ANSWER.to_string());
        }

        let reply = persona::post_process(command, &answer);
        self.remember(command, &reply);
        let context = json!({
            "memory_used": !memory_context.is_empty(),
            "session_id": self.session_id,
            "visual_command": visual,
        });
        self.store_exchange(command, &reply, Some(&context));
        Ok(reply)
    }

    fn remember(&mut self, command: &str, reply: &str) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back((command.to_string(), reply.to_string()));
    }

    fn history_text(&self) -> String {
        if self.history.is_empty() {
            return "Início da conversa.".to_string();
        }
        self.history
            .iter()
            .map(|(user, jarvis)| format!("Usuário: {user}\nJarvis: {jarvis}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn store_exchange(&self, command: &str, reply: &str, context: Option<&serde_json::Value>) {
        let Some(memory) = &self.memory else { return };
        if let Err(e) = memory.store_conversation(&self.session_id, command, reply, context) {
            log::warn!("Exchange not stored: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::RecordingDesktop;
    use crate::llm::ScriptedModel;

    fn agent(answers: &[&str]) -> (Agent, Arc<ScriptedModel>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_lookup(|_| None);
        config.workspace = dir.path().to_path_buf();
        let model = Arc::new(ScriptedModel::new(answers.iter().copied()));
        let agent = Agent::new(config, Arc::new(RecordingDesktop::new()))
            .with_model(Some(model.clone() as Arc<dyn LanguageModel>))
            .with_memory(Some(MemoryStore::in_memory().unwrap()))
            .without_delays();
        (agent, model, dir)
    }

    #[test]
    fn session_id_has_timestamp() {
        let (agent, _, _dir) = agent(&[]);
        assert!(agent.session_id().starts_with("session_"));
        assert_eq!(agent.session_id().len(), "session_20240101_120000".len());
    }

    #[tokio::test]
    async fn free_question_goes_to_model() {
        let (mut agent, model, _dir) = agent(&["<think>hmm</think>Rust é uma linguagem de sistemas."]);
        let outcome = agent.handle("o que é rust?").await;
        assert_eq!(outcome.text, "Rust é uma linguagem de sistemas.");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].0.contains("Comando do usuário: o que é rust?"));
        assert!(!prompts[0].1);
        assert_eq!(agent.memory().unwrap().stats().unwrap().total_conversations, 1);
    }

    #[tokio::test]
    async fn history_is_capped() {
        let answers: Vec<String> = (0..7).map(|i| format!("resposta {i}")).collect();
        let answers: Vec<&str> = answers.iter().map(String::as_str).collect();
        let (mut agent, model, _dir) = agent(&answers);
        for i in 0..7 {
            agent.handle(&format!("pergunta {i}")).await;
        }
        assert_eq!(agent.history.len(), HISTORY_LEN);
        let last_prompt = &model.prompts()[6].0;
        assert!(!last_prompt.contains("Usuário: pergunta 0\n"));
        assert!(last_prompt.contains("Usuário: pergunta 5\nJarvis: resposta 5"));
    }

    #[tokio::test]
    async fn routed_commands_skip_the_model() {
        let (mut agent, model, _dir) = agent(&[]);
        let outcome = agent.handle("que horas são").await;
        assert!(outcome.text.starts_with("São exatamente"));
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn facts_are_learned_before_routing() {
        let (mut agent, _, _dir) = agent(&["Prazer, Ana."]);
        agent.handle("meu nome é Ana").await;
        let facts = agent.memory().unwrap().search("ana", None, 5).unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn missing_model_and_empty_answer() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_lookup(|_| None);
        config.workspace = dir.path().to_path_buf();
        let mut bare = Agent::new(config, Arc::new(RecordingDesktop::new()));
        assert_eq!(bare.handle("conte uma piada").await.text, NO_MODEL);

        let (mut agent, _, _dir) = agent(&["<think>nada</think>"]);
        assert_eq!(agent.handle("conte uma piada").await.text, EMPTY_ANSWER);
        // The script is exhausted now, so the model errors out.
        assert_eq!(agent.handle("conte outra").await.text, MODEL_FAILURE);
    }

    #[tokio::test]
    async fn visual_question_sends_screenshot() {
        let (mut agent, model, _dir) = agent(&["Vejo um editor aberto."]);
        let outcome = agent.handle("olhe a minha tela e diga o que vê").await;
        assert_eq!(outcome.text, "Vejo um editor aberto.");
        assert!(model.prompts()[0].1);
    }

    #[tokio::test]
    async fn visual_question_without_screen() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_lookup(|_| None);
        config.workspace = dir.path().to_path_buf();
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(["não usado"]));
        let mut agent = Agent::new(config, Arc::new(RecordingDesktop::without_screen()))
            .with_model(Some(model));
        let outcome = agent.handle("veja isso aqui").await;
        assert!(outcome.text.starts_with("Não consegui capturar a tela:"));
    }
}
