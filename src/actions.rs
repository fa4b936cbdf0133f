//! Executors for routed intents.
//!
//! Every executor returns an [`Outcome`]. Failures never escape as errors:
//! they become a Portuguese sentence for the user and a log line for us.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, Timelike};

use crate::apps::{self, App};
use crate::cleanup::Cleanup;
use crate::codegen::{self, clean_code, ProjectGenerator, ProjectRequest};
use crate::config::Config;
use crate::debugger::{self, Debugger};
use crate::desktop::{Desktop, Key};
use crate::llm::{strip_think_block, LanguageModel};
use crate::memory::MemoryStore;
use crate::persona::{self, EasterEgg};
use crate::router::{contains_word, CleanupKind, Intent, ListTarget};
use crate::tips::TipsBook;
use crate::vision;
use crate::worker::Announcer;

const SYSTEM_ACTIONS_DISABLED: &str = "Ações do sistema estão desativadas, mestre.";
const STUDY_PLAYLIST: &str =
    "https://www.youtube.com/watch?v=5qap5aO4i9A&list=PLofht4PTVXV3xJ-6o9QeYjF51i1cMq9h";
const GAMER_APPS: [(&str, &str); 3] = [("Discord", "discord"), ("Opera GX", "opera gx"), ("Steam", "steam")];
const MONTHS: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

const STUDY_TIPS: &str = "# Dicas do Dia - Estudo e Produtividade

## 📚 Dicas de Estudo

### 🎯 Foco e Concentração
- Use a técnica Pomodoro: 25min estudo + 5min pausa
- Elimine distrações: silencie notificações
- Ambiente organizado = mente organizada

### 🧠 Técnicas de Aprendizagem
- **Repetição espaçada**: revise em 1 dia, 3 dias, 1 semana
- **Mapas mentais**: conecte ideias visualmente
- **Ensine o que aprendeu**: solidifica o conhecimento

### 💻 Programação Eficiente
- **Code Review**: revise seu próprio código
- **Documente enquanto programa**: anote decisões importantes
- **Pequenos commits**: mudanças incrementais

---
*Gerado por J.A.R.V.I.S. - Seu assistente de estudos*
";

const STUDY_SUMMARY: &str = "📚 MODO ESTUDO ATIVADO COM SUCESSO!

✅ Windsurf aberto para desenvolvimento
🎵 Música ambiente iniciada (Study Focus)
📝 Arquivo dicas_do_dia.md aberto para revisão
🔊 Volume ajustado para concentração

💡 Dicas para melhor estudo:
• Use fones de ouvido para melhor foco
• Faça pausas a cada 50 minutos
• Mantenha-se hidratado
• Anote dúvidas para resolver depois

Bons estudos, mestre! J.A.R.V.I.S. está aqui para ajudar.";

/// What a handled command produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Short reply, spoken or sent back.
    pub text: String,
    /// Long text for the screen (analyses, listings of code).
    pub detail: Option<String>,
    /// The shutdown protocol ran; front-ends should stop.
    pub shutdown: bool,
}

impl Outcome {
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Code produced by generate-and-paste, waiting for a "salvar".
#[derive(Debug, Clone)]
pub struct PendingCode {
    pub code: String,
    pub task: String,
}

/// State that outlives a single command.
pub struct SessionState {
    pub workspace: PathBuf,
    pub pending_code: Option<PendingCode>,
    pub commands: u32,
    pub projects: ProjectGenerator,
    /// Skip the pauses that give windows time to appear.
    pub no_delays: bool,
    /// Confine the cleanup protocol to this directory instead of the system
    /// temp dir, and leave processes alone.
    pub cleanup_sandbox: Option<PathBuf>,
}

impl SessionState {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            pending_code: None,
            commands: 0,
            projects: ProjectGenerator::new(workspace),
            no_delays: false,
            cleanup_sandbox: None,
        }
    }
}

/// Borrowed view of the agent for one command.
pub struct Actions<'a> {
    pub config: &'a Config,
    pub desktop: &'a dyn Desktop,
    pub model: Option<&'a Arc<dyn LanguageModel>>,
    pub vision_model: Option<&'a Arc<dyn LanguageModel>>,
    pub memory: Option<&'a MemoryStore>,
    pub announcer: &'a Announcer,
    pub state: &'a mut SessionState,
}

/// Intents that move windows, keys or processes.
fn drives_desktop(intent: &Intent) -> bool {
    matches!(
        intent,
        Intent::StudyMode
            | Intent::GamerOn
            | Intent::GamerOff
            | Intent::GitCommit(_)
            | Intent::AnalyzeScreen
            | Intent::GenerateCode(_)
            | Intent::OpenAndType(_)
            | Intent::OpenApp(_)
            | Intent::CloseApp(_)
            | Intent::TypeText(_)
            | Intent::Paste
            | Intent::Lock
            | Intent::EasterEgg(EasterEgg::Party)
            // Kills processes and ends the program.
            | Intent::Cleanup(CleanupKind::Full)
    )
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Actions<'_> {
    async fn pause(&self, millis: u64) {
        if !self.state.no_delays {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn vision(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.vision_model.or(self.model)
    }

    pub async fn execute(&mut self, intent: Intent) -> Outcome {
        // Checked once here so no executor can forget it.
        if drives_desktop(&intent) && !self.config.enable_system_actions {
            log::info!("Refusing {intent:?}: system actions disabled");
            return Outcome::say(SYSTEM_ACTIONS_DISABLED);
        }
        match intent {
            Intent::Menu => Outcome::say(persona::menu()),
            Intent::StudyMode => self.study_mode().await,
            Intent::Debugger => self.assisted_debugger().await,
            Intent::RecallTip(term) => self.recall_tip(&term),
            Intent::SaveTip(tip) => self.save_tip(&tip),
            Intent::GamerOn => self.gamer_on().await,
            Intent::GamerOff => self.gamer_off(),
            Intent::GitCommit(message) => self.git_commit(&message).await,
            Intent::AnalyzeScreen => self.analyze_screen().await,
            Intent::Project(request) => self.project(request).await,
            Intent::GenerateCode(command) => self.generate_and_paste(&command).await,
            Intent::ExplainClipboardError => self.explain_clipboard_error().await,
            Intent::SavePendingCode => self.save_pending_code(),
            Intent::Cleanup(kind) => self.cleanup(kind).await,
            Intent::EasterEgg(EasterEgg::Party) => self.party().await,
            Intent::EasterEgg(EasterEgg::Ultron) => Outcome::say(persona::ULTRON_LINE),
            Intent::SetPreference { key, value } => self.set_preference(&key, &value),
            Intent::KnownFacts => self.known_facts(),
            Intent::MemoryStats => self.memory_stats(),
            Intent::Time => Outcome::say(time_reply(Local::now())),
            Intent::Date => Outcome::say(date_reply(Local::now())),
            Intent::SetWorkspace(path) => self.set_workspace(&path),
            Intent::OpenAndType(command) => self.open_and_type(&command).await,
            Intent::OpenApp(target) => self.open_app(&target),
            Intent::CloseApp(target) => self.close_app(&target),
            Intent::TypeText(text) => self.type_text(&text).await,
            Intent::Paste => self.paste().await,
            Intent::ListFiles(target) => self.list_files(target),
            Intent::Lock => match self.desktop.lock_screen() {
                Ok(()) => Outcome::say("Sistema bloqueado, mestre."),
                Err(e) => {
                    log::error!("Lock failed: {e:#}");
                    Outcome::say("Não consegui bloquear o sistema, mestre.")
                }
            },
            Intent::RefuseShutdown => {
                Outcome::say("Comando de desligamento não permitido por segurança, mestre.")
            }
            Intent::RefuseRestart => {
                Outcome::say("Comando de reinicialização não permitido por segurança, mestre.")
            }
            Intent::Hint(text) => Outcome::say(text),
        }
    }

    // -----------------------------------------------------------------------
    // productivity

    async fn study_mode(&mut self) -> Outcome {
        log::info!("📚 Activating study mode");
        // The editor registers a URI scheme when installed; otherwise the
        // website at least shows where to get it.
        if let Err(e) = self.desktop.launch("windsurf://") {
            log::warn!("Windsurf scheme failed ({e:#}), trying the website");
            if let Err(e) = self.desktop.launch("https://windsurf.ai") {
                log::error!("Could not open Windsurf: {e:#}");
            }
        }
        self.pause(2000).await;

        if let Err(e) = self.desktop.launch(STUDY_PLAYLIST) {
            log::warn!("Playlist failed ({e:#}), trying Spotify");
            if let Err(e) = self.desktop.launch("spotify:") {
                log::error!("Could not start music: {e:#}");
            }
        }
        self.pause(3000).await;

        // Seeded once. Later edits by the user are kept.
        let tips = self.state.workspace.join("dicas_do_dia.md");
        if !tips.exists() {
            if let Err(e) = fs::write(&tips, STUDY_TIPS) {
                log::error!("Failed to create {}: {e}", tips.display());
            }
        }
        if let Err(e) = self.desktop.launch(&tips.to_string_lossy()) {
            log::error!("Failed to open {}: {e:#}", tips.display());
        }

        // Music sits under the voice replies.
        for _ in 0..2 {
            if let Err(e) = self.desktop.press(Key::VolumeDown) {
                log::warn!("Volume adjustment failed: {e:#}");
                break;
            }
        }
        Outcome::say(STUDY_SUMMARY)
    }

    fn tips(&self) -> TipsBook {
        TipsBook::new(&self.state.workspace)
    }

    fn recall_tip(&self, term: &str) -> Outcome {
        match self.tips().search(term) {
            Ok(reply) => Outcome::say(reply),
            Err(e) => {
                log::error!("Tip search failed: {e:#}");
                Outcome::say(format!("❌ Erro ao buscar na memória: {e}, mestre."))
            }
        }
    }

    fn save_tip(&self, tip: &str) -> Outcome {
        match self.tips().save_tip(tip) {
            Ok(()) => Outcome::say(format!(
                "💾 Dica salva na memória: '{}'. Use 'lembra daquela dica' para consultar depois, mestre!",
                codegen::truncate(tip, 50)
            )),
            Err(e) => {
                log::error!("Saving tip failed: {e:#}");
                Outcome::say(format!("❌ Erro ao salvar dica: {e}, mestre."))
            }
        }
    }

    async fn gamer_on(&mut self) -> Outcome {
        let mut opened = Vec::new();
        let mut failed = Vec::new();
        for (label, alias) in GAMER_APPS {
            let Some(app) = apps::find(alias) else { continue };
            match self.desktop.launch(app.target().launch) {
                Ok(()) => {
                    log::info!("✅ {label} opened");
                    opened.push(label);
                    // Staggered; three launchers starting at once stall each other.
                    self.pause(1000).await;
                }
                Err(e) => {
                    log::error!("Failed to open {label}: {e:#}");
                    failed.push(label);
                }
            }
        }
        if opened.is_empty() {
            return Outcome::say(
                "❌ Não consegui abrir nenhum aplicativo gamer. Verifique se eles estão instalados, mestre.",
            );
        }
        let mut message = format!("🎮 Modo Gamer ativado! Abertos: {}", opened.join(", "));
        if !failed.is_empty() {
            message.push_str(&format!(". Falhas: {}", failed.join(", ")));
        }
        message.push_str(". Prepare-se para a ação, mestre!");
        Outcome::say(message)
    }

    /// Only apps that were running and actually died are reported.
    fn gamer_off(&self) -> Outcome {
        let closed: Vec<&str> = GAMER_APPS
            .iter()
            .filter_map(|(label, alias)| {
                let process = apps::find(alias)?.target().process;
                (self.desktop.is_process_running(process) && self.desktop.kill_process(process))
                    .then_some(*label)
            })
            .collect();
        if closed.is_empty() {
            Outcome::say("ℹ️ Nenhum aplicativo gamer estava em execução, mestre.")
        } else {
            Outcome::say(format!(
                "🛑 Modo Gamer encerrado! Fechados: {}. Modo gamer desativado, mestre!",
                closed.join(", ")
            ))
        }
    }

    /// Types the commit into the editor's integrated terminal (Ctrl+J opens
    /// it in VS Code and its forks). Keystrokes go to whatever has focus.
    async fn git_commit(&self, message: &str) -> Outcome {
        let result: anyhow::Result<()> = async {
            self.desktop.hotkey(&[Key::Ctrl, Key::Char('j')])?;
            self.pause(1000).await;
            self.desktop.type_text("git add .")?;
            self.pause(500).await;
            self.desktop.press(Key::Enter)?;
            self.pause(1000).await;
            self.desktop.type_text(&format!("git commit -m \"{message}\""))?;
            self.pause(500).await;
            self.desktop.press(Key::Enter)?;
            Ok(())
        }
        .await;
        match result {
            Ok(()) => Outcome::say(format!(
                "✅ Comandos Git executados! Commit '{message}' criado com sucesso, mestre."
            )),
            Err(e) => {
                log::error!("Git keystrokes failed: {e:#}");
                Outcome::say(format!("❌ Erro ao executar comandos Git: {e}, mestre."))
            }
        }
    }

    // -----------------------------------------------------------------------
    // vision

    async fn analyze_screen(&self) -> Outcome {
        let Some(model) = self.vision() else {
            return Outcome::say("⚠️ IA não disponível para análise de tela, mestre.");
        };
        let png = match vision::capture_png(self.desktop) {
            Ok(png) => png,
            Err(e) => return Outcome::say(format!("❌ Erro ao capturar tela: {e}, mestre.")),
        };
        let analysis = match model.generate_with_image(vision::SCREEN_PROMPT, &png).await {
            Ok(answer) => strip_think_block(&answer).0,
            Err(e) => {
                log::error!("Screen analysis failed: {e}");
                return Outcome::say(format!("❌ Erro ao analisar com IA: {e}, mestre."));
            }
        };
        // A ready fix comes back as a fenced block next to "corrigido"; it is
        // pasted over the focused editor's contents.
        match vision::apply_fix(self.desktop, &analysis) {
            Ok(true) => log::info!("Automatic fix pasted into the editor"),
            Ok(false) => {}
            Err(e) => log::warn!("Automatic fix failed: {e:#}"),
        }
        Outcome::say("Análise de tela concluída! Verifique o terminal para detalhes, mestre.")
            .with_detail(vision::format_screen_analysis(&analysis))
    }

    async fn assisted_debugger(&self) -> Outcome {
        let Some(model) = self.vision() else {
            return Outcome::say("⚠️ IA não disponível para debugging assistido, mestre.");
        };
        let png = match vision::capture_png(self.desktop) {
            Ok(png) => png,
            Err(e) => return Outcome::say(format!("❌ Erro ao capturar tela: {e}, mestre.")),
        };
        let analysis = match model.generate_with_image(vision::DEBUGGER_PROMPT, &png).await {
            Ok(answer) => strip_think_block(&answer).0,
            Err(e) => {
                log::error!("Debugger analysis failed: {e}");
                return Outcome::say(format!("❌ Erro ao analisar com IA: {e}, mestre."));
            }
        };
        // Kept so "lembra daquela dica" can find it next time.
        if let Err(e) = self.tips().save_resolved_error(&analysis) {
            log::warn!("Could not store the analysis: {e:#}");
        }
        Outcome::say("Análise de erro concluída! Verifique o terminal para diagnóstico completo, mestre.")
            .with_detail(vision::format_debugger_analysis(&analysis))
    }

    async fn explain_clipboard_error(&self) -> Outcome {
        let error = match self.desktop.clipboard() {
            Ok(text) => text,
            Err(e) => {
                return Outcome::say(format!("❌ Erro ao ler área de transferência: {e}, mestre."))
            }
        };
        // Shorter than any real error message.
        if error.trim().chars().count() < 10 {
            return Outcome::say(
                "⚠️ Não encontrei um erro válido na área de transferência. Copie o erro primeiro, mestre.",
            );
        }
        let Some(model) = self.model else {
            return Outcome::say("⚠️ IA não disponível para análise de erro, mestre.");
        };
        let prompt = format!(
            "Analise este erro de programação e forneça uma explicação didática para um estudante:\n\n\
ERRO:\n```\n{error}\n```\n\n\
Forneça:\n\
1. O que significa este erro em termos simples\n\
2. Causas comuns que provocam este erro\n\
3. Como corrigir (com exemplos de código)\n\
4. Dicas para evitar no futuro\n\n\
Use linguagem clara e educativa, como se estivesse ensinando programação."
        );
        match model.generate(&prompt).await {
            Ok(answer) => {
                let explanation = strip_think_block(&answer).0;
                let rule = "=".repeat(50);
                Outcome::say(
                    "Análise do erro concluída! Verifique o terminal para a explicação detalhada, mestre.",
                )
                .with_detail(format!(
                    "🔍 ANÁLISE DE ERRO - J.A.R.V.I.S.\n\n{rule}\n\n{explanation}\n\n{rule}\n\n💡 Dica: Sempre leia as mensagens de erro com atenção!"
                ))
            }
            Err(e) => {
                log::error!("Error explanation failed: {e}");
                Outcome::say(format!("❌ Erro ao consultar a IA: {e}, mestre."))
            }
        }
    }

    // -----------------------------------------------------------------------
    // code

    async fn project(&mut self, request: ProjectRequest) -> Outcome {
        let Some(spec) = codegen::language(&request.language) else {
            return Outcome::say(format!(
                "Linguagem {} não suportada, mestre. Linguagens disponíveis: {}",
                request.language,
                codegen::language_names()
            ));
        };
        // Check the toolchain before spending a model call on code that
        // cannot run here.
        let tools_ok = tokio::task::spawn_blocking(move || codegen::tools_available(spec))
            .await
            .unwrap_or(false);
        if !tools_ok {
            return Outcome::say(format!(
                "Ferramentas para {} não encontradas, mestre. Instale o compilador/interpretador necessário.",
                spec.name.to_uppercase()
            ));
        }

        log::info!("💡 Generating {} code for: {}", spec.name, request.task);
        let code = codegen::generate_code(self.model.map(|m| &**m), spec, &request.task).await;
        let (path, name) = match self.state.projects.create(spec, &code, &request.task) {
            Ok(created) => created,
            Err(e) => {
                log::error!("Project creation failed: {e:#}");
                return Outcome::say(format!("Erro ao criar projeto: {e}, mestre."));
            }
        };
        log::info!("📁 Project created: {}", path.display());

        let debugger = Debugger::new(
            self.model.cloned(),
            self.config.debug_max_attempts,
            &self.state.workspace,
        );
        let session = debugger
            .run_session(&path, spec, &code, &request.task, self.announcer)
            .await;
        let detail = format!(
            "📁 Projeto: {}\n\n{}\n{}",
            path.display(),
            "=".repeat(60),
            session.final_code
        );
        Outcome::say(debugger::summary(&session, &name, spec)).with_detail(detail)
    }

    async fn generate_and_paste(&mut self, command: &str) -> Outcome {
        self.state.commands += 1;
        if self.state.commands > self.config.max_commands_per_session {
            return Outcome::say(
                "Limite de comandos atingido por segurança, mestre. Reinicie o Jarvis para continuar.",
            );
        }

        let lower = command.to_lowercase();
        let app = paste_target(&lower);
        let kind = code_kind(&lower);
        log::info!("🤖 Generating '{kind}' code for {}", app.display);

        let fallback = format!("# Código {kind}\nprint('Hello, World!')");
        let code = match self.model {
            Some(model) => {
                let prompt = format!(
                    "Gere um código {kind} simples e funcional.\nRetorne apenas o código, sem explicações ou comentários desnecessários."
                );
                match model.generate(&prompt).await {
                    Ok(answer) => {
                        let code = clean_code(&strip_think_block(&answer).0, &[]);
                        if code.trim().is_empty() {
                            fallback
                        } else {
                            code
                        }
                    }
                    Err(e) => {
                        log::warn!("Code generation failed, using fallback: {e}");
                        fallback
                    }
                }
            }
            None => fallback,
        };

        // Clipboard first: pasting is faster and safer than typing out
        // indentation-sensitive code key by key.
        if let Err(e) = self.desktop.set_clipboard(&code) {
            return Outcome::say(format!("Erro ao copiar código: {e}, mestre."));
        }
        let target = app.target();
        if let Err(e) = self.desktop.launch(target.launch) {
            return Outcome::say(format!("Erro ao abrir {}: {e}, mestre.", app.display));
        }
        self.pause(2500).await;
        // Only apps with a dependable process name are checked; anything else
        // is assumed to have come up.
        if app.checks_focus() && !self.desktop.is_process_running(target.process) {
            return Outcome::say(format!(
                "Não consegui verificar que {} está ativo, mestre.",
                app.display
            ));
        }
        if let Err(e) = self.desktop.hotkey(&[Key::Ctrl, Key::Char('v')]) {
            log::warn!("Paste failed ({e:#}), typing instead");
            if self.desktop.type_text(&code).is_err() {
                return Outcome::say("Não consegui colar o código, mestre.");
            }
        }

        self.state.pending_code = Some(PendingCode {
            code: code.clone(),
            task: kind.clone(),
        });
        Outcome::say(format!("Código {kind} gerado e colado no {}, mestre.", app.display))
            .with_detail(code)
    }

    fn save_pending_code(&mut self) -> Outcome {
        let Some(pending) = self.state.pending_code.take() else {
            return Outcome::say("Não há código para salvar, mestre.");
        };
        let filename = code_filename(&pending.task);
        let path = self.state.workspace.join(&filename);
        match fs::write(&path, &pending.code) {
            Ok(()) => {
                log::info!("💾 Code saved to {}", path.display());
                Outcome::say(format!("Código salvo com sucesso em '{filename}', mestre."))
            }
            Err(e) => {
                log::error!("Saving code failed: {e}");
                self.state.pending_code = Some(pending);
                Outcome::say(format!("Erro ao salvar código: {e}, mestre."))
            }
        }
    }

    // -----------------------------------------------------------------------
    // cleanup and easter eggs

    async fn cleanup(&self, kind: CleanupKind) -> Outcome {
        let workspace = self.state.workspace.clone();
        let sandbox = self.state.cleanup_sandbox.clone();
        let reply = tokio::task::spawn_blocking(move || {
            let mut cleanup = Cleanup::new(&workspace);
            if let Some(dir) = &sandbox {
                cleanup = cleanup.with_temp_dir(dir).without_process_sweep();
            }
            cleanup.execute(kind)
        })
            .await
            .unwrap_or_else(|e| format!("Erro na limpeza: {e}"));
        Outcome {
            text: reply,
            detail: None,
            shutdown: kind == CleanupKind::Full,
        }
    }

    async fn party(&self) -> Outcome {
        let result: anyhow::Result<()> = async {
            self.desktop.press(Key::VolumeMute)?;
            self.pause(500).await;
            self.desktop.press(Key::VolumeMute)?;
            self.pause(500).await;
            for _ in 0..4 {
                self.desktop.press(Key::VolumeUp)?;
                self.pause(100).await;
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => Outcome::say(persona::PARTY_LINE),
            Err(e) => {
                log::error!("Party protocol failed: {e:#}");
                Outcome::say("Não consegui ativar o modo festa, mestre. Verifique as permissões.")
            }
        }
    }

    // -----------------------------------------------------------------------
    // memory

    fn set_preference(&self, key: &str, value: &str) -> Outcome {
        let Some(memory) = self.memory else {
            return Outcome::say("Memória indisponível no momento, mestre.");
        };
        match memory.set_preference(key, value) {
            Ok(()) => Outcome::say(format!("Preferência '{key}' definida como '{value}', mestre.")),
            Err(e) => {
                log::error!("Preference not saved: {e}");
                Outcome::say(format!("Não consegui salvar a preferência: {e}, mestre."))
            }
        }
    }

    fn known_facts(&self) -> Outcome {
        let Some(memory) = self.memory else {
            return Outcome::say("Memória indisponível no momento, mestre.");
        };
        match memory.search("", None, 10) {
            Ok(facts) if facts.is_empty() => {
                Outcome::say("Ainda não sei nada sobre você, mestre. Conte-me algo!")
            }
            Ok(facts) => {
                let lines: Vec<String> = facts
                    .iter()
                    .map(|f| format!("• {} ({})", f.fact, f.category))
                    .collect();
                Outcome::say(format!("🧠 O que sei sobre você, mestre:\n{}", lines.join("\n")))
            }
            Err(e) => {
                log::error!("Fact lookup failed: {e}");
                Outcome::say(format!("Não consegui consultar a memória: {e}, mestre."))
            }
        }
    }

    fn memory_stats(&self) -> Outcome {
        let Some(memory) = self.memory else {
            return Outcome::say("Memória indisponível no momento, mestre.");
        };
        match memory.stats() {
            Ok(stats) => {
                let facts: i64 = stats.facts_by_category.values().sum();
                let mut text = format!(
                    "📊 Memória: {facts} fatos, {} conversas, {} preferências.",
                    stats.total_conversations, stats.total_preferences
                );
                for (category, count) in &stats.facts_by_category {
                    text.push_str(&format!("\n• {category}: {count}"));
                }
                Outcome::say(text)
            }
            Err(e) => {
                log::error!("Memory stats failed: {e}");
                Outcome::say(format!("Não consegui ler as estatísticas: {e}, mestre."))
            }
        }
    }

    // -----------------------------------------------------------------------
    // files and applications

    fn set_workspace(&mut self, path: &str) -> Outcome {
        let dir = PathBuf::from(path);
        if !dir.is_dir() {
            return Outcome::say(format!("O caminho não existe: {path}"));
        }
        self.state.projects.set_workspace(&dir);
        self.state.workspace = dir;
        Outcome::say(format!("Workspace definido para: {path}"))
    }

    fn list_files(&self, target: ListTarget) -> Outcome {
        let dir = match target {
            ListTarget::Workspace => Some(self.state.workspace.clone()),
            ListTarget::Desktop => dirs::desktop_dir().or_else(|| dirs::home_dir().map(|h| h.join("Desktop"))),
            ListTarget::Current => std::env::current_dir().ok(),
        };
        let Some(dir) = dir else {
            return Outcome::say("Não consegui determinar a pasta para listar, mestre.");
        };
        Outcome::say(list_dir(&dir))
    }

    fn open_app(&self, target: &str) -> Outcome {
        let (launch, label) = match apps::find_in(target).or_else(|| apps::find(target)) {
            Some(app) => (app.target().launch.to_string(), capitalize(app.display)),
            None => (target.to_string(), capitalize(target)),
        };
        match self.desktop.launch(&launch) {
            Ok(()) => Outcome::say(format!("{label} aberto com sucesso, mestre.")),
            Err(e) => {
                log::error!("Failed to open {target}: {e:#}");
                Outcome::say(format!("Não consegui abrir '{target}', mestre."))
            }
        }
    }

    fn close_app(&self, target: &str) -> Outcome {
        let Some(app) = apps::find_in(target) else {
            return Outcome::say(
                "Não reconheci qual aplicativo fechar, mestre. Tente: 'fechar bloco de notas', 'fechar discord', 'fechar chrome', etc.",
            );
        };
        log::info!("🔪 Closing {} ({})", app.display, app.target().process);
        if self.desktop.kill_process(app.target().process) {
            Outcome::say(format!("{} fechado com sucesso, mestre.", capitalize(app.display)))
        } else {
            Outcome::say(format!(
                "Não consegui fechar {}. Talvez não esteja em execução, mestre.",
                app.display
            ))
        }
    }

    async fn type_text(&self, text: &str) -> Outcome {
        if text.trim().is_empty() {
            return Outcome::say("O que você gostaria que eu digitasse, mestre?");
        }
        self.pause(1000).await;
        match self.desktop.type_text(text) {
            Ok(()) => Outcome::say(format!("Texto digitado com sucesso: '{text}', mestre.")),
            Err(e) => Outcome::say(format!("Erro ao digitar texto: {e}, mestre.")),
        }
    }

    async fn paste(&self) -> Outcome {
        self.pause(1000).await;
        match self.desktop.hotkey(&[Key::Ctrl, Key::Char('v')]) {
            Ok(()) => Outcome::say("Texto colado com sucesso, mestre."),
            Err(e) => Outcome::say(format!("Erro ao colar texto: {e}, mestre.")),
        }
    }

    async fn open_and_type(&self, command: &str) -> Outcome {
        let Some((app, text)) = split_open_and_type(command) else {
            return Outcome::say(
                "Não reconheci qual aplicativo abrir. Tente: 'abra e digite no bloco de notas', mestre.",
            );
        };
        if text.is_empty() {
            return Outcome::say(format!(
                "O que você gostaria que eu digitasse no {}, mestre?",
                app.display
            ));
        }
        if let Err(e) = self.desktop.launch(app.target().launch) {
            return Outcome::say(format!("Erro ao abrir e digitar: {e}, mestre."));
        }
        self.pause(2000).await;
        match self.desktop.type_text(&text) {
            Ok(()) => Outcome::say(format!(
                "{} aberto e texto digitado: '{text}', mestre.",
                capitalize(app.display)
            )),
            Err(e) => Outcome::say(format!("Erro ao abrir e digitar: {e}, mestre.")),
        }
    }
}

// ---------------------------------------------------------------------------
// helpers

pub fn time_reply<T: Timelike>(now: T) -> String {
    format!("São exatamente {:02}:{:02}, mestre.", now.hour(), now.minute())
}

pub fn date_reply<T: Datelike>(today: T) -> String {
    format!(
        "Hoje é {} de {} de {}, senhor.",
        today.day(),
        MONTHS[today.month0() as usize],
        today.year()
    )
}

/// App named by "no <app>", "na <app>" or "em <app>"; the notepad otherwise.
fn paste_target(lower: &str) -> &'static App {
    apps::APPS
        .iter()
        .flat_map(|app| app.aliases.iter().map(move |alias| (app, *alias)))
        .filter(|(_, alias)| {
            ["no", "na", "em"]
                .iter()
                .any(|prep| contains_word(lower, &format!("{prep} {alias}")))
        })
        .max_by_key(|(_, alias)| alias.len())
        .map(|(app, _)| app)
        .or_else(|| apps::find("bloco de notas"))
        .unwrap_or(&apps::APPS[0])
}

/// "escreva um código de fibonacci no bloco de notas" → "fibonacci".
fn code_kind(lower: &str) -> String {
    const PREFIXES: [&str; 8] = [
        "escreva um código de ",
        "gere um código de ",
        "crie um código de ",
        "escreva um código ",
        "gere um código ",
        "crie um código ",
        "gerar código de ",
        "escrever código de ",
    ];
    let mut kind = lower.trim();
    if let Some(start) = PREFIXES.iter().filter_map(|p| kind.find(p).map(|i| i + p.len())).min() {
        kind = &kind[start..];
    }
    let mut kind = kind.to_string();
    for app in apps::APPS {
        for alias in app.aliases {
            for prep in ["no", "na", "em"] {
                kind = kind.replace(&format!(" {prep} {alias}"), "");
                if kind.starts_with(&format!("{prep} {alias}")) {
                    kind = kind[prep.len() + 1 + alias.len()..].to_string();
                }
            }
        }
    }
    let kind = kind.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    if kind.is_empty() {
        "hello world".to_string()
    } else {
        kind.to_string()
    }
}

/// First three words of the task, safe for a file name.
fn code_filename(task: &str) -> String {
    let stem: String = task
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if stem.is_empty() {
        "codigo_jarvis.py".to_string()
    } else {
        format!("{stem}.py")
    }
}

/// "abra e digite no bloco de notas olá mundo" → (notepad, "olá mundo").
fn split_open_and_type(command: &str) -> Option<(&'static App, String)> {
    const PHRASES: [&str; 4] = ["abra e digite", "abre e digita", "abrir e digitar", "open and type"];
    let lower = command.to_lowercase();
    let (pos, phrase) = PHRASES
        .iter()
        .filter_map(|p| lower.find(p).map(|i| (i, *p)))
        .min_by_key(|(i, _)| *i)?;
    let rest = &lower[pos + phrase.len()..];
    let app = apps::find_in(rest)?;
    let alias = app
        .aliases
        .iter()
        .filter(|a| contains_word(rest, a))
        .max_by_key(|a| a.len())?;
    let alias_end = rest.find(alias)? + alias.len();
    let offset = pos + phrase.len() + alias_end;

    // Keep the user's casing when lower-casing did not move any byte.
    let tail = if lower.len() == command.len() {
        command.get(offset..).unwrap_or(&lower[offset..])
    } else {
        &lower[offset..]
    };
    let text = tail
        .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .trim()
        .to_string();
    Some((app, text))
}

fn list_dir(dir: &Path) -> String {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) if !dir.exists() => {
            return format!("O caminho do workspace não existe: {}", dir.display())
        }
        Err(e) => return format!("Erro ao listar workspace: {e}"),
    };
    let mut folders = Vec::new();
    let mut files = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.path().is_dir() {
            folders.push(name);
        } else {
            files.push(name);
        }
    }
    folders.sort();
    files.sort();

    let mut result = format!("Arquivos em {}:\n\n", dir.display());
    if !folders.is_empty() {
        let shown: Vec<String> = folders.iter().take(10).map(|f| format!("📁 {f}")).collect();
        result.push_str(&format!("Pastas:\n{}\n\n", shown.join("\n")));
    }
    if !files.is_empty() {
        let shown: Vec<String> = files.iter().take(15).map(|f| format!("📄 {f}")).collect();
        result.push_str(&format!("Arquivos:\n{}", shown.join("\n")));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::RecordingDesktop;
    use crate::llm::ScriptedModel;
    use chrono::NaiveDate;

    struct Fixture {
        config: Config,
        desktop: RecordingDesktop,
        memory: MemoryStore,
        state: SessionState,
        announcer: Announcer,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_desktop(RecordingDesktop::new())
        }

        fn with_desktop(desktop: RecordingDesktop) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::from_lookup(|_| None);
            config.workspace = dir.path().to_path_buf();
            let mut state = SessionState::new(dir.path());
            state.no_delays = true;
            Self {
                config,
                desktop,
                memory: MemoryStore::in_memory().unwrap(),
                state,
                announcer: Announcer::silent(),
                _dir: dir,
            }
        }

        async fn run(&mut self, intent: Intent, model: Option<&Arc<dyn LanguageModel>>) -> Outcome {
            let mut actions = Actions {
                config: &self.config,
                desktop: &self.desktop,
                model,
                vision_model: None,
                memory: Some(&self.memory),
                announcer: &self.announcer,
                state: &mut self.state,
            };
            actions.execute(intent).await
        }
    }

    #[test]
    fn clock_replies() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(9, 7, 0).unwrap();
        assert_eq!(time_reply(t), "São exatamente 09:07, mestre.");
        assert_eq!(date_reply(t), "Hoje é 5 de março de 2024, senhor.");
    }

    #[test]
    fn code_kind_and_target() {
        assert_eq!(code_kind("escreva um código de fibonacci no bloco de notas"), "fibonacci");
        assert_eq!(code_kind("gere um código"), "hello world");
        assert_eq!(paste_target("gere um código no word").display, "word");
        assert_eq!(paste_target("gere um código de soma").display, "bloco de notas");
    }

    #[test]
    fn filenames_use_three_words() {
        assert_eq!(code_filename("ordenação de listas grandes"), "ordenação_de_listas.py");
        assert_eq!(code_filename("olá, mundo!"), "olá_mundo.py");
        assert_eq!(code_filename(""), "codigo_jarvis.py");
    }

    #[test]
    fn open_and_type_keeps_casing() {
        let (app, text) = split_open_and_type("Abra e digite no bloco de notas Olá Mundo").unwrap();
        assert_eq!(app.display, "bloco de notas");
        assert_eq!(text, "Olá Mundo");
        assert!(split_open_and_type("abra e digite no photoshop oi").is_none());
    }

    #[tokio::test]
    async fn system_actions_can_be_disabled() {
        let mut fx = Fixture::new();
        fx.config.enable_system_actions = false;
        let outcome = fx.run(Intent::OpenApp("discord".into()), None).await;
        assert_eq!(outcome.text, SYSTEM_ACTIONS_DISABLED);
        assert!(fx.desktop.events().is_empty());
        // Reading the clock still works.
        assert!(fx.run(Intent::Time, None).await.text.starts_with("São exatamente"));
    }

    #[tokio::test]
    async fn full_cleanup_is_a_system_action() {
        let mut fx = Fixture::new();
        fx.config.enable_system_actions = false;
        let outcome = fx.run(Intent::Cleanup(CleanupKind::Full), None).await;
        assert_eq!(outcome.text, SYSTEM_ACTIONS_DISABLED);
        assert!(!outcome.shutdown);
    }

    #[tokio::test]
    async fn paste_checks_focus_only_for_plain_editors() {
        let mut fx = Fixture::with_desktop(RecordingDesktop::new().with_stalled_launches());
        let outcome = fx
            .run(Intent::GenerateCode("escreva um código de soma no bloco de notas".into()), None)
            .await;
        assert_eq!(outcome.text, "Não consegui verificar que bloco de notas está ativo, mestre.");
        assert!(!fx.desktop.events().iter().any(|e| e == "hotkey ctrl+v"));

        let outcome = fx
            .run(Intent::GenerateCode("escreva um código de soma no vscode".into()), None)
            .await;
        assert!(outcome.text.ends_with("colado no vs code, mestre."), "{}", outcome.text);
        assert!(fx.desktop.events().iter().any(|e| e == "hotkey ctrl+v"));
    }

    #[tokio::test]
    async fn gamer_mode_round_trip() {
        let mut fx = Fixture::new();
        let on = fx.run(Intent::GamerOn, None).await;
        assert_eq!(
            on.text,
            "🎮 Modo Gamer ativado! Abertos: Discord, Opera GX, Steam. Prepare-se para a ação, mestre!"
        );

        let mut fx = Fixture::with_desktop(
            RecordingDesktop::new().with_running(apps::find("steam").unwrap().target().process),
        );
        let off = fx.run(Intent::GamerOff, None).await;
        assert_eq!(off.text, "🛑 Modo Gamer encerrado! Fechados: Steam. Modo gamer desativado, mestre!");
        let again = fx.run(Intent::GamerOff, None).await;
        assert_eq!(again.text, "ℹ️ Nenhum aplicativo gamer estava em execução, mestre.");
    }

    #[tokio::test]
    async fn generated_code_is_pasted_then_saved() {
        let mut fx = Fixture::new();
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(["```python\nprint('oi')\n```"]));
        let outcome = fx
            .run(Intent::GenerateCode("escreva um código de saudação simples no bloco de notas".into()), Some(&model))
            .await;
        assert_eq!(outcome.text, "Código saudação simples gerado e colado no bloco de notas, mestre.");
        assert_eq!(fx.desktop.clipboard().unwrap(), "print('oi')");
        assert!(fx.desktop.events().contains(&"hotkey ctrl+v".to_string()));

        let saved = fx.run(Intent::SavePendingCode, None).await;
        assert_eq!(saved.text, "Código salvo com sucesso em 'saudação_simples.py', mestre.");
        let path = fx.state.workspace.join("saudação_simples.py");
        assert_eq!(fs::read_to_string(path).unwrap(), "print('oi')");
        assert_eq!(fx.run(Intent::SavePendingCode, None).await.text, "Não há código para salvar, mestre.");
    }

    #[tokio::test]
    async fn generate_and_paste_is_capped() {
        let mut fx = Fixture::new();
        fx.config.max_commands_per_session = 1;
        fx.run(Intent::GenerateCode("gere um código".into()), None).await;
        let outcome = fx.run(Intent::GenerateCode("gere um código".into()), None).await;
        assert!(outcome.text.starts_with("Limite de comandos atingido"));
    }

    #[tokio::test]
    async fn clipboard_error_needs_content_and_model() {
        let mut fx = Fixture::with_desktop(RecordingDesktop::new().with_clipboard("erro"));
        let outcome = fx.run(Intent::ExplainClipboardError, None).await;
        assert!(outcome.text.starts_with("⚠️ Não encontrei um erro válido"));

        let mut fx = Fixture::with_desktop(
            RecordingDesktop::new().with_clipboard("NameError: name 'x' is not defined"),
        );
        assert_eq!(
            fx.run(Intent::ExplainClipboardError, None).await.text,
            "⚠️ IA não disponível para análise de erro, mestre."
        );
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(["A variável x não existe."]));
        let outcome = fx.run(Intent::ExplainClipboardError, Some(&model)).await;
        assert!(outcome.detail.unwrap().contains("A variável x não existe."));
    }

    #[tokio::test]
    async fn screen_analysis_reports_capture_failure() {
        let mut fx = Fixture::with_desktop(RecordingDesktop::without_screen());
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(["nada"]));
        let outcome = fx.run(Intent::AnalyzeScreen, Some(&model)).await;
        assert!(outcome.text.starts_with("❌ Erro ao capturar tela:"));
    }

    #[tokio::test]
    async fn debugger_saves_analysis_as_tip() {
        let mut fx = Fixture::new();
        let model: Arc<dyn LanguageModel> =
            Arc::new(ScriptedModel::new(["IDENTIFIQUE O ERRO: NameError na linha 3"]));
        let outcome = fx.run(Intent::Debugger, Some(&model)).await;
        assert!(outcome.text.starts_with("Análise de erro concluída!"));
        assert!(outcome.detail.unwrap().starts_with("🐛 ANÁLISE DE ERRO"));
        let found = TipsBook::new(&fx.state.workspace).search("nameerror").unwrap();
        assert!(found.contains("Erro Resolvido"));
    }

    #[tokio::test]
    async fn apps_open_and_close() {
        let mut fx = Fixture::new();
        let opened = fx.run(Intent::OpenApp("discord".into()), None).await;
        assert_eq!(opened.text, "Discord aberto com sucesso, mestre.");
        let closed = fx.run(Intent::CloseApp("discord".into()), None).await;
        assert_eq!(closed.text, "Discord fechado com sucesso, mestre.");
        let unknown = fx.run(Intent::CloseApp("photoshop".into()), None).await;
        assert!(unknown.text.starts_with("Não reconheci qual aplicativo fechar"));
    }

    #[tokio::test]
    async fn workspace_and_listing() {
        let mut fx = Fixture::new();
        let bad = fx.run(Intent::SetWorkspace("/definitely/not/here".into()), None).await;
        assert_eq!(bad.text, "O caminho não existe: /definitely/not/here");

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("main.py"), "").unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let ok = fx.run(Intent::SetWorkspace(path.clone()), None).await;
        assert_eq!(ok.text, format!("Workspace definido para: {path}"));

        let listing = fx.run(Intent::ListFiles(ListTarget::Workspace), None).await;
        assert!(listing.text.contains("Pastas:\n📁 src"));
        assert!(listing.text.contains("Arquivos:\n📄 main.py"));
    }

    #[tokio::test]
    async fn party_presses_volume_keys() {
        let mut fx = Fixture::new();
        let outcome = fx.run(Intent::EasterEgg(EasterEgg::Party), None).await;
        assert_eq!(outcome.text, persona::PARTY_LINE);
        let events = fx.desktop.events();
        assert_eq!(events.iter().filter(|e| *e == "press volumeup").count(), 4);
        assert_eq!(events.iter().filter(|e| *e == "press volumemute").count(), 2);
    }

    #[tokio::test]
    async fn memory_commands() {
        let mut fx = Fixture::new();
        assert!(fx.run(Intent::KnownFacts, None).await.text.starts_with("Ainda não sei nada"));
        fx.memory.store_fact("Ana", "nome", 3).unwrap();
        let facts = fx.run(Intent::KnownFacts, None).await;
        assert!(facts.text.contains("• Ana (nome)"));

        let pref = fx
            .run(Intent::SetPreference { key: "linguagem".into(), value: "rust".into() }, None)
            .await;
        assert_eq!(pref.text, "Preferência 'linguagem' definida como 'rust', mestre.");
        let stats = fx.run(Intent::MemoryStats, None).await;
        assert!(stats.text.starts_with("📊 Memória: 1 fatos, 0 conversas, 1 preferências."));
    }

    #[tokio::test]
    async fn git_commit_types_in_terminal() {
        let mut fx = Fixture::new();
        let outcome = fx.run(Intent::GitCommit("primeiro commit".into()), None).await;
        assert!(outcome.text.contains("Commit 'primeiro commit' criado"));
        assert_eq!(
            fx.desktop.events(),
            vec![
                "hotkey ctrl+j",
                "type git add .",
                "press enter",
                "type git commit -m \"primeiro commit\"",
                "press enter",
            ]
        );
    }
}
