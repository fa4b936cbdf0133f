//! Command routing.
//!
//! Every command goes through one ordered table of rules. The first rule
//! whose matcher returns an [`Intent`] wins; when nothing matches the
//! command is handed to the language model.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::codegen::{self, ProjectRequest};
use crate::persona::{self, EasterEgg};

/// What the user asked for, with any arguments already extracted.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Menu,
    StudyMode,
    Debugger,
    RecallTip(String),
    SaveTip(String),
    GamerOn,
    GamerOff,
    GitCommit(String),
    AnalyzeScreen,
    Project(ProjectRequest),
    GenerateCode(String),
    ExplainClipboardError,
    SavePendingCode,
    Cleanup(CleanupKind),
    EasterEgg(EasterEgg),
    SetPreference { key: String, value: String },
    KnownFacts,
    MemoryStats,
    Time,
    Date,
    SetWorkspace(String),
    OpenAndType(String),
    OpenApp(String),
    CloseApp(String),
    TypeText(String),
    Paste,
    ListFiles(ListTarget),
    Lock,
    RefuseShutdown,
    RefuseRestart,
    /// A recognised command with a missing argument; the text explains
    /// what to say instead.
    Hint(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    Full,
    Logs,
    Temp,
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTarget {
    Workspace,
    Desktop,
    Current,
}

/// Session state some rules depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteContext {
    /// Generated code is waiting for a "salvar" answer.
    pub pending_code: bool,
    /// Uniform sample in `[0, 1)` for the probabilistic easter egg.
    pub roll: f64,
}

type Matcher = fn(&Command, &RouteContext) -> Option<Intent>;

/// The command as typed plus its lower-cased form.
struct Command<'a> {
    raw: &'a str,
    lower: String,
}

static RULES: &[(&str, Matcher)] = &[
    ("menu", menu),
    ("study_mode", study_mode),
    ("debugger", debugger),
    ("recall_tip", recall_tip),
    ("save_tip", save_tip),
    ("gamer_mode", gamer_mode),
    ("git_commit", git_commit),
    ("analyze_screen", analyze_screen),
    ("project", project),
    ("generate_code", generate_code),
    ("explain_error", explain_error),
    ("save_pending_code", save_pending_code),
    ("cleanup", cleanup),
    ("easter_egg", easter_egg),
    ("memory", memory),
    ("clock", clock),
    ("workspace", workspace),
    ("open_and_type", open_and_type),
    ("open_app", open_app),
    ("close_app", close_app),
    ("typing", typing),
    ("list_files", list_files),
    ("system", system),
];

/// Route a command. Returns `None` when the model should answer.
pub fn route(command: &str, ctx: &RouteContext) -> Option<Intent> {
    let command = Command {
        raw: command.trim(),
        lower: command.trim().to_lowercase(),
    };
    if command.lower.is_empty() {
        return None;
    }
    RULES.iter().find_map(|(name, matcher)| {
        let intent = matcher(&command, ctx)?;
        log::debug!("Command matched rule '{}': {:?}", name, intent);
        Some(intent)
    })
}

/// True when `phrase` occurs in `text` delimited by non-alphanumeric
/// characters (or the string edges).
pub fn contains_word(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    text.match_indices(phrase).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + phrase.len()..].chars().next();
        !before.map_or(false, char::is_alphanumeric) && !after.map_or(false, char::is_alphanumeric)
    })
}

fn any_word(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| contains_word(text, w))
}

fn any_phrase(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Text following the first whole-word occurrence of any verb.
fn after_verb<'a>(raw: &'a str, verbs: &[&str]) -> Option<&'a str> {
    static CACHE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid regex"));
    CACHE.find_iter(raw).find_map(|m| {
        let word = m.as_str().to_lowercase();
        verbs
            .iter()
            .any(|v| *v == word)
            .then(|| raw[m.end()..].trim())
    })
}

fn strip_articles(text: &str) -> &str {
    let trimmed = text.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ':');
    for article in ["o ", "a ", "os ", "as ", "um ", "uma "] {
        if trimmed.len() >= article.len()
            && trimmed.is_char_boundary(article.len())
            && trimmed[..article.len()].eq_ignore_ascii_case(article)
        {
            return trimmed[article.len()..].trim_start();
        }
    }
    trimmed
}

fn clean_target(text: &str) -> String {
    let text = strip_articles(text);
    let text = text
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .trim_end_matches("por favor")
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace());
    text.to_string()
}

// ---------------------------------------------------------------------------
// rules, in routing order

fn menu(c: &Command, _: &RouteContext) -> Option<Intent> {
    (any_word(&c.lower, &["menu", "comandos", "ajuda"]) || c.lower.contains("o que você sabe fazer"))
        .then_some(Intent::Menu)
}

fn study_mode(c: &Command, _: &RouteContext) -> Option<Intent> {
    any_phrase(&c.lower, &["modo estudo", "modostudo"]).then_some(Intent::StudyMode)
}

fn debugger(c: &Command, _: &RouteContext) -> Option<Intent> {
    (c.lower.contains("por que falhou") || contains_word(&c.lower, "debugger"))
        .then_some(Intent::Debugger)
}

fn recall_tip(c: &Command, _: &RouteContext) -> Option<Intent> {
    if !any_phrase(&c.lower, &["lembra daquela dica", "busca dica"]) {
        return None;
    }
    let term = c
        .lower
        .replace("lembra daquela dica", "")
        .replace("busca dica", "");
    let term = term.trim_matches(|ch: char| ch.is_whitespace() || ch == '?' || ch == ',');
    Some(if term.is_empty() {
        Intent::Hint(
            "Por favor, especifique o que você quer lembrar, mestre. Ex: 'lembra daquela dica python'",
        )
    } else {
        Intent::RecallTip(term.to_string())
    })
}

fn save_tip(c: &Command, _: &RouteContext) -> Option<Intent> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)^salvar dica:\s*(.*)$").expect("valid regex"));
    let caps = RE.captures(c.raw)?;
    let tip = caps.get(1).map_or("", |m| m.as_str().trim());
    Some(if tip.is_empty() {
        Intent::Hint(
            "Por favor, forneça a dica para salvar, mestre. Ex: 'salvar dica: Sempre use try/except'",
        )
    } else {
        Intent::SaveTip(tip.to_string())
    })
}

fn gamer_mode(c: &Command, _: &RouteContext) -> Option<Intent> {
    if !any_phrase(&c.lower, &["modo gamer", "modogamer"]) {
        return None;
    }
    Some(if any_word(&c.lower, &["encerrar", "fechar", "desativar"]) {
        Intent::GamerOff
    } else {
        Intent::GamerOn
    })
}

fn git_commit(c: &Command, _: &RouteContext) -> Option<Intent> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)^git:\s*(.*)$").expect("valid regex"));
    let caps = RE.captures(c.raw)?;
    let message = caps.get(1).map_or("", |m| m.as_str().trim());
    Some(if message.is_empty() {
        Intent::Hint("Por favor, forneça uma mensagem para o commit, mestre.")
    } else {
        Intent::GitCommit(message.to_string())
    })
}

fn analyze_screen(c: &Command, _: &RouteContext) -> Option<Intent> {
    any_phrase(&c.lower, &["olhe a tela", "analise a tela", "veja a tela"])
        .then_some(Intent::AnalyzeScreen)
}

fn project(c: &Command, _: &RouteContext) -> Option<Intent> {
    codegen::interpret_request(&c.lower).map(Intent::Project)
}

fn generate_code(c: &Command, _: &RouteContext) -> Option<Intent> {
    any_phrase(
        &c.lower,
        &[
            "escreva um código",
            "gere um código",
            "crie um código",
            "gerar código",
            "escrever código",
        ],
    )
    .then(|| Intent::GenerateCode(c.raw.to_string()))
}

fn explain_error(c: &Command, _: &RouteContext) -> Option<Intent> {
    any_phrase(&c.lower, &["explique o erro", "qual o erro", "corrija o erro"])
        .then_some(Intent::ExplainClipboardError)
}

fn save_pending_code(c: &Command, ctx: &RouteContext) -> Option<Intent> {
    (ctx.pending_code && any_word(&c.lower, &["sim", "salvar", "salve"]))
        .then_some(Intent::SavePendingCode)
}

fn cleanup(c: &Command, _: &RouteContext) -> Option<Intent> {
    let kind = if any_phrase(
        &c.lower,
        &[
            "protocolo de encerramento",
            "limpar área de trabalho",
            "limpeza completa",
            "encerrar sistema",
            "shutdown limpo",
        ],
    ) {
        CleanupKind::Full
    } else if c.lower.contains("limpar logs") {
        CleanupKind::Logs
    } else if any_phrase(&c.lower, &["limpar temporários", "limpar temporarios"]) {
        CleanupKind::Temp
    } else if c.lower.contains("limpar cache") {
        CleanupKind::Cache
    } else {
        return None;
    };
    Some(Intent::Cleanup(kind))
}

fn easter_egg(c: &Command, ctx: &RouteContext) -> Option<Intent> {
    persona::easter_egg(&c.lower, ctx.roll).map(Intent::EasterEgg)
}

fn memory(c: &Command, _: &RouteContext) -> Option<Intent> {
    static PREF: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)prefer[êe]ncia:\s*([^=]+?)\s*=\s*(.+?)\s*$").expect("valid regex")
    });
    if let Some(caps) = PREF.captures(c.raw) {
        let key = caps.get(1).map_or("", |m| m.as_str()).trim().to_lowercase();
        let value = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
        return Some(Intent::SetPreference { key, value });
    }
    if c.lower.contains("o que você sabe sobre mim") {
        return Some(Intent::KnownFacts);
    }
    if any_phrase(&c.lower, &["estatísticas da memória", "estatisticas da memoria"]) {
        return Some(Intent::MemoryStats);
    }
    None
}

fn clock(c: &Command, _: &RouteContext) -> Option<Intent> {
    if c.lower.contains("que horas") || contains_word(&c.lower, "horas") {
        return Some(Intent::Time);
    }
    any_phrase(&c.lower, &["que dia é hoje", "data de hoje"]).then_some(Intent::Date)
}

fn workspace(c: &Command, _: &RouteContext) -> Option<Intent> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)definir workspace\s*(?:para\s+)?(.*)$").expect("valid regex")
    });
    let caps = RE.captures(c.raw)?;
    let path = caps.get(1).map_or("", |m| m.as_str().trim());
    Some(if path.is_empty() {
        Intent::Hint("Informe o caminho do workspace, mestre. Ex: 'definir workspace C:\\projetos'")
    } else {
        Intent::SetWorkspace(path.to_string())
    })
}

fn open_and_type(c: &Command, _: &RouteContext) -> Option<Intent> {
    any_phrase(
        &c.lower,
        &["abra e digite", "abre e digita", "abrir e digitar", "open and type"],
    )
    .then(|| Intent::OpenAndType(c.raw.to_string()))
}

fn open_app(c: &Command, _: &RouteContext) -> Option<Intent> {
    let rest = after_verb(c.raw, &["abra", "abre", "abrir", "open"])?;
    let target = clean_target(rest);
    Some(if target.is_empty() {
        Intent::Hint("Qual aplicativo devo abrir, mestre?")
    } else {
        Intent::OpenApp(target)
    })
}

fn close_app(c: &Command, _: &RouteContext) -> Option<Intent> {
    let rest = after_verb(c.raw, &["feche", "fecha", "fechar", "close"])?;
    Some(Intent::CloseApp(clean_target(rest).to_lowercase()))
}

fn typing(c: &Command, _: &RouteContext) -> Option<Intent> {
    static APP_REFERENCES: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:no|na) (?:bloco de notas|notepad|bloco|editor)\b")
            .expect("valid regex")
    });
    if let Some(rest) = after_verb(c.raw, &["digite", "digitar", "escreva", "escrever", "type"]) {
        let text = APP_REFERENCES.replace_all(rest, "");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        return Some(Intent::TypeText(text));
    }
    any_word(&c.lower, &["cole", "colar", "paste"]).then_some(Intent::Paste)
}

fn list_files(c: &Command, _: &RouteContext) -> Option<Intent> {
    if !any_word(
        &c.lower,
        &["liste", "listar", "lista", "mostrar", "mostra", "arquivos", "files"],
    ) {
        return None;
    }
    let target = if c.lower.contains("workspace") {
        ListTarget::Workspace
    } else if c.lower.contains("desktop") || c.lower.contains("área de trabalho") {
        ListTarget::Desktop
    } else {
        ListTarget::Current
    };
    Some(Intent::ListFiles(target))
}

fn system(c: &Command, _: &RouteContext) -> Option<Intent> {
    if any_word(&c.lower, &["desligue", "desligar", "shutdown"]) {
        Some(Intent::RefuseShutdown)
    } else if any_word(&c.lower, &["reiniciar", "reboot", "restart"]) {
        Some(Intent::RefuseRestart)
    } else if any_word(&c.lower, &["bloquear", "bloqueie", "lock"]) {
        Some(Intent::Lock)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(command: &str) -> Option<Intent> {
        route(command, &RouteContext { pending_code: false, roll: 0.99 })
    }

    #[test]
    fn whole_words_only() {
        assert!(contains_word("sim, pode salvar", "sim"));
        assert!(!contains_word("um código simples", "sim"));
        assert!(contains_word("abra o chrome", "abra"));
        assert!(!contains_word("abraço", "abra"));
        assert!(contains_word("em c++ para somar", "c++"));
    }

    #[test]
    fn first_rule_wins() {
        assert_eq!(r("Jarvis, menu"), Some(Intent::Menu));
        assert_eq!(r("ativar modo estudo"), Some(Intent::StudyMode));
        assert_eq!(r("por que falhou?"), Some(Intent::Debugger));
        assert_eq!(r("encerrar modo gamer"), Some(Intent::GamerOff));
        assert_eq!(r("modo gamer"), Some(Intent::GamerOn));
        assert_eq!(r("olhe a tela"), Some(Intent::AnalyzeScreen));
        assert_eq!(r("explique o erro"), Some(Intent::ExplainClipboardError));
    }

    #[test]
    fn tips_keep_their_text() {
        assert_eq!(
            r("Salvar dica: Use Result em vez de panics"),
            Some(Intent::SaveTip("Use Result em vez de panics".into()))
        );
        assert!(matches!(r("salvar dica:"), Some(Intent::Hint(_))));
        assert_eq!(
            r("lembra daquela dica python"),
            Some(Intent::RecallTip("python".into()))
        );
        assert!(matches!(r("lembra daquela dica"), Some(Intent::Hint(_))));
    }

    #[test]
    fn git_message_preserves_case() {
        assert_eq!(
            r("git: Corrige bug no Login"),
            Some(Intent::GitCommit("Corrige bug no Login".into()))
        );
        assert!(matches!(r("git:   "), Some(Intent::Hint(_))));
    }

    #[test]
    fn project_requests_beat_plain_generation() {
        match r("crie um programa em rust para somar dois números") {
            Some(Intent::Project(req)) => {
                assert_eq!(req.language, "rust");
                assert_eq!(req.task, "somar dois números");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            r("escreva um código de fibonacci no notepad"),
            Some(Intent::GenerateCode(_))
        ));
    }

    #[test]
    fn save_requires_pending_code() {
        assert_eq!(r("sim"), None);
        let ctx = RouteContext { pending_code: true, roll: 0.5 };
        assert_eq!(route("sim, pode salvar", &ctx), Some(Intent::SavePendingCode));
        assert_ne!(route("algo simples", &ctx), Some(Intent::SavePendingCode));
    }

    #[test]
    fn cleanup_variants() {
        assert_eq!(r("protocolo de encerramento"), Some(Intent::Cleanup(CleanupKind::Full)));
        assert_eq!(r("limpar logs"), Some(Intent::Cleanup(CleanupKind::Logs)));
        assert_eq!(r("limpar temporários"), Some(Intent::Cleanup(CleanupKind::Temp)));
        assert_eq!(r("limpar cache"), Some(Intent::Cleanup(CleanupKind::Cache)));
    }

    #[test]
    fn easter_eggs_and_clock() {
        assert_eq!(r("festa em casa!"), Some(Intent::EasterEgg(EasterEgg::Party)));
        assert_eq!(r("como está o sistema?"), None);
        let lucky = RouteContext { pending_code: false, roll: 0.1 };
        assert_eq!(
            route("como está o sistema?", &lucky),
            Some(Intent::EasterEgg(EasterEgg::Ultron))
        );
        assert_eq!(r("que horas são?"), Some(Intent::Time));
        assert_eq!(r("que dia é hoje?"), Some(Intent::Date));
    }

    #[test]
    fn memory_commands() {
        assert_eq!(
            r("Preferência: Linguagem = Rust"),
            Some(Intent::SetPreference { key: "linguagem".into(), value: "Rust".into() })
        );
        assert_eq!(r("o que você sabe sobre mim?"), Some(Intent::KnownFacts));
        assert_eq!(r("estatísticas da memória"), Some(Intent::MemoryStats));
    }

    #[test]
    fn desktop_commands() {
        assert_eq!(r("abra o Chrome, por favor"), Some(Intent::OpenApp("Chrome".into())));
        assert_eq!(r("feche o discord"), Some(Intent::CloseApp("discord".into())));
        assert!(matches!(
            r("abra e digite no bloco de notas olá mundo"),
            Some(Intent::OpenAndType(_))
        ));
        assert_eq!(
            r("digite no bloco de notas Olá Mundo"),
            Some(Intent::TypeText("Olá Mundo".into()))
        );
        assert_eq!(r("cole aqui"), Some(Intent::Paste));
        assert_eq!(r("liste os arquivos do workspace"), Some(Intent::ListFiles(ListTarget::Workspace)));
        assert_eq!(r("mostra a área de trabalho"), Some(Intent::ListFiles(ListTarget::Desktop)));
        assert_eq!(r("desligue o computador"), Some(Intent::RefuseShutdown));
        assert_eq!(r("bloquear"), Some(Intent::Lock));
        assert_eq!(
            r("definir workspace /home/ana/Projetos"),
            Some(Intent::SetWorkspace("/home/ana/Projetos".into()))
        );
    }

    #[test]
    fn unknown_goes_to_model() {
        assert_eq!(r("explique o que é ownership em rust"), None);
        assert_eq!(r("   "), None);
    }
}
