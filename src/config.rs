//! Runtime configuration read from environment variables.
//!
//! Everything has a default so Jarvis starts with a bare `.env`. Values are
//! read once in `main` and passed down; nothing else touches the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder shipped in the sample `.env`; treated as "no key".
const PLACEHOLDER_KEY: &str = "sua_api_key_aqui";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Voice,
    Text,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub backend: Backend,
    pub model_name: String,
    pub vision_model: String,
    pub gemini_base_url: String,
    pub llm_timeout: Duration,
    pub temperature: f32,
    pub workspace: PathBuf,
    pub enable_system_actions: bool,
    pub memory_db: PathBuf,
    pub trigger_word: String,
    pub conversation_timeout: Duration,
    pub vosk_model_path: Option<String>,
    /// Input device by position in the host's device list.
    pub mic_index: Option<usize>,
    /// Input device whose name contains this text.
    pub mic_name_keyword: Option<String>,
    pub voice_name: Option<String>,
    pub voice_engine: String,
    pub voice_rate: f32,
    pub input_mode: InputMode,
    pub telegram_token: Option<String>,
    pub max_commands_per_session: u32,
    pub debug_max_attempts: u32,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let gemini_api_key = get("GEMINI_API_KEY").filter(|k| k != PLACEHOLDER_KEY);
        let backend = match get("LLM_BACKEND").map(|b| b.to_lowercase()).as_deref() {
            Some("ollama") => Backend::Ollama,
            Some("gemini") => Backend::Gemini,
            _ if gemini_api_key.is_some() => Backend::Gemini,
            _ => Backend::Ollama,
        };
        let model_name = get("MODEL_NAME").unwrap_or_else(|| match backend {
            Backend::Gemini => "gemini-2.5-flash".to_string(),
            Backend::Ollama => "qwen3:1.7b".to_string(),
        });
        let vision_model = get("VISION_MODEL").unwrap_or_else(|| model_name.clone());

        let workspace = get("WORKSPACE_PATH")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join("Desktop")))
            .unwrap_or_else(|| PathBuf::from("."));
        let memory_db = get("MEMORY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace.join("jarvis_memory.db"));

        let input_mode = match get("INPUT_MODE").map(|m| m.to_lowercase()).as_deref() {
            Some("text") | Some("texto") => InputMode::Text,
            Some("voice") | Some("voz") => InputMode::Voice,
            _ if cfg!(feature = "voice") => InputMode::Voice,
            _ => InputMode::Text,
        };

        Self {
            gemini_api_key,
            backend,
            model_name,
            vision_model,
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            llm_timeout: Duration::from_secs(parse_or(get("LLM_TIMEOUT"), 30)),
            temperature: parse_or(get("TEMPERATURE"), 0.7),
            workspace,
            enable_system_actions: get("ENABLE_SYSTEM_ACTIONS")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            memory_db,
            trigger_word: get("TRIGGER_WORD")
                .unwrap_or_else(|| "jarvis".to_string())
                .to_lowercase(),
            conversation_timeout: Duration::from_secs(parse_or(get("CONVERSATION_TIMEOUT"), 30)),
            vosk_model_path: get("VOSK_MODEL_PATH"),
            mic_index: get("MIC_INDEX").and_then(|v| v.parse().ok()),
            mic_name_keyword: get("MIC_NAME_KEYWORD"),
            voice_name: get("VOICE_NAME"),
            voice_engine: get("VOICE_ENGINE")
                .unwrap_or_else(|| "system".to_string())
                .to_lowercase(),
            voice_rate: parse_or(get("VOICE_RATE"), 1.0),
            input_mode,
            telegram_token: get("TELEGRAM_TOKEN"),
            max_commands_per_session: parse_or(get("MAX_COMMANDS_PER_SESSION"), 10),
            debug_max_attempts: parse_or::<u32>(get("DEBUG_MAX_ATTEMPTS"), 3).max(1),
        }
    }

    /// Problems worth warning about at startup. None of them is fatal; the
    /// assistant keeps running with the affected feature disabled.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.backend == Backend::Gemini && self.gemini_api_key.is_none() {
            problems.push("GEMINI_API_KEY não configurada no arquivo .env".to_string());
        }
        if self.input_mode == InputMode::Voice {
            if !cfg!(feature = "voice") {
                problems.push(
                    "INPUT_MODE=voice requer compilar com a feature `voice`; usando o console"
                        .to_string(),
                );
            } else if self.vosk_model_path.is_none() {
                problems.push("VOSK_MODEL_PATH não configurado para o modo de voz".to_string());
            }
        }
        if !self.workspace.is_dir() {
            problems.push(format!(
                "WORKSPACE_PATH não existe: {}",
                self.workspace.display()
            ));
        }
        problems
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_to_ollama_without_key() {
        let config = config_from(&[]);
        assert_eq!(config.backend, Backend::Ollama);
        assert_eq!(config.model_name, "qwen3:1.7b");
        assert_eq!(config.trigger_word, "jarvis");
        assert_eq!(config.max_commands_per_session, 10);
        assert_eq!(config.debug_max_attempts, 3);
        assert!(config.enable_system_actions);
    }

    #[test]
    fn key_selects_gemini_and_placeholder_is_ignored() {
        let config = config_from(&[("GEMINI_API_KEY", "abc123")]);
        assert_eq!(config.backend, Backend::Gemini);
        assert_eq!(config.model_name, "gemini-2.5-flash");
        assert_eq!(config.vision_model, "gemini-2.5-flash");

        let placeholder = config_from(&[("GEMINI_API_KEY", "sua_api_key_aqui")]);
        assert!(placeholder.gemini_api_key.is_none());
        assert_eq!(placeholder.backend, Backend::Ollama);
    }

    #[test]
    fn explicit_gemini_without_key_is_reported() {
        let config = config_from(&[("LLM_BACKEND", "gemini"), ("WORKSPACE_PATH", ".")]);
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("GEMINI_API_KEY")));
    }

    #[test]
    fn memory_db_follows_workspace() {
        let config = config_from(&[("WORKSPACE_PATH", "/tmp/ws")]);
        assert_eq!(config.memory_db, PathBuf::from("/tmp/ws/jarvis_memory.db"));
    }

    #[test]
    fn bad_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("CONVERSATION_TIMEOUT", "soon"),
            ("DEBUG_MAX_ATTEMPTS", "0"),
            ("ENABLE_SYSTEM_ACTIONS", "FALSE"),
        ]);
        assert_eq!(config.conversation_timeout, Duration::from_secs(30));
        assert_eq!(config.debug_max_attempts, 1);
        assert!(!config.enable_system_actions);
    }
}
