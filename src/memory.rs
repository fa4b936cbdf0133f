//! Persistent memory backed by SQLite.
//!
//! Three tables: facts about the user (`memory`), past exchanges
//! (`conversation_context`) and key/value preferences (`user_preferences`).
//! Facts are extracted from what the user says with a small ordered table of
//! regular expressions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::codegen::truncate;
use crate::error::{MemoryError, MemoryResult};

/// A stored fact about the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub fact: String,
    pub category: String,
    pub importance: i64,
    pub created_at: String,
    pub access_count: i64,
}

/// A fact found in user input, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    pub fact: String,
    pub category: &'static str,
    pub importance: i64,
}

/// One stored user/assistant exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub user_input: String,
    pub jarvis_response: String,
    pub context: JsonValue,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub facts_by_category: BTreeMap<String, i64>,
    pub total_conversations: i64,
    pub total_preferences: i64,
}

const NAME: &str = r"([A-Za-zÀ-ÿ\s]+)";

/// Ordered extraction table: pattern, category, importance.
static PATTERNS: Lazy<Vec<(Regex, &'static str, i64)>> = Lazy::new(|| {
    let table: &[(String, &'static str, i64)] = &[
        (format!(r"meu nome é\s+{NAME}"), "nome", 3),
        (format!(r"chamo-me\s+{NAME}"), "nome", 3),
        (format!(r"\beu sou\s+{NAME}"), "nome", 3),
        (r"estou trabalhando (?:no|em)\s+(.+?)(?:\s+projeto)?$".into(), "trabalho", 2),
        (r"meu projeto (?:atual|principal) é\s+(.+)".into(), "projeto", 2),
        (r"estou desenvolvendo\s+(.+)".into(), "projeto", 2),
        (r"\b(?:eu|gosto de|prefiro)\s+(.+)".into(), "preferencia", 2),
        (r"\bodeio\s+(.+)".into(), "preferencia", 2),
        (r"não gosto de\s+(.+)".into(), "preferencia", 2),
        (r"\bmoro (?:em|na|no)\s+(.+)".into(), "localizacao", 2),
        (r"\btenho\s+(\d+)\s+anos".into(), "idade", 2),
        (r"\bestudo\s+(.+)".into(), "estudo", 2),
        (r"\busando\s+(.+)".into(), "tecnologia", 2),
        (r"programando (?:em|com)\s+(.+)".into(), "tecnologia", 2),
        (r"trabalhando com\s+(.+)".into(), "tecnologia", 2),
        (r"\bestou\s+(.+)".into(), "estado", 2),
        (r"\bestou (?:me sentindo|sentindo-me)\s+(.+)".into(), "estado", 2),
    ];
    table
        .iter()
        .map(|(pattern, category, importance)| {
            (
                Regex::new(&format!("(?i){pattern}")).expect("valid regex"),
                *category,
                *importance,
            )
        })
        .collect()
});

/// Find facts worth remembering in a piece of user input.
pub fn extract_user_info(text: &str) -> Vec<ExtractedFact> {
    let mut facts = Vec::new();
    for (re, category, importance) in PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let fact = m
                .as_str()
                .trim()
                .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ','))
                .trim();
            if !fact.is_empty() {
                facts.push(ExtractedFact {
                    fact: fact.to_string(),
                    category,
                    importance: *importance,
                });
            }
        }
    }
    facts
}

/// SQLite store shared by the agent and its actions.
pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
    pub fn open(path: &Path) -> MemoryResult<Self> {
        log::debug!("Opening memory database at {}", path.display());
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> MemoryResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> MemoryResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fact TEXT NOT NULL,
                category TEXT NOT NULL,
                importance INTEGER DEFAULT 1,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                last_accessed TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                access_count INTEGER DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS conversation_context (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                user_input TEXT NOT NULL,
                jarvis_response TEXT NOT NULL,
                context_data TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS user_preferences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                preference_key TEXT UNIQUE NOT NULL,
                preference_value TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_memory_category ON memory(category);
            CREATE INDEX IF NOT EXISTS idx_memory_importance ON memory(importance);
            CREATE INDEX IF NOT EXISTS idx_conversation_session ON conversation_context(session_id);
            CREATE INDEX IF NOT EXISTS idx_preferences_key ON user_preferences(preference_key);",
        )?;
        log::info!("Memory database ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MemoryResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| MemoryError::Poisoned)
    }

    /// Insert a fact, or refresh it when the same fact and category exist.
    pub fn store_fact(&self, fact: &str, category: &str, importance: i64) -> MemoryResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE memory
             SET importance = ?1, last_accessed = CURRENT_TIMESTAMP, access_count = access_count + 1
             WHERE fact = ?2 AND category = ?3",
            params![importance, fact, category],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO memory (fact, category, importance) VALUES (?1, ?2, ?3)",
                params![fact, category, importance],
            )?;
        }
        log::info!("Stored fact [{}] {}", category, fact);
        Ok(())
    }

    pub fn store_conversation(
        &self,
        session_id: &str,
        user_input: &str,
        jarvis_response: &str,
        context: Option<&JsonValue>,
    ) -> MemoryResult<()> {
        let context_json = context.map(serde_json::to_string).transpose()?;
        self.conn()?.execute(
            "INSERT INTO conversation_context (session_id, user_input, jarvis_response, context_data)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, user_input, jarvis_response, context_json],
        )?;
        Ok(())
    }

    /// Extract facts from user input and store each one.
    pub fn auto_extract_and_store(&self, text: &str) -> MemoryResult<Vec<ExtractedFact>> {
        let facts = extract_user_info(text);
        for f in &facts {
            self.store_fact(&f.fact, f.category, f.importance)?;
        }
        Ok(facts)
    }

    /// Facts containing `query`, most important and most recently used
    /// first. An empty query matches everything.
    pub fn search(&self, query: &str, category: Option<&str>, limit: usize) -> MemoryResult<Vec<Fact>> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = conn.prepare(
            "SELECT fact, category, importance, created_at, access_count
             FROM memory
             WHERE fact LIKE ?1 ESCAPE '\\' AND (?2 IS NULL OR category = ?2)
             ORDER BY importance DESC, last_accessed DESC, id DESC
             LIMIT ?3",
        )?;
        let facts = stmt
            .query_map(params![pattern, category, limit as i64], |row| {
                Ok(Fact {
                    fact: row.get(0)?,
                    category: row.get(1)?,
                    importance: row.get(2)?,
                    created_at: row.get(3)?,
                    access_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    /// Exchanges from the last `hours`, newest first: 10 for one session,
    /// 20 across all sessions.
    pub fn recent_context(&self, session_id: Option<&str>, hours: u32) -> MemoryResult<Vec<Exchange>> {
        let conn = self.conn()?;
        let since = format!("-{hours} hours");
        let limit: i64 = if session_id.is_some() { 10 } else { 20 };
        let mut stmt = conn.prepare(
            "SELECT user_input, jarvis_response, context_data, created_at
             FROM conversation_context
             WHERE created_at >= datetime('now', ?1) AND (?2 IS NULL OR session_id = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![since, session_id, limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(user_input, jarvis_response, context, created_at)| -> MemoryResult<Exchange> {
                let context = match context {
                    Some(raw) => serde_json::from_str(&raw)?,
                    None => JsonValue::Object(Default::default()),
                };
                Ok(Exchange {
                    user_input,
                    jarvis_response,
                    context,
                    created_at,
                })
            })
            .collect()
    }

    pub fn preferences(&self) -> MemoryResult<BTreeMap<String, String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT preference_key, preference_value FROM user_preferences")?;
        let prefs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(prefs)
    }

    pub fn preference(&self, key: &str) -> MemoryResult<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT preference_value FROM user_preferences WHERE preference_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Replace-on-write.
    pub fn set_preference(&self, key: &str, value: &str) -> MemoryResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO user_preferences (preference_key, preference_value)
             VALUES (?1, ?2)",
            params![key, value],
        )?;
        log::info!("Preference set: {} = {}", key, value);
        Ok(())
    }

    /// Memory section of the assistant prompt: top facts, the last three
    /// exchanges of the past six hours and every preference.
    pub fn context_for_prompt(&self, session_id: Option<&str>) -> MemoryResult<String> {
        let mut parts = Vec::new();

        let facts = self.search("", None, 5)?;
        if !facts.is_empty() {
            parts.push("INFORMAÇÕES IMPORTANTES DO USUÁRIO:".to_string());
            parts.extend(facts.iter().map(|f| format!("- {} ({})", f.fact, f.category)));
        }

        let recent = self.recent_context(session_id, 6)?;
        if !recent.is_empty() {
            parts.push("\nCONVERSA RECENTE:".to_string());
            for exchange in recent.iter().take(3) {
                parts.push(format!("Usuário: {}...", truncate(&exchange.user_input, 50)));
                parts.push(format!("Jarvis: {}...", truncate(&exchange.jarvis_response, 50)));
            }
        }

        let prefs = self.preferences()?;
        if !prefs.is_empty() {
            parts.push("\nPREFERÊNCIAS DO USUÁRIO:".to_string());
            parts.extend(prefs.iter().map(|(k, v)| format!("- {k}: {v}")));
        }

        Ok(parts.join("\n"))
    }

    /// Drop conversations older than `days` and old facts with importance
    /// below 3. Returns the number of rows removed.
    pub fn cleanup_old_data(&self, days: u32) -> MemoryResult<usize> {
        let conn = self.conn()?;
        let cutoff = format!("-{days} days");
        let conversations = conn.execute(
            "DELETE FROM conversation_context WHERE created_at < datetime('now', ?1)",
            params![cutoff],
        )?;
        let facts = conn.execute(
            "DELETE FROM memory WHERE importance < 3 AND created_at < datetime('now', ?1)",
            params![cutoff],
        )?;
        log::info!(
            "Memory cleanup removed {} conversations and {} facts",
            conversations,
            facts
        );
        Ok(conversations + facts)
    }

    pub fn stats(&self) -> MemoryResult<MemoryStats> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM memory GROUP BY category")?;
        let facts_by_category = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let total_conversations =
            conn.query_row("SELECT COUNT(*) FROM conversation_context", [], |row| row.get(0))?;
        let total_preferences =
            conn.query_row("SELECT COUNT(*) FROM user_preferences", [], |row| row.get(0))?;
        Ok(MemoryStats {
            facts_by_category,
            total_conversations,
            total_preferences,
        })
    }

    #[cfg(test)]
    fn execute(&self, sql: &str) {
        self.conn().unwrap().execute_batch(sql).unwrap();
    }
}

/// Make `%`, `_` and the escape character itself match literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(text: &str) -> Vec<(&'static str, String)> {
        extract_user_info(text)
            .into_iter()
            .map(|f| (f.category, f.fact))
            .collect()
    }

    #[test]
    fn extracts_name_age_and_place() {
        let facts = categories("Meu nome é Ana");
        assert_eq!(facts, vec![("nome", "Ana".to_string())]);

        let facts = categories("tenho 25 anos e moro em Lisboa.");
        assert!(facts.contains(&("idade", "25".to_string())));
        assert!(facts.contains(&("localizacao", "Lisboa".to_string())));
    }

    #[test]
    fn work_pattern_takes_whole_phrase() {
        let facts = categories("estou trabalhando no jarvis projeto");
        assert!(facts.contains(&("trabalho", "jarvis".to_string())));
        let facts = categories("estou trabalhando em um compilador");
        assert!(facts.contains(&("trabalho", "um compilador".to_string())));
    }

    #[test]
    fn meu_does_not_count_as_eu() {
        assert!(categories("meu computador travou")
            .iter()
            .all(|(c, _)| *c != "preferencia"));
        assert!(categories("prefiro Rust")
            .contains(&("preferencia", "Rust".to_string())));
    }

    #[test]
    fn storing_twice_refreshes_instead_of_duplicating() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_fact("Ana", "nome", 2).unwrap();
        store.store_fact("Ana", "nome", 3).unwrap();
        let facts = store.search("Ana", None, 10).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].importance, 3);
        assert_eq!(facts[0].access_count, 2);
    }

    #[test]
    fn search_orders_by_importance() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_fact("Rust", "tecnologia", 2).unwrap();
        store.store_fact("Ana", "nome", 3).unwrap();
        store.store_fact("cansado", "estado", 1).unwrap();

        let all = store.search("", None, 10).unwrap();
        let names: Vec<_> = all.iter().map(|f| f.fact.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Rust", "cansado"]);

        let only = store.search("", Some("tecnologia"), 10).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(store.search("", None, 2).unwrap().len(), 2);
    }

    #[test]
    fn search_terms_are_literal() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_fact("cobertura de 100% nos testes", "projeto", 2).unwrap();
        store.store_fact("gosto de snake_case", "preferencia", 2).unwrap();
        store.store_fact("gosto de café", "preferencia", 2).unwrap();

        assert_eq!(store.search("%", None, 10).unwrap().len(), 1);
        // Unescaped, "e_c" would also match the "e c" in "de café".
        assert_eq!(store.search("e_c", None, 10).unwrap().len(), 1);
        assert_eq!(store.search("_", None, 10).unwrap()[0].fact, "gosto de snake_case");
    }

    #[test]
    fn preferences_replace_on_write() {
        let store = MemoryStore::in_memory().unwrap();
        store.set_preference("linguagem", "Python").unwrap();
        store.set_preference("linguagem", "Rust").unwrap();
        assert_eq!(store.preference("linguagem").unwrap().as_deref(), Some("Rust"));
        assert_eq!(store.preferences().unwrap().len(), 1);
        assert_eq!(store.preference("tema").unwrap(), None);
    }

    #[test]
    fn recent_context_limits_per_session() {
        let store = MemoryStore::in_memory().unwrap();
        let ctx = serde_json::json!({"memory_used": true});
        for i in 0..12 {
            store
                .store_conversation("s1", &format!("pergunta {i}"), "resposta", Some(&ctx))
                .unwrap();
        }
        for _ in 0..12 {
            store.store_conversation("s2", "outra", "resposta", None).unwrap();
        }
        let s1 = store.recent_context(Some("s1"), 24).unwrap();
        assert_eq!(s1.len(), 10);
        assert_eq!(s1[0].user_input, "pergunta 11");
        assert_eq!(s1[0].context["memory_used"], true);
        assert_eq!(store.recent_context(None, 24).unwrap().len(), 20);
    }

    #[test]
    fn prompt_context_sections() {
        let store = MemoryStore::in_memory().unwrap();
        assert_eq!(store.context_for_prompt(None).unwrap(), "");

        store.store_fact("Ana", "nome", 3).unwrap();
        store
            .store_conversation("s", &"x".repeat(80), "ok", None)
            .unwrap();
        store.set_preference("tema", "escuro").unwrap();

        let ctx = store.context_for_prompt(Some("s")).unwrap();
        assert!(ctx.starts_with("INFORMAÇÕES IMPORTANTES DO USUÁRIO:\n- Ana (nome)"));
        assert!(ctx.contains(&format!("Usuário: {}...", "x".repeat(50))));
        assert!(ctx.contains("- tema: escuro"));
    }

    #[test]
    fn cleanup_keeps_important_and_recent() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_fact("Ana", "nome", 3).unwrap();
        store.store_fact("velho", "estado", 2).unwrap();
        store.store_fact("novo", "estado", 2).unwrap();
        store.store_conversation("s", "antiga", "r", None).unwrap();
        store.store_conversation("s", "nova", "r", None).unwrap();
        store.execute(
            "UPDATE memory SET created_at = datetime('now', '-40 days') WHERE fact IN ('Ana', 'velho');
             UPDATE conversation_context SET created_at = datetime('now', '-40 days') WHERE user_input = 'antiga';",
        );

        assert_eq!(store.cleanup_old_data(30).unwrap(), 2);
        let facts: Vec<_> = store
            .search("", None, 10)
            .unwrap()
            .into_iter()
            .map(|f| f.fact)
            .collect();
        assert!(facts.contains(&"Ana".to_string()));
        assert!(facts.contains(&"novo".to_string()));
        assert!(!facts.contains(&"velho".to_string()));
        assert_eq!(store.stats().unwrap().total_conversations, 1);
    }

    #[test]
    fn stats_group_by_category() {
        let store = MemoryStore::in_memory().unwrap();
        store.auto_extract_and_store("meu nome é Ana").unwrap();
        store.store_fact("Rust", "tecnologia", 2).unwrap();
        store.set_preference("a", "b").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.facts_by_category.get("nome"), Some(&1));
        assert_eq!(stats.facts_by_category.get("tecnologia"), Some(&1));
        assert_eq!(stats.total_preferences, 1);
    }
}
