//! Long-term tips: a JSON file in the workspace holding user tips and the
//! analyses produced by the assisted debugger.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::codegen::truncate;

pub const TIPS_FILE: &str = "memoria_jarvis.json";

const MAX_ERRORS: usize = 50;
const MAX_TIPS: usize = 100;
const MAX_ANALYSIS_CHARS: usize = 500;
const MAX_RESULTS: usize = 5;
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TipsData {
    #[serde(default)]
    erros_resolvidos: Vec<ResolvedError>,
    #[serde(default)]
    dicas_importantes: Vec<Tip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResolvedError {
    data: String,
    tipo: String,
    analise: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tip {
    data: String,
    conteudo: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    categoria: String,
}

/// The tips file of one workspace.
#[derive(Debug, Clone)]
pub struct TipsBook {
    path: PathBuf,
}

impl TipsBook {
    pub fn new(workspace: &Path) -> Self {
        Self {
            path: workspace.join(TIPS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<TipsData> {
        if !self.path.exists() {
            return Ok(TipsData::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", self.path.display()))
    }

    fn save(&self, data: &TipsData) -> Result<()> {
        let json = serde_json::to_string_pretty(data).context("failed to serialise tips")?;
        fs::write(&self.path, json).with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Store a user tip; the oldest are dropped past the cap.
    pub fn save_tip(&self, tip: &str) -> Result<()> {
        let mut data = self.load()?;
        data.dicas_importantes.push(Tip {
            data: Local::now().to_rfc3339(),
            conteudo: tip.to_string(),
            tags: vec!["dica".into(), "importante".into(), "usuario".into()],
            categoria: "geral".into(),
        });
        trim_front(&mut data.dicas_importantes, MAX_TIPS);
        self.save(&data)?;
        log::info!("Tip saved to {}", self.path.display());
        Ok(())
    }

    /// Store a debugger analysis.
    pub fn save_resolved_error(&self, analysis: &str) -> Result<()> {
        let mut data = self.load()?;
        let analise = if analysis.chars().count() > MAX_ANALYSIS_CHARS {
            format!("{}...", truncate(analysis, MAX_ANALYSIS_CHARS))
        } else {
            analysis.to_string()
        };
        data.erros_resolvidos.push(ResolvedError {
            data: Local::now().to_rfc3339(),
            tipo: "debugging".into(),
            analise,
            tags: vec!["erro".into(), "debug".into(), "python".into(), "traceback".into()],
        });
        trim_front(&mut data.erros_resolvidos, MAX_ERRORS);
        self.save(&data)?;
        log::info!("Resolved error saved to {}", self.path.display());
        Ok(())
    }

    /// Search content and tags; returns the reply text.
    pub fn search(&self, term: &str) -> Result<String> {
        if !self.path.exists() {
            return Ok(
                "Ainda não tenho dicas salvas na memória, mestre. Vamos construir esse conhecimento juntos!"
                    .to_string(),
            );
        }
        let data = self.load()?;
        let term = term.to_lowercase();
        let hit = |content: &str, tags: &[String]| {
            content.to_lowercase().contains(&term) || tags.iter().any(|t| t.to_lowercase().contains(&term))
        };

        let mut results: Vec<(&str, &str, &str, &[String])> = Vec::new();
        for e in &data.erros_resolvidos {
            if hit(&e.analise, &e.tags) {
                results.push(("Erro Resolvido", e.data.as_str(), e.analise.as_str(), e.tags.as_slice()));
            }
        }
        for t in &data.dicas_importantes {
            if hit(&t.conteudo, &t.tags) {
                results.push(("Dica Importante", t.data.as_str(), t.conteudo.as_str(), t.tags.as_slice()));
            }
        }

        if results.is_empty() {
            return Ok(format!(
                "Não encontrei dicas sobre '{term}' na memória, mestre. Quer que eu salve esta informação para futuras consultas?"
            ));
        }

        let mut reply = format!("🧠 ENCONTRADOS {} RESULTADOS NA MEMÓRIA:\n\n", results.len());
        for (i, (kind, date, content, tags)) in results.iter().take(MAX_RESULTS).enumerate() {
            reply.push_str(&format!("📌 {}. {}\n", i + 1, kind));
            reply.push_str(&format!("   📅 Data: {}\n", truncate(date, 10)));
            reply.push_str(&format!("   📝 Conteúdo: {}...\n", truncate(content, PREVIEW_CHARS)));
            reply.push_str(&format!("   🏷️ Tags: {}\n\n", tags.join(", ")));
        }
        if results.len() > MAX_RESULTS {
            reply.push_str(&format!("... e mais {} resultados.\n", results.len() - MAX_RESULTS));
        }
        reply.push_str("💡 Dica: Use 'salvar dica: [sua dica]' para guardar informações importantes!");
        Ok(reply)
    }
}

fn trim_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let book = TipsBook::new(dir.path());
        assert!(book.search("python").unwrap().starts_with("Ainda não tenho dicas"));
    }

    #[test]
    fn saved_tips_are_found_by_content_and_tag() {
        let dir = tempfile::tempdir().unwrap();
        let book = TipsBook::new(dir.path());
        book.save_tip("Sempre use Result em Rust").unwrap();
        book.save_tip("Prefira iteradores").unwrap();

        let reply = book.search("rust").unwrap();
        assert!(reply.starts_with("🧠 ENCONTRADOS 1 RESULTADOS"));
        assert!(reply.contains("Dica Importante"));

        let by_tag = book.search("usuario").unwrap();
        assert!(by_tag.starts_with("🧠 ENCONTRADOS 2 RESULTADOS"));

        assert!(book.search("haskell").unwrap().starts_with("Não encontrei dicas sobre 'haskell'"));
    }

    #[test]
    fn tips_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let book = TipsBook::new(dir.path());
        for i in 0..(MAX_TIPS + 3) {
            book.save_tip(&format!("dica {i}")).unwrap();
        }
        let data = book.load().unwrap();
        assert_eq!(data.dicas_importantes.len(), MAX_TIPS);
        assert_eq!(data.dicas_importantes[0].conteudo, "dica 3");

        let reply = book.search("dica").unwrap();
        assert!(reply.contains(&format!("... e mais {} resultados.", MAX_TIPS - MAX_RESULTS)));
    }

    #[test]
    fn long_analyses_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let book = TipsBook::new(dir.path());
        book.save_resolved_error(&"é".repeat(800)).unwrap();
        let data = book.load().unwrap();
        let analise = &data.erros_resolvidos[0].analise;
        assert_eq!(analise.chars().count(), MAX_ANALYSIS_CHARS + 3);
        assert!(analise.ends_with("..."));
        assert!(book.search("traceback").unwrap().contains("Erro Resolvido"));
    }
}
