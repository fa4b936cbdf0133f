//! Screen capture and the prompts that go with it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::desktop::{Desktop, Key};
use crate::router::contains_word;

pub const SCREEN_PROMPT: &str = "Analise esta captura de tela do ambiente de desenvolvimento e identifique:

1. **Erros visíveis**: Mensagens de erro, warnings, problemas de sintaxe
2. **Problemas de código**: Bugs lógicos, variáveis não definidas, etc.
3. **Sugestões de melhoria**: Otimizações, boas práticas
4. **Correções específicas**: Código exato para corrigir problemas encontrados

Se encontrar erros de código, forneça o código corrigido completo.
Seja específico e prático, como um mentor de programação.";

pub const DEBUGGER_PROMPT: &str = "Você é um especialista em debugging de código. Analise esta captura de tela e:

1. **IDENTIFIQUE O ERRO**: Localize o traceback/mensagem de erro
2. **DIAGNÓSTICO**: Explique a causa raiz do erro de forma clara
3. **SOLUÇÃO**: Forneça o código exato para corrigir o problema
4. **PREVENÇÃO**: Dê dicas para evitar erros similares no futuro

**IMPORTANTE**:
- Seja específico e prático
- Forneça o código corrigido completo
- Explique de forma didática, como um mentor
- Foque no traceback visível (SyntaxError, NameError, TypeError, etc.)

Analise a imagem e ajude o programador a resolver este erro.";

/// Directory holding in-flight screenshots.
pub fn vision_dir() -> PathBuf {
    std::env::temp_dir().join("jarvis_vision")
}

/// A screenshot on disk. The file is removed when the capture is dropped,
/// whether or not the analysis succeeded.
#[derive(Debug)]
pub struct Capture {
    path: PathBuf,
}

impl Capture {
    pub fn take(desktop: &dyn Desktop) -> Result<Self> {
        let dir = vision_dir();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("screen_{}.png", Local::now().format("%Y%m%d_%H%M%S_%3f")));
        let capture = Self { path };
        desktop.screenshot(&capture.path)?;
        log::debug!("Screen captured to {}", capture.path.display());
        Ok(capture)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn png(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("failed to read {}", self.path.display()))
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if self.path.exists() {
            match fs::remove_file(&self.path) {
                Ok(()) => log::debug!("Removed {}", self.path.display()),
                Err(e) => log::warn!("Failed to remove {}: {e}", self.path.display()),
            }
        }
    }
}

/// Capture the screen and return the PNG bytes. The file on disk is gone
/// by the time this returns.
pub fn capture_png(desktop: &dyn Desktop) -> Result<Vec<u8>> {
    let capture = Capture::take(desktop)?;
    capture.png()
}

/// Free-form questions that should carry a screenshot to the model.
pub fn is_visual_question(command: &str) -> bool {
    let lower = command.to_lowercase();
    ["olhe", "veja"].iter().any(|w| contains_word(&lower, w))
        || ["analise a tela", "olhar tela", "ver tela"]
            .iter()
            .any(|p| lower.contains(p))
}

/// The last fenced block of an analysis, usually the corrected version.
pub fn last_code_block(text: &str) -> Option<String> {
    static BLOCK: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?s)```(?:python|javascript|html|css|json|xml|rust|java|cpp|c|go|cs)?[ \t]*\n(.*?)\n```")
            .expect("valid regex")
    });
    BLOCK
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .last()
        .map(|m| m.as_str().trim().to_string())
}

/// When the analysis says it corrected something and carries code, paste
/// that code over the focused editor. Returns true when applied.
pub fn apply_fix(desktop: &dyn Desktop, analysis: &str) -> Result<bool> {
    if !(analysis.contains("```") && analysis.to_lowercase().contains("corrigido")) {
        return Ok(false);
    }
    let Some(code) = last_code_block(analysis) else {
        log::info!("Analysis mentions a fix but has no code block");
        return Ok(false);
    };
    desktop.set_clipboard(&code)?;
    std::thread::sleep(std::time::Duration::from_millis(500));
    desktop.hotkey(&[Key::Ctrl, Key::Char('a')])?;
    desktop.hotkey(&[Key::Ctrl, Key::Char('v')])?;
    log::info!("Corrected code applied to the editor");
    Ok(true)
}

pub fn format_screen_analysis(analysis: &str) -> String {
    let rule = "=".repeat(60);
    format!(
        "🔍 ANÁLISE DE TELA - J.A.R.V.I.S.\n\n{rule}\n\n{analysis}\n\n{rule}\n\n💡 Dica: Mantenha seu ambiente de desenvolvimento organizado!"
    )
}

pub fn format_debugger_analysis(analysis: &str) -> String {
    let rule = "=".repeat(60);
    format!(
        "🐛 ANÁLISE DE ERRO - DEBUGGER ASSISTIDO\n\n{rule}\n\n{analysis}\n\n{rule}\n\n\
💡 Dicas Rápidas:\n\
• Verifique a sintaxe linha por linha\n\
• Use print() para debugar variáveis\n\
• Teste pequenos trechos isoladamente\n\
• Consulte a documentação quando necessário\n\n\
🔧 Se o erro persistir, peça para \"olhe a tela\" para análise mais detalhada."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::RecordingDesktop;

    #[test]
    fn capture_file_is_removed_on_drop() {
        let desktop = RecordingDesktop::new();
        let capture = Capture::take(&desktop).unwrap();
        let path = capture.path().to_path_buf();
        assert!(path.is_file());
        assert!(!capture.png().unwrap().is_empty());
        drop(capture);
        assert!(!path.exists());
    }

    #[test]
    fn failed_capture_leaves_nothing() {
        let desktop = RecordingDesktop::without_screen();
        assert!(capture_png(&desktop).is_err());
        assert_eq!(capture_png(&RecordingDesktop::new()).unwrap(), crate::desktop::FAKE_PNG);
    }

    #[test]
    fn visual_questions() {
        assert!(is_visual_question("Jarvis, olhe isso aqui"));
        assert!(is_visual_question("pode ver tela?"));
        assert!(!is_visual_question("desenvolve um app"));
    }

    #[test]
    fn last_block_wins() {
        let text = "Erro:\n```python\nprint(x\n```\nCorrigido:\n```python\nprint(x)\n```\n";
        assert_eq!(last_code_block(text).as_deref(), Some("print(x)"));
        assert_eq!(last_code_block("sem código"), None);
    }

    #[test]
    fn fix_is_pasted_only_when_corrected() {
        let desktop = RecordingDesktop::new();
        assert!(!apply_fix(&desktop, "```python\nx = 1\n```").unwrap());
        assert!(desktop.events().is_empty());

        let analysis = "Código corrigido:\n```python\nx = 1\n```";
        assert!(apply_fix(&desktop, analysis).unwrap());
        assert_eq!(desktop.clipboard().unwrap(), "x = 1");
        assert_eq!(desktop.events(), vec!["copy", "hotkey ctrl+a", "hotkey ctrl+v"]);
    }
}
