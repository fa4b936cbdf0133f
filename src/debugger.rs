//! Generate, run, fix: the retry loop behind "crie um programa em ...".
//!
//! Each attempt compiles and runs the project. On failure the error output
//! is classified, the model is asked for a corrected main file, the fix is
//! validated and written back, and the next attempt starts. Progress goes
//! out through the [`Announcer`] so the voice front-end can speak it while
//! the loop keeps working.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::codegen::{self, clean_code, compile_and_run, truncate, write_main, LanguageSpec, RunResult};
use crate::llm::LanguageModel;
use crate::worker::Announcer;

/// How bad an error looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    High,
    Medium,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => f.write_str("high"),
            Severity::Medium => f.write_str("medium"),
        }
    }
}

/// Classified error output of a failed run.
#[derive(Debug, Clone)]
pub struct ErrorAnalysis {
    pub language: String,
    /// Pattern name such as `syntax` or `borrow`; `unknown` when nothing matched.
    pub error_type: String,
    /// The matched text, or the first line of output.
    pub message: String,
    pub line: Option<u32>,
    pub severity: Severity,
}

type PatternTable = Vec<(&'static str, Regex)>;

fn table(patterns: &[(&'static str, &str)]) -> PatternTable {
    patterns
        .iter()
        .map(|(name, p)| (*name, Regex::new(&format!("(?i){p}")).expect("valid regex")))
        .collect()
}

/// Per-language patterns, tried in order; the first match wins.
static PATTERNS: Lazy<Vec<(&'static str, PatternTable)>> = Lazy::new(|| {
    vec![
        (
            "python",
            table(&[
                ("syntax", r#"(?s)File ".*?", line (\d+).*?SyntaxError: ([^\n]+)"#),
                ("name", r"NameError: name '(.+)' is not defined"),
                ("type", r"TypeError: (.+)"),
                ("import", r"ModuleNotFoundError: No module named '(.+)'"),
                ("index", r"IndexError: (.+)"),
                ("key", r"KeyError: (.+)"),
                ("value", r"ValueError: (.+)"),
                ("attribute", r"AttributeError: (.+)"),
            ]),
        ),
        (
            "cpp",
            table(&[
                ("syntax", r"error: expected (.+) before"),
                ("compile", r"error: (.+)"),
                ("linker", r"undefined reference to"),
                ("include", r"fatal error: (.+): No such file or directory"),
                ("type", r"error: invalid conversion from"),
                ("declaration", r"error: '(.+)' was not declared"),
            ]),
        ),
        (
            "javascript",
            table(&[
                ("syntax", r"SyntaxError: (.+)"),
                ("reference", r"ReferenceError: (.+) is not defined"),
                ("type", r"TypeError: (.+)"),
                ("module", r"Error: Cannot find module"),
                ("json", r"SyntaxError: Unexpected token"),
            ]),
        ),
        (
            "java",
            table(&[
                ("compile", r"(.+)\.java:(\d+): error: (.+)"),
                ("class", r"java\.lang\.ClassNotFoundException: (.+)"),
                ("null", r"NullPointerException"),
                ("array", r"ArrayIndexOutOfBoundsException"),
                ("cast", r"ClassCastException"),
            ]),
        ),
        (
            "rust",
            table(&[
                ("borrow", r"error\[E0308\]: (.+)"),
                ("move", r"error\[E0382\]: (.+)"),
                ("lifetime", r"error\[E0495\]: (.+)"),
                ("compile", r"error\[E\d+\]: (.+)"),
            ]),
        ),
        (
            "go",
            table(&[
                ("syntax", r"syntax error: (.+)"),
                ("undefined", r"undefined: (.+)"),
                ("import", r"cannot find package"),
                ("type", r"cannot use (.+) as type"),
            ]),
        ),
        (
            "c",
            table(&[
                ("compile", r"error: (.+)"),
                ("warning", r"warning: (.+)"),
                ("undefined", r"undefined reference to"),
                ("conflict", r"conflicting types for"),
            ]),
        ),
        (
            "cs",
            table(&[
                ("missing", r"CS0103: The name '(.+)' does not exist"),
                ("type", r"CS0029: Cannot implicitly convert"),
                ("compile", r"CS\d+: (.+)"),
            ]),
        ),
    ]
});

fn severity(error_type: &str) -> Severity {
    match error_type {
        "syntax" | "compile" | "linker" | "undefined" => Severity::High,
        _ => Severity::Medium,
    }
}

/// Classify the error output of a run.
pub fn analyze_error(output: &str, language: &str) -> ErrorAnalysis {
    let mut analysis = ErrorAnalysis {
        language: language.to_string(),
        error_type: "unknown".to_string(),
        message: output.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim().to_string(),
        line: None,
        severity: Severity::Medium,
    };

    let patterns = PATTERNS.iter().find(|(lang, _)| *lang == language);
    if let Some((_, patterns)) = patterns {
        for (name, re) in patterns {
            if let Some(caps) = re.captures(output) {
                analysis.error_type = name.to_string();
                analysis.message = caps[0].trim().to_string();
                analysis.line = match (language, *name) {
                    ("python", "syntax") => caps.get(1),
                    ("java", "compile") => caps.get(2),
                    _ => None,
                }
                .and_then(|m| m.as_str().parse().ok());
                break;
            }
        }
    }
    analysis.severity = severity(&analysis.error_type);
    analysis
}

/// Result of checking a proposed fix.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub valid: bool,
    pub reason: String,
    pub warnings: Vec<String>,
}

/// Reject empty fixes; warn about fixes that rewrite most of the program or
/// still look syntactically broken.
pub fn validate_fix(fixed: &str, original: &str, analysis: &ErrorAnalysis) -> Validation {
    if fixed.trim().is_empty() {
        return Validation {
            valid: false,
            reason: "Código corrigido está vazio".to_string(),
            warnings: Vec::new(),
        };
    }

    let mut warnings = Vec::new();
    let original_lines = original.lines().count() as f64;
    let fixed_lines = fixed.lines().count() as f64;
    if (original_lines - fixed_lines).abs() > original_lines * 0.5 {
        warnings.push("Correção alterou significativamente o código original".to_string());
    }
    if analysis.language == "python" && analysis.error_type == "syntax" && has_dangling_block(fixed) {
        warnings.push("Ainda podem existir erros de sintaxe".to_string());
    }

    Validation {
        valid: true,
        reason: String::new(),
        warnings,
    }
}

/// A line opening a Python block (`...:`) with no indented body after it.
fn has_dangling_block(code: &str) -> bool {
    let lines: Vec<&str> = code.lines().filter(|l| !l.trim().is_empty()).collect();
    let indent = |l: &str| l.len() - l.trim_start().len();
    lines.iter().enumerate().any(|(i, line)| {
        let trimmed = line.trim_end();
        if !trimmed.ends_with(':') || trimmed.trim_start().starts_with('#') {
            return false;
        }
        match lines.get(i + 1) {
            Some(next) => indent(next) <= indent(line),
            None => true,
        }
    })
}

fn fix_prompt(analysis: &ErrorAnalysis, error_output: &str, code: &str, task: &str) -> String {
    let lang = analysis.language.to_uppercase();
    format!(
        "Você é um especialista em debugging e programação. Analise o seguinte erro e forneça uma solução detalhada:\n\n\
LINGUAGEM: {lang}\n\
TIPO DE ERRO: {}\n\
SEVERIDADE: {}\n\
MENSAGEM DE ERRO: {}\n\n\
TAREFA ORIGINAL: {task}\n\n\
CÓDIGO COM ERRO:\n```\n{code}\n```\n\n\
SAÍDA COMPLETA DO ERRO:\n```\n{}\n```\n\n\
IMPORTANTE:\n\
- Corrija APENAS o erro específico, não altere outra lógica\n\
- Mantenha a estrutura original do código\n\
- Use boas práticas para {lang}\n\
- Retorne APENAS o código corrigido, sem explicações e sem marcadores como ```\n\n\
CÓDIGO CORRIGIDO:",
        analysis.error_type,
        analysis.severity,
        analysis.message,
        truncate(error_output, 2000),
    )
}

/// One run of the project.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub number: u32,
    pub result: RunResult,
    pub at: DateTime<Local>,
}

/// Everything that happened in one session.
#[derive(Debug, Clone)]
pub struct Session {
    pub language: String,
    pub task: String,
    pub started: DateTime<Local>,
    pub attempts: Vec<Attempt>,
    pub final_code: String,
    pub report: Option<PathBuf>,
}

impl Session {
    pub fn success(&self) -> bool {
        self.attempts.last().is_some_and(|a| a.result.success)
    }

    pub fn last_result(&self) -> Option<&RunResult> {
        self.attempts.last().map(|a| &a.result)
    }

    fn report_text(&self) -> String {
        let mut report = format!(
            "RELATÓRIO DE DEBUG - JARVIS\n{}\n\nDATA/HORA: {}\nLINGUAGEM: {}\nTAREFA: {}\nRESULTADO FINAL: {}\n\nTENTATIVAS:\n{}\n",
            "=".repeat(50),
            self.started.format("%Y-%m-%d %H:%M:%S"),
            self.language.to_uppercase(),
            self.task,
            if self.success() { "SUCCESS" } else { "FAILED" },
            "-".repeat(30),
        );
        for attempt in &self.attempts {
            let r = &attempt.result;
            let status = if r.success { "✅ SUCESSO" } else { "❌ FALHA" };
            let stdout = if r.stdout.is_empty() { "Nenhuma" } else { truncate(&r.stdout, 100) };
            let stderr = if r.stderr.is_empty() { "Nenhum" } else { truncate(&r.stderr, 200) };
            report.push_str(&format!(
                "\nTENTATIVA {}:\n- Status: {status}\n- Timestamp: {}\n- Saída: {stdout}\n- Erro: {stderr}\n",
                attempt.number,
                attempt.at.format("%H:%M:%S"),
            ));
        }
        report
    }
}

/// Runs sessions for one workspace.
pub struct Debugger {
    model: Option<Arc<dyn LanguageModel>>,
    max_attempts: u32,
    log_dir: PathBuf,
}

impl Debugger {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, max_attempts: u32, workspace: &Path) -> Self {
        Self {
            model,
            max_attempts: max_attempts.max(1),
            log_dir: workspace.join("jarvis_logs"),
        }
    }

    /// Ask the model for a corrected main file. The error string is the
    /// reason no usable fix came back.
    async fn attempt_fix(
        &self,
        spec: &LanguageSpec,
        error_output: &str,
        code: &str,
        task: &str,
    ) -> std::result::Result<String, String> {
        let analysis = analyze_error(error_output, spec.name);
        log::info!(
            "Fixing {} error '{}' ({}) line {:?}",
            analysis.language,
            analysis.error_type,
            analysis.severity,
            analysis.line
        );
        let Some(model) = &self.model else {
            return Err("API não disponível para pesquisa de solução, mestre.".to_string());
        };
        let answer = model
            .generate(&fix_prompt(&analysis, error_output, code, task))
            .await
            .map_err(|e| {
                log::error!("Fix request failed: {e}");
                format!("Erro ao pesquisar solução: {e}")
            })?;
        let fixed = clean_code(&answer, spec.code_starts);
        if fixed.trim().is_empty() {
            return Err("Não foi possível gerar código corrigido, mestre.".to_string());
        }
        let validation = validate_fix(&fixed, code, &analysis);
        if !validation.valid {
            log::warn!("Rejected fix: {}", validation.reason);
            return Err(format!("Correção gerada é inválida: {}", validation.reason));
        }
        for warning in &validation.warnings {
            log::warn!("Fix accepted with warning: {warning}");
        }
        Ok(fixed)
    }

    /// Run the project, fixing and retrying until it succeeds or the
    /// attempts run out. The report is written either way.
    pub async fn run_session(
        &self,
        project: &Path,
        spec: &'static LanguageSpec,
        code: &str,
        task: &str,
        announcer: &Announcer,
    ) -> Session {
        log::info!("Debug session for {} in {}", spec.name, project.display());
        announcer.announce("Iniciando modo de depuração avançada, mestre.");

        let mut session = Session {
            language: spec.name.to_string(),
            task: task.to_string(),
            started: Local::now(),
            attempts: Vec::new(),
            final_code: code.to_string(),
            report: None,
        };

        for number in 1..=self.max_attempts {
            log::info!("Attempt {number}/{}", self.max_attempts);
            if number > 1 {
                announcer.announce(format!(
                    "Analisando erro, tentativa {number} de {}.",
                    self.max_attempts
                ));
            }

            let dir = project.to_path_buf();
            let result = tokio::task::spawn_blocking(move || compile_and_run(&dir, spec))
                .await
                .unwrap_or_else(|e| RunResult {
                    stderr: format!("Erro na execução: {e}"),
                    ..RunResult::default()
                });
            let success = result.success;
            let error_output = result.error_output().to_string();
            session.attempts.push(Attempt {
                number,
                result,
                at: Local::now(),
            });

            if success {
                if number > 1 {
                    announcer.announce("Código corrigido e executado com sucesso, mestre!");
                }
                break;
            }
            if number == self.max_attempts {
                announcer.announce("Número máximo de tentativas atingido, mestre.");
                break;
            }

            announcer.announce("Erro detectado. Analisando e corrigindo...");
            match self
                .attempt_fix(spec, &error_output, &session.final_code, task)
                .await
            {
                Ok(fixed) => {
                    if let Err(e) = write_main(project, spec, &fixed) {
                        log::error!("Failed to save fixed code: {e:#}");
                        break;
                    }
                    session.final_code = fixed;
                    announcer.announce("Código corrigido. Testando novamente...");
                }
                Err(reason) => {
                    log::error!("No fix: {reason}");
                    announcer.announce(format!("Não foi possível corrigir o erro: {reason}"));
                    break;
                }
            }
        }

        match self.write_report(&session) {
            Ok(path) => session.report = Some(path),
            Err(e) => log::error!("Failed to write debug report: {e:#}"),
        }
        session
    }

    fn write_report(&self, session: &Session) -> Result<PathBuf> {
        fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("failed to create {}", self.log_dir.display()))?;
        let path = self
            .log_dir
            .join(format!("debug_report_{}.txt", Local::now().format("%Y%m%d_%H%M%S")));
        fs::write(&path, session.report_text())
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("Debug report written to {}", path.display());
        Ok(path)
    }
}

/// Reply for a finished session.
pub fn summary(session: &Session, project_name: &str, spec: &LanguageSpec) -> String {
    let attempts = session.attempts.len() as u32;
    let lang = spec.name.to_uppercase();
    let Some(result) = session.last_result() else {
        return format!("Projeto '{project_name}' criado, mas não foi executado, mestre.");
    };
    let mut message = match (result.success, attempts) {
        (true, 1) => codegen::format_result(result, project_name, spec, attempts),
        (true, _) => format!(
            "✅ Projeto '{project_name}' em {lang} executado com sucesso após {attempts} tentativas, mestre."
        ),
        (false, _) => {
            let mut message = format!(
                "Não foi possível executar o projeto '{project_name}' após {attempts} tentativas, mestre."
            );
            let error = result.error_output().trim();
            if !error.is_empty() {
                message.push_str(&format!(" Último erro: {}", truncate(error, 200)));
            }
            message
        }
    };
    if let (false, Some(report)) = (result.success, &session.report) {
        message.push_str(&format!(" Relatório de debug salvo em: {}", report.display()));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::language;
    use crate::llm::ScriptedModel;

    #[test]
    fn python_syntax_error_with_line() {
        let output = "  File \"/tmp/p/main.py\", line 3\n    print(x\n         ^\nSyntaxError: '(' was never closed\n";
        let analysis = analyze_error(output, "python");
        assert_eq!(analysis.error_type, "syntax");
        assert_eq!(analysis.line, Some(3));
        assert_eq!(analysis.severity, Severity::High);
    }

    #[test]
    fn ordered_patterns() {
        let analysis = analyze_error("NameError: name 'foo' is not defined", "python");
        assert_eq!(analysis.error_type, "name");
        assert_eq!(analysis.severity, Severity::Medium);

        let analysis = analyze_error("Main.java:7: error: ';' expected", "java");
        assert_eq!(analysis.error_type, "compile");
        assert_eq!(analysis.line, Some(7));

        let analysis = analyze_error("error[E0382]: borrow of moved value: `v`", "rust");
        assert_eq!(analysis.error_type, "move");

        let analysis = analyze_error("main.go:5:2: undefined: fmtx", "go");
        assert_eq!(analysis.error_type, "undefined");
        assert_eq!(analysis.severity, Severity::High);
    }

    #[test]
    fn unknown_errors_keep_first_line() {
        let analysis = analyze_error("\nalgo deu errado\noutra linha", "python");
        assert_eq!(analysis.error_type, "unknown");
        assert_eq!(analysis.message, "algo deu errado");
        assert!(analyze_error("whatever", "cobol").line.is_none());
    }

    #[test]
    fn validation_rules() {
        let syntax = analyze_error("File \"m.py\", line 1\nSyntaxError: bad", "python");
        assert!(!validate_fix("  \n", "print(1)", &syntax).valid);

        let ok = validate_fix("def f():\n    return 1\n", "def f()\n    return 1\n", &syntax);
        assert!(ok.valid);
        assert!(ok.warnings.is_empty());

        let dangling = validate_fix("if x:\nprint(1)\n", "if x\n    print(1)\n", &syntax);
        assert!(dangling.valid);
        assert_eq!(dangling.warnings, vec!["Ainda podem existir erros de sintaxe"]);

        let rewrite = validate_fix("a\nb\nc\nd\ne\n", "a\nb\n", &syntax);
        assert!(rewrite.warnings[0].starts_with("Correção alterou"));
    }

    #[tokio::test]
    async fn session_without_model_stops_after_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let spec = language("python").unwrap();
        let code = "print(\n";
        write_main(dir.path(), spec, code).unwrap();

        let (announcer, mut rx) = Announcer::channel(16);
        let debugger = Debugger::new(None, 3, dir.path());
        let session = debugger.run_session(dir.path(), spec, code, "teste", &announcer).await;

        assert!(!session.success());
        assert_eq!(session.attempts.len(), 1);
        let reply = summary(&session, "python_project_teste", spec);
        assert!(reply.starts_with("Não foi possível executar o projeto 'python_project_teste' após 1 tentativas"));
        assert!(reply.contains("Relatório de debug salvo em:"));
        let report = fs::read_to_string(session.report.unwrap()).unwrap();
        assert!(report.contains("RESULTADO FINAL: FAILED"));
        assert!(report.contains("TENTATIVA 1:"));

        let mut spoken = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            spoken.push(msg);
        }
        assert_eq!(spoken[0], "Iniciando modo de depuração avançada, mestre.");
        assert!(spoken.last().unwrap().contains("API não disponível"));
    }

    #[tokio::test]
    async fn fix_is_written_to_main_file() {
        let dir = tempfile::tempdir().unwrap();
        let spec = language("python").unwrap();
        let code = "print(\n";
        write_main(dir.path(), spec, code).unwrap();

        let model = Arc::new(ScriptedModel::new(["```python\nprint('ok')\n```"]));
        let debugger = Debugger::new(Some(model.clone()), 2, dir.path());
        let session = debugger
            .run_session(dir.path(), spec, code, "teste", &Announcer::silent())
            .await;

        assert_eq!(session.final_code, "print('ok')");
        assert_eq!(fs::read_to_string(dir.path().join("main.py")).unwrap(), "print('ok')");
        assert_eq!(session.attempts.len(), 2);
        assert!(model.prompts()[0].0.contains("TAREFA ORIGINAL: teste"));
    }
}
