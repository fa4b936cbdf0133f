//! Shutdown protocol: clears temporary files, stale logs, the screenshot
//! cache and throwaway projects, then stops stray Jarvis processes and
//! writes a report into the workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::Local;
use sysinfo::System;

use crate::router::CleanupKind;

const LOG_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);
const PROJECT_MARKERS: [&str; 3] = ["temp", "debug", "test"];

/// Outcome of one protocol step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: &'static str,
    pub detail: String,
    pub ok: bool,
}

pub struct Cleanup {
    workspace: PathBuf,
    temp_dir: PathBuf,
    sweep_processes: bool,
    log: Vec<String>,
}

impl Cleanup {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            temp_dir: std::env::temp_dir(),
            sweep_processes: true,
            log: Vec::new(),
        }
    }

    /// Use another directory in place of the system temp dir.
    pub fn with_temp_dir(mut self, dir: &Path) -> Self {
        self.temp_dir = dir.to_path_buf();
        self
    }

    /// Leave running processes alone.
    pub fn without_process_sweep(mut self) -> Self {
        self.sweep_processes = false;
        self
    }

    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("🧹 {message}");
        self.log
            .push(format!("[{}] {message}", Local::now().format("%H:%M:%S")));
    }

    fn vision_dir(&self) -> PathBuf {
        self.temp_dir.join("jarvis_vision")
    }

    pub fn temp_files(&mut self) -> Result<String> {
        let mut paths = glob_in(&self.temp_dir, "jarvis_*")?;
        for pattern in ["*.tmp", "*_temp*", "temp_*", "*.cache"] {
            paths.extend(glob_in(&self.workspace, pattern)?);
        }
        paths.sort();
        paths.dedup();

        let mut count = 0;
        let mut bytes = 0;
        for path in paths {
            let size = size_of(&path);
            match remove(&path) {
                Ok(()) => {
                    count += 1;
                    bytes += size;
                }
                Err(e) => self.note(format!("Erro ao remover {}: {e}", path.display())),
            }
        }
        Ok(format!(
            "Arquivos temporários: {count} arquivos, {:.2} MB",
            bytes as f64 / (1024.0 * 1024.0)
        ))
    }

    /// Error logs older than a week.
    pub fn error_logs(&mut self) -> Result<String> {
        let mut paths = glob_in(&self.workspace.join("jarvis_logs"), "*error*.log")?;
        paths.extend(glob_in(&self.workspace, "*error*.log")?);

        let mut count = 0;
        for path in paths {
            let age = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| SystemTime::now().duration_since(t).ok())
                .unwrap_or_default();
            if age <= LOG_MAX_AGE {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => count += 1,
                Err(e) => self.note(format!("Erro ao remover log {}: {e}", path.display())),
            }
        }
        Ok(format!("Logs de erro: {count} arquivos removidos"))
    }

    pub fn vision_cache(&mut self) -> Result<String> {
        let dir = self.vision_dir();
        if !dir.exists() {
            return Ok("Cache de visão: já limpo".to_string());
        }
        let count = fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .count();
        fs::remove_dir_all(&dir).with_context(|| format!("failed to remove {}", dir.display()))?;
        fs::create_dir_all(&dir).with_context(|| format!("failed to recreate {}", dir.display()))?;
        Ok(format!("Cache de visão: {count} arquivos limpos"))
    }

    /// Project directories whose name marks them as throwaway.
    pub fn temp_projects(&mut self) -> Result<String> {
        let mut paths = Vec::new();
        for pattern in ["*_temp_*", "temp_*", "*_project_*", "debug_*"] {
            paths.extend(glob_in(&self.workspace, pattern)?);
        }
        paths.sort();
        paths.dedup();

        let mut count = 0;
        for path in paths.into_iter().filter(|p| p.is_dir()) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !PROJECT_MARKERS.iter().any(|m| name.contains(m)) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => count += 1,
                Err(e) => self.note(format!("Erro ao remover projeto {}: {e}", path.display())),
            }
        }
        Ok(format!("Projetos temporários: {count} diretórios removidos"))
    }

    /// Kill other Jarvis processes. The current process is never touched.
    pub fn processes(&mut self) -> Result<String> {
        if !self.sweep_processes {
            return Ok("Processos finalizados: 0".to_string());
        }
        let own = sysinfo::get_current_pid().ok();
        let mut sys = System::new();
        sys.refresh_processes();

        let mut killed = Vec::new();
        for (pid, process) in sys.processes() {
            if Some(*pid) == own || !process.name().to_lowercase().contains("jarvis") {
                continue;
            }
            if process.kill() {
                killed.push(pid.as_u32());
            }
        }
        for pid in &killed {
            self.note(format!("Processo {pid} finalizado"));
        }
        Ok(format!("Processos finalizados: {}", killed.len()))
    }

    /// Run every step. Failures are recorded in the outcome, never fatal.
    pub fn run_protocol(&mut self) -> Vec<StepOutcome> {
        self.note("Iniciando limpeza de sistema...");
        let steps: [(&'static str, fn(&mut Self) -> Result<String>); 5] = [
            ("Limpando arquivos temporários...", Self::temp_files),
            ("Limpando logs de erro...", Self::error_logs),
            ("Limpando caches de visão...", Self::vision_cache),
            ("Limpando projetos temporários...", Self::temp_projects),
            ("Finalizando processos...", Self::processes),
        ];
        let mut outcomes = Vec::new();
        for (step, action) in steps {
            log::info!("{step}");
            let outcome = match action(self) {
                Ok(detail) => StepOutcome { step, detail, ok: true },
                Err(e) => {
                    log::warn!("{step} failed: {e:#}");
                    StepOutcome {
                        step,
                        detail: format!("{e:#}"),
                        ok: false,
                    }
                }
            };
            outcomes.push(outcome);
        }
        self.note("Protocolo de encerramento concluído.");
        outcomes
    }

    pub fn report_text(&self, outcomes: &[StepOutcome]) -> String {
        let mut report = format!(
            "RELATÓRIO DE LIMPEZA - JARVIS\n{}\nData/Hora: {}\nWorkspace: {}\n\nDETALHES DA LIMPEZA:\n{}\n",
            "=".repeat(50),
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.workspace.display(),
            "-".repeat(30),
        );
        for outcome in outcomes {
            let status = if outcome.ok { "✅" } else { "❌" };
            report.push_str(&format!("{status} {}\n   → {}\n", outcome.step, outcome.detail));
        }
        report.push_str(&format!("\nLOG COMPLETO:\n{}\n", "-".repeat(30)));
        for entry in &self.log {
            report.push_str(entry);
            report.push('\n');
        }
        report
    }

    pub fn write_report(&self, outcomes: &[StepOutcome]) -> Result<PathBuf> {
        let path = self
            .workspace
            .join(format!("cleanup_report_{}.txt", Local::now().format("%Y%m%d_%H%M%S")));
        fs::write(&path, self.report_text(outcomes))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Run one of the cleanup commands and return the reply. Blocking.
    pub fn execute(&mut self, kind: CleanupKind) -> String {
        let single = match kind {
            CleanupKind::Full => None,
            CleanupKind::Logs => Some(self.error_logs()),
            CleanupKind::Temp => Some(self.temp_files()),
            CleanupKind::Cache => Some(self.vision_cache()),
        };
        if let Some(result) = single {
            return result.unwrap_or_else(|e| format!("Erro na limpeza: {e:#}"));
        }

        let outcomes = self.run_protocol();
        match self.write_report(&outcomes) {
            Ok(path) => log::info!("Cleanup report saved to {}", path.display()),
            Err(e) => log::error!("Failed to save cleanup report: {e:#}"),
        }
        "Protocolo de encerramento concluído com sucesso.".to_string()
    }
}

fn glob_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let escaped = format!(
        "{}{}{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        std::path::MAIN_SEPARATOR,
        pattern
    );
    let paths = glob::glob(&escaped)
        .with_context(|| format!("invalid pattern {}", full.display()))?
        .filter_map(|entry| entry.ok())
        .collect();
    Ok(paths)
}

fn remove(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn size_of(path: &Path) -> u64 {
    if path.is_dir() {
        fs::read_dir(path)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| size_of(&e.path())).sum())
            .unwrap_or(0)
    } else {
        fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}
