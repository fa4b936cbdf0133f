//! Status files under `~/.jarvis`.
//!
//! External tools (desktop widgets, shell prompts) read these to show what
//! the assistant is doing. Writing `canceled` to `jarvis.status` interrupts
//! speech in progress.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Listening,
    Processing,
    Speaking,
    Canceled,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Listening => "listening",
            Status::Processing => "processing",
            Status::Speaking => "speaking",
            Status::Canceled => "canceled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct JarvisIO {
    base: PathBuf,
}

impl JarvisIO {
    /// Status files in `~/.jarvis`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().context("could not determine the home directory")?;
        Self::at(home.join(".jarvis"))
    }

    pub fn at(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base)
            .with_context(|| format!("failed to create {}", base.display()))?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn write(&self, file: &str, content: &str) {
        if let Err(e) = std::fs::write(self.base.join(file), content) {
            log::debug!("Could not write {file}: {e}");
        }
    }

    pub fn write_status(&self, status: Status) {
        self.write("jarvis.status", status.as_str());
    }

    pub fn write_spoken(&self, text: &str) {
        self.write("jarvis.spoken", text);
    }

    pub fn write_heard(&self, text: &str) {
        self.write("jarvis.heard", text);
    }

    /// The model's reasoning block of the last answer.
    pub fn write_think(&self, text: &str) {
        self.write("jarvis.think", text);
    }

    pub fn current_status(&self) -> Option<String> {
        std::fs::read_to_string(self.base.join("jarvis.status")).ok()
    }

    pub fn is_canceled(&self) -> bool {
        self.current_status()
            .map(|s| s.trim().eq_ignore_ascii_case(Status::Canceled.as_str()))
            .unwrap_or(false)
    }

    /// Run the user's `scripts/cancel_tts.sh` hook, if present.
    pub fn cancel_tts(&self) {
        let script = self.base.join("scripts").join("cancel_tts.sh");
        if !script.exists() {
            return;
        }
        if let Err(e) = std::process::Command::new("bash").arg(&script).spawn() {
            log::warn!("Failed to run {}: {e}", script.display());
        }
    }

    pub fn set_pid(&self) {
        self.write("jarvis", &std::process::id().to_string());
    }

    pub fn clear_pid(&self) {
        let _ = std::fs::remove_file(self.base.join("jarvis"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let io = JarvisIO::at(dir.path().join(".jarvis")).unwrap();
        io.write_status(Status::Speaking);
        assert_eq!(io.current_status().as_deref(), Some("speaking"));
        assert!(!io.is_canceled());

        std::fs::write(io.base().join("jarvis.status"), "Canceled\n").unwrap();
        assert!(io.is_canceled());
    }

    #[test]
    fn pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let io = JarvisIO::at(dir.path()).unwrap();
        io.set_pid();
        let pid = std::fs::read_to_string(dir.path().join("jarvis")).unwrap();
        assert_eq!(pid, std::process::id().to_string());
        io.clear_pid();
        assert!(!dir.path().join("jarvis").exists());
    }
}
