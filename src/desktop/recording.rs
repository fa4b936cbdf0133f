//! In-memory [`Desktop`] for tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};

use super::{same_process, Desktop, Key};
use crate::apps;

/// A desktop that only records what it was asked to do.
///
/// Launching an application marks its target as running, so launch-then-check
/// flows behave as on a real machine.
#[derive(Debug, Default)]
pub struct RecordingDesktop {
    events: Mutex<Vec<String>>,
    running: Mutex<HashSet<String>>,
    clipboard: Mutex<String>,
    fail_screenshots: bool,
    stalled_launches: bool,
}

/// Bytes written by [`RecordingDesktop::screenshot`].
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

impl RecordingDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// A desktop whose screenshots always fail.
    pub fn without_screen() -> Self {
        Self {
            fail_screenshots: true,
            ..Self::default()
        }
    }

    /// Launched applications never show up as running processes.
    pub fn with_stalled_launches(mut self) -> Self {
        self.stalled_launches = true;
        self
    }

    pub fn with_clipboard(self, text: &str) -> Self {
        if let Ok(mut clip) = self.clipboard.lock() {
            *clip = text.to_string();
        }
        self
    }

    pub fn with_running(self, process: &str) -> Self {
        if let Ok(mut running) = self.running.lock() {
            running.insert(process.to_lowercase());
        }
        self
    }

    /// Everything recorded so far, e.g. `launch notepad.exe`, `hotkey ctrl+v`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn record(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Desktop for RecordingDesktop {
    fn launch(&self, target: &str) -> Result<()> {
        self.record(format!("launch {target}"));
        if self.stalled_launches {
            return Ok(());
        }
        if let Ok(mut running) = self.running.lock() {
            running.insert(target.to_lowercase());
            // Catalog apps whose process name differs from the launch target.
            if let Some(app) = apps::APPS
                .iter()
                .find(|a| a.target().launch.eq_ignore_ascii_case(target))
            {
                running.insert(app.target().process.to_lowercase());
            }
        }
        Ok(())
    }

    fn kill_process(&self, name: &str) -> bool {
        self.record(format!("kill {name}"));
        self.running
            .lock()
            .map(|mut running| {
                let before = running.len();
                running.retain(|p| !same_process(p, name));
                running.len() < before
            })
            .unwrap_or(false)
    }

    fn is_process_running(&self, name: &str) -> bool {
        self.running
            .lock()
            .map(|running| running.iter().any(|p| same_process(p, name)))
            .unwrap_or(false)
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.record(format!("type {text}"));
        Ok(())
    }

    fn hotkey(&self, keys: &[Key]) -> Result<()> {
        let combo = keys.iter().map(Key::to_string).collect::<Vec<_>>().join("+");
        self.record(format!("hotkey {combo}"));
        Ok(())
    }

    fn press(&self, key: Key) -> Result<()> {
        self.record(format!("press {key}"));
        Ok(())
    }

    fn set_clipboard(&self, text: &str) -> Result<()> {
        self.record("copy".to_string());
        let mut clip = self
            .clipboard
            .lock()
            .map_err(|_| anyhow!("clipboard lock poisoned"))?;
        *clip = text.to_string();
        Ok(())
    }

    fn clipboard(&self) -> Result<String> {
        self.clipboard
            .lock()
            .map(|c| c.clone())
            .map_err(|_| anyhow!("clipboard lock poisoned"))
    }

    fn screenshot(&self, path: &Path) -> Result<()> {
        self.record("screenshot".to_string());
        if self.fail_screenshots {
            bail!("no display available");
        }
        std::fs::write(path, FAKE_PNG).context("failed to write fake screenshot")
    }

    fn lock_screen(&self) -> Result<()> {
        self.record("lock".to_string());
        Ok(())
    }
}
