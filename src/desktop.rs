//! Desktop automation.
//!
//! [`Desktop`] is the seam between the assistant and the operating system.
//! [`SystemDesktop`] shells out to the usual per-platform tools (PowerShell
//! on Windows, xdotool/xclip on Linux, osascript on macOS) and uses
//! `sysinfo` to look at running processes. `RecordingDesktop` (feature
//! `testing`) records the calls instead and is what the tests drive.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use sysinfo::System;

use crate::process;

/// Longest we wait for a helper program.
const HELPER_TIMEOUT: Duration = Duration::from_secs(15);

/// Keys used by the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Ctrl,
    Enter,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    Char(char),
}

impl Key {
    fn xdotool(self) -> String {
        match self {
            Key::Ctrl => "ctrl".into(),
            Key::Enter => "Return".into(),
            Key::VolumeUp => "XF86AudioRaiseVolume".into(),
            Key::VolumeDown => "XF86AudioLowerVolume".into(),
            Key::VolumeMute => "XF86AudioMute".into(),
            Key::Char(c) => c.to_string(),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// Everything the assistant does to the desktop.
pub trait Desktop: Send + Sync {
    /// Open an application, URL, URI scheme or file.
    fn launch(&self, target: &str) -> Result<()>;

    /// Force-kill processes matching `name`. True when something was killed.
    fn kill_process(&self, name: &str) -> bool;

    fn is_process_running(&self, name: &str) -> bool;

    /// Type text into the focused window.
    fn type_text(&self, text: &str) -> Result<()>;

    /// Press keys together, e.g. Ctrl+V.
    fn hotkey(&self, keys: &[Key]) -> Result<()>;

    fn press(&self, key: Key) -> Result<()>;

    fn set_clipboard(&self, text: &str) -> Result<()>;

    fn clipboard(&self) -> Result<String>;

    /// Capture the whole screen as a PNG at `path`.
    fn screenshot(&self, path: &Path) -> Result<()>;

    fn lock_screen(&self) -> Result<()>;
}

/// Run a helper program to completion, killing it after [`HELPER_TIMEOUT`].
fn run(cmd: &mut Command) -> Result<()> {
    run_with_input(cmd, None).map(|_| ())
}

/// Same as [`run`], optionally feeding stdin; returns stdout.
///
/// Programs that are fed input get no output pipes: `xclip` forks a daemon
/// that holds the selection and would keep them open after it returns.
fn run_with_input(cmd: &mut Command, input: Option<&str>) -> Result<String> {
    let program = format!("{:?}", cmd.get_program());
    let (stdout, stderr) = match input {
        Some(_) => (Stdio::null(), Stdio::null()),
        None => (Stdio::piped(), Stdio::piped()),
    };
    let mut child = cmd
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(text.as_bytes())
            .with_context(|| format!("failed to write to {program}"))?;
    }

    let captured = process::wait_captured(&mut child, HELPER_TIMEOUT)
        .with_context(|| format!("failed to wait on {program}"))?
        .ok_or_else(|| anyhow!("{program} timed out"))?;
    if !captured.status.success() {
        bail!(
            "{program} exited with {}: {}",
            captured.status.code().unwrap_or(-1),
            captured.stderr.trim()
        );
    }
    Ok(captured.stdout)
}

/// Process names compare case-insensitively and without a `.exe` suffix.
/// Linux reports at most 15 bytes of the name, so a 15-byte name also
/// matches a longer wanted name that starts with it.
pub fn same_process(name: &str, wanted: &str) -> bool {
    fn normalise(name: &str) -> String {
        let lower = name.trim().to_lowercase();
        lower.strip_suffix(".exe").unwrap_or(&lower).to_string()
    }
    let (name, wanted) = (normalise(name), normalise(wanted));
    !name.is_empty() && (name == wanted || (name.len() == 15 && wanted.starts_with(&name)))
}

/// Match on the reported name or the executable's file name, never on the
/// command line.
fn process_matches(process: &sysinfo::Process, wanted: &str) -> bool {
    same_process(process.name(), wanted)
        || process
            .exe()
            .and_then(|exe| exe.file_name())
            .and_then(|file| file.to_str())
            .map_or(false, |file| same_process(file, wanted))
}

#[cfg(target_os = "windows")]
fn powershell(script: &str) -> Result<String> {
    run_with_input(
        Command::new("powershell").args(["-NoProfile", "-NonInteractive", "-Command", script]),
        None,
    )
}

#[cfg(target_os = "macos")]
fn osascript(script: &str) -> Result<()> {
    run(Command::new("osascript").args(["-e", script]))
}

/// Escape text for WScript.Shell SendKeys.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn sendkeys_escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => format!("{{{c}}}"),
            '\n' => "{ENTER}".to_string(),
            '\'' => "''".to_string(),
            other => other.to_string(),
        })
        .collect()
}

/// Escape text for an AppleScript string literal.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// The real desktop of the machine Jarvis runs on.
#[derive(Debug, Default)]
pub struct SystemDesktop;

impl SystemDesktop {
    pub fn new() -> Self {
        Self
    }
}

impl Desktop for SystemDesktop {
    fn launch(&self, target: &str) -> Result<()> {
        log::info!("Launching {}", target);
        // `start` resolves URIs, files and registered app names alike; the
        // empty string is the window title it would otherwise take from `target`.
        #[cfg(target_os = "windows")]
        {
            run(Command::new("cmd").args(["/C", "start", "", target]))
        }
        #[cfg(target_os = "macos")]
        {
            // Bare names are applications; `open -a` finds them in /Applications.
            if target.contains(':') || Path::new(target).exists() {
                run(Command::new("open").arg(target))
            } else {
                run(Command::new("open").args(["-a", target]))
            }
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            if target.contains("://") || target.ends_with(':') || Path::new(target).exists() {
                return run(Command::new("xdg-open").arg(target));
            }
            // Anything else is a command line. Detached, so it outlives us.
            let mut parts = target.split_whitespace();
            let program = parts.next().ok_or_else(|| anyhow!("empty launch target"))?;
            Command::new(program)
                .args(parts)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map(|_| ())
                .with_context(|| format!("failed to launch {target}"))
        }
    }

    fn kill_process(&self, name: &str) -> bool {
        log::info!("Killing process {}", name);
        // `/IM` matches the image name exactly, like `same_process` below.
        #[cfg(target_os = "windows")]
        {
            match run(Command::new("taskkill").args(["/F", "/IM", name, "/T"])) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("Kill of {} failed: {e}", name);
                    false
                }
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            let mut sys = System::new();
            sys.refresh_processes();
            let own = sysinfo::get_current_pid().ok();
            let mut killed = false;
            for process in sys
                .processes()
                .values()
                .filter(|p| Some(p.pid()) != own && process_matches(p, name))
            {
                log::debug!("Killing pid {} ({})", process.pid(), process.name());
                killed |= process.kill();
            }
            killed
        }
    }

    fn is_process_running(&self, name: &str) -> bool {
        let mut sys = System::new();
        sys.refresh_processes();
        let found = sys.processes().values().any(|p| process_matches(p, name));
        found
    }

    fn type_text(&self, text: &str) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            let script = format!(
                "$w = New-Object -ComObject WScript.Shell; $w.SendKeys('{}')",
                sendkeys_escape(text)
            );
            powershell(&script).map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            osascript(&format!(
                "tell application \"System Events\" to keystroke \"{}\"",
                applescript_escape(text)
            ))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            run(Command::new("xdotool").args(["type", "--delay", "10", "--", text]))
        }
    }

    fn hotkey(&self, keys: &[Key]) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            let mut combo = String::new();
            for key in keys {
                match key {
                    Key::Ctrl => combo.push('^'),
                    Key::Char(c) => combo.push(*c),
                    Key::Enter => combo.push_str("{ENTER}"),
                    other => return self.press(*other),
                }
            }
            powershell(&format!(
                "$w = New-Object -ComObject WScript.Shell; $w.SendKeys('{combo}')"
            ))
            .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            let ctrl = keys.contains(&Key::Ctrl);
            let Some(Key::Char(c)) = keys.iter().find(|k| matches!(k, Key::Char(_))) else {
                bail!("unsupported hotkey {keys:?}");
            };
            // Ctrl shortcuts are Command shortcuts on a Mac.
            let using = if ctrl { " using command down" } else { "" };
            osascript(&format!(
                "tell application \"System Events\" to keystroke \"{c}\"{using}"
            ))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            // xdotool takes the whole chord as one `ctrl+v` argument.
            let combo = keys.iter().map(|k| k.xdotool()).collect::<Vec<_>>().join("+");
            run(Command::new("xdotool").args(["key", &combo]))
        }
    }

    fn press(&self, key: Key) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            let code = match key {
                // Virtual-key codes of the media keys.
                Key::VolumeUp => "[char]175".to_string(),
                Key::VolumeDown => "[char]174".to_string(),
                Key::VolumeMute => "[char]173".to_string(),
                Key::Enter => "'{ENTER}'".to_string(),
                Key::Ctrl => "'^'".to_string(),
                Key::Char(c) => format!("'{}'", sendkeys_escape(&c.to_string())),
            };
            powershell(&format!(
                "$w = New-Object -ComObject WScript.Shell; $w.SendKeys({code})"
            ))
            .map(|_| ())
        }
        #[cfg(target_os = "macos")]
        {
            let script = match key {
                Key::VolumeUp => "set volume output volume ((output volume of (get volume settings)) + 6)".to_string(),
                Key::VolumeDown => "set volume output volume ((output volume of (get volume settings)) - 6)".to_string(),
                Key::VolumeMute => "set volume output muted (not (output muted of (get volume settings)))".to_string(),
                Key::Enter => "tell application \"System Events\" to key code 36".to_string(),
                Key::Ctrl => bail!("ctrl cannot be pressed alone"),
                Key::Char(c) => format!(
                    "tell application \"System Events\" to keystroke \"{}\"",
                    applescript_escape(&c.to_string())
                ),
            };
            osascript(&script)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            run(Command::new("xdotool").args(["key", &key.xdotool()]))
        }
    }

    fn set_clipboard(&self, text: &str) -> Result<()> {
        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut c = Command::new("powershell");
            c.args(["-NoProfile", "-Command", "$input | Set-Clipboard"]);
            c
        };
        #[cfg(target_os = "macos")]
        let mut cmd = Command::new("pbcopy");
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let mut cmd = {
            let mut c = Command::new("xclip");
            c.args(["-selection", "clipboard"]);
            c
        };
        run_with_input(&mut cmd, Some(text))
            .map(|_| ())
            .context("failed to copy to the clipboard")
    }

    fn clipboard(&self) -> Result<String> {
        #[cfg(target_os = "windows")]
        let out = powershell("Get-Clipboard -Raw");
        #[cfg(target_os = "macos")]
        let out = run_with_input(&mut Command::new("pbpaste"), None);
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let out = run_with_input(
            Command::new("xclip").args(["-selection", "clipboard", "-o"]),
            None,
        );
        out.context("failed to read the clipboard")
    }

    fn screenshot(&self, path: &Path) -> Result<()> {
        let target = path.to_string_lossy().to_string();
        #[cfg(target_os = "windows")]
        {
            let script = format!(
                "Add-Type -AssemblyName System.Windows.Forms,System.Drawing; \
                 $b = [System.Windows.Forms.SystemInformation]::VirtualScreen; \
                 $bmp = New-Object System.Drawing.Bitmap $b.Width, $b.Height; \
                 $g = [System.Drawing.Graphics]::FromImage($bmp); \
                 $g.CopyFromScreen($b.Left, $b.Top, 0, 0, $bmp.Size); \
                 $bmp.Save('{}', [System.Drawing.Imaging.ImageFormat]::Png)",
                target.replace('\'', "''")
            );
            powershell(&script).map(|_| ())?;
        }
        #[cfg(target_os = "macos")]
        {
            run(Command::new("screencapture").args(["-x", &target]))?;
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            // First tool that is installed wins. Wayland sessions only have grim.
            let attempts: [(&str, Vec<&str>); 4] = [
                ("gnome-screenshot", vec!["-f", target.as_str()]),
                ("scrot", vec!["-o", target.as_str()]),
                ("grim", vec![target.as_str()]),
                ("import", vec!["-window", "root", target.as_str()]),
            ];
            let mut last_error = anyhow!("no screenshot tool found");
            let mut captured = false;
            for (program, args) in attempts {
                match run(Command::new(program).args(&args)) {
                    Ok(()) => {
                        captured = true;
                        break;
                    }
                    Err(e) => {
                        log::debug!("{} failed: {e}", program);
                        last_error = e;
                    }
                }
            }
            if !captured {
                return Err(last_error.context("failed to capture the screen"));
            }
        }
        if !path.is_file() {
            bail!("screenshot was not written to {}", path.display());
        }
        Ok(())
    }

    fn lock_screen(&self) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            run(Command::new("rundll32.exe").arg("user32.dll,LockWorkStation"))
        }
        #[cfg(target_os = "macos")]
        {
            // Locks when "require password after sleep" is on, which is the default.
            run(Command::new("pmset").arg("displaysleepnow"))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            run(Command::new("loginctl").arg("lock-session"))
        }
    }
}

#[cfg(any(test, feature = "testing"))]
mod recording;
#[cfg(any(test, feature = "testing"))]
pub use recording::{RecordingDesktop, FAKE_PNG};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sendkeys_special_characters_are_braced() {
        assert_eq!(sendkeys_escape("a+b"), "a{+}b");
        assert_eq!(sendkeys_escape("(x)"), "{(}x{)}");
        assert_eq!(sendkeys_escape("it's"), "it''s");
    }

    #[test]
    fn applescript_quotes_are_escaped() {
        assert_eq!(applescript_escape(r#"say "hi""#), r#"say \"hi\""#);
    }

    #[test]
    fn key_names() {
        assert_eq!(Key::Ctrl.to_string(), "ctrl");
        assert_eq!(Key::VolumeUp.to_string(), "volumeup");
        assert_eq!(Key::Char('v').to_string(), "v");
        assert_eq!(Key::Enter.xdotool(), "Return");
    }

    #[test]
    fn recording_desktop_tracks_processes() {
        let desktop = RecordingDesktop::new();
        desktop.launch("Discord.exe").unwrap();
        assert!(desktop.is_process_running("discord"));
        assert!(desktop.kill_process("Discord.exe"));
        assert!(!desktop.kill_process("Discord.exe"));
        desktop.hotkey(&[Key::Ctrl, Key::Char('v')]).unwrap();
        assert_eq!(
            desktop.events(),
            vec!["launch Discord.exe", "kill Discord.exe", "kill Discord.exe", "hotkey ctrl+v"]
        );
    }

    #[test]
    fn process_names_match_exactly() {
        assert!(same_process("Discord", "discord"));
        assert!(same_process("notepad.exe", "Notepad"));
        assert!(same_process("gnome-calculato", "gnome-calculator"));
        assert!(!same_process("code-insiders", "code"));
        assert!(!same_process("vscode-helper", "code"));
        assert!(!same_process("opera", "opera gx launcher"));
        assert!(!same_process("", "steam"));
    }

    #[test]
    fn recording_desktop_kills_only_exact_names() {
        let desktop = RecordingDesktop::new().with_running("code-insiders");
        desktop.launch("code").unwrap();
        assert!(desktop.kill_process("code"));
        assert!(desktop.is_process_running("code-insiders"));
        assert!(!desktop.is_process_running("code"));
    }

    #[test]
    fn recording_desktop_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.png");
        RecordingDesktop::new().screenshot(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), FAKE_PNG);
        assert!(RecordingDesktop::without_screen().screenshot(&path).is_err());
    }
}
