//! Wake-word and conversation state for the voice front-end.
//!
//! Idle mode listens in short windows for the trigger word. Once awake,
//! every utterance is a command until the user sends Jarvis back to sleep
//! or stays silent past the conversation timeout.

use std::time::{Duration, Instant};

/// Capture window while waiting for the wake word.
pub const IDLE_LISTEN: Duration = Duration::from_secs(5);
/// Capture window for a command in conversation mode.
pub const COMMAND_LISTEN: Duration = Duration::from_secs(10);

pub const WAKE_REPLY: &str = "Sim, mestre? Estou ouvindo.";
pub const SLEEP_REPLY: &str = "Entrando em modo de espera, mestre.";

/// Tokens the recogniser produces out of background noise. They are only
/// trimmed from the edges of a transcript, never from the middle.
const NOISE_WORDS: &[&str] = &["the", "uh", "um", "a", "é", "hã", "hum", "ah", "eh"];

const SLEEP_PHRASES: &[&str] = &["pode descansar", "dormir", "silêncio", "silencio"];

/// Trim leading and trailing noise tokens.
pub fn strip_noise_words(text: &str) -> String {
    let is_noise = |t: &&str| NOISE_WORDS.contains(&t.to_lowercase().as_str());
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    while tokens.first().map_or(false, is_noise) {
        tokens.remove(0);
    }
    while tokens.last().map_or(false, is_noise) {
        tokens.pop();
    }
    tokens.join(" ")
}

pub fn is_sleep_phrase(text: &str) -> bool {
    let lower = text.to_lowercase();
    SLEEP_PHRASES.iter().any(|p| lower.contains(p))
}

/// What the front-end should do with a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    /// Nothing usable; keep listening.
    Nothing,
    /// Wake word in idle mode. Carries whatever followed it.
    Wake(String),
    /// Back to idle at the user's request.
    Sleep,
    /// Silence outlasted the conversation timeout.
    TimedOut,
    Command(String),
}

#[derive(Debug)]
pub struct Listener {
    trigger: String,
    timeout: Duration,
    awake: bool,
    last_interaction: Instant,
}

impl Listener {
    pub fn new(trigger: &str, timeout: Duration) -> Self {
        Self {
            trigger: trigger.to_lowercase(),
            timeout,
            awake: false,
            last_interaction: Instant::now(),
        }
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// How long the next capture should last.
    pub fn window(&self) -> Duration {
        if self.awake {
            COMMAND_LISTEN
        } else {
            IDLE_LISTEN
        }
    }

    pub fn hear(&mut self, transcript: &str) -> Heard {
        self.hear_at(transcript, Instant::now())
    }

    pub fn hear_at(&mut self, transcript: &str, now: Instant) -> Heard {
        let cleaned = strip_noise_words(transcript.trim());

        if !self.awake {
            let lower = cleaned.to_lowercase();
            let Some(pos) = lower.find(&self.trigger) else {
                return Heard::Nothing;
            };
            self.awake = true;
            self.last_interaction = now;
            let rest = lower[pos + self.trigger.len()..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == ',')
                .to_string();
            return Heard::Wake(rest);
        }

        if cleaned.is_empty() {
            if now.duration_since(self.last_interaction) > self.timeout {
                self.awake = false;
                return Heard::TimedOut;
            }
            return Heard::Nothing;
        }

        self.last_interaction = now;
        if is_sleep_phrase(&cleaned) {
            self.awake = false;
            return Heard::Sleep;
        }
        Heard::Command(cleaned)
    }

    /// Recognition failed; only the timeout can change state.
    pub fn failed_at(&mut self, now: Instant) -> Heard {
        if self.awake && now.duration_since(self.last_interaction) > self.timeout {
            self.awake = false;
            return Heard::TimedOut;
        }
        Heard::Nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_only_at_edges() {
        assert_eq!(strip_noise_words("uh abra o chrome um"), "abra o chrome");
        assert_eq!(strip_noise_words("the"), "");
        assert_eq!(strip_noise_words("crie um projeto"), "crie um projeto");
    }

    #[test]
    fn wake_command_sleep() {
        let start = Instant::now();
        let mut l = Listener::new("Jarvis", Duration::from_secs(30));
        assert_eq!(l.window(), IDLE_LISTEN);
        assert_eq!(l.hear_at("que horas são", start), Heard::Nothing);
        assert_eq!(l.hear_at("ei jarvis", start), Heard::Wake(String::new()));
        assert_eq!(l.window(), COMMAND_LISTEN);
        assert_eq!(
            l.hear_at("abra o chrome", start),
            Heard::Command("abra o chrome".into())
        );
        assert_eq!(l.hear_at("pode descansar", start), Heard::Sleep);
        assert!(!l.is_awake());
    }

    #[test]
    fn wake_word_with_command_attached() {
        let mut l = Listener::new("jarvis", Duration::from_secs(30));
        assert_eq!(l.hear("Jarvis, que horas são"), Heard::Wake("que horas são".into()));
    }

    #[test]
    fn silence_times_out() {
        let start = Instant::now();
        let mut l = Listener::new("jarvis", Duration::from_secs(30));
        l.hear_at("jarvis", start);
        assert_eq!(l.hear_at("", start + Duration::from_secs(10)), Heard::Nothing);
        assert_eq!(l.hear_at("  ", start + Duration::from_secs(31)), Heard::TimedOut);
        assert!(!l.is_awake());

        l.hear_at("jarvis", start);
        assert_eq!(l.failed_at(start + Duration::from_secs(5)), Heard::Nothing);
        assert_eq!(l.failed_at(start + Duration::from_secs(40)), Heard::TimedOut);
    }
}
