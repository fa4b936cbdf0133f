//! Canned-answer model for tests.

use async_trait::async_trait;

use super::LanguageModel;
use crate::error::{LlmError, LlmResult};

/// Model that replays canned answers in order and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    answers: std::sync::Mutex<std::collections::VecDeque<String>>,
    prompts: std::sync::Mutex<Vec<(String, bool)>>,
}

impl ScriptedModel {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: std::sync::Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Default::default(),
        }
    }

    /// Prompts received so far, with whether an image was attached.
    pub fn prompts(&self) -> Vec<(String, bool)> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next(&self, prompt: &str, image: bool) -> LlmResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((prompt.to_string(), image));
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .ok_or(LlmError::Empty)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        self.next(prompt, false)
    }

    async fn generate_with_image(&self, prompt: &str, _png: &[u8]) -> LlmResult<String> {
        self.next(prompt, true)
    }
}
