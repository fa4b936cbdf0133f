//! Language model clients.
//!
//! Two backends sit behind the [`LanguageModel`] trait: Google's Gemini
//! `generateContent` endpoint over plain HTTP and a local model served by
//! Ollama. Both accept an optional PNG screenshot so the vision features can
//! use whichever backend is configured. The helpers at the bottom clean raw
//! model output before it is spoken or shown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::images::Image;
use ollama_rs::Ollama;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{Backend, Config};
use crate::error::{LlmError, LlmResult};

/// A text generator that can optionally look at an image.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> LlmResult<String>;

    /// Generate with a PNG attached to the prompt.
    async fn generate_with_image(&self, prompt: &str, png: &[u8]) -> LlmResult<String>;
}

/// Build the model selected by the configuration. Returns `None` when the
/// Gemini backend is selected without an API key.
pub fn build_model(config: &Config) -> Option<Arc<dyn LanguageModel>> {
    build_named(config, &config.model_name)
}

/// Same as [`build_model`] but for the model used on screenshots.
pub fn build_vision_model(config: &Config) -> Option<Arc<dyn LanguageModel>> {
    build_named(config, &config.vision_model)
}

fn build_named(config: &Config, model: &str) -> Option<Arc<dyn LanguageModel>> {
    match config.backend {
        Backend::Gemini => {
            let key = config.gemini_api_key.clone()?;
            match GeminiModel::new(
                &config.gemini_base_url,
                key,
                model,
                config.temperature,
                config.llm_timeout,
            ) {
                Ok(m) => Some(Arc::new(m)),
                Err(e) => {
                    log::error!("Failed to build Gemini client: {e}");
                    None
                }
            }
        }
        Backend::Ollama => Some(Arc::new(OllamaModel::new(model, config.llm_timeout))),
    }
}

// ---------------------------------------------------------------------------
// Gemini

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiModel {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> LlmResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature,
            timeout,
        })
    }

    async fn send(&self, parts: Vec<Part<'_>>) -> LlmResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };
        log::debug!("Sending request to Gemini: {}", url);

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Gemini API error: {} - {}", status, body);
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        self.send(vec![Part::Text { text: prompt }]).await
    }

    async fn generate_with_image(&self, prompt: &str, png: &[u8]) -> LlmResult<String> {
        let image = Part::Image {
            inline_data: InlineData {
                mime_type: "image/png",
                data: BASE64.encode(png),
            },
        };
        self.send(vec![Part::Text { text: prompt }, image]).await
    }
}

// ---------------------------------------------------------------------------
// Ollama

/// Local model served by Ollama at the default endpoint
/// (`http://localhost:11434`).
pub struct OllamaModel {
    client: Ollama,
    model: String,
    timeout: Duration,
}

impl OllamaModel {
    pub fn new(model: &str, timeout: Duration) -> Self {
        Self {
            client: Ollama::default(),
            model: model.to_string(),
            timeout,
        }
    }

    async fn run(&self, prompt: &str, images: Vec<Image>) -> LlmResult<String> {
        let mut request = GenerationRequest::new(self.model.clone(), prompt.to_string());
        if !images.is_empty() {
            request = request.images(images);
        }
        let response = tokio::time::timeout(self.timeout, self.client.generate(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| LlmError::Ollama(e.to_string()))?;
        log::debug!("Raw LLM response: {}", response.response);
        if response.response.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(response.response)
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        self.run(prompt, Vec::new()).await
    }

    async fn generate_with_image(&self, prompt: &str, png: &[u8]) -> LlmResult<String> {
        let encoded = BASE64.encode(png);
        self.run(prompt, vec![Image::from_base64(&encoded)]).await
    }
}

// ---------------------------------------------------------------------------
// Output helpers

/// Split a `<think>...</think>` block off the answer. Returns the remaining
/// answer and the captured reasoning, if any.
pub fn strip_think_block(answer: &str) -> (String, Option<String>) {
    let answer = answer.trim();
    if let (Some(start), Some(end)) = (answer.find("<think>"), answer.find("</think>")) {
        if start < end {
            let think = answer[start + "<think>".len()..end].trim().to_string();
            let mut rest = String::from(&answer[..start]);
            rest.push_str(&answer[end + "</think>".len()..]);
            return (rest.trim().to_string(), Some(think));
        }
    }
    (answer.to_string(), None)
}

/// Drop fenced code blocks entirely, keeping the surrounding prose.
pub fn strip_code_fences(answer: &str) -> String {
    if !answer.contains("```") {
        return answer.to_string();
    }
    let mut cleaned = String::new();
    let mut in_code = false;
    for line in answer.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if !in_code {
            cleaned.push_str(line);
            cleaned.push('\n');
        }
    }
    cleaned.trim().to_string()
}

/// Text suitable for the speech synthesiser: no code, no markdown markers.
pub fn clean_for_speech(answer: &str) -> String {
    let text = strip_code_fences(answer);
    let text: String = text
        .chars()
        .filter(|c| !matches!(c, '`' | '*' | '#'))
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(any(test, feature = "testing"))]
mod scripted;
#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedModel;

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gemini(server: &MockServer) -> GeminiModel {
        GeminiModel::new(
            &server.uri(),
            "test-key".to_string(),
            "gemini-test",
            0.7,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn gemini_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "Olá, "}, {"text": "mestre."}]}}]
            })))
            .mount(&server)
            .await;

        let text = gemini(&server).generate("oi").await.unwrap();
        assert_eq!(text, "Olá, mestre.");
    }

    #[tokio::test]
    async fn gemini_sends_inline_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "vejo uma tela"}]}}]
            })))
            .mount(&server)
            .await;

        let model = gemini(&server);
        model.generate_with_image("descreva", b"\x89PNG").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "descreva");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], BASE64.encode(b"\x89PNG"));
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn gemini_reports_status_and_empty_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;
        let err = gemini(&server).generate("oi").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 403, .. }));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})))
            .mount(&server)
            .await;
        let err = gemini(&server).generate("oi").await.unwrap_err();
        assert!(matches!(err, LlmError::Empty));
    }

    #[test]
    fn think_block_is_split_off() {
        let (answer, think) = strip_think_block("<think>hmm, vejamos</think>\n São 10 horas.");
        assert_eq!(answer, "São 10 horas.");
        assert_eq!(think.as_deref(), Some("hmm, vejamos"));

        let (answer, think) = strip_think_block("sem raciocínio");
        assert_eq!(answer, "sem raciocínio");
        assert!(think.is_none());
    }

    #[test]
    fn speech_text_has_no_markdown() {
        let raw = "## Resposta\nUse **sempre** `cargo`.\n```rust\nfn main() {}\n```\nPronto.";
        assert_eq!(clean_for_speech(raw), "Resposta Use sempre cargo. Pronto.");
    }
}
