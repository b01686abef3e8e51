use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigStore;
use crate::formatter::{colorize, Tone};
use crate::prompt::KeyValidator;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen3:14b";

pub const GEMINI_MODEL_KEY: &str = "gemini_model";
pub const OLLAMA_URL_KEY: &str = "ollama_url";
pub const OLLAMA_MODEL_KEY: &str = "ollama_model";

#[derive(Debug, Error)]
pub enum LlmError {
    /// The service is down, overloaded, or not configured. Worth retrying.
    #[error("{0} is not available. Please check your configuration.")]
    ServiceUnavailable(String),
    #[error("Error communicating with {service}: {message}")]
    Request { service: String, message: String },
    #[error("Unexpected response from {service}: {message}")]
    Response { service: String, message: String },
}

impl LlmError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::ServiceUnavailable(_))
    }
}

/// A text-completion service.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;
    /// Hosted service rather than a local model.
    fn is_remote(&self) -> bool;
    async fn check_availability(&self) -> bool;
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Gemini API client configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_tokens: Some(8192),
            temperature: Some(0.2),
            max_retries: 2,
            timeout_seconds: 120,
        }
    }
}

pub struct GeminiBackend {
    config: GeminiConfig,
    client: Client,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn with_api_key(api_key: String) -> anyhow::Result<Self> {
        Self::new(GeminiConfig {
            api_key,
            ..GeminiConfig::default()
        })
    }

    fn request_error(&self, message: impl ToString) -> LlmError {
        LlmError::Request {
            service: "Gemini".to_string(),
            message: message.to_string(),
        }
    }

    /// The API key goes in the `x-goog-api-key` header, never the URL.
    fn generate_request(&self, request: &GeminiRequest) -> RequestBuilder {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        self.client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(request)
    }

    /// Make a request to the Gemini API
    async fn make_request(&self, request: &GeminiRequest) -> Result<GeminiResponse, LlmError> {
        let mut attempt = 0;
        loop {
            let response = match self.generate_request(request).send().await {
                Ok(response) => response,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    return Err(LlmError::ServiceUnavailable("Gemini".to_string()))
                }
                Err(e) => return Err(self.request_error(e)),
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<GeminiResponse>()
                    .await
                    .map_err(|e| LlmError::Response {
                        service: "Gemini".to_string(),
                        message: e.to_string(),
                    });
            }

            let error_text = response.text().await.unwrap_or_default();
            if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS
            {
                if attempt < self.config.max_retries {
                    // 1s, 2s, ...
                    let delay = Duration::from_secs(2_u64.pow(attempt));
                    eprintln!(
                        "⏳ API overloaded, retrying in {}s... (attempt {}/{})",
                        delay.as_secs(),
                        attempt + 1,
                        self.config.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                warn!("Gemini unavailable after {} attempts: {}", attempt + 1, error_text);
                return Err(LlmError::ServiceUnavailable("Gemini".to_string()));
            }

            return Err(self.request_error(format!(
                "Gemini API request failed: {} - {}",
                status, error_text
            )));
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn check_availability(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GeminiRequest {
            contents: vec![GeminiMessage {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            }),
        };

        let response = self.make_request(&request).await?;
        response.text().ok_or_else(|| LlmError::Response {
            service: "Gemini".to_string(),
            message: "No candidates in response".to_string(),
        })
    }
}

// Gemini API request/response structures
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiMessage>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiMessage {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiResponse {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .collect();
        Some(text)
    }
}

/// Local Ollama server.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn check_availability(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!("Ollama availability check failed: {}", e);
                false
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::ServiceUnavailable("Ollama".to_string())
                } else {
                    LlmError::Request {
                        service: "Ollama".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(LlmError::ServiceUnavailable("Ollama".to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Request {
                service: "Ollama".to_string(),
                message: format!("{} - {}", status, error_text),
            });
        }

        let body: OllamaChatResponse = response.json().await.map_err(|e| LlmError::Response {
            service: "Ollama".to_string(),
            message: e.to_string(),
        })?;
        Ok(body.message.content)
    }
}

static THINK_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>\s*").expect("valid think block regex"));

/// Drop `<think>...</think>` reasoning blocks some local models emit.
pub fn remove_think_block(text: &str) -> String {
    THINK_BLOCK_RE.replace_all(text, "").into_owned()
}

/// Gemini when a key is configured, Ollama otherwise.
pub struct UnifiedLlm {
    backend: Box<dyn LlmBackend>,
}

impl UnifiedLlm {
    pub fn with_backend(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Choose the backend from `store`, reading model and URL overrides from
    /// the `config_name` block.
    pub fn from_config(store: &ConfigStore, config_name: &str) -> anyhow::Result<Self> {
        let setting = |key: &str, default: &str| {
            store
                .get_value(config_name, key)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default.to_string())
        };

        if let Some(api_key) = store.gemini_api_key() {
            let config = GeminiConfig {
                api_key,
                model: setting(GEMINI_MODEL_KEY, DEFAULT_GEMINI_MODEL),
                ..GeminiConfig::default()
            };
            match GeminiBackend::new(config) {
                Ok(backend) => {
                    println!("{}", colorize("🔗 Using Gemini for LLM queries", Tone::Info));
                    return Ok(Self::with_backend(Box::new(backend)));
                }
                Err(e) => println!(
                    "{}",
                    colorize(
                        &format!("❌ Failed to initialize Gemini: {}. Falling back to Ollama.", e),
                        Tone::Negative
                    )
                ),
            }
        } else {
            debug!("No Gemini API key configured");
        }

        let backend = OllamaBackend::new(
            &setting(OLLAMA_URL_KEY, DEFAULT_OLLAMA_URL),
            &setting(OLLAMA_MODEL_KEY, DEFAULT_OLLAMA_MODEL),
        )?;
        println!("{}", colorize("🔗 Using Ollama for LLM queries", Tone::Info));
        Ok(Self::with_backend(Box::new(backend)))
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_remote(&self) -> bool {
        self.backend.is_remote()
    }

    /// Send one prompt and return the cleaned response text.
    pub async fn query(&self, prompt: &str) -> Result<String, LlmError> {
        if !self.backend.check_availability().await {
            return Err(LlmError::ServiceUnavailable(self.backend.name().to_string()));
        }

        debug!("Querying {} with {} prompt bytes", self.backend.name(), prompt.len());
        let raw = self.backend.complete(prompt).await?;
        Ok(remove_think_block(&raw))
    }
}

/// A key is valid when the service answers a one-word prompt with it.
pub async fn validate_gemini_api_key(api_key: &str) -> bool {
    let config = GeminiConfig {
        api_key: api_key.to_string(),
        max_tokens: Some(8),
        max_retries: 0,
        timeout_seconds: 30,
        ..GeminiConfig::default()
    };
    let backend = match GeminiBackend::new(config) {
        Ok(backend) => backend,
        Err(_) => return false,
    };

    match backend.complete("Hello").await {
        Ok(_) => true,
        Err(e) => {
            debug!("Gemini key validation failed: {}", e);
            false
        }
    }
}

pub struct GeminiKeyValidator;

#[async_trait]
impl KeyValidator for GeminiKeyValidator {
    async fn validate(&self, api_key: &str) -> bool {
        validate_gemini_api_key(api_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{encode_secure_value, GEMINI_API_KEY, META_SECTION};
    use crate::testing::ScriptedLlm;
    use tempfile::TempDir;

    #[test]
    fn test_remove_think_block() {
        let text = "<think>\nplanning the answer\n</think>\n\nActual answer";
        assert_eq!(remove_think_block(text), "Actual answer");
        assert_eq!(remove_think_block("no block here"), "no block here");
        assert_eq!(
            remove_think_block("<think>a</think> one <think>b</think>two"),
            "one two"
        );
    }

    #[tokio::test]
    async fn test_query_strips_think_block() {
        let llm = UnifiedLlm::with_backend(Box::new(ScriptedLlm::new(vec![Ok(
            "<think>hmm</think>result".to_string(),
        )])));
        assert_eq!(llm.query("prompt").await.unwrap(), "result");
    }

    #[tokio::test]
    async fn test_query_unavailable_backend() {
        let llm = UnifiedLlm::with_backend(Box::new(ScriptedLlm::unavailable()));
        let err = llm.query("prompt").await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(
            err.to_string(),
            "Scripted is not available. Please check your configuration."
        );
    }

    #[test]
    fn test_from_config_prefers_gemini_with_key() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::load_from(dir.path().join("config.toml")).unwrap();
        store.set_value(META_SECTION, GEMINI_API_KEY, &encode_secure_value("k"));
        let llm = UnifiedLlm::from_config(&store, "default").unwrap();
        assert_eq!(llm.name(), "Gemini");
        assert!(llm.is_remote());
    }

    #[test]
    fn test_from_config_falls_back_to_ollama() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::load_from(dir.path().join("config.toml")).unwrap();
        store.set_value("default", OLLAMA_MODEL_KEY, "llama3");
        let llm = UnifiedLlm::from_config(&store, "default").unwrap();
        assert_eq!(llm.name(), "Ollama");
        assert!(!llm.is_remote());
    }

    #[test]
    fn test_gemini_requires_key() {
        assert!(GeminiBackend::with_api_key(String::new()).is_err());
    }

    #[test]
    fn test_gemini_key_is_sent_as_header() {
        let backend = GeminiBackend::with_api_key("secret-key".to_string()).unwrap();
        let request = GeminiRequest {
            contents: Vec::new(),
            generation_config: None,
        };
        let built = backend.generate_request(&request).build().unwrap();

        assert!(!built.url().as_str().contains("secret-key"));
        assert!(built.url().query().is_none());
        assert!(built.url().path().ends_with(":generateContent"));
        assert_eq!(built.headers()["x-goog-api-key"], "secret-key");
    }

    #[test]
    fn test_gemini_response_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Hello world"));

        let empty: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), None);
    }
}
