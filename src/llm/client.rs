use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{LlmConfig, Provider};
use crate::error::GenerationError;

/// Sampling options for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A generative text service: two prompts in, raw text out.
///
/// Output is untrusted; callers clean and validate it. Implementations must be
/// safe to call from several flow pipelines at once.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, GenerationError>;
}

// ============================================================================
// HTTP providers
// ============================================================================

/// Chat-style HTTP client for Ollama, OpenAI-compatible and Anthropic APIs.
pub struct HttpGenerator {
    provider: Provider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            provider: config.provider,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<serde_json::Value, GenerationError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.post(&url).json(body);

        request = match self.provider {
            Provider::Ollama => request,
            Provider::OpenAi => match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            },
            Provider::Anthropic => request
                .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
                .header("anthropic-version", "2023-06-01"),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

fn decode<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<T, GenerationError> {
    serde_json::from_value(value).map_err(|e| GenerationError::Decode(e.to_string()))
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        debug!(
            provider = ?self.provider,
            model = %self.model,
            prompt_chars = system_prompt.len() + user_prompt.len(),
            "generative call"
        );

        match self.provider {
            Provider::Ollama => {
                let body = OllamaChatRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: system_prompt,
                        },
                        ChatMessage {
                            role: "user",
                            content: user_prompt,
                        },
                    ],
                    stream: false,
                    options: OllamaOptions {
                        temperature: options.temperature,
                        num_predict: options.max_tokens,
                    },
                };
                let response: OllamaChatResponse = decode(self.post("/api/chat", &body).await?)?;
                Ok(response.message.content)
            }
            Provider::OpenAi => {
                let body = OpenAiChatRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: system_prompt,
                        },
                        ChatMessage {
                            role: "user",
                            content: user_prompt,
                        },
                    ],
                    temperature: options.temperature,
                    max_tokens: options.max_tokens,
                };
                let response: OpenAiChatResponse =
                    decode(self.post("/v1/chat/completions", &body).await?)?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| GenerationError::Decode("response has no choices".into()))
            }
            Provider::Anthropic => {
                let body = AnthropicRequest {
                    model: &self.model,
                    system: system_prompt,
                    messages: vec![ChatMessage { role: "user", content: user_prompt }],
                    temperature: options.temperature,
                    max_tokens: options.max_tokens,
                };
                let response: AnthropicResponse = decode(self.post("/v1/messages", &body).await?)?;
                Ok(response
                    .content
                    .into_iter()
                    .filter_map(|b| b.text)
                    .collect::<Vec<_>>()
                    .join(""))
            }
        }
    }
}
