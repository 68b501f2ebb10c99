//! OpenRouter adapter for chat completions and the model catalog.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    async fn models(&self) -> Result<Vec<ModelCatalogEntry>, ProviderError>;
}

// =============================================================================
// OPENROUTER ADAPTER
// =============================================================================

/// Maximum allowed response content length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Default result cap for plugin web search.
pub const DEFAULT_WEB_MAX_RESULTS: u32 = 5;

/// OpenRouter API adapter.
#[derive(Debug, Clone)]
pub struct OpenRouterAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl OpenRouterAdapter {
    /// Create from API key with production defaults.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(
            api_key,
            "https://openrouter.ai/api/v1",
            Duration::from_secs(120),
            None,
            None,
        )
    }

    /// Create from the `OPENROUTER_API_KEY` environment variable.
    /// Base URL, referer, and title are fixed at construction; no other
    /// environment variable is consulted.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ProviderError::config("OPENROUTER_API_KEY not set"))?;
        Self::new(api_key)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        referer: Option<String>,
        app_title: Option<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let base_url = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        if let Some(ref r) = referer {
            if let Ok(v) = HeaderValue::from_str(r) {
                headers.insert("HTTP-Referer", v);
            }
        }

        if let Some(ref t) = app_title {
            if let Ok(v) = HeaderValue::from_str(t) {
                headers.insert("X-Title", v);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    /// Effective wire model id. Flag-only web search rides on the id.
    fn wire_model_id(req: &ChatRequest) -> String {
        match req.web_search {
            WebSearch::Enabled => format!("{}:online", req.model),
            _ => req.model.clone(),
        }
    }

    /// Extract request ID from response headers.
    fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// Parse a Retry-After header given in whole seconds.
    fn extract_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugins: Option<Vec<WebPluginSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptionsSpec>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: m.content.clone(),
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct WebPluginSpec {
    id: &'static str,
    max_results: u32,
}

#[derive(Serialize)]
struct WebSearchOptionsSpec {
    search_context_size: &'static str,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<ApiUsage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    annotations: Option<Vec<Annotation>>,
}

#[derive(Deserialize)]
struct Annotation {
    #[serde(rename = "type")]
    kind: Option<String>,
    url_citation: Option<ApiCitation>,
}

#[derive(Deserialize)]
struct ApiCitation {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    start_index: Option<usize>,
    #[serde(default)]
    end_index: Option<usize>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct ModelsApiResponse {
    data: Vec<ModelCatalogEntry>,
}

fn collect_citations(annotations: Option<Vec<Annotation>>) -> Vec<Citation> {
    annotations
        .unwrap_or_default()
        .into_iter()
        .filter(|a| a.kind.as_deref() == Some("url_citation"))
        .filter_map(|a| a.url_citation)
        .map(|c| Citation {
            url: c.url,
            title: c.title.unwrap_or_default(),
            content: c.content,
            start_index: c.start_index.unwrap_or(0),
            end_index: c.end_index.unwrap_or(0),
        })
        .collect()
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for OpenRouterAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();

        let messages: Vec<ApiMessage> = req.messages.iter().map(ApiMessage::from).collect();
        let wire_model = Self::wire_model_id(req);

        let api_req = ChatApiRequest {
            model: &wire_model,
            messages: &messages,
            temperature: req.temperature,
            stream: false,
            max_tokens: req.max_tokens,
            response_format: if req.json_mode {
                Some(ResponseFormat {
                    format_type: "json_object",
                })
            } else {
                None
            },
            plugins: match req.web_search {
                WebSearch::MaxResults(n) => Some(vec![WebPluginSpec {
                    id: "web",
                    max_results: n.max(1),
                }]),
                _ => None,
            },
            web_search_options: match req.web_search {
                WebSearch::Context(size) => Some(WebSearchOptionsSpec {
                    search_context_size: size.as_str(),
                }),
                _ => None,
            },
        };

        let mut response = self
            .client
            .post(self.chat_url())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let retry_after = Self::extract_retry_after(response.headers());

        // Stream response to enforce size limit
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(ProviderError::validation(format!(
                    "Response too large: {new_len} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();

        if !status.is_success() {
            let mut ctx = ErrorContext {
                http_status: Some(status.as_u16()),
                provider_code: None,
                request_id,
            };
            let message = match serde_json::from_str::<ChatApiResponse>(&body) {
                Ok(ChatApiResponse {
                    error: Some(error), ..
                }) => {
                    ctx.provider_code = error.code;
                    error.message.unwrap_or_default()
                }
                _ => format!("HTTP {}", status.as_u16()),
            };

            return Err(if status.as_u16() == 429 {
                ProviderError::rate_limited(retry_after, ctx)
            } else {
                ProviderError::remote_api(status.as_u16(), message, ctx)
            });
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::validation(format!("Invalid JSON: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::validation(format!(
                "Provider error in 200 body: {}",
                error.message.unwrap_or_default()
            )));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::validation("No choices in response"))?;

        let message = choice
            .message
            .ok_or_else(|| ProviderError::validation("No message in first choice"))?;

        let content = message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::validation("Empty content in response"));
        }

        let citations = collect_citations(message.annotations);

        let usage = parsed.usage.map(|u| {
            let prompt = u.prompt_tokens.unwrap_or(0);
            let completion = u.completion_tokens.unwrap_or(0);
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: u.total_tokens.unwrap_or(prompt + completion),
            }
        });

        Ok(ChatResponse {
            content,
            citations,
            usage,
            latency: start.elapsed(),
        })
    }

    async fn models(&self) -> Result<Vec<ModelCatalogEntry>, ProviderError> {
        let response = self.client.get(self.models_url()).send().await?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let retry_after = Self::extract_retry_after(response.headers());

        if !status.is_success() {
            let ctx = ErrorContext {
                http_status: Some(status.as_u16()),
                provider_code: None,
                request_id,
            };
            return Err(if status.as_u16() == 429 {
                ProviderError::rate_limited(retry_after, ctx)
            } else {
                ProviderError::remote_api(status.as_u16(), format!("HTTP {}", status.as_u16()), ctx)
            });
        }

        let body = response.text().await?;
        let parsed: ModelsApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::validation(format!("Invalid catalog JSON: {e}")))?;

        Ok(parsed.data)
    }
}
