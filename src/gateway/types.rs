//! Core types for the provider gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for cost tracking and debugging.
///
/// Every request through the gateway carries attribution so we know:
/// - Who made the request (user_id)
/// - Which session it belongs to (session_id)
/// - Which code path triggered it (caller)
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// User who initiated the request (if known).
    pub user_id: Option<Uuid>,
    /// Council session this request is part of.
    pub session_id: Option<Uuid>,
    /// Which code path made this call, for debugging.
    /// Use a static string like "council::fanout" or "council::synthesis".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// WEB SEARCH
// =============================================================================

/// Requested breadth of web search context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchContextSize {
    Low,
    Medium,
    High,
}

impl SearchContextSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchContextSize::Low => "low",
            SearchContextSize::Medium => "medium",
            SearchContextSize::High => "high",
        }
    }
}

/// Web-search augmentation for a completion call.
///
/// Each variant maps to exactly one wire encoding:
/// - `Enabled` appends the `:online` suffix to the model id.
/// - `MaxResults` requests the `web` plugin with a result cap.
/// - `Context` sets `web_search_options.search_context_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WebSearch {
    #[default]
    Off,
    Enabled,
    MaxResults(u32),
    Context(SearchContextSize),
}

impl WebSearch {
    pub fn is_off(&self) -> bool {
        matches!(self, WebSearch::Off)
    }

    /// Number of search results the plugin encoding will be billed for.
    pub fn billed_results(&self) -> u32 {
        match self {
            WebSearch::MaxResults(n) => *n,
            _ => 0,
        }
    }
}

/// A web citation attached to a response, with byte offsets into the
/// response text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// Request for a chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// OpenRouter model id, e.g. "anthropic/claude-3-5-haiku".
    pub model: String,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Whether to request JSON output.
    pub json_mode: bool,
    /// Web-search augmentation.
    pub web_search: WebSearch,
    /// Attribution for cost tracking.
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            max_tokens: None,
            json_mode: false,
            web_search: WebSearch::Off,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn web_search(mut self, web: WebSearch) -> Self {
        self.web_search = web;
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated content.
    pub content: String,
    /// Web citations, when search was active and the provider returned any.
    pub citations: Vec<Citation>,
    /// Token usage. Absent when the provider omitted the usage block.
    pub usage: Option<TokenUsage>,
    /// Time taken for this attempt.
    pub latency: Duration,
}

// =============================================================================
// MODEL CATALOG
// =============================================================================

/// Provider-advertised per-token pricing strings from the catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogPricing {
    pub prompt: String,
    pub completion: String,
}

/// One entry of the gateway's model catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelCatalogEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pricing: Option<CatalogPricing>,
    #[serde(default)]
    pub context_length: Option<u64>,
}
