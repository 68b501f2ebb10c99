//! Data model for council sessions: model references, per-call options,
//! responses, rounds, and session results.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::gateway::{Citation, WebSearch};

// =============================================================================
// Constants
// =============================================================================

/// System prompt used when neither the model nor the council declares one.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a member of a council of AI advisors. Give your best, well-reasoned \
     answer to the user's question.";

/// Synthesizer used when the council does not designate one.
/// Low-cost model, good enough for folding answers together.
pub const DEFAULT_SYNTHESIZER_MODEL: &str = "openai/gpt-4o-mini";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Error text placed in slots that lost the first-N race. Downstream logic
/// branches on the exact string, so it is part of the contract.
pub const FIRST_N_SENTINEL: &str = "Response not needed (first-n limit reached)";

/// Error text placed in slots dropped by the time-limit filter.
pub const TIME_LIMIT_ERROR: &str = "Filtered: exceeded time limit";

/// Error text for synthesis over a round with no successful responses.
pub const NO_CONTENT_ERROR: &str = "No successful responses to synthesize";

// =============================================================================
// Model references
// =============================================================================

/// A council member: a bare model id, or an id with a per-model system
/// prompt override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ModelRef {
    Id(String),
    WithSystem {
        id: String,
        system: String,
    },
}

impl ModelRef {
    pub fn new(id: impl Into<String>) -> Self {
        ModelRef::Id(id.into())
    }

    pub fn with_system(id: impl Into<String>, system: impl Into<String>) -> Self {
        ModelRef::WithSystem {
            id: id.into(),
            system: system.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            ModelRef::Id(id) => id,
            ModelRef::WithSystem { id, .. } => id,
        }
    }

    /// Effective system prompt: per-model override, else the council's,
    /// else the built-in default.
    pub fn effective_system<'a>(&'a self, council_system: Option<&'a str>) -> &'a str {
        match self {
            ModelRef::WithSystem { system, .. } => system,
            ModelRef::Id(_) => council_system.unwrap_or(DEFAULT_SYSTEM_PROMPT),
        }
    }
}

impl From<&str> for ModelRef {
    fn from(id: &str) -> Self {
        ModelRef::Id(id.to_string())
    }
}

// =============================================================================
// Query options
// =============================================================================

/// Fully resolved options carried through a session.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Session cancellation handle, shared by every request.
    pub cancel: CancelToken,
    /// Web-search augmentation.
    pub web_search: WebSearch,
    /// Race to the first N settled responses. Must be <= model count.
    pub first_n: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            cancel: CancelToken::new(),
            web_search: WebSearch::Off,
            first_n: None,
        }
    }
}

impl QueryOptions {
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn web_search(mut self, web: WebSearch) -> Self {
        self.web_search = web;
        self
    }

    pub fn first_n(mut self, n: usize) -> Self {
        self.first_n = Some(n);
        self
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Token and timing accounting for one response. Latency is measured by the
/// orchestrator from dispatch to settlement, retry waits included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseMeta {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub latency_ms: u64,
    /// Estimated cost in USD, when the gateway priced the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

/// One model's answer, or its failure. Exactly one of `content` and `error`
/// is present; the constructors enforce it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelResponse {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelResponse {
    pub fn success(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: Some(content.into()),
            citations: Vec::new(),
            meta: None,
            error: None,
        }
    }

    pub fn failure(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: None,
            citations: Vec::new(),
            meta: None,
            error: Some(error.into()),
        }
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn is_success(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether this slot lost a first-N race.
    pub fn is_first_n_sentinel(&self) -> bool {
        self.error.as_deref() == Some(FIRST_N_SENTINEL)
    }

    /// Whether this slot was dropped by the time-limit filter.
    pub fn is_time_limited(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.starts_with(TIME_LIMIT_ERROR))
    }
}

/// One fan-out pass: slot i holds model i's response.
pub type RoundResult = Vec<ModelResponse>;

// =============================================================================
// Session results
// =============================================================================

/// Summary accounting over a whole session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsensusMetadata {
    /// Total estimated cost in USD across all rounds and synthesis.
    pub total_cost: f64,
    /// Total tokens across all rounds and synthesis.
    pub total_tokens: u64,
    /// Mean latency in whole milliseconds over responses that carry meta.
    pub average_latency_ms: u64,
    /// Number of council members (length of round 1).
    pub model_count: usize,
}

/// Result of a full council session.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResponse {
    pub rounds: Vec<RoundResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<ModelResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConsensusMetadata>,
}

impl ConsensusResponse {
    /// True iff at least one slot of the final round carries content.
    /// Callers translate this to process exit codes.
    pub fn any_success(&self) -> bool {
        self.rounds
            .last()
            .is_some_and(|round| round.iter().any(|r| r.is_success()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ref_id_helpers() {
        let bare = ModelRef::new("openai/gpt-4o");
        assert_eq!(bare.model_id(), "openai/gpt-4o");
        assert_eq!(bare.effective_system(None), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(bare.effective_system(Some("council prompt")), "council prompt");

        let with_system = ModelRef::with_system("openai/gpt-4o", "be terse");
        assert_eq!(with_system.model_id(), "openai/gpt-4o");
        assert_eq!(with_system.effective_system(Some("council prompt")), "be terse");
    }

    #[test]
    fn model_ref_deserializes_both_shapes() {
        let bare: ModelRef = serde_json::from_str(r#""openai/gpt-4o""#).unwrap();
        assert_eq!(bare, ModelRef::new("openai/gpt-4o"));

        let with_system: ModelRef =
            serde_json::from_str(r#"{"id":"openai/gpt-4o","system":"be terse"}"#).unwrap();
        assert_eq!(with_system, ModelRef::with_system("openai/gpt-4o", "be terse"));
    }

    #[test]
    fn response_constructors_are_exclusive() {
        let ok = ModelResponse::success("a", "hello");
        assert!(ok.is_success() && !ok.is_error());

        let bad = ModelResponse::failure("a", "boom");
        assert!(bad.is_error() && !bad.is_success());
        assert_eq!(bad.error.as_deref(), Some("boom"));
    }

    #[test]
    fn sentinel_detection_is_exact() {
        let sentinel = ModelResponse::failure("a", FIRST_N_SENTINEL);
        assert!(sentinel.is_first_n_sentinel());

        let other = ModelResponse::failure("a", "Response not needed");
        assert!(!other.is_first_n_sentinel());
    }

    #[test]
    fn any_success_checks_final_round_only() {
        let resp = ConsensusResponse {
            rounds: vec![
                vec![ModelResponse::success("a", "x")],
                vec![ModelResponse::failure("a", "boom")],
            ],
            synthesis: None,
            metadata: None,
        };
        assert!(!resp.any_success());

        let empty = ConsensusResponse {
            rounds: vec![],
            synthesis: None,
            metadata: None,
        };
        assert!(!empty.any_success());
    }
}
