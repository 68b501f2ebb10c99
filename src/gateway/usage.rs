//! Call accounting for the provider gateway.
//!
//! Every call the gateway issues is reported to a [`UsageSink`], so spend
//! can be metered without the gateway knowing where the numbers land: a
//! server wires in its own store, tools print to stderr, tests drop the
//! records entirely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// How a gateway call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Succeeded,
    Failed,
}

impl CallOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Succeeded => "succeeded",
            CallOutcome::Failed => "failed",
        }
    }
}

/// Accounting record for one call through the gateway.
///
/// Token fields use the same prompt/completion split the council's
/// response meta uses, and cost is the USD estimate from the active
/// pricing table.
#[derive(Debug, Clone)]
pub struct GatewayCall {
    /// Which API was hit: "chat/completions" or "models".
    pub endpoint: &'static str,
    /// Model id as sent on the wire. Empty for catalog fetches.
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    /// Wall-clock time of the attempt in milliseconds.
    pub latency_ms: u64,
    pub outcome: CallOutcome,
    /// Short machine-readable code when the call failed.
    pub error_code: Option<&'static str>,
    /// Code path that issued the call, e.g. "council::query".
    pub caller: &'static str,
    /// User on whose behalf the call ran, when known.
    pub user_id: Option<Uuid>,
    /// Council session the call belongs to, when known.
    pub session_id: Option<Uuid>,
    /// When the call was issued.
    pub at: DateTime<Utc>,
}

impl GatewayCall {
    /// Record for a chat completion attempt.
    pub fn chat(model: impl Into<String>, caller: &'static str) -> Self {
        Self::started("chat/completions", model.into(), caller)
    }

    /// Record for a model catalog fetch.
    pub fn catalog(caller: &'static str) -> Self {
        Self::started("models", String::new(), caller)
    }

    fn started(endpoint: &'static str, model: String, caller: &'static str) -> Self {
        Self {
            endpoint,
            model,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_usd: 0.0,
            latency_ms: 0,
            outcome: CallOutcome::Succeeded,
            error_code: None,
            caller,
            user_id: None,
            session_id: None,
            at: Utc::now(),
        }
    }

    pub fn tokens(mut self, prompt: u32, completion: u32) -> Self {
        self.prompt_tokens = prompt;
        self.completion_tokens = completion;
        self
    }

    pub fn cost(mut self, usd: f64) -> Self {
        self.cost_usd = usd;
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn session(mut self, session_id: Option<Uuid>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Mark the call failed, tagging it with a short error code.
    pub fn failed(mut self, code: &'static str) -> Self {
        self.outcome = CallOutcome::Failed;
        self.error_code = Some(code);
        self
    }
}

/// Destination for gateway call records.
///
/// Recording must never interfere with the call path: implementations deal
/// with their own failures (log and move on) rather than propagating them.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, call: GatewayCall);
}

/// Sink that throws every record away. The default for tests and for
/// tools that do not meter spend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUsageSink;

#[async_trait]
impl UsageSink for NullUsageSink {
    async fn record(&self, _call: GatewayCall) {}
}

/// Sink that prints one JSON line per call to stderr, for ad-hoc metering
/// of interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, call: GatewayCall) {
        eprintln!(
            r#"{{"at":"{}","endpoint":"{}","model":"{}","prompt_tokens":{},"completion_tokens":{},"cost_usd":{:.6},"latency_ms":{},"outcome":"{}","caller":"{}"}}"#,
            call.at.to_rfc3339(),
            call.endpoint,
            call.model,
            call.prompt_tokens,
            call.completion_tokens,
            call.cost_usd,
            call.latency_ms,
            call.outcome.label(),
            call.caller,
        );
    }
}
