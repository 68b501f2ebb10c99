//! Provider gateway for OpenRouter chat completions.

pub mod error;
pub mod openrouter;
pub mod pricing;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::council::types::{ModelResponse, QueryOptions, ResponseMeta};
use crate::council::QueryBackend;

use openrouter::{ChatProvider, OpenRouterAdapter};
use usage::UsageSink as UsageSinkTrait;

pub use error::{ErrorContext, ProviderError};
pub use pricing::*;
pub use types::*;
pub use usage::{CallOutcome, GatewayCall, NullUsageSink, StderrUsageSink, UsageSink};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Retrying gateway around the wire adapter.
///
/// Holds the pricing table and reports every call to a [`UsageSink`].
pub struct ProviderGateway<U: UsageSinkTrait> {
    provider: OpenRouterAdapter,
    usage_sink: Arc<U>,
    pricing: PricingTable,
    config: GatewayConfig,
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let provider = OpenRouterAdapter::from_env()?;
        Ok(Self {
            provider,
            usage_sink,
            pricing: PricingTable::builtin(),
            config: GatewayConfig::default(),
        })
    }

    pub fn with_config(
        provider: OpenRouterAdapter,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            provider,
            usage_sink,
            pricing: PricingTable::builtin(),
            config,
        }
    }

    /// Replace the built-in pricing table with an externally loaded one.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Chat completion with retry. Retries 429 (honoring the server's
    /// retry-after hint), 5xx, and transport errors with exponential
    /// backoff; everything else fails fast.
    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.provider.chat(&req).await {
                Ok(resp) => {
                    self.record_chat(&req, Some(&resp), None).await;
                    return Ok(resp);
                }
                Err(err) => {
                    self.record_chat(&req, None, Some(err.code())).await;

                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = err
                        .retry_after_hint()
                        .unwrap_or_else(|| backoff_delay(self.config.retry_base_delay, attempt));
                    tracing::debug!(
                        model = %req.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying chat completion"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::validation("retry loop exited without an error")))
    }

    /// Fetch the model catalog. The one gateway operation whose failure
    /// propagates to the caller.
    pub async fn models(&self) -> Result<Vec<ModelCatalogEntry>, ProviderError> {
        let start = Instant::now();
        let result = self.provider.models().await;

        let call = GatewayCall::catalog("gateway::catalog")
            .latency(start.elapsed().as_millis() as u64);
        let call = match &result {
            Ok(_) => call,
            Err(err) => call.failed(err.code()),
        };
        self.usage_sink.record(call).await;

        result
    }

    pub fn estimate_cost(&self, model_id: &str, total_tokens: u64) -> f64 {
        self.pricing.estimate(model_id, total_tokens)
    }

    async fn record_chat(
        &self,
        req: &ChatRequest,
        resp: Option<&ChatResponse>,
        error_code: Option<&'static str>,
    ) {
        let mut call = GatewayCall::chat(&req.model, req.attribution.caller)
            .user(req.attribution.user_id)
            .session(req.attribution.session_id);

        if let Some(resp) = resp {
            call = call.latency(resp.latency.as_millis() as u64);
            if let Some(usage) = resp.usage {
                call = call
                    .tokens(usage.prompt_tokens, usage.completion_tokens)
                    .cost(self.pricing.estimate(&req.model, usage.total_tokens as u64));
            }
        }

        let call = match error_code {
            Some(code) => call.failed(code),
            None => call,
        };

        self.usage_sink.record(call).await;
    }
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> QueryBackend for ProviderGateway<U> {
    /// Query one model. Failures are materialized as error responses; the
    /// latency clock spans every attempt, retry waits included.
    async fn query_model(
        &self,
        model_id: &str,
        messages: &[Message],
        options: &QueryOptions,
    ) -> ModelResponse {
        let start = Instant::now();

        let mut req = ChatRequest::new(model_id, messages.to_vec(), Attribution::new("council::query"))
            .temperature(options.temperature)
            .web_search(options.web_search);
        if let Some(max) = options.max_tokens {
            req = req.max_tokens(max);
        }

        let outcome = if options.cancel.is_cancelled() {
            Err(ProviderError::Cancelled)
        } else {
            tokio::select! {
                result = self.chat(req) => result,
                _ = options.cancel.cancelled() => Err(ProviderError::Cancelled),
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(resp) => {
                let meta = resp.usage.map(|usage| {
                    let tokens_cost = self.pricing.estimate(model_id, usage.total_tokens as u64);
                    let search_cost = web_search_cost(options.web_search.billed_results());
                    ResponseMeta {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        total_tokens: usage.total_tokens,
                        latency_ms,
                        estimated_cost: Some(tokens_cost + search_cost),
                    }
                });
                let mut response = ModelResponse::success(model_id, resp.content);
                response.citations = resp.citations;
                response.meta = meta;
                response
            }
            Err(err) => {
                tracing::warn!(model = %model_id, error = %err, "Model query failed");
                ModelResponse::failure(model_id, err.to_string())
            }
        }
    }

    async fn available_models(&self) -> Result<Vec<ModelCatalogEntry>, ProviderError> {
        self.models().await
    }

    fn estimate_cost(&self, model_id: &str, total_tokens: u64) -> f64 {
        ProviderGateway::estimate_cost(self, model_id, total_tokens)
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}
