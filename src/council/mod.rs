//! Council orchestration: fan-out, consensus rounds, filtering, synthesis,
//! and session-level aggregation.

pub mod consensus;
pub mod fanout;
pub mod filter;
pub mod progress;
pub mod synthesis;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::config::{CouncilConfig, QueryDefaults};
use crate::gateway::{Message, ModelCatalogEntry, ProviderError};

pub use consensus::build_consensus_prompt;
pub use fanout::{query_all, query_first_n, ModelQuery};
pub use filter::apply_time_limit;
pub use progress::{ProgressEvent, ProgressSink, ProgressStage, ReporterWorker, SerializedReporter};
pub use synthesis::{build_synthesis_prompt, SYNTHESIZER_SYSTEM_PROMPT};
pub use types::*;

// =============================================================================
// BACKEND SEAM
// =============================================================================

/// What the orchestrator needs from a backend. Production uses the retrying
/// provider gateway; tests use deterministic stubs.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Query one model. Never fails; failures are materialized as error
    /// responses with the latency clock spanning the whole call.
    async fn query_model(
        &self,
        model_id: &str,
        messages: &[Message],
        options: &QueryOptions,
    ) -> ModelResponse;

    /// Fetch the model catalog. The only backend operation that may
    /// propagate a network failure.
    async fn available_models(&self) -> Result<Vec<ModelCatalogEntry>, ProviderError>;

    /// Estimated cost in USD for a call on `model_id` consuming
    /// `total_tokens`.
    fn estimate_cost(&self, model_id: &str, total_tokens: u64) -> f64;
}

// =============================================================================
// CALL OPTIONS
// =============================================================================

/// Per-call inputs layered over a council's defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Call-site overrides; set fields beat the council's defaults.
    pub overrides: QueryDefaults,
    /// Generation cap, call-site only.
    pub max_tokens: Option<u32>,
    /// Session cancellation handle. Firing it aborts every in-flight
    /// request; the session still returns a well-formed result.
    pub cancel: CancelToken,
}

impl CallOptions {
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn overrides(mut self, overrides: QueryDefaults) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Fully resolved session parameters: call-site > council defaults >
/// built-ins.
#[derive(Debug, Clone)]
struct SessionSettings {
    options: QueryOptions,
    rounds: u32,
    single: bool,
    time_limit: Option<Duration>,
}

fn resolve_session(config: &CouncilConfig, call: &CallOptions) -> SessionSettings {
    let merged = call.overrides.overlay(&config.defaults);
    SessionSettings {
        options: QueryOptions {
            temperature: merged.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: call.max_tokens,
            cancel: call.cancel.clone(),
            web_search: merged.web_search(),
            first_n: merged.first_n,
        },
        rounds: merged.rounds.unwrap_or(config.rounds),
        single: merged.single.unwrap_or(false),
        time_limit: merged.time_limit.map(Duration::from_secs_f64),
    }
}

// =============================================================================
// COUNCIL FACADE
// =============================================================================

/// Top-level orchestrator: wires fan-out, consensus, filtering, and
/// synthesis over a backend, and computes session metadata.
pub struct Council<B: QueryBackend + ?Sized> {
    backend: Arc<B>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl<B: QueryBackend + ?Sized + 'static> Council<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            progress: None,
        }
    }

    /// Attach a progress observer. Events for one model arrive in order;
    /// use [`SerializedReporter`] unless the sink is already thread-safe.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Single fan-out round, slots in council order.
    pub async fn query(
        &self,
        prompt: &str,
        config: &CouncilConfig,
        call: CallOptions,
    ) -> RoundResult {
        let settings = resolve_session(config, &call);
        let mut rounds = consensus::run_rounds(
            &self.backend,
            consensus::SessionPlan {
                models: &config.models,
                system: config.system.as_deref(),
                prompt,
                options: &settings.options,
                rounds: 1,
                time_limit: settings.time_limit,
                progress: self.progress.clone(),
            },
        )
        .await;
        rounds.remove(0)
    }

    /// Full session: consensus rounds, optional synthesis, and summary
    /// metadata.
    pub async fn query_with_consensus(
        &self,
        prompt: &str,
        config: &CouncilConfig,
        call: CallOptions,
    ) -> ConsensusResponse {
        let settings = resolve_session(config, &call);

        let rounds = consensus::run_rounds(
            &self.backend,
            consensus::SessionPlan {
                models: &config.models,
                system: config.system.as_deref(),
                prompt,
                options: &settings.options,
                rounds: settings.rounds,
                time_limit: settings.time_limit,
                progress: self.progress.clone(),
            },
        )
        .await;

        let synthesis = if settings.single {
            Some(
                synthesis::synthesize(
                    &self.backend,
                    config.synthesizer.as_ref(),
                    prompt,
                    &rounds,
                    &settings.options,
                )
                .await,
            )
        } else {
            None
        };

        let metadata = compute_metadata(self.backend.as_ref(), &rounds, synthesis.as_ref());

        ConsensusResponse {
            rounds,
            synthesis,
            metadata: Some(metadata),
        }
    }

    /// Ordered model ids from the gateway catalog.
    pub async fn available_models(&self) -> Result<Vec<String>, ProviderError> {
        let catalog = self.backend.available_models().await?;
        Ok(catalog.into_iter().map(|entry| entry.id).collect())
    }

    pub fn estimate_cost(&self, model_id: &str, total_tokens: u64) -> f64 {
        self.backend.estimate_cost(model_id, total_tokens)
    }
}

// =============================================================================
// METADATA
// =============================================================================

fn compute_metadata<B: QueryBackend + ?Sized>(
    backend: &B,
    rounds: &[RoundResult],
    synthesis: Option<&ModelResponse>,
) -> ConsensusMetadata {
    let mut total_cost = 0.0f64;
    let mut total_tokens = 0u64;
    let mut latency_sum = 0u64;
    let mut latency_count = 0u64;

    let all = rounds.iter().flatten().chain(synthesis);
    for response in all {
        if let Some(meta) = &response.meta {
            total_tokens += meta.total_tokens as u64;
            total_cost += meta.estimated_cost.unwrap_or_else(|| {
                backend.estimate_cost(&response.model, meta.total_tokens as u64)
            });
            latency_sum += meta.latency_ms;
            latency_count += 1;
        }
    }

    ConsensusMetadata {
        total_cost,
        total_tokens,
        average_latency_ms: if latency_count > 0 {
            latency_sum / latency_count
        } else {
            0
        },
        model_count: rounds.first().map(Vec::len).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::WebSearch;

    struct FlatRateBackend;

    #[async_trait]
    impl QueryBackend for FlatRateBackend {
        async fn query_model(
            &self,
            model_id: &str,
            _messages: &[Message],
            _options: &QueryOptions,
        ) -> ModelResponse {
            ModelResponse::success(model_id, "ok")
        }

        async fn available_models(&self) -> Result<Vec<ModelCatalogEntry>, ProviderError> {
            Ok(vec![])
        }

        fn estimate_cost(&self, _model_id: &str, total_tokens: u64) -> f64 {
            total_tokens as f64 / 1000.0 * 0.002
        }
    }

    fn meta(tokens: u32, latency_ms: u64, cost: Option<f64>) -> ResponseMeta {
        ResponseMeta {
            prompt_tokens: tokens / 2,
            completion_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            latency_ms,
            estimated_cost: cost,
        }
    }

    #[test]
    fn call_site_overrides_beat_council_defaults() {
        let mut config = CouncilConfig::new(vec![ModelRef::new("a"), ModelRef::new("b")]);
        config.rounds = 2;
        config.defaults.temperature = Some(0.2);
        config.defaults.first_n = Some(2);

        let call = CallOptions::default().overrides(QueryDefaults {
            temperature: Some(1.5),
            rounds: Some(3),
            ..Default::default()
        });

        let settings = resolve_session(&config, &call);
        assert_eq!(settings.options.temperature, 1.5);
        assert_eq!(settings.options.first_n, Some(2));
        assert_eq!(settings.rounds, 3);
        assert!(!settings.single);
    }

    #[test]
    fn built_ins_apply_when_nothing_is_set() {
        let config = CouncilConfig::new(vec![ModelRef::new("a")]);
        let settings = resolve_session(&config, &CallOptions::default());
        assert_eq!(settings.options.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(settings.options.web_search, WebSearch::Off);
        assert_eq!(settings.rounds, 1);
        assert_eq!(settings.time_limit, None);
    }

    #[test]
    fn config_rounds_apply_when_defaults_silent() {
        let mut config = CouncilConfig::new(vec![ModelRef::new("a")]);
        config.rounds = 4;
        let settings = resolve_session(&config, &CallOptions::default());
        assert_eq!(settings.rounds, 4);
    }

    #[test]
    fn metadata_sums_cost_tokens_and_latency() {
        let rounds = vec![vec![
            ModelResponse::success("a", "x").with_meta(meta(1000, 100, Some(0.01))),
            ModelResponse::success("b", "y").with_meta(meta(2000, 200, None)),
            ModelResponse::failure("c", "boom"),
        ]];

        let metadata = compute_metadata(&FlatRateBackend, &rounds, None);
        assert_eq!(metadata.total_tokens, 3000);
        // 0.01 explicit + 2000 tokens at the flat fallback rate.
        assert!((metadata.total_cost - (0.01 + 0.004)).abs() < 1e-9);
        assert_eq!(metadata.average_latency_ms, 150);
        assert_eq!(metadata.model_count, 3);
    }

    #[test]
    fn metadata_includes_synthesis() {
        let rounds = vec![vec![
            ModelResponse::success("a", "x").with_meta(meta(1000, 100, Some(0.01)))
        ]];
        let synthesis = ModelResponse::success("s", "folded").with_meta(meta(500, 300, Some(0.002)));

        let metadata = compute_metadata(&FlatRateBackend, &rounds, Some(&synthesis));
        assert_eq!(metadata.total_tokens, 1500);
        assert!((metadata.total_cost - 0.012).abs() < 1e-9);
        assert_eq!(metadata.average_latency_ms, 200);
        assert_eq!(metadata.model_count, 1);
    }

    #[test]
    fn metadata_handles_meta_free_rounds() {
        let rounds = vec![vec![ModelResponse::failure("a", "boom")]];
        let metadata = compute_metadata(&FlatRateBackend, &rounds, None);
        assert_eq!(metadata.total_cost, 0.0);
        assert_eq!(metadata.total_tokens, 0);
        assert_eq!(metadata.average_latency_ms, 0);
        assert_eq!(metadata.model_count, 1);
    }
}
