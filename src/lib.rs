#![forbid(unsafe_code)]

//! # council-harness
//!
//! A multi-model deliberation engine. One prompt fans out to a council of
//! models behind the OpenRouter chat-completion API; answers come back in
//! council order with cost, latency, and token accounting. Optional
//! consensus rounds show each model its peers' answers and invite a
//! revision, and an optional synthesizer folds the final round into a
//! single definitive answer.
//!
//! Shaping policies: race to the first N settled responses, drop responses
//! slower than a wall-clock budget, and augment queries with web search.
//!
//! The crate is the orchestrator core. Front ends (CLI, protocol servers),
//! configuration discovery, and export rendering live with the caller.

pub mod cancel;
pub mod config;
pub mod council;
pub mod gateway;

pub use cancel::CancelToken;
pub use config::{ConfigError, CouncilConfig, QueryDefaults, RootConfig};
pub use council::{
    apply_time_limit, build_consensus_prompt, build_synthesis_prompt, query_all, query_first_n,
    CallOptions, ConsensusMetadata, ConsensusResponse, Council, ModelRef, ModelResponse,
    ProgressEvent, ProgressSink, ProgressStage, QueryBackend, QueryOptions, ResponseMeta,
    RoundResult, SerializedReporter, DEFAULT_SYNTHESIZER_MODEL, DEFAULT_SYSTEM_PROMPT,
    FIRST_N_SENTINEL, NO_CONTENT_ERROR, TIME_LIMIT_ERROR,
};
pub use gateway::{
    Citation, Message, ModelCatalogEntry, NullUsageSink, PricingTable, ProviderError,
    ProviderGateway, Role, SearchContextSize, StderrUsageSink, UsageSink, WebSearch,
};
