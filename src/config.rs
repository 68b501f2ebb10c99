//! Validated configuration schema for councils.
//!
//! The orchestrator consumes already-validated values; discovery and file
//! handling belong to the caller. Shapes mirror the external JSON config:
//! camelCase keys, explicit defaults, and unknown fields rejected loudly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::council::types::ModelRef;
use crate::gateway::{SearchContextSize, WebSearch};

pub const MIN_ROUNDS: u32 = 1;
pub const MAX_ROUNDS: u32 = 10;
pub const MIN_TIME_LIMIT_SECS: f64 = 0.1;
pub const MAX_TIME_LIMIT_SECS: f64 = 300.0;
pub const MAX_WEB_RESULTS: u32 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("models must not be empty")]
    EmptyModels,

    #[error("rounds must be {MIN_ROUNDS}..={MAX_ROUNDS}, got {0}")]
    RoundsOutOfRange(u32),

    #[error("temperature must be 0..=2, got {0}")]
    TemperatureOutOfRange(f32),

    #[error("firstN must be >= 1")]
    FirstNZero,

    #[error("firstN must be <= number of models ({models}), got {first_n}")]
    FirstNTooLarge { first_n: usize, models: usize },

    #[error("webMaxResults must be 1..={MAX_WEB_RESULTS}, got {0}")]
    WebMaxResultsOutOfRange(u32),

    #[error("timeLimit must be {MIN_TIME_LIMIT_SECS}..={MAX_TIME_LIMIT_SECS} seconds, got {0}")]
    TimeLimitOutOfRange(f64),

    #[error("defaultCouncil names unknown council: {0}")]
    UnknownDefaultCouncil(String),

    #[error("unknown council: {0}")]
    UnknownCouncil(String),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Partial, overridable call options. Used both as a council's `defaults`
/// block and as call-site overrides; unset fields defer to the next layer.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct QueryDefaults {
    pub rounds: Option<u32>,
    pub single: Option<bool>,
    pub temperature: Option<f32>,
    pub first_n: Option<usize>,
    pub web: Option<bool>,
    pub web_max_results: Option<u32>,
    pub web_context: Option<SearchContextSize>,
    pub time_limit: Option<f64>,
}

impl QueryDefaults {
    /// Layer `self` over `base`: set fields win, unset fields fall through.
    pub fn overlay(&self, base: &QueryDefaults) -> QueryDefaults {
        QueryDefaults {
            rounds: self.rounds.or(base.rounds),
            single: self.single.or(base.single),
            temperature: self.temperature.or(base.temperature),
            first_n: self.first_n.or(base.first_n),
            web: self.web.or(base.web),
            web_max_results: self.web_max_results.or(base.web_max_results),
            web_context: self.web_context.or(base.web_context),
            time_limit: self.time_limit.or(base.time_limit),
        }
    }

    /// Canonical web-search mode. A result cap selects the plugin encoding,
    /// a context size selects the search-options encoding, and the bare
    /// flag selects the model-suffix encoding.
    pub fn web_search(&self) -> WebSearch {
        if let Some(n) = self.web_max_results {
            WebSearch::MaxResults(n)
        } else if let Some(size) = self.web_context {
            WebSearch::Context(size)
        } else if self.web == Some(true) {
            WebSearch::Enabled
        } else {
            WebSearch::Off
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rounds) = self.rounds {
            if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&rounds) {
                return Err(ConfigError::RoundsOutOfRange(rounds));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::TemperatureOutOfRange(t));
            }
        }
        if self.first_n == Some(0) {
            return Err(ConfigError::FirstNZero);
        }
        if let Some(n) = self.web_max_results {
            if !(1..=MAX_WEB_RESULTS).contains(&n) {
                return Err(ConfigError::WebMaxResultsOutOfRange(n));
            }
        }
        if let Some(limit) = self.time_limit {
            if !(MIN_TIME_LIMIT_SECS..=MAX_TIME_LIMIT_SECS).contains(&limit) {
                return Err(ConfigError::TimeLimitOutOfRange(limit));
            }
        }
        Ok(())
    }
}

/// One council: members, shared system prompt, synthesizer, rounds, and
/// default call options.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CouncilConfig {
    pub models: Vec<ModelRef>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub synthesizer: Option<ModelRef>,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default)]
    pub defaults: QueryDefaults,
}

fn default_rounds() -> u32 {
    1
}

impl CouncilConfig {
    pub fn new(models: Vec<ModelRef>) -> Self {
        Self {
            models,
            system: None,
            synthesizer: None,
            rounds: default_rounds(),
            defaults: QueryDefaults::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::EmptyModels);
        }
        if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&self.rounds) {
            return Err(ConfigError::RoundsOutOfRange(self.rounds));
        }
        self.defaults.validate()?;
        if let Some(first_n) = self.defaults.first_n {
            if first_n > self.models.len() {
                return Err(ConfigError::FirstNTooLarge {
                    first_n,
                    models: self.models.len(),
                });
            }
        }
        Ok(())
    }
}

/// Root of the external configuration: an anonymous council plus an
/// optional registry of named ones.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RootConfig {
    #[serde(default)]
    pub models: Vec<ModelRef>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub synthesizer: Option<ModelRef>,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default)]
    pub defaults: QueryDefaults,
    #[serde(default)]
    pub councils: BTreeMap<String, CouncilConfig>,
    #[serde(default)]
    pub default_council: Option<String>,
}

impl RootConfig {
    /// Parse and validate in one step.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RootConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.default_council {
            if !self.councils.contains_key(name) {
                return Err(ConfigError::UnknownDefaultCouncil(name.clone()));
            }
        }
        for council in self.councils.values() {
            council.validate()?;
        }
        // The root model list is the fallback council; it must stand on its
        // own only when no named council can be selected instead.
        if self.councils.is_empty() || self.default_council.is_none() {
            self.root_council().validate()?;
        }
        Ok(())
    }

    fn root_council(&self) -> CouncilConfig {
        CouncilConfig {
            models: self.models.clone(),
            system: self.system.clone(),
            synthesizer: self.synthesizer.clone(),
            rounds: self.rounds,
            defaults: self.defaults.clone(),
        }
    }

    /// Resolve a council by name, by `defaultCouncil`, or from the root
    /// model list, in that order.
    pub fn council(&self, name: Option<&str>) -> Result<CouncilConfig, ConfigError> {
        match name {
            Some(name) => self
                .councils
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownCouncil(name.to_string())),
            None => match &self.default_council {
                Some(default) => self
                    .councils
                    .get(default)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownDefaultCouncil(default.clone())),
                None => Ok(self.root_council()),
            },
        }
    }
}
