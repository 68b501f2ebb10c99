//! Model pricing registry.
//!
//! Rates are USD per 1000 total tokens. Lookup walks an explicitly ordered
//! rule base: exact model fragments first, then broader patterns, then a
//! default rate. Declaration order breaks ties when two keys both match, so
//! the table is a vector rather than a hash map.

use serde::{Deserialize, Serialize};

/// Default rate applied when no fragment or pattern matches.
pub const DEFAULT_RATE_PER_1K: f64 = 0.002;

/// Surcharge for plugin web search, USD per result.
/// OpenRouter bills the web plugin at $4 per 1000 results.
pub const WEB_PLUGIN_RATE_PER_RESULT: f64 = 0.004;

/// One rule of the rate table. `key` matches if it appears anywhere in the
/// lowercased model id.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RateEntry {
    pub key: String,
    pub rate: f64,
}

impl RateEntry {
    fn new(key: &str, rate: f64) -> Self {
        Self {
            key: key.to_string(),
            rate,
        }
    }
}

/// Immutable, ordered pricing rule base.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PricingTable {
    pub default_rate: f64,
    pub models: Vec<RateEntry>,
    pub patterns: Vec<RateEntry>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PricingTable {
    /// Built-in fallback used when no external table is supplied.
    /// Rates verified periodically against OpenRouter model pages.
    pub fn builtin() -> Self {
        Self {
            default_rate: DEFAULT_RATE_PER_1K,
            models: vec![
                RateEntry::new("claude-opus-4", 0.015),
                RateEntry::new("claude-3-5-sonnet", 0.009),
                RateEntry::new("claude-3-5-haiku", 0.0024),
                RateEntry::new("gpt-5.2-chat", 0.008),
                RateEntry::new("gpt-5-mini", 0.0011),
                RateEntry::new("gpt-4o-mini", 0.0004),
                RateEntry::new("gpt-4o", 0.0075),
                RateEntry::new("kimi-k2", 0.0011),
                RateEntry::new("deepseek", 0.0008),
                RateEntry::new("gemini-2.5-flash", 0.0013),
                RateEntry::new("gemini-2.5-pro", 0.006),
            ],
            patterns: vec![
                RateEntry::new("free", 0.0),
                RateEntry::new("mini", 0.0006),
                RateEntry::new("turbo", 0.001),
                RateEntry::new("pro", 0.004),
            ],
        }
    }

    /// Load a table from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Rate for a model in USD per 1000 total tokens. First match wins;
    /// exact fragments take precedence over patterns.
    pub fn rate_for(&self, model_id: &str) -> f64 {
        let id = model_id.to_lowercase();
        for entry in &self.models {
            if id.contains(&entry.key) {
                return entry.rate;
            }
        }
        for entry in &self.patterns {
            if id.contains(&entry.key) {
                return entry.rate;
            }
        }
        self.default_rate
    }

    /// Estimated cost in USD for a call that consumed `total_tokens`.
    pub fn estimate(&self, model_id: &str, total_tokens: u64) -> f64 {
        (total_tokens as f64 / 1000.0) * self.rate_for(model_id)
    }
}

/// Cost of a plugin web search billed at `max_results` results.
pub fn web_search_cost(results: u32) -> f64 {
    results as f64 * WEB_PLUGIN_RATE_PER_RESULT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_fragment_beats_pattern() {
        // "gpt-4o-mini" contains both the exact fragment and the "mini"
        // pattern; the fragment rate applies.
        let table = PricingTable::builtin();
        assert_eq!(table.rate_for("openai/gpt-4o-mini"), 0.0004);
    }

    #[test]
    fn pattern_applies_when_no_fragment_matches() {
        let table = PricingTable::builtin();
        assert_eq!(table.rate_for("somevendor/shiny-mini"), 0.0006);
    }

    #[test]
    fn default_rate_when_nothing_matches() {
        let table = PricingTable::builtin();
        assert_eq!(table.rate_for("unknown/model"), DEFAULT_RATE_PER_1K);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = PricingTable::builtin();
        assert_eq!(
            table.rate_for("Anthropic/Claude-3-5-Haiku"),
            table.rate_for("anthropic/claude-3-5-haiku")
        );
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let first_wins = PricingTable {
            default_rate: 0.002,
            models: vec![RateEntry::new("sonnet", 0.009), RateEntry::new("claude", 0.005)],
            patterns: vec![],
        };
        let swapped = PricingTable {
            default_rate: 0.002,
            models: vec![RateEntry::new("claude", 0.005), RateEntry::new("sonnet", 0.009)],
            patterns: vec![],
        };
        assert_eq!(first_wins.rate_for("anthropic/claude-3-5-sonnet"), 0.009);
        assert_eq!(swapped.rate_for("anthropic/claude-3-5-sonnet"), 0.005);
    }

    #[test]
    fn estimate_scales_by_thousand_tokens() {
        let table = PricingTable::builtin();
        let cost = table.estimate("anthropic/claude-3-5-haiku", 2_000);
        assert!((cost - 0.0048).abs() < 1e-9);
    }

    #[test]
    fn estimate_zero_tokens_is_zero() {
        let table = PricingTable::builtin();
        assert_eq!(table.estimate("anthropic/claude-3-5-haiku", 0), 0.0);
        assert_eq!(table.estimate("unknown/model", 0), 0.0);
    }

    #[test]
    fn estimate_is_non_negative() {
        let table = PricingTable::builtin();
        for model in ["a", "free-model", "openai/gpt-4o", "x/y:free"] {
            assert!(table.estimate(model, 123_456) >= 0.0);
        }
    }

    #[test]
    fn free_pattern_prices_at_zero() {
        let table = PricingTable::builtin();
        assert_eq!(table.estimate("meta-llama/llama-3-8b:free", 50_000), 0.0);
    }

    #[test]
    fn table_round_trips_through_json() {
        let table = PricingTable::builtin();
        let json = serde_json::to_string(&table).unwrap();
        let parsed = PricingTable::from_json(&json).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn web_search_cost_per_result() {
        assert!((web_search_cost(5) - 0.02).abs() < 1e-9);
        assert_eq!(web_search_cost(0), 0.0);
    }
}
