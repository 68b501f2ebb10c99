//! Post-hoc latency filter for completed rounds.

use std::time::Duration;

use super::types::{ModelResponse, RoundResult, TIME_LIMIT_ERROR};

/// Replace successful responses slower than `limit` with a time-limit error
/// slot. Error responses pass through untouched (they failed for reasons
/// unrelated to time), as do successes without meta (no latency to judge).
///
/// Applied per round before the round enters the transcript, so later
/// rounds treat filtered slots as error slots and never re-query them.
pub fn apply_time_limit(round: RoundResult, limit: Duration) -> RoundResult {
    let limit_ms = limit.as_millis() as u64;
    let mut dropped: Vec<String> = Vec::new();

    let filtered = round
        .into_iter()
        .map(|response| {
            let too_slow = response.is_success()
                && response
                    .meta
                    .as_ref()
                    .is_some_and(|meta| meta.latency_ms > limit_ms);
            if too_slow {
                dropped.push(response.model.clone());
                ModelResponse::failure(&response.model, TIME_LIMIT_ERROR)
            } else {
                response
            }
        })
        .collect();

    if !dropped.is_empty() {
        tracing::info!(
            limit_ms,
            dropped = ?dropped,
            "Time limit filter dropped slow responses"
        );
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::types::ResponseMeta;

    fn meta(latency_ms: u64) -> ResponseMeta {
        ResponseMeta {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
            latency_ms,
            estimated_cost: None,
        }
    }

    #[test]
    fn drops_slow_successes() {
        let round = vec![
            ModelResponse::success("a", "fast").with_meta(meta(100)),
            ModelResponse::success("b", "slow").with_meta(meta(900)),
        ];
        let filtered = apply_time_limit(round, Duration::from_millis(500));
        assert!(filtered[0].is_success());
        assert_eq!(filtered[1].error.as_deref(), Some(TIME_LIMIT_ERROR));
        assert_eq!(filtered[1].model, "b");
    }

    #[test]
    fn keeps_responses_at_the_limit() {
        let round = vec![ModelResponse::success("a", "on time").with_meta(meta(500))];
        let filtered = apply_time_limit(round, Duration::from_millis(500));
        assert!(filtered[0].is_success());
    }

    #[test]
    fn keeps_errors_regardless_of_latency() {
        let round = vec![ModelResponse::failure("a", "boom")];
        let filtered = apply_time_limit(round, Duration::from_millis(1));
        assert_eq!(filtered[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn keeps_successes_without_meta() {
        let round = vec![ModelResponse::success("a", "no accounting")];
        let filtered = apply_time_limit(round, Duration::from_millis(1));
        assert!(filtered[0].is_success());
    }

    #[test]
    fn preserves_slot_order() {
        let round = vec![
            ModelResponse::success("a", "x").with_meta(meta(999)),
            ModelResponse::success("b", "y").with_meta(meta(1)),
            ModelResponse::success("c", "z").with_meta(meta(999)),
        ];
        let filtered = apply_time_limit(round, Duration::from_millis(100));
        let models: Vec<_> = filtered.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["a", "b", "c"]);
        assert!(filtered[0].is_time_limited());
        assert!(filtered[1].is_success());
        assert!(filtered[2].is_time_limited());
    }
}
