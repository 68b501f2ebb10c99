//! Multi-round consensus state machine.
//!
//! Round 1 fans the prompt out to the full council (optionally racing to
//! the first N). Every later round shows each surviving model its own
//! prior answer plus its peers' answers and asks for a revision. A slot
//! that errors in round k stays errored, verbatim, for every later round
//! and is never re-queried.

use std::sync::Arc;
use std::time::Duration;

use crate::gateway::Message;

use super::fanout::{dispatch, dispatch_first_n, ModelQuery, RoundProgress};
use super::progress::{ProgressEvent, ProgressSink, ProgressStage};
use super::types::{ModelRef, ModelResponse, QueryOptions, RoundResult};
use super::QueryBackend;

/// Resolved inputs for one session's rounds.
pub(crate) struct SessionPlan<'a> {
    pub models: &'a [ModelRef],
    pub system: Option<&'a str>,
    pub prompt: &'a str,
    pub options: &'a QueryOptions,
    pub rounds: u32,
    pub time_limit: Option<Duration>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

/// Build the revision prompt shown to the model at `index`: every peer's
/// answer in council order, excluding the model's own answer and errored
/// peers. Pure; calling twice on the same input yields identical text.
pub fn build_consensus_prompt(index: usize, responses: &[ModelResponse]) -> String {
    let mut prompt =
        String::from("Consider your peers' views and revise your response if needed:\n\n");
    for (peer_index, peer) in responses.iter().enumerate() {
        if peer_index == index {
            continue;
        }
        let Some(content) = peer.content.as_deref() else {
            continue;
        };
        prompt.push_str(&format!("**{}**:\n{}\n\n", peer.model, content));
    }
    prompt.push_str("Based on these perspectives, would you like to revise or expand your answer?");
    prompt
}

fn report_preparing(progress: &Option<Arc<dyn ProgressSink>>, round: usize, model: &str) {
    if let Some(sink) = progress {
        sink.report(ProgressEvent {
            round,
            model: model.to_string(),
            stage: ProgressStage::Preparing,
        });
    }
}

fn round_progress(progress: &Option<Arc<dyn ProgressSink>>, round: usize) -> RoundProgress {
    progress.as_ref().map(|sink| (Arc::clone(sink), round))
}

fn apply_filter(round: RoundResult, time_limit: Option<Duration>) -> RoundResult {
    match time_limit {
        Some(limit) => super::filter::apply_time_limit(round, limit),
        None => round,
    }
}

/// Run all rounds of a session and return the transcript. Each round is
/// latency-filtered before it is stored, so later rounds build on the
/// filtered view. Stops early when the session token fires.
pub(crate) async fn run_rounds<B>(backend: &Arc<B>, plan: SessionPlan<'_>) -> Vec<RoundResult>
where
    B: QueryBackend + ?Sized + 'static,
{
    let mut rounds: Vec<RoundResult> = Vec::with_capacity(plan.rounds as usize);

    // Round 1: plain fan-out over the full council.
    let queries: Vec<ModelQuery> = plan
        .models
        .iter()
        .map(|model| {
            report_preparing(&plan.progress, 1, model.model_id());
            ModelQuery::new(
                model.model_id(),
                vec![
                    Message::system(model.effective_system(plan.system)),
                    Message::user(plan.prompt),
                ],
            )
        })
        .collect();

    let first = match plan.options.first_n {
        Some(n) if n < queries.len() => {
            dispatch_first_n(
                backend,
                queries,
                plan.options,
                n,
                round_progress(&plan.progress, 1),
            )
            .await
        }
        _ => dispatch(backend, queries, plan.options, round_progress(&plan.progress, 1)).await,
    };
    rounds.push(apply_filter(first, plan.time_limit));

    for round_number in 2..=plan.rounds as usize {
        if plan.options.cancel.is_cancelled() {
            tracing::debug!(round = round_number, "Session cancelled, skipping remaining rounds");
            break;
        }

        let previous = rounds
            .last()
            .expect("at least one round present")
            .clone();

        let mut carried: Vec<Option<ModelResponse>> = vec![None; previous.len()];
        let mut live: Vec<(usize, ModelQuery)> = Vec::new();

        for (index, prior) in previous.iter().enumerate() {
            let model = &plan.models[index];
            match prior.content.as_deref() {
                Some(own_answer) => {
                    report_preparing(&plan.progress, round_number, model.model_id());
                    let messages = vec![
                        Message::system(model.effective_system(plan.system)),
                        Message::user(plan.prompt),
                        Message::assistant(own_answer),
                        Message::user(build_consensus_prompt(index, &previous)),
                    ];
                    live.push((index, ModelQuery::new(model.model_id(), messages)));
                }
                None => {
                    // Errored slots ride through untouched; no network call.
                    carried[index] = Some(prior.clone());
                }
            }
        }

        let revised = dispatch(
            backend,
            live.iter().map(|(_, q)| q.clone()).collect(),
            plan.options,
            round_progress(&plan.progress, round_number),
        )
        .await;

        for ((index, _), response) in live.into_iter().zip(revised) {
            carried[index] = Some(response);
        }

        let round: RoundResult = carried
            .into_iter()
            .map(|slot| slot.expect("every slot settled or carried"))
            .collect();

        let filtered = apply_filter(round, plan.time_limit);
        tracing::debug!(
            round = round_number,
            successes = filtered.iter().filter(|r| r.is_success()).count(),
            "Consensus round complete"
        );
        rounds.push(filtered);
    }

    rounds
}
