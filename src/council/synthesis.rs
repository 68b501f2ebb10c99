//! Synthesizer driver: folds a finished transcript into one answer.

use std::sync::Arc;

use crate::gateway::{Message, WebSearch};

use super::types::{
    ModelRef, ModelResponse, QueryOptions, RoundResult, DEFAULT_SYNTHESIZER_MODEL,
    NO_CONTENT_ERROR,
};
use super::QueryBackend;

/// System prompt for the synthesizer query.
pub const SYNTHESIZER_SYSTEM_PROMPT: &str =
    "You are an expert synthesizer. Provide clear, direct answers based on the \
     information given. Never mention the synthesis process or multiple sources.";

/// Closing directive appended to every synthesis prompt.
const CLOSING_DIRECTIVE: &str =
    "Do not mention the council, multiple perspectives, or synthesis process. \
     Simply answer the question as if you are providing the definitive response.";

/// Build the compound synthesis prompt, or None when the final round has no
/// successful responses. Numbering always refers to council position, so an
/// errored member is skipped without shifting its peers' numbers.
pub fn build_synthesis_prompt(prompt: &str, rounds: &[RoundResult]) -> Option<String> {
    let final_round = rounds.last()?;
    if !final_round.iter().any(|r| r.is_success()) {
        return None;
    }

    let mut compound = format!("The question was:\n{prompt}\n\n");

    if rounds.len() == 1 {
        compound.push_str("Expert Perspectives:\n\n");
        for (index, response) in final_round.iter().enumerate() {
            if let Some(content) = response.content.as_deref() {
                compound.push_str(&format!("Perspective {}:\n{}\n\n", index + 1, content));
            }
        }
        compound.push_str("Provide a direct, comprehensive answer to the question. ");
    } else {
        compound.push_str("Full Council Discussion:\n\n");
        for (round_index, round) in rounds.iter().enumerate() {
            compound.push_str(&format!("Round {}:\n\n", round_index + 1));
            for (index, response) in round.iter().enumerate() {
                if let Some(content) = response.content.as_deref() {
                    compound.push_str(&format!("Elder {}:\n{}\n\n", index + 1, content));
                }
            }
        }
        compound.push_str(
            "Provide a direct, comprehensive answer to the question, informed by the \
             discussion above. ",
        );
    }

    compound.push_str(CLOSING_DIRECTIVE);
    Some(compound)
}

/// Query the designated synthesizer once over the finished transcript.
/// Never touches the network when there is nothing to synthesize.
pub(crate) async fn synthesize<B>(
    backend: &Arc<B>,
    synthesizer: Option<&ModelRef>,
    prompt: &str,
    rounds: &[RoundResult],
    options: &QueryOptions,
) -> ModelResponse
where
    B: QueryBackend + ?Sized + 'static,
{
    let model_id = synthesizer
        .map(ModelRef::model_id)
        .unwrap_or(DEFAULT_SYNTHESIZER_MODEL);

    let Some(compound) = build_synthesis_prompt(prompt, rounds) else {
        return ModelResponse::failure(model_id, NO_CONTENT_ERROR);
    };

    let messages = vec![
        Message::system(SYNTHESIZER_SYSTEM_PROMPT),
        Message::user(compound),
    ];

    // Session temperature applies; shaping policies do not.
    let mut synth_options = options.clone();
    synth_options.first_n = None;
    synth_options.web_search = WebSearch::Off;

    backend.query_model(model_id, &messages, &synth_options).await
}
