//! Concurrent fan-out of one round of model queries, with an optional
//! first-N race.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::gateway::{Message, ProviderError};

use super::progress::{ProgressEvent, ProgressSink, ProgressStage};
use super::types::{ModelResponse, QueryOptions, RoundResult, FIRST_N_SENTINEL};
use super::QueryBackend;

/// One slot's request within a round.
#[derive(Debug, Clone)]
pub struct ModelQuery {
    pub model_id: String,
    pub messages: Vec<Message>,
}

impl ModelQuery {
    pub fn new(model_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model_id: model_id.into(),
            messages,
        }
    }
}

/// Progress destination for one round's dispatch.
pub(crate) type RoundProgress = Option<(Arc<dyn ProgressSink>, usize)>;

fn report(progress: &RoundProgress, model: &str, stage: ProgressStage) {
    if let Some((sink, round)) = progress {
        sink.report(ProgressEvent {
            round: *round,
            model: model.to_string(),
            stage,
        });
    }
}

/// Query every model concurrently and return results in input order.
/// One task per model; a failure in one slot never affects the others.
pub async fn query_all<B>(
    backend: &Arc<B>,
    queries: Vec<ModelQuery>,
    options: &QueryOptions,
) -> RoundResult
where
    B: QueryBackend + ?Sized + 'static,
{
    dispatch(backend, queries, options, None).await
}

pub(crate) async fn dispatch<B>(
    backend: &Arc<B>,
    queries: Vec<ModelQuery>,
    options: &QueryOptions,
    progress: RoundProgress,
) -> RoundResult
where
    B: QueryBackend + ?Sized + 'static,
{
    let model_ids: Vec<String> = queries.iter().map(|q| q.model_id.clone()).collect();

    let handles: Vec<_> = queries
        .into_iter()
        .map(|query| {
            let backend = Arc::clone(backend);
            let options = options.clone();
            let progress = progress.clone();
            tokio::spawn(async move {
                report(&progress, &query.model_id, ProgressStage::Querying);
                let response = backend
                    .query_model(&query.model_id, &query.messages, &options)
                    .await;
                report(&progress, &query.model_id, ProgressStage::Complete);
                response
            })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(idx, outcome)| match outcome {
            Ok(response) => response,
            Err(join_err) => {
                tracing::error!(model = %model_ids[idx], error = %join_err, "Query task failed");
                ModelResponse::failure(
                    &model_ids[idx],
                    format!("internal error: query task failed: {join_err}"),
                )
            }
        })
        .collect()
}

/// Race the fan-out to the first `n` settled slots. Settlement counts both
/// success and failure, so a dead model never stalls the race. Losing slots
/// carry the first-N sentinel; the losers' in-flight requests are aborted
/// through a child of the session token.
pub async fn query_first_n<B>(
    backend: &Arc<B>,
    queries: Vec<ModelQuery>,
    options: &QueryOptions,
    n: usize,
) -> RoundResult
where
    B: QueryBackend + ?Sized + 'static,
{
    dispatch_first_n(backend, queries, options, n, None).await
}

pub(crate) async fn dispatch_first_n<B>(
    backend: &Arc<B>,
    queries: Vec<ModelQuery>,
    options: &QueryOptions,
    n: usize,
    progress: RoundProgress,
) -> RoundResult
where
    B: QueryBackend + ?Sized + 'static,
{
    let total = queries.len();
    if n >= total {
        return dispatch(backend, queries, options, progress).await;
    }

    let model_ids: Vec<String> = queries.iter().map(|q| q.model_id.clone()).collect();

    let race = options.cancel.child();
    let race_options = options.clone().cancel(race.clone());

    let (tx, mut rx) = mpsc::channel::<(usize, ModelResponse)>(total);
    for (idx, query) in queries.into_iter().enumerate() {
        let backend = Arc::clone(backend);
        let options = race_options.clone();
        let progress = progress.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            report(&progress, &query.model_id, ProgressStage::Querying);
            let response = backend
                .query_model(&query.model_id, &query.messages, &options)
                .await;
            report(&progress, &query.model_id, ProgressStage::Complete);
            let _ = tx.send((idx, response)).await;
        });
    }
    drop(tx);

    let mut slots: Vec<Option<ModelResponse>> = (0..total).map(|_| None).collect();
    let mut settled = 0usize;
    while settled < n {
        match rx.recv().await {
            Some((idx, response)) => {
                slots[idx] = Some(response);
                settled += 1;
            }
            None => break,
        }
    }

    // Race concluded: abort the rest without touching the session token.
    race.cancel();

    let session_cancelled = options.cancel.is_cancelled();
    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| match slot {
            Some(response) => response,
            None => {
                let error = if session_cancelled {
                    ProviderError::Cancelled.to_string()
                } else {
                    FIRST_N_SENTINEL.to_string()
                };
                ModelResponse::failure(&model_ids[idx], error)
            }
        })
        .collect()
}
