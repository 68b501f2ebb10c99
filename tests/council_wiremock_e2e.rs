use std::sync::Arc;
use std::time::Duration;

use council_harness::council::{CallOptions, Council};
use council_harness::gateway::openrouter::OpenRouterAdapter;
use council_harness::gateway::{GatewayConfig, NullUsageSink, ProviderGateway};
use council_harness::{CouncilConfig, ModelRef};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers per model, with revision requests recognized by the longer
/// message list they carry.
#[derive(Clone, Copy)]
struct ScriptedCouncil;

impl Respond for ScriptedCouncil {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let model = body["model"].as_str().unwrap_or("");
        let message_count = body["messages"].as_array().map(Vec::len).unwrap_or(0);

        let content = if model == "synth-model" {
            "folded answer".to_string()
        } else if message_count <= 2 {
            format!("{model} first take")
        } else {
            format!("{model} revised take")
        };

        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": content },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 18, "total_tokens": 30 }
        }))
    }
}

#[tokio::test]
async fn two_round_session_with_synthesis_runs_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ScriptedCouncil)
        .mount(&server)
        .await;

    let adapter =
        OpenRouterAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), None, None)
            .unwrap();
    let gateway = ProviderGateway::with_config(
        adapter,
        Arc::new(NullUsageSink),
        GatewayConfig {
            max_retries: 0,
            retry_base_delay: Duration::from_millis(0),
        },
    );
    let council = Council::new(Arc::new(gateway));

    let mut config = CouncilConfig::new(vec![
        ModelRef::new("model-one"),
        ModelRef::new("model-two"),
    ]);
    config.rounds = 2;
    config.synthesizer = Some(ModelRef::new("synth-model"));
    config.defaults.single = Some(true);

    let resp = council
        .query_with_consensus("what now?", &config, CallOptions::default())
        .await;

    assert_eq!(resp.rounds.len(), 2);
    assert_eq!(resp.rounds[0][0].content.as_deref(), Some("model-one first take"));
    assert_eq!(resp.rounds[0][1].content.as_deref(), Some("model-two first take"));
    assert_eq!(resp.rounds[1][0].content.as_deref(), Some("model-one revised take"));
    assert_eq!(resp.rounds[1][1].content.as_deref(), Some("model-two revised take"));

    assert!(resp.any_success());
    let synthesis = resp.synthesis.unwrap();
    assert_eq!(synthesis.content.as_deref(), Some("folded answer"));

    // 2 models x 2 rounds, plus one synthesizer call.
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 5);

    let metadata = resp.metadata.unwrap();
    assert_eq!(metadata.model_count, 2);
    assert_eq!(metadata.total_tokens, 150);
    assert!(metadata.total_cost > 0.0);

    // Every response came back priced and timed.
    for round in &resp.rounds {
        for slot in round {
            let meta = slot.meta.as_ref().unwrap();
            assert_eq!(meta.total_tokens, 30);
            assert!(meta.estimated_cost.unwrap() > 0.0);
        }
    }
}

#[tokio::test]
async fn revision_requests_embed_peer_answers_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ScriptedCouncil)
        .mount(&server)
        .await;

    let adapter =
        OpenRouterAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), None, None)
            .unwrap();
    let gateway = ProviderGateway::with_config(
        adapter,
        Arc::new(NullUsageSink),
        GatewayConfig {
            max_retries: 0,
            retry_base_delay: Duration::from_millis(0),
        },
    );
    let council = Council::new(Arc::new(gateway));

    let mut config = CouncilConfig::new(vec![
        ModelRef::new("model-one"),
        ModelRef::new("model-two"),
    ]);
    config.rounds = 2;

    council
        .query_with_consensus("what now?", &config, CallOptions::default())
        .await;

    let received = server.received_requests().await.unwrap();
    let revision_bodies: Vec<serde_json::Value> = received
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .filter(|b: &serde_json::Value| {
            b["messages"].as_array().map(Vec::len).unwrap_or(0) == 4
        })
        .collect();
    assert_eq!(revision_bodies.len(), 2);

    for body in &revision_bodies {
        let model = body["model"].as_str().unwrap();
        let peer_view = body["messages"][3]["content"].as_str().unwrap();
        let own_tag = format!("**{model}**");
        assert!(!peer_view.contains(&own_tag));
        assert!(peer_view.contains("first take"));
    }
}
