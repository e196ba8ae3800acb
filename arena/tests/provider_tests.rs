mod common;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use common::*;
use holdem_arena::provider::{ActionProvider, AgentEndpoint, HttpAgentProvider, ProviderError};
use holdem_arena::protocol::PROTOCOL_VERSION;
use holdem_engine::rules::SeededShuffler;
use holdem_engine::{Action, HandSetup, HandState};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn heads_up_state() -> HandState {
    let setup = HandSetup {
        hand_id: "h-prov".into(),
        table_id: "t-prov".into(),
        hand_no: 1,
        button_seat: sn(1),
        seats: vec![seat(1, 10_000), seat(2, 10_000)],
        config: config(),
    };
    let mut shuffler = SeededShuffler::new(12);
    HandState::start(setup, &mut shuffler).unwrap()
}

fn provider_for(addr: SocketAddr, path: &str, timeout_ms: u64) -> HttpAgentProvider {
    let mut endpoints = HashMap::new();
    endpoints.insert(
        sn(1),
        AgentEndpoint::new(format!("http://{addr}{path}")),
    );
    HttpAgentProvider::new(endpoints, timeout_ms)
}

#[tokio::test]
async fn valid_reply_becomes_an_action() {
    let app = Router::new().route(
        "/act",
        post(|| async { Json(json!({"action": "call"})) }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let action = provider.next_action(&state, sn(1)).await.unwrap();
    assert_eq!(action, Action::Call);
}

#[tokio::test]
async fn request_carries_the_documented_payload() {
    let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let app = Router::new().route(
        "/act",
        post(move |State(sink): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
            *sink.lock().unwrap() = Some(body);
            Json(json!({"action": "fold"}))
        }),
    )
    .with_state(sink);
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    provider.next_action(&state, sn(1)).await.unwrap();

    let body = captured.lock().unwrap().take().unwrap();
    assert_eq!(body["protocol_version"], PROTOCOL_VERSION);
    assert_eq!(body["table_id"], "t-prov");
    assert_eq!(body["seat"], 1);
    // only the acting seat's own two cards are disclosed
    assert_eq!(body["hole_cards"].as_array().unwrap().len(), 2);
    assert_eq!(body["board"].as_array().unwrap().len(), 0);
    assert_eq!(body["pot"], 150);
    assert_eq!(body["to_call"], 50);
    assert_eq!(body["min_raise_to"], 200);
    assert_eq!(body["stacks"]["1"], 9_950);
    assert_eq!(body["stacks"]["2"], 9_900);
    assert_eq!(body["bets"]["1"], 50);
    assert_eq!(body["bets"]["2"], 100);
    let legal: Vec<String> = body["legal_actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(legal, vec!["fold", "call", "raise"]);
    assert_eq!(body["action_deadline_ms"], 1_000);
}

#[tokio::test]
async fn min_raise_to_is_absent_when_raise_is_illegal() {
    let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let app = Router::new().route(
        "/act",
        post(move |State(sink): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
            *sink.lock().unwrap() = Some(body);
            Json(json!({"action": "fold"}))
        }),
    )
    .with_state(sink);
    let addr = serve(app).await;

    // short stack can only call or fold, so no raise and no min_raise_to
    let setup = HandSetup {
        hand_id: "h-short".into(),
        table_id: "t-prov".into(),
        hand_no: 1,
        button_seat: sn(1),
        seats: vec![seat(1, 40), seat(2, 10_000), seat(3, 10_000)],
        config: config(),
    };
    let mut shuffler = SeededShuffler::new(12);
    let state = HandState::start(setup, &mut shuffler).unwrap();
    assert_eq!(state.acting_seat, Some(sn(1)));

    let provider = provider_for(addr, "/act", 1_000);
    provider.next_action(&state, sn(1)).await.unwrap();

    let body = captured.lock().unwrap().take().unwrap();
    assert_eq!(body["min_raise_to"], Value::Null);
    let legal: Vec<String> = body["legal_actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(legal, vec!["fold", "call"]);
}

#[tokio::test]
async fn slow_agent_times_out() {
    let app = Router::new().route(
        "/act",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Json(json!({"action": "call"}))
        }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 50);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::RequestTimeout));
}

#[tokio::test]
async fn non_2xx_status_is_a_network_error() {
    let app = Router::new().route(
        "/act",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "agent exploded") }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
}

#[tokio::test]
async fn unreachable_agent_is_a_network_error() {
    let state = heads_up_state();
    // nothing listens on this port
    let mut endpoints = HashMap::new();
    endpoints.insert(sn(1), AgentEndpoint::new("http://127.0.0.1:1/act"));
    let provider = HttpAgentProvider::new(endpoints, 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Network(_) | ProviderError::RequestTimeout
    ));
}

#[tokio::test]
async fn garbage_body_is_malformed() {
    let app = Router::new().route("/act", post(|| async { "not even json" }));
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[tokio::test]
async fn trailing_json_is_malformed() {
    let app = Router::new().route(
        "/act",
        post(|| async { "{\"action\":\"call\"}{\"action\":\"fold\"}" }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = Router::new().route(
        "/act",
        post(|| async { "x".repeat(2 * 1024 * 1024) }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 5_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[tokio::test]
async fn action_outside_legal_set_is_illegal() {
    // check is not legal while the button owes the blind
    let app = Router::new().route(
        "/act",
        post(|| async { Json(json!({"action": "check"})) }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::IllegalAgentAction(_)));
}

#[tokio::test]
async fn zero_amount_raise_is_illegal() {
    let app = Router::new().route(
        "/act",
        post(|| async { Json(json!({"action": "raise", "amount": 0})) }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::IllegalAgentAction(_)));
}

#[tokio::test]
async fn amountless_raise_is_illegal() {
    let app = Router::new().route(
        "/act",
        post(|| async { Json(json!({"action": "raise"})) }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::IllegalAgentAction(_)));
}

#[tokio::test]
async fn amount_on_fold_is_illegal() {
    let app = Router::new().route(
        "/act",
        post(|| async { Json(json!({"action": "fold", "amount": 25})) }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::IllegalAgentAction(_)));
}

#[tokio::test]
async fn missing_endpoint_is_reported() {
    let state = heads_up_state();
    let provider = HttpAgentProvider::new(HashMap::new(), 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::EndpointNotConfigured(s) if s == sn(1)));
}

#[tokio::test]
async fn missing_hole_cards_are_reported() {
    let app = Router::new().route(
        "/act",
        post(|| async { Json(json!({"action": "call"})) }),
    );
    let addr = serve(app).await;

    let mut state = heads_up_state();
    state.hole_cards.remove(&sn(1));
    let provider = provider_for(addr, "/act", 1_000);
    let err = provider.next_action(&state, sn(1)).await.unwrap_err();
    assert!(matches!(err, ProviderError::MissingHoleCards));
}

#[tokio::test]
async fn per_seat_timeout_overrides_the_default() {
    let app = Router::new().route(
        "/act",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Json(json!({"action": "call"}))
        }),
    );
    let addr = serve(app).await;

    let state = heads_up_state();
    let mut endpoints = HashMap::new();
    endpoints.insert(
        sn(1),
        AgentEndpoint {
            url: format!("http://{addr}/act"),
            timeout_ms: Some(2_000),
        },
    );
    // default would time out, the per-seat override does not
    let provider = HttpAgentProvider::new(endpoints, 50);
    let action = provider.next_action(&state, sn(1)).await.unwrap();
    assert_eq!(action, Action::Call);
}
