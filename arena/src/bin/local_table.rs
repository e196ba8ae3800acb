//! Local smoke driver: boots a stub agent over HTTP and plays a short
//! session against it, end to end through the real provider and store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, routing::post};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use holdem_arena::protocol::{ActionRequest, ActionResponse};
use holdem_arena::store::TableStore;
use holdem_arena::{AgentEndpoint, HttpAgentProvider, MemoryStore, RunRequest, TableRunner};
use holdem_engine::{ActionKind, SeatNo, SeatState, TableConfig};

/// Call-station agent: checks when free, calls when facing a bet.
async fn stub_agent(Json(request): Json<ActionRequest>) -> Json<ActionResponse> {
    let action = if request.legal_actions.contains(&ActionKind::Check) {
        ActionKind::Check
    } else {
        ActionKind::Call
    };
    Json(ActionResponse {
        action,
        amount: None,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let app = Router::new().route("/act", post(stub_agent));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub agent");
    let addr: SocketAddr = listener.local_addr().expect("stub agent addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stub agent");
    });
    info!(%addr, "stub agent listening");

    let config = TableConfig::default();
    let seats: Vec<SeatState> = (1..=3)
        .map(|n| SeatState::new(SeatNo::new(n).expect("seat no"), config.starting_stack))
        .collect();
    let endpoints: HashMap<SeatNo, AgentEndpoint> = seats
        .iter()
        .map(|s| (s.seat_no, AgentEndpoint::new(format!("http://{addr}/act"))))
        .collect();

    let store = Arc::new(MemoryStore::new());
    let provider = HttpAgentProvider::new(endpoints, config.action_timeout_ms);
    let mut runner = TableRunner::new(provider, store.clone() as Arc<dyn TableStore>);

    let request = RunRequest {
        table_id: "local-demo".into(),
        starting_hand: 1,
        hands_to_run: 10,
        button_seat: SeatNo::new(1).expect("seat no"),
        seats,
        config,
    };
    let result = runner
        .run(request, CancellationToken::new())
        .await
        .expect("table run");

    info!(
        hands = result.hands_completed,
        actions = result.total_actions,
        fallbacks = result.total_fallbacks,
        "run finished"
    );
    for summary in &result.hand_summaries {
        info!(
            hand_no = summary.hand_no,
            phase = %summary.final_phase,
            actions = summary.action_count,
            "hand summary"
        );
    }
    for seat in &result.final_seats {
        info!(seat = %seat.seat_no, stack = seat.stack, "final stack");
    }
}
