use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use holdem_engine::{Action, HandState, SeatNo};

use crate::protocol::{ActionRequest, ActionResponse};

/// Hard cap on agent response bodies.
pub const MAX_RESPONSE_BYTES: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("seat {0} has no callback endpoint configured")]
    EndpointNotConfigured(SeatNo),
    #[error("agent did not answer before the deadline")]
    RequestTimeout,
    #[error("network failure talking to agent: {0}")]
    Network(String),
    #[error("malformed agent response: {0}")]
    MalformedResponse(String),
    #[error("agent returned an illegal action: {0}")]
    IllegalAgentAction(String),
    #[error("acting seat has no hole cards")]
    MissingHoleCards,
}

/// Strategy interface the runner drives. Tests substitute scripted
/// implementations; production uses the HTTP agent provider.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    async fn next_action(&self, state: &HandState, seat: SeatNo) -> Result<Action, ProviderError>;
}

/// Where to reach one seat's agent, with an optional per-seat deadline.
#[derive(Debug, Clone)]
pub struct AgentEndpoint {
    pub url: String,
    pub timeout_ms: Option<u64>,
}

impl AgentEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        AgentEndpoint {
            url: url.into(),
            timeout_ms: None,
        }
    }
}

/// Solicits actions from remote agents over HTTP. Owns its pooled client;
/// callers never share connection state.
pub struct HttpAgentProvider {
    client: Client,
    endpoints: HashMap<SeatNo, AgentEndpoint>,
    default_timeout_ms: u64,
}

impl HttpAgentProvider {
    pub fn new(endpoints: HashMap<SeatNo, AgentEndpoint>, default_timeout_ms: u64) -> Self {
        HttpAgentProvider {
            client: Client::new(),
            endpoints,
            default_timeout_ms,
        }
    }

    fn deadline_ms(&self, endpoint: &AgentEndpoint) -> u64 {
        endpoint.timeout_ms.unwrap_or(self.default_timeout_ms)
    }
}

#[async_trait]
impl ActionProvider for HttpAgentProvider {
    async fn next_action(&self, state: &HandState, seat: SeatNo) -> Result<Action, ProviderError> {
        let endpoint = self
            .endpoints
            .get(&seat)
            .ok_or(ProviderError::EndpointNotConfigured(seat))?;
        let hole = state
            .hole_cards
            .get(&seat)
            .filter(|cards| cards.len() == 2)
            .ok_or(ProviderError::MissingHoleCards)?;

        let deadline_ms = self.deadline_ms(endpoint);
        let request = ActionRequest::for_acting_seat(state, seat, hole, deadline_ms);
        debug!(
            table_id = %state.table_id,
            hand_no = state.hand_no,
            seat = %seat,
            url = %endpoint.url,
            "soliciting action"
        );

        let response = self
            .client
            .post(&endpoint.url)
            .timeout(Duration::from_millis(deadline_ms))
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Network(format!(
                "agent returned status {}",
                status
            )));
        }

        // Bounded body read; anything past the cap is rejected outright.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_transport_error)?;
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(ProviderError::MalformedResponse(
                    "response body exceeds 1 MiB".into(),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        // Exactly one JSON object; trailing bytes are a protocol violation.
        let mut deserializer = serde_json::Deserializer::from_slice(&body);
        let reply = ActionResponse::deserialize(&mut deserializer)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        deserializer
            .end()
            .map_err(|_| ProviderError::MalformedResponse("trailing data after JSON object".into()))?;

        if !request.legal_actions.contains(&reply.action) {
            return Err(ProviderError::IllegalAgentAction(format!(
                "{} is not in the legal action set",
                reply.action
            )));
        }
        reply.into_action().map_err(ProviderError::IllegalAgentAction)
    }
}

fn classify_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::RequestTimeout
    } else {
        ProviderError::Network(err.to_string())
    }
}
