#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use holdem_arena::provider::{ActionProvider, ProviderError};
use holdem_arena::runner::RunRequest;
use holdem_engine::{Action, HandState, SeatNo, SeatState, TableConfig};

pub fn sn(no: u8) -> SeatNo {
    SeatNo::new(no).unwrap()
}

pub fn seat(no: u8, stack: u32) -> SeatState {
    SeatState::new(sn(no), stack)
}

pub fn config() -> TableConfig {
    TableConfig {
        small_blind: 50,
        big_blind: 100,
        ..TableConfig::default()
    }
}

pub fn run_request(table_id: &str, hands: u32, seats: Vec<SeatState>) -> RunRequest {
    RunRequest {
        table_id: table_id.into(),
        starting_hand: 1,
        hands_to_run: hands,
        button_seat: sn(1),
        seats,
        config: config(),
    }
}

/// Passive agent: checks when free, calls when facing a bet.
pub struct CheckCallProvider;

#[async_trait]
impl ActionProvider for CheckCallProvider {
    async fn next_action(&self, state: &HandState, seat: SeatNo) -> Result<Action, ProviderError> {
        Ok(if state.to_call(seat) == 0 {
            Action::Check
        } else {
            Action::Call
        })
    }
}

/// Check-call play with a small pause per action, to keep a run in flight
/// long enough for cancellation tests to catch it.
pub struct PacedProvider {
    pub delay: std::time::Duration,
}

#[async_trait]
impl ActionProvider for PacedProvider {
    async fn next_action(&self, state: &HandState, seat: SeatNo) -> Result<Action, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(if state.to_call(seat) == 0 {
            Action::Check
        } else {
            Action::Call
        })
    }
}

/// Replays a fixed script of actions, then reports a network failure.
pub struct ScriptedProvider {
    actions: Mutex<VecDeque<Action>>,
}

impl ScriptedProvider {
    pub fn new(actions: Vec<Action>) -> Self {
        ScriptedProvider {
            actions: Mutex::new(actions.into()),
        }
    }
}

#[async_trait]
impl ActionProvider for ScriptedProvider {
    async fn next_action(&self, _state: &HandState, _seat: SeatNo) -> Result<Action, ProviderError> {
        self.actions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))
    }
}

/// Never answers in time.
pub struct TimingOutProvider;

#[async_trait]
impl ActionProvider for TimingOutProvider {
    async fn next_action(&self, _state: &HandState, _seat: SeatNo) -> Result<Action, ProviderError> {
        Err(ProviderError::RequestTimeout)
    }
}

/// Plays passively until a threshold, then trips the cancellation token and
/// stalls so the runner observes the cancel before this call resolves.
pub struct CancelAfterProvider {
    remaining: Mutex<u32>,
    cancel: CancellationToken,
}

impl CancelAfterProvider {
    pub fn new(actions_before_cancel: u32, cancel: CancellationToken) -> Self {
        CancelAfterProvider {
            remaining: Mutex::new(actions_before_cancel),
            cancel,
        }
    }
}

#[async_trait]
impl ActionProvider for CancelAfterProvider {
    async fn next_action(&self, state: &HandState, seat: SeatNo) -> Result<Action, ProviderError> {
        let should_stall = {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                true
            } else {
                *remaining -= 1;
                false
            }
        };
        if should_stall {
            self.cancel.cancel();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            return Err(ProviderError::RequestTimeout);
        }
        Ok(if state.to_call(seat) == 0 {
            Action::Check
        } else {
            Action::Call
        })
    }
}
