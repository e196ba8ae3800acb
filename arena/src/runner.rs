use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use holdem_engine::pot;
use holdem_engine::rules::{CryptoShuffler, Shuffler};
use holdem_engine::{
    Action, EngineError, HandSetup, HandState, Phase, SeatNo, SeatState, SeatStatus, TableConfig,
};

use crate::store::{
    ActionRecord, HandRecord, RunStatus, StoreError, TableRunRecord, TableStore,
};

/// Safety cap: no legal hand comes anywhere near this many actions.
pub const DEFAULT_MAX_ACTIONS_PER_HAND: u32 = 500;

/// Everything needed to drive one table for a stretch of hands.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub table_id: String,
    pub starting_hand: u32,
    pub hands_to_run: u32,
    pub button_seat: SeatNo,
    pub seats: Vec<SeatState>,
    pub config: TableConfig,
}

/// Per-hand digest handed to hooks and kept in the run result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandSummary {
    pub hand_no: u32,
    pub final_phase: Phase,
    pub action_count: u32,
    pub fallback_count: u32,
    pub final_state: HandState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTableResult {
    pub hands_completed: u32,
    pub final_button: SeatNo,
    pub final_seats: Vec<SeatState>,
    pub total_actions: u32,
    pub total_fallbacks: u32,
    pub hand_summaries: Vec<HandSummary>,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("hands_to_run must be positive")]
    InvalidHandsToRun,
    #[error("hand {hand_no} exceeded the action safety cap")]
    ActionLimitExceeded { hand_no: u32 },
    #[error("fewer than two seats still have chips")]
    InsufficientActiveSeats { partial: Box<RunTableResult> },
    #[error("table run cancelled")]
    Cancelled { partial: Box<RunTableResult> },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lifecycle hooks, delivered exactly once and in order per table.
pub trait TableHooks: Send {
    fn on_hand_start(&mut self, _state: &HandState) {}
    fn on_action(&mut self, _hand_no: u32, _before: &HandState, _action: &Action, _is_fallback: bool) {
    }
    fn on_hand_complete(&mut self, _summary: &HandSummary) {}
}

pub struct NoHooks;

impl TableHooks for NoHooks {}

/// Drives a table through N hands: one cooperative task per table, actions
/// solicited from the provider, every transition persisted through the store.
pub struct TableRunner<P> {
    provider: P,
    store: Arc<dyn TableStore>,
    shuffler: Box<dyn Shuffler>,
    hooks: Box<dyn TableHooks>,
    max_actions_per_hand: u32,
}

impl<P: crate::provider::ActionProvider> TableRunner<P> {
    pub fn new(provider: P, store: Arc<dyn TableStore>) -> Self {
        TableRunner {
            provider,
            store,
            shuffler: Box::new(CryptoShuffler),
            hooks: Box::new(NoHooks),
            max_actions_per_hand: DEFAULT_MAX_ACTIONS_PER_HAND,
        }
    }

    pub fn with_shuffler(mut self, shuffler: Box<dyn Shuffler>) -> Self {
        self.shuffler = shuffler;
        self
    }

    pub fn with_hooks(mut self, hooks: Box<dyn TableHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_action_cap(mut self, cap: u32) -> Self {
        self.max_actions_per_hand = cap;
        self
    }

    pub async fn run(
        &mut self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunTableResult, RunnerError> {
        request.config.validate()?;
        if request.hands_to_run == 0 {
            return Err(RunnerError::InvalidHandsToRun);
        }

        let started_at = Utc::now();
        let mut result = RunTableResult {
            hands_completed: 0,
            final_button: request.button_seat,
            final_seats: request.seats.clone(),
            total_actions: 0,
            total_fallbacks: 0,
            hand_summaries: Vec::new(),
        };
        let mut run = TableRunRecord {
            table_id: request.table_id.clone(),
            status: RunStatus::Running,
            started_at,
            ended_at: None,
            error: None,
            hands_requested: request.hands_to_run,
            hands_completed: 0,
            total_actions: 0,
            total_fallbacks: 0,
            current_hand_no: request.starting_hand,
        };
        self.store.upsert_table_run(&run).await?;

        let mut seats = request.seats;
        let mut button = request.button_seat;

        for i in 0..request.hands_to_run {
            let hand_no = request.starting_hand + i;
            if cancel.is_cancelled() {
                return self.finish_stopped(run, result).await;
            }

            let hand_id = Uuid::new_v4().to_string();
            let setup = HandSetup {
                hand_id: hand_id.clone(),
                table_id: request.table_id.clone(),
                hand_no,
                button_seat: button,
                seats: seats.clone(),
                config: request.config.clone(),
            };
            let mut state = match HandState::start(setup, self.shuffler.as_mut()) {
                Ok(state) => state,
                Err(err) => return self.finish_failed(run, err.into()).await,
            };
            run.current_hand_no = hand_no;

            let hand_started = Utc::now();
            self.store
                .create_hand(&HandRecord {
                    hand_id: hand_id.clone(),
                    table_id: request.table_id.clone(),
                    hand_no,
                    started_at: hand_started,
                    ended_at: None,
                    final_phase: state.phase,
                    final_state: state.clone(),
                    winner_summary: Vec::new(),
                })
                .await?;
            self.hooks.on_hand_start(&state);
            info!(table_id = %request.table_id, hand_no, %hand_id, "hand started");

            let mut action_count = 0u32;
            let mut fallback_count = 0u32;
            while !state.phase.is_terminal() {
                if action_count >= self.max_actions_per_hand {
                    return self
                        .finish_failed(run, RunnerError::ActionLimitExceeded { hand_no })
                        .await;
                }
                let Some(seat) = state.acting_seat else {
                    let err = EngineError::InvalidTransition("betting without acting seat");
                    return self.finish_failed(run, err.into()).await;
                };

                let solicited = tokio::select! {
                    _ = cancel.cancelled() => None,
                    outcome = self.provider.next_action(&state, seat) => Some(outcome),
                };
                let Some(solicited) = solicited else {
                    return self.finish_stopped(run, result).await;
                };

                let (action, next_state, is_fallback) = match solicited {
                    Ok(action) => match state.apply_action(seat, action) {
                        Ok(next) => (action, next, false),
                        Err(err) => {
                            warn!(table_id = %request.table_id, hand_no, %seat, %err,
                                "agent action rejected, substituting fallback");
                            match self.apply_fallback(&state, seat) {
                                Ok(pair) => pair,
                                Err(err) => return self.finish_failed(run, err.into()).await,
                            }
                        }
                    },
                    Err(err) => {
                        warn!(table_id = %request.table_id, hand_no, %seat, %err,
                            "action solicitation failed, substituting fallback");
                        match self.apply_fallback(&state, seat) {
                            Ok(pair) => pair,
                            Err(err) => return self.finish_failed(run, err.into()).await,
                        }
                    }
                };

                self.hooks.on_action(hand_no, &state, &action, is_fallback);
                self.store
                    .append_action(
                        &hand_id,
                        &ActionRecord {
                            id: 0,
                            hand_id: hand_id.clone(),
                            street: state.street,
                            acting_seat: seat,
                            action: action.kind(),
                            amount: action.amount(),
                            is_fallback,
                            at: Utc::now(),
                        },
                    )
                    .await?;

                action_count += 1;
                result.total_actions += 1;
                if is_fallback {
                    fallback_count += 1;
                    result.total_fallbacks += 1;
                }
                state = next_state;
            }

            if state.phase == Phase::Showdown {
                state = match pot::resolve_showdown(&state) {
                    Ok(next) => next,
                    Err(err) => return self.finish_failed(run, err.into()).await,
                };
            }

            let summary = HandSummary {
                hand_no,
                final_phase: state.phase,
                action_count,
                fallback_count,
                final_state: state.clone(),
            };
            self.hooks.on_hand_complete(&summary);
            self.store
                .complete_hand(&HandRecord {
                    hand_id: hand_id.clone(),
                    table_id: request.table_id.clone(),
                    hand_no,
                    started_at: hand_started,
                    ended_at: Some(Utc::now()),
                    final_phase: state.phase,
                    final_state: state.clone(),
                    winner_summary: state.showdown_awards.clone(),
                })
                .await?;

            result.hands_completed += 1;
            result.hand_summaries.push(summary);

            // carry stacks forward and rotate the button to the next funded seat
            seats = carry_forward(&state.seats);
            if let Some(next_button) = next_funded_after(&seats, button) {
                button = next_button;
            }
            result.final_seats = seats.clone();
            result.final_button = button;

            run.hands_completed = result.hands_completed;
            run.total_actions = result.total_actions;
            run.total_fallbacks = result.total_fallbacks;
            self.store.upsert_table_run(&run).await?;

            let funded = seats.iter().filter(|s| s.can_act()).count();
            if funded < 2 && i + 1 < request.hands_to_run {
                run.status = RunStatus::Failed;
                run.error = Some("fewer than two seats still have chips".into());
                run.ended_at = Some(Utc::now());
                self.store.upsert_table_run(&run).await?;
                return Err(RunnerError::InsufficientActiveSeats {
                    partial: Box::new(result),
                });
            }
        }

        run.status = RunStatus::Completed;
        run.ended_at = Some(Utc::now());
        self.store.upsert_table_run(&run).await?;
        info!(table_id = %run.table_id, hands = result.hands_completed, "table run completed");
        Ok(result)
    }

    /// The fallback never desyncs state: check when nothing is owed, fold
    /// otherwise, both applied through the normal path.
    fn apply_fallback(
        &self,
        state: &HandState,
        seat: SeatNo,
    ) -> Result<(Action, HandState, bool), EngineError> {
        let action = if state.to_call(seat) == 0 {
            Action::Check
        } else {
            Action::Fold
        };
        let next = state.apply_action(seat, action)?;
        Ok((action, next, true))
    }

    async fn finish_stopped(
        &mut self,
        mut run: TableRunRecord,
        result: RunTableResult,
    ) -> Result<RunTableResult, RunnerError> {
        run.status = RunStatus::Stopped;
        run.ended_at = Some(Utc::now());
        self.store.upsert_table_run(&run).await?;
        info!(table_id = %run.table_id, hands = result.hands_completed, "table run stopped");
        Err(RunnerError::Cancelled {
            partial: Box::new(result),
        })
    }

    async fn finish_failed(
        &mut self,
        mut run: TableRunRecord,
        err: RunnerError,
    ) -> Result<RunTableResult, RunnerError> {
        run.status = RunStatus::Failed;
        run.error = Some(err.to_string());
        run.ended_at = Some(Utc::now());
        self.store.upsert_table_run(&run).await?;
        Err(err)
    }
}

/// Reset round-local fields between hands; a seat that lost its whole stack
/// sits out the rest of the run as busted.
fn carry_forward(seats: &[SeatState]) -> Vec<SeatState> {
    seats
        .iter()
        .map(|s| {
            let mut seat = s.clone();
            seat.committed_in_round = 0;
            seat.total_committed = 0;
            seat.has_acted_this_round = false;
            seat.folded = false;
            if seat.status == SeatStatus::Active && seat.stack == 0 {
                seat.status = SeatStatus::Busted;
            }
            seat
        })
        .collect()
}

/// Next seat clockwise from `from` that still has chips to play.
fn next_funded_after(seats: &[SeatState], from: SeatNo) -> Option<SeatNo> {
    let mut order: Vec<SeatNo> = seats.iter().map(|s| s.seat_no).collect();
    order.sort();
    let start = order.iter().position(|&s| s == from)?;
    for i in 1..=order.len() {
        let candidate = order[(start + i) % order.len()];
        let funded = seats
            .iter()
            .find(|s| s.seat_no == candidate)
            .map(|s| s.status == SeatStatus::Active && s.stack > 0)
            .unwrap_or(false);
        if funded {
            return Some(candidate);
        }
    }
    None
}
