mod common;

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use common::*;
use holdem_arena::runner::{HandSummary, RunnerError, TableHooks, TableRunner};
use holdem_arena::store::{MemoryStore, RunStatus, TableStore};
use holdem_engine::pot::AwardReason;
use holdem_engine::rules::SeededShuffler;
use holdem_engine::{Action, ActionKind, HandState, Phase};

fn runner_with<P: holdem_arena::ActionProvider>(
    provider: P,
    store: Arc<MemoryStore>,
    seed: u64,
) -> TableRunner<P> {
    TableRunner::new(provider, store as Arc<dyn TableStore>)
        .with_shuffler(Box::new(SeededShuffler::new(seed)))
}

#[tokio::test]
async fn heads_up_fold_settles_blinds() {
    let store = Arc::new(MemoryStore::new());
    let provider = ScriptedProvider::new(vec![Action::Fold]);
    let mut runner = runner_with(provider, store.clone(), 5);

    let result = runner
        .run(
            run_request("t-fold", 1, vec![seat(1, 10_000), seat(2, 10_000)]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.hands_completed, 1);
    assert_eq!(result.total_actions, 1);
    assert_eq!(result.total_fallbacks, 0);

    let summary = &result.hand_summaries[0];
    assert_eq!(summary.final_phase, Phase::Complete);
    assert_eq!(summary.final_state.pot, 0);
    assert_eq!(summary.final_state.seat(sn(1)).unwrap().stack, 9_950);
    assert_eq!(summary.final_state.seat(sn(2)).unwrap().stack, 10_050);
    assert_eq!(
        summary.final_state.showdown_awards[0].reason,
        AwardReason::Uncontested
    );

    let hands = store.list_hands("t-fold").await.unwrap();
    assert_eq!(hands.len(), 1);
    let actions = store.list_actions(&hands[0].hand_id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, ActionKind::Fold);
    assert!(!actions[0].is_fallback);

    let run = store.get_table_run("t-fold").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.hands_completed, 1);
}

#[tokio::test]
async fn provider_timeout_substitutes_fold_fallback() {
    let store = Arc::new(MemoryStore::new());
    let mut runner = runner_with(TimingOutProvider, store.clone(), 5);

    let result = runner
        .run(
            run_request("t-timeout", 1, vec![seat(1, 10_000), seat(2, 10_000)]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // button owes the big blind, so the substituted action is a fold
    assert_eq!(result.total_fallbacks, 1);
    let summary = &result.hand_summaries[0];
    assert_eq!(summary.final_state.seat(sn(2)).unwrap().stack, 10_050);

    let hands = store.list_hands("t-timeout").await.unwrap();
    let actions = store.list_actions(&hands[0].hand_id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, ActionKind::Fold);
    assert!(actions[0].is_fallback);
}

#[tokio::test]
async fn illegal_agent_action_substitutes_fallback() {
    let store = Arc::new(MemoryStore::new());
    // raise to 150 is below the 200 minimum; the runner must not apply it
    let provider = ScriptedProvider::new(vec![Action::Raise(150), Action::Fold]);
    let mut runner = runner_with(provider, store.clone(), 5);

    let result = runner
        .run(
            run_request("t-illegal", 1, vec![seat(1, 10_000), seat(2, 10_000)]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.total_actions, 1);
    assert_eq!(result.total_fallbacks, 1);

    let hands = store.list_hands("t-illegal").await.unwrap();
    let actions = store.list_actions(&hands[0].hand_id).await.unwrap();
    assert_eq!(actions[0].action, ActionKind::Fold);
    assert!(actions[0].is_fallback);
}

#[tokio::test]
async fn check_fallback_when_nothing_owed() {
    let store = Arc::new(MemoryStore::new());
    // seat 1 calls, then the big blind's agent fails with nothing to call
    let provider = ScriptedProvider::new(vec![Action::Call]);
    let mut runner = runner_with(provider, store.clone(), 5);

    let result = runner
        .run(
            run_request("t-check-fb", 1, vec![seat(1, 10_000), seat(2, 10_000)]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let hands = store.list_hands("t-check-fb").await.unwrap();
    let actions = store.list_actions(&hands[0].hand_id).await.unwrap();
    // call, then fallback checks the rest of the hand down
    assert_eq!(actions[0].action, ActionKind::Call);
    assert!(!actions[0].is_fallback);
    for record in &actions[1..] {
        assert_eq!(record.action, ActionKind::Check);
        assert!(record.is_fallback);
    }
    assert_eq!(result.hand_summaries[0].final_phase, Phase::Complete);
}

#[tokio::test]
async fn actions_persist_in_order_with_streets() {
    let store = Arc::new(MemoryStore::new());
    let mut runner = runner_with(CheckCallProvider, store.clone(), 5);

    runner
        .run(
            run_request("t-order", 1, vec![seat(1, 10_000), seat(2, 10_000)]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let hands = store.list_hands("t-order").await.unwrap();
    let actions = store.list_actions(&hands[0].hand_id).await.unwrap();
    assert_eq!(actions.len(), 8);

    let streets: Vec<String> = actions.iter().map(|a| a.street.to_string()).collect();
    assert_eq!(
        streets,
        vec![
            "preflop", "preflop", "flop", "flop", "turn", "turn", "river", "river"
        ]
    );
    // ids are monotonically increasing in application order
    for pair in actions.windows(2) {
        assert!(pair[0].id < pair[1].id);
    }
    // heads-up: button acts first preflop, second postflop
    assert_eq!(actions[0].acting_seat, sn(1));
    assert_eq!(actions[2].acting_seat, sn(2));
}

struct ConservationHooks {
    expected: Mutex<Option<u32>>,
    violations: Arc<Mutex<Vec<String>>>,
}

impl TableHooks for ConservationHooks {
    fn on_hand_start(&mut self, state: &HandState) {
        *self.expected.lock().unwrap() = Some(state.chip_total());
    }

    fn on_action(&mut self, hand_no: u32, before: &HandState, _action: &Action, _fb: bool) {
        let expected = self.expected.lock().unwrap().unwrap();
        if before.chip_total() != expected {
            self.violations
                .lock()
                .unwrap()
                .push(format!("hand {} drifted", hand_no));
        }
    }

    fn on_hand_complete(&mut self, summary: &HandSummary) {
        let expected = self.expected.lock().unwrap().unwrap();
        if summary.final_state.chip_total() != expected {
            self.violations
                .lock()
                .unwrap()
                .push(format!("hand {} settled wrong", summary.hand_no));
        }
    }
}

#[tokio::test]
async fn hundred_hands_deterministic_and_conserving() {
    let store = Arc::new(MemoryStore::new());
    let violations = Arc::new(Mutex::new(Vec::new()));
    let hooks = ConservationHooks {
        expected: Mutex::new(None),
        violations: violations.clone(),
    };
    let mut runner = runner_with(CheckCallProvider, store.clone(), 99)
        .with_hooks(Box::new(hooks));

    let seats = vec![seat(1, 10_000), seat(2, 10_000), seat(3, 10_000)];
    let result = runner
        .run(run_request("t-hundred", 100, seats), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.hands_completed, 100);
    assert_eq!(result.hand_summaries.len(), 100);
    for (i, summary) in result.hand_summaries.iter().enumerate() {
        assert_eq!(summary.hand_no, 1 + i as u32);
        assert!(summary.final_phase == Phase::Complete);
    }
    assert!(violations.lock().unwrap().is_empty());

    // the whole run conserves the table's chips
    let total: u32 = result.final_seats.iter().map(|s| s.stack).sum();
    assert_eq!(total, 30_000);

    let hands = store.list_hands("t-hundred").await.unwrap();
    assert_eq!(hands.len(), 100);
    for (i, hand) in hands.iter().enumerate() {
        assert_eq!(hand.hand_no, 1 + i as u32);
        assert!(hand.ended_at.is_some());
    }
}

#[tokio::test]
async fn seeded_runs_reproduce_identical_histories() {
    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(MemoryStore::new());
        let mut runner = runner_with(CheckCallProvider, store.clone(), 4242);
        let result = runner
            .run(
                run_request("t-repro", 10, vec![seat(1, 10_000), seat(2, 10_000)]),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let stacks: Vec<u32> = result.final_seats.iter().map(|s| s.stack).collect();
        outcomes.push((result.total_actions, stacks));
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn cancellation_marks_run_stopped_and_keeps_history() {
    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();
    // enough actions for a few hands, then cancel mid-solicitation
    let provider = CancelAfterProvider::new(20, cancel.clone());
    let mut runner = runner_with(provider, store.clone(), 7);

    let err = runner
        .run(
            run_request("t-cancel", 100, vec![seat(1, 10_000), seat(2, 10_000)]),
            cancel,
        )
        .await
        .unwrap_err();

    let RunnerError::Cancelled { partial } = err else {
        panic!("expected cancellation error");
    };
    assert!(partial.hands_completed > 0);
    assert!(partial.hands_completed < 100);

    let run = store.get_table_run("t-cancel").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Stopped);
    assert_eq!(run.hands_completed, partial.hands_completed);

    // every completed hand and its actions survived the cancellation
    let hands = store.list_hands("t-cancel").await.unwrap();
    let completed: Vec<_> = hands.iter().filter(|h| h.ended_at.is_some()).collect();
    assert_eq!(completed.len(), partial.hands_completed as usize);
    for hand in completed {
        let actions = store.list_actions(&hand.hand_id).await.unwrap();
        assert!(!actions.is_empty());
    }
}

#[tokio::test]
async fn short_stack_bust_out_aborts_the_run() {
    let store = Arc::new(MemoryStore::new());
    let mut runner = runner_with(CheckCallProvider, store.clone(), 31);

    // both seats are all-in from the blinds every hand; a decisive showdown
    // busts one of them long before twenty hands pass
    let err = runner
        .run(
            run_request("t-bust", 20, vec![seat(1, 100), seat(2, 100)]),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let RunnerError::InsufficientActiveSeats { partial } = err else {
        panic!("expected insufficient active seats");
    };
    assert!(partial.hands_completed >= 1);
    let run = store.get_table_run("t-bust").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn zero_hands_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mut runner = runner_with(CheckCallProvider, store, 1);

    let err = runner
        .run(
            run_request("t-zero", 0, vec![seat(1, 10_000), seat(2, 10_000)]),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::InvalidHandsToRun));
}

#[tokio::test]
async fn button_rotates_between_hands() {
    let store = Arc::new(MemoryStore::new());
    // each three-handed hand takes two folds to end uncontested
    let provider = ScriptedProvider::new(vec![Action::Fold; 6]);
    let mut runner = runner_with(provider, store.clone(), 11);

    let seats = vec![seat(1, 10_000), seat(2, 10_000), seat(3, 10_000)];
    let result = runner
        .run(run_request("t-rotate", 3, seats), CancellationToken::new())
        .await
        .unwrap();

    // button walks 1 -> 2 -> 3 -> 1
    assert_eq!(result.final_button, sn(1));
    let buttons: Vec<_> = result
        .hand_summaries
        .iter()
        .map(|s| s.final_state.button_seat)
        .collect();
    assert_eq!(buttons, vec![sn(1), sn(2), sn(3)]);
}
