use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use holdem_engine::{Action, ActionKind, HandState, SeatNo};

/// Wire format version spoken to agents.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request body POSTed to an agent's callback URL when its seat must act.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub protocol_version: u32,
    pub hand_id: String,
    pub table_id: String,
    pub seat: u8,
    pub hole_cards: Vec<String>,
    pub board: Vec<String>,
    pub pot: u32,
    pub to_call: u32,
    pub min_raise_to: Option<u32>,
    pub stacks: BTreeMap<u8, u32>,
    pub bets: BTreeMap<u8, u32>,
    pub legal_actions: Vec<ActionKind>,
    pub action_deadline_ms: u64,
}

impl ActionRequest {
    /// Assemble the request for the acting seat. Only that seat's hole cards
    /// are included; everything else an agent may see is public.
    pub fn for_acting_seat(
        state: &HandState,
        seat: SeatNo,
        hole: &[holdem_engine::Card],
        deadline_ms: u64,
    ) -> Self {
        let legal = state.legal_actions();
        let mut stacks = BTreeMap::new();
        let mut bets = BTreeMap::new();
        for s in &state.seats {
            stacks.insert(s.seat_no.get(), s.stack);
            bets.insert(s.seat_no.get(), s.committed_in_round);
        }
        ActionRequest {
            protocol_version: PROTOCOL_VERSION,
            hand_id: state.hand_id.clone(),
            table_id: state.table_id.clone(),
            seat: seat.get(),
            hole_cards: hole.iter().map(|c| c.to_string()).collect(),
            board: state.board.iter().map(|c| c.to_string()).collect(),
            pot: state.pot,
            to_call: state.to_call(seat),
            min_raise_to: legal
                .contains(&ActionKind::Raise)
                .then_some(state.min_raise_to),
            stacks,
            bets,
            legal_actions: legal,
            action_deadline_ms: deadline_ms,
        }
    }
}

/// Agent reply: `{"action":"call"}` or `{"action":"raise","amount":350}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

impl ActionResponse {
    /// Translate the reply into an engine action, enforcing the amount rules:
    /// bet/raise carry a positive amount, everything else carries none.
    pub fn into_action(self) -> Result<Action, String> {
        match (self.action, self.amount) {
            (ActionKind::Fold, None) => Ok(Action::Fold),
            (ActionKind::Check, None) => Ok(Action::Check),
            (ActionKind::Call, None) => Ok(Action::Call),
            (ActionKind::Bet, Some(n)) if n > 0 => Ok(Action::Bet(n)),
            (ActionKind::Raise, Some(n)) if n > 0 => Ok(Action::Raise(n)),
            (ActionKind::Bet, _) | (ActionKind::Raise, _) => {
                Err("bet and raise require a positive amount".into())
            }
            (kind, Some(_)) => Err(format!("{} must not carry an amount", kind)),
        }
    }
}
