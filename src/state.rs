use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::dealer;
use super::pot::PotAward;
use super::rules::{Shuffler, fresh_deck};
use super::shared::*;

/// 开一手牌所需的输入
#[derive(Debug, Clone)]
pub struct HandSetup {
    pub hand_id: String,
    pub table_id: String,
    pub hand_no: u32,
    pub button_seat: SeatNo,
    pub seats: Vec<SeatState>,
    pub config: TableConfig,
}

/// 一手牌的完整快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandState {
    pub hand_id: String,
    pub table_id: String,
    pub hand_no: u32,
    pub button_seat: SeatNo,
    pub acting_seat: Option<SeatNo>,
    pub phase: Phase,
    pub street: Street,
    pub pot: u32,
    pub current_bet: u32,
    pub min_raise_to: u32,
    pub last_full_raise: u32,
    pub last_aggressor_seat: Option<SeatNo>,
    pub action_order_start_seat: SeatNo,
    pub board: Vec<Card>,
    pub deck: Vec<Card>,
    pub next_card_index: usize,
    pub seats: Vec<SeatState>,
    pub hole_cards: BTreeMap<SeatNo, Vec<Card>>,
    pub showdown_awards: Vec<PotAward>,
    pub config: TableConfig,
}

impl HandState {
    /// 开始新的一手：洗牌发牌、下盲注、指定首个行动座位
    pub fn start(setup: HandSetup, shuffler: &mut dyn Shuffler) -> Result<HandState, EngineError> {
        setup.config.validate()?;

        let mut seats = setup.seats;
        seats.sort_by_key(|s| s.seat_no);
        for pair in seats.windows(2) {
            if pair[0].seat_no == pair[1].seat_no {
                return Err(EngineError::DuplicateSeat(pair[1].seat_no));
            }
        }
        // 本局开始前重置座位进度；没有筹码的座位视为出局
        for seat in &mut seats {
            seat.committed_in_round = 0;
            seat.total_committed = 0;
            seat.has_acted_this_round = false;
            seat.folded = false;
            if seat.status == SeatStatus::Active && seat.stack == 0 {
                seat.status = SeatStatus::Busted;
            }
        }

        let eligible: Vec<SeatNo> = seats
            .iter()
            .filter(|s| s.can_act())
            .map(|s| s.seat_no)
            .collect();
        if eligible.len() < 2 {
            return Err(EngineError::NoActiveSeats);
        }
        if !eligible.contains(&setup.button_seat) {
            return Err(EngineError::InvalidSeatNumber(setup.button_seat.get()));
        }

        let mut deck = fresh_deck();
        shuffler.shuffle(&mut deck);

        let big_blind = setup.config.big_blind;
        let small_blind = setup.config.small_blind;
        let mut state = HandState {
            hand_id: setup.hand_id,
            table_id: setup.table_id,
            hand_no: setup.hand_no,
            button_seat: setup.button_seat,
            acting_seat: None,
            phase: Phase::Dealing,
            street: Street::Preflop,
            pot: 0,
            current_bet: 0,
            min_raise_to: 0,
            last_full_raise: 0,
            last_aggressor_seat: None,
            action_order_start_seat: setup.button_seat,
            board: Vec::new(),
            deck,
            next_card_index: 0,
            seats,
            hole_cards: BTreeMap::new(),
            showdown_awards: Vec::new(),
            config: setup.config,
        };

        dealer::deal_preflop(&mut state)?;

        // 盲注：单挑时庄家就是小盲，先行动
        let button = state.button_seat;
        let sb = if eligible.len() == 2 {
            button
        } else {
            state
                .next_seat_after(button, |s| s.can_act())
                .ok_or(EngineError::NoActiveSeats)?
        };
        let bb = state
            .next_seat_after(sb, |s| s.can_act())
            .ok_or(EngineError::NoActiveSeats)?;
        state.post_blind(sb, small_blind);
        state.post_blind(bb, big_blind);

        state.current_bet = big_blind;
        state.last_full_raise = big_blind;
        state.min_raise_to = state.current_bet + state.last_full_raise;
        state.last_aggressor_seat = Some(bb);
        state.phase = Phase::Betting;

        match state.next_seat_after(bb, |s| s.can_act()) {
            Some(first) => {
                state.acting_seat = Some(first);
                state.action_order_start_seat = first;
                // 盲注就把所有人打光时直接发完公共牌
                if !state.betting_open() {
                    state.advance_street()?;
                }
            }
            None => state.advance_street()?,
        }
        Ok(state)
    }

    /// 处理一次行动，返回新的快照；出错时原快照不变
    pub fn apply_action(&self, seat: SeatNo, action: Action) -> Result<HandState, EngineError> {
        match self.phase {
            Phase::Showdown | Phase::Complete => return Err(EngineError::HandAlreadyComplete),
            Phase::Dealing => return Err(EngineError::InvalidTransition("hand not in betting phase")),
            Phase::Betting => {}
        }
        let acting = self
            .acting_seat
            .ok_or(EngineError::InvalidTransition("no acting seat"))?;
        if seat != acting {
            return Err(EngineError::NotActingSeat(seat));
        }

        let mut next = self.clone();
        let to_call = next.to_call(seat);

        match action {
            Action::Fold => {
                let s = next.seat_mut(seat)?;
                s.folded = true;
                s.has_acted_this_round = true;
            }
            Action::Check => {
                if to_call > 0 {
                    return Err(EngineError::IllegalAction("cannot check facing a bet"));
                }
                next.seat_mut(seat)?.has_acted_this_round = true;
            }
            Action::Call => {
                if to_call == 0 {
                    return Err(EngineError::IllegalAction("nothing to call"));
                }
                let s = next.seat_mut(seat)?;
                let pay = to_call.min(s.stack);
                s.stack -= pay;
                s.committed_in_round += pay;
                s.total_committed += pay;
                s.has_acted_this_round = true;
                next.pot += pay;
            }
            Action::Bet(amount) => {
                if next.current_bet > 0 {
                    return Err(EngineError::IllegalAction("bet not allowed after opening"));
                }
                if amount == 0 {
                    return Err(EngineError::IllegalAction("bet amount must be positive"));
                }
                {
                    let s = next.seat_mut(seat)?;
                    if amount > s.stack {
                        return Err(EngineError::InsufficientChips);
                    }
                    s.stack -= amount;
                    s.committed_in_round += amount;
                    s.total_committed += amount;
                    s.has_acted_this_round = true;
                }
                next.pot += amount;
                next.current_bet = next.seat(seat).map(|s| s.committed_in_round).unwrap_or(amount);
                next.last_full_raise = amount;
                next.min_raise_to = next.current_bet + next.last_full_raise;
                next.last_aggressor_seat = Some(seat);
                next.reset_pending_responses(seat);
            }
            Action::Raise(amount) => {
                if next.current_bet == 0 {
                    return Err(EngineError::IllegalAction("no bet to raise"));
                }
                let committed = next.seat(seat).map(|s| s.committed_in_round).unwrap_or(0);
                if amount <= committed {
                    return Err(EngineError::IllegalAction("raise must add chips"));
                }
                if amount < next.min_raise_to {
                    return Err(EngineError::IllegalAction("raise below minimum"));
                }
                let previous_bet = next.current_bet;
                {
                    let s = next.seat_mut(seat)?;
                    let pay = amount - s.committed_in_round;
                    if pay > s.stack {
                        return Err(EngineError::InsufficientChips);
                    }
                    s.stack -= pay;
                    s.committed_in_round += pay;
                    s.total_committed += pay;
                    s.has_acted_this_round = true;
                    next.pot += pay;
                }
                // 不足一个完整加注幅度时不重置 last_full_raise
                let delta = amount - previous_bet;
                if delta >= next.last_full_raise {
                    next.last_full_raise = delta;
                }
                next.current_bet = amount;
                next.min_raise_to = next.current_bet + next.last_full_raise;
                next.last_aggressor_seat = Some(seat);
                next.reset_pending_responses(seat);
            }
        }

        if next.seats.iter().filter(|s| s.in_hand()).count() <= 1 {
            next.award_uncontested();
            return Ok(next);
        }

        if next.betting_open() {
            let follow = next
                .next_seat_after(seat, |s| s.can_act())
                .ok_or(EngineError::InvalidTransition("no seat left to act"))?;
            next.acting_seat = Some(follow);
        } else {
            next.advance_street()?;
        }
        Ok(next)
    }

    /// 当前行动座位合法的行动类别
    pub fn legal_actions(&self) -> Vec<ActionKind> {
        let Some(seat) = self.acting_seat else {
            return Vec::new();
        };
        let Some(s) = self.seat(seat) else {
            return Vec::new();
        };
        let to_call = self.to_call(seat);
        let mut kinds = vec![ActionKind::Fold];
        if to_call == 0 {
            kinds.push(ActionKind::Check);
        } else {
            kinds.push(ActionKind::Call);
        }
        if self.current_bet == 0 && s.stack > 0 {
            kinds.push(ActionKind::Bet);
        }
        if self.current_bet > 0 && s.stack > to_call {
            kinds.push(ActionKind::Raise);
        }
        kinds
    }

    /// 指定座位还需跟注的金额
    pub fn to_call(&self, seat: SeatNo) -> u32 {
        self.seat(seat)
            .map(|s| self.current_bet.saturating_sub(s.committed_in_round))
            .unwrap_or(0)
    }

    pub fn seat(&self, seat: SeatNo) -> Option<&SeatState> {
        self.seats.iter().find(|s| s.seat_no == seat)
    }

    fn seat_mut(&mut self, seat: SeatNo) -> Result<&mut SeatState, EngineError> {
        self.seats
            .iter_mut()
            .find(|s| s.seat_no == seat)
            .ok_or(EngineError::InvalidSeatNumber(seat.get()))
    }

    /// 全部座位按庄家左手方向的顺序（不含庄家在首位，庄家排最后）
    pub fn seats_after_button(&self) -> Vec<SeatNo> {
        let mut order: Vec<SeatNo> = self.seats.iter().map(|s| s.seat_no).collect();
        order.sort();
        if let Some(pos) = order.iter().position(|&s| s == self.button_seat) {
            order.rotate_left(pos + 1);
        }
        order
    }

    /// 从某座位起顺时针找下一个满足条件的座位
    fn next_seat_after(
        &self,
        from: SeatNo,
        pred: impl Fn(&SeatState) -> bool,
    ) -> Option<SeatNo> {
        let mut order: Vec<SeatNo> = self.seats.iter().map(|s| s.seat_no).collect();
        order.sort();
        let start = order.iter().position(|&s| s == from)?;
        for i in 1..=order.len() {
            let candidate = order[(start + i) % order.len()];
            if candidate == from {
                continue;
            }
            if self.seat(candidate).map(&pred).unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }

    fn post_blind(&mut self, seat: SeatNo, blind: u32) {
        if let Ok(s) = self.seat_mut(seat) {
            let amount = blind.min(s.stack);
            s.stack -= amount;
            s.committed_in_round += amount;
            s.total_committed += amount;
            self.pot += amount;
        }
    }

    /// 下注或加注后，其余还能行动的座位要重新表态
    fn reset_pending_responses(&mut self, aggressor: SeatNo) {
        for s in &mut self.seats {
            if s.seat_no != aggressor && s.can_act() {
                s.has_acted_this_round = false;
            }
        }
    }

    /// 本轮下注是否仍未结束
    fn betting_open(&self) -> bool {
        let eligible: Vec<&SeatState> = self.seats.iter().filter(|s| s.can_act()).collect();
        if eligible.len() <= 1 {
            // 没有对手能回应时，只剩欠注未补的情况需要行动
            return eligible
                .iter()
                .any(|s| s.committed_in_round < self.current_bet);
        }
        eligible
            .iter()
            .any(|s| !s.has_acted_this_round || s.committed_in_round != self.current_bet)
    }

    /// 推进到下一条街；无人能行动时连续发到河牌进入摊牌
    fn advance_street(&mut self) -> Result<(), EngineError> {
        loop {
            if self.street == Street::River {
                self.phase = Phase::Showdown;
                self.acting_seat = None;
                self.reset_round();
                return Ok(());
            }
            let target = match self.street {
                Street::Preflop => Street::Flop,
                Street::Flop => Street::Turn,
                Street::Turn => Street::River,
                Street::River => unreachable!(),
            };
            dealer::deal_street(self, target)?;
            self.street = target;
            self.reset_round();

            let first = self.next_seat_after(self.button_seat, |s| s.can_act());
            self.acting_seat = first;
            if let Some(f) = first {
                self.action_order_start_seat = f;
            }
            if self.betting_open() {
                return Ok(());
            }
        }
    }

    fn reset_round(&mut self) {
        for s in &mut self.seats {
            s.committed_in_round = 0;
            s.has_acted_this_round = false;
        }
        self.current_bet = 0;
        self.last_aggressor_seat = None;
        self.last_full_raise = self.config.big_blind;
        self.min_raise_to = self.config.big_blind;
    }

    /// 只剩一个未弃牌座位时整个底池直接归它
    fn award_uncontested(&mut self) {
        let Some(winner) = self
            .seats
            .iter()
            .find(|s| s.in_hand())
            .map(|s| s.seat_no)
        else {
            return;
        };
        let amount = self.pot;
        if let Ok(s) = self.seat_mut(winner) {
            s.stack += amount;
        }
        self.showdown_awards.push(PotAward::uncontested(amount, winner));
        self.pot = 0;
        self.phase = Phase::Complete;
        self.acting_seat = None;
    }

    /// 本手开始时全部座位的筹码总量（用于守恒检查）
    pub fn chip_total(&self) -> u32 {
        self.pot + self.seats.iter().map(|s| s.stack).sum::<u32>()
    }
}
