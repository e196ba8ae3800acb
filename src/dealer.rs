use super::shared::*;
use super::state::HandState;

/// 从牌堆游标处取一张牌
fn draw(state: &mut HandState) -> Result<Card, EngineError> {
    let card = state
        .deck
        .get(state.next_card_index)
        .copied()
        .ok_or(EngineError::InvalidTransition("deck exhausted"))?;
    state.next_card_index += 1;
    Ok(card)
}

/// 发底牌：从庄家左手第一个座位开始，两轮各发一张
pub fn deal_preflop(state: &mut HandState) -> Result<(), EngineError> {
    if state.next_card_index != 0 || state.deck.len() != 52 {
        return Err(EngineError::InvalidTransition("deck must be fresh for preflop"));
    }
    if !state.board.is_empty() || !state.hole_cards.is_empty() {
        return Err(EngineError::InvalidTransition("hand already dealt"));
    }

    let order: Vec<SeatNo> = state
        .seats_after_button()
        .into_iter()
        .filter(|&s| state.seat(s).map(|st| st.can_act()).unwrap_or(false))
        .collect();
    if order.len() < 2 {
        return Err(EngineError::NoActiveSeats);
    }

    for _ in 0..2 {
        for &seat in &order {
            let card = draw(state)?;
            state.hole_cards.entry(seat).or_insert_with(Vec::new).push(card);
        }
    }
    Ok(())
}

/// 发公共牌：烧一张，翻牌发三张，转牌河牌各一张
pub fn deal_street(state: &mut HandState, street: Street) -> Result<(), EngineError> {
    let take = match street {
        Street::Preflop => return Err(EngineError::InvalidTransition("preflop has no board cards")),
        Street::Flop => 3,
        Street::Turn | Street::River => 1,
    };
    if state.board.len() + take != street.board_len() {
        return Err(EngineError::InvalidTransition("board out of step with street"));
    }

    let _burned = draw(state)?;
    for _ in 0..take {
        let card = draw(state)?;
        state.board.push(card);
    }
    Ok(())
}
