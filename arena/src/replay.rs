use holdem_engine::SeatNo;
use holdem_engine::pot::AwardReason;

use crate::store::HandRecord;

/// Who is asking for a hand's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Admin,
    Seat(SeatNo),
}

/// Whether the hand ended in a reveal: any award that was not an
/// uncontested walk means the remaining hands were shown.
pub fn went_to_showdown(record: &HandRecord) -> bool {
    record
        .winner_summary
        .iter()
        .any(|award| award.reason != AwardReason::Uncontested)
}

/// Apply the per-seat visibility rule to a persisted hand. Seat viewers
/// always see their own hole cards; opponents' cards stay hidden unless the
/// hand reached showdown. The undealt deck is never disclosed to seats.
pub fn redact_hand(record: &HandRecord, viewer: Viewer) -> HandRecord {
    let Viewer::Seat(seat) = viewer else {
        return record.clone();
    };

    let mut redacted = record.clone();
    let state = &mut redacted.final_state;
    state.deck.clear();
    state.next_card_index = 0;
    if !went_to_showdown(record) {
        state.hole_cards.retain(|&owner, _| owner == seat);
    }
    redacted
}

pub fn redact_hands(records: &[HandRecord], viewer: Viewer) -> Vec<HandRecord> {
    records.iter().map(|r| redact_hand(r, viewer)).collect()
}
