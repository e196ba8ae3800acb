use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::rules::{HandEvaluation, evaluate_hand};
use super::shared::*;
use super::state::HandState;

/// 单个奖池的归属说明
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardReason {
    MainPot,
    SidePot(u32),
    Uncontested,
}

impl fmt::Display for AwardReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AwardReason::MainPot => write!(f, "main_pot"),
            AwardReason::SidePot(n) => write!(f, "side_pot_{}", n),
            AwardReason::Uncontested => write!(f, "uncontested"),
        }
    }
}

impl std::str::FromStr for AwardReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main_pot" => Ok(AwardReason::MainPot),
            "uncontested" => Ok(AwardReason::Uncontested),
            _ => match s.strip_prefix("side_pot_").and_then(|n| n.parse().ok()) {
                Some(n) => Ok(AwardReason::SidePot(n)),
                None => Err(format!("unknown award reason: {}", s)),
            },
        }
    }
}

impl Serialize for AwardReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AwardReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// 一次奖池分配的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotAward {
    pub amount: u32,
    pub seats: Vec<SeatNo>,
    pub reason: AwardReason,
}

impl PotAward {
    pub fn uncontested(amount: u32, winner: SeatNo) -> Self {
        PotAward {
            amount,
            seats: vec![winner],
            reason: AwardReason::Uncontested,
        }
    }
}

/// 摊牌结算：按投入档位切层，每层由该层参与者中牌力最强者瓜分
pub fn resolve_showdown(state: &HandState) -> Result<HandState, EngineError> {
    if state.phase != Phase::Showdown {
        return Err(EngineError::InvalidTransition("hand is not at showdown"));
    }
    if state.board.len() != 5 {
        return Err(EngineError::InvalidTransition("board incomplete for showdown"));
    }

    let mut next = state.clone();

    // 能参与摊牌的座位的最佳牌力
    let mut evals: BTreeMap<SeatNo, HandEvaluation> = BTreeMap::new();
    for s in &state.seats {
        if !s.in_hand() {
            continue;
        }
        if let Some(hole) = state.hole_cards.get(&s.seat_no) {
            if hole.len() == 2 {
                evals.insert(s.seat_no, evaluate_hand(&[hole[0], hole[1]], &state.board));
            }
        }
    }

    // 投入档位（含弃牌座位），升序
    let mut levels: Vec<u32> = state
        .seats
        .iter()
        .map(|s| s.total_committed)
        .filter(|&c| c > 0)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    // 每层的金额与赢家
    let mut layers: Vec<(u32, Vec<SeatNo>)> = Vec::new();
    let mut prev = 0u32;
    for &cur in &levels {
        let contributors = state
            .seats
            .iter()
            .filter(|s| s.total_committed >= cur)
            .count() as u32;
        let amount = (cur - prev) * contributors;

        let mut best: Option<&HandEvaluation> = None;
        let mut winners: Vec<SeatNo> = Vec::new();
        for s in &state.seats {
            if s.total_committed < cur {
                continue;
            }
            let Some(eval) = evals.get(&s.seat_no) else {
                continue;
            };
            match best {
                None => {
                    best = Some(eval);
                    winners.push(s.seat_no);
                }
                Some(current) => match eval.cmp(current) {
                    std::cmp::Ordering::Greater => {
                        best = Some(eval);
                        winners.clear();
                        winners.push(s.seat_no);
                    }
                    std::cmp::Ordering::Equal => winners.push(s.seat_no),
                    std::cmp::Ordering::Less => {}
                },
            }
        }
        layers.push((amount, winners));
        prev = cur;
    }

    // 最深投入者弃牌时该层无人有资格，金额并入下一个有赢家的层
    for i in (1..layers.len()).rev() {
        if layers[i].1.is_empty() {
            let orphan = layers[i].0;
            layers[i].0 = 0;
            layers[i - 1].0 += orphan;
        }
    }
    layers.retain(|(amount, winners)| *amount > 0 && !winners.is_empty());
    if layers.is_empty() && state.pot > 0 {
        return Err(EngineError::InvalidTransition("no eligible winner at showdown"));
    }

    // 零头从庄家左手第一个赢家开始逐枚分发
    let button_order = next.seats_after_button();
    let mut awards: Vec<PotAward> = Vec::new();
    for (amount, winners) in &layers {
        let share = amount / winners.len() as u32;
        let odd = amount % winners.len() as u32;
        for w in winners {
            if let Some(s) = next.seats.iter_mut().find(|s| s.seat_no == *w) {
                s.stack += share;
            }
        }
        let mut handed = 0;
        for seat in &button_order {
            if handed == odd {
                break;
            }
            if winners.contains(seat) {
                if let Some(s) = next.seats.iter_mut().find(|s| s.seat_no == *seat) {
                    s.stack += 1;
                    handed += 1;
                }
            }
        }

        let reason = if awards.is_empty() {
            AwardReason::MainPot
        } else {
            AwardReason::SidePot(awards.len() as u32)
        };
        let mut seats = winners.clone();
        seats.sort();
        awards.push(PotAward {
            amount: *amount,
            seats,
            reason,
        });
    }

    debug_assert_eq!(
        awards.iter().map(|a| a.amount).sum::<u32>(),
        state.pot,
        "pot awards must account for every committed chip"
    );

    next.pot = 0;
    next.phase = Phase::Complete;
    next.acting_seat = None;
    next.showdown_awards = awards;
    Ok(next)
}
