use std::collections::HashMap;

use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::shared::*;

/// 洗牌接口，方便测试替换为确定性实现
pub trait Shuffler: Send {
    fn shuffle(&mut self, cards: &mut [Card]);
}

/// 默认洗牌器，使用操作系统熵源驱动的 CSPRNG 做均匀 Fisher-Yates
#[derive(Debug, Default)]
pub struct CryptoShuffler;

impl Shuffler for CryptoShuffler {
    fn shuffle(&mut self, cards: &mut [Card]) {
        let mut rng = rand::rng();
        cards.shuffle(&mut rng);
    }
}

/// 带种子的洗牌器，相同种子产生相同牌序
#[derive(Debug)]
pub struct SeededShuffler {
    rng: StdRng,
}

impl SeededShuffler {
    pub fn new(seed: u64) -> Self {
        SeededShuffler {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Shuffler for SeededShuffler {
    fn shuffle(&mut self, cards: &mut [Card]) {
        cards.shuffle(&mut self.rng);
    }
}

/// 创建一副有序的 52 张牌
pub fn fresh_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for &suit in &Suit::ALL {
        for &rank in &Rank::ALL {
            deck.push(Card { rank, suit });
        }
    }
    deck
}

/// 牌型类别，从小到大排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandCategory {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

/// 牌力评估结果：先比类别，再按字典序比关键牌
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandEvaluation {
    pub category: HandCategory,
    pub tiebreak: Vec<Rank>,
}

/// 评估两张底牌加公共牌的最强五张组合
pub fn evaluate_hand(hole: &[Card; 2], board: &[Card]) -> HandEvaluation {
    let mut all_cards = vec![hole[0], hole[1]];
    all_cards.extend_from_slice(board);

    if all_cards.len() <= 5 {
        return evaluate_five(&all_cards);
    }

    // 遍历全部 C(n,5) 组合取最大
    all_cards
        .iter()
        .copied()
        .combinations(5)
        .map(|five| evaluate_five(&five))
        .max()
        .expect("at least one five-card combination")
}

/// 评估恰好五张牌
pub fn evaluate_five(cards: &[Card]) -> HandEvaluation {
    assert!(cards.len() == 5, "只能评估5张牌");

    // 按点数分组，组按（张数，点数）降序排列
    let mut rank_counts: HashMap<Rank, u8> = HashMap::new();
    for card in cards {
        *rank_counts.entry(card.rank).or_insert(0) += 1;
    }
    let mut groups: Vec<(u8, Rank)> = rank_counts
        .iter()
        .map(|(&rank, &count)| (count, rank))
        .collect();
    groups.sort_by(|a, b| b.cmp(a));

    let is_flush = cards.iter().all(|c| c.suit == cards[0].suit);
    let straight_high = straight_high_card(cards);

    if let Some(high) = straight_high {
        if is_flush && high == Rank::Ace {
            return HandEvaluation {
                category: HandCategory::RoyalFlush,
                tiebreak: vec![Rank::Ace],
            };
        }
        if is_flush {
            return HandEvaluation {
                category: HandCategory::StraightFlush,
                tiebreak: vec![high],
            };
        }
    }

    // 四条
    if groups[0].0 == 4 {
        return HandEvaluation {
            category: HandCategory::FourOfAKind,
            tiebreak: vec![groups[0].1, groups[1].1],
        };
    }

    // 葫芦
    if groups[0].0 == 3 && groups[1].0 == 2 {
        return HandEvaluation {
            category: HandCategory::FullHouse,
            tiebreak: vec![groups[0].1, groups[1].1],
        };
    }

    if is_flush {
        return HandEvaluation {
            category: HandCategory::Flush,
            tiebreak: ranks_desc(cards),
        };
    }

    if let Some(high) = straight_high {
        return HandEvaluation {
            category: HandCategory::Straight,
            tiebreak: vec![high],
        };
    }

    // 三条
    if groups[0].0 == 3 {
        return HandEvaluation {
            category: HandCategory::ThreeOfAKind,
            tiebreak: vec![groups[0].1, groups[1].1, groups[2].1],
        };
    }

    // 两对
    if groups[0].0 == 2 && groups[1].0 == 2 {
        return HandEvaluation {
            category: HandCategory::TwoPair,
            tiebreak: vec![groups[0].1, groups[1].1, groups[2].1],
        };
    }

    // 一对
    if groups[0].0 == 2 {
        return HandEvaluation {
            category: HandCategory::OnePair,
            tiebreak: vec![groups[0].1, groups[1].1, groups[2].1, groups[3].1],
        };
    }

    HandEvaluation {
        category: HandCategory::HighCard,
        tiebreak: ranks_desc(cards),
    }
}

/// 五张牌的点数降序
fn ranks_desc(cards: &[Card]) -> Vec<Rank> {
    let mut ranks: Vec<Rank> = cards.iter().map(|c| c.rank).collect();
    ranks.sort_by(|a, b| b.cmp(a));
    ranks
}

/// 检查五张牌是否为顺子，返回最大牌；A-2-3-4-5 的最大牌是 5
fn straight_high_card(cards: &[Card]) -> Option<Rank> {
    let mut values: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    values.sort_unstable();
    values.dedup();
    if values.len() != 5 {
        return None;
    }

    if values.windows(2).all(|w| w[1] == w[0] + 1) {
        return Some(Rank::from_value(values[4]));
    }
    // 轮子顺：A 当 1 用
    if values == [2, 3, 4, 5, 14] {
        return Some(Rank::Five);
    }
    None
}

/// 比较两手底牌在同一公共牌下的强弱
pub fn compare_hands(
    hand1: &[Card; 2],
    hand2: &[Card; 2],
    board: &[Card],
) -> std::cmp::Ordering {
    evaluate_hand(hand1, board).cmp(&evaluate_hand(hand2, board))
}
