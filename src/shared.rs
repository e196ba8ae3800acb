use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 扑克牌花色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suit {
    Clubs,    // 梅花
    Diamonds, // 方块
    Hearts,   // 红心
    Spades,   // 黑桃
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Suit::Clubs => write!(f, "c"),
            Suit::Diamonds => write!(f, "d"),
            Suit::Hearts => write!(f, "h"),
            Suit::Spades => write!(f, "s"),
        }
    }
}

/// 扑克牌点数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,  // J
    Queen, // Q
    King,  // K
    Ace,   // A
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Self {
        match value {
            2 => Rank::Two,
            3 => Rank::Three,
            4 => Rank::Four,
            5 => Rank::Five,
            6 => Rank::Six,
            7 => Rank::Seven,
            8 => Rank::Eight,
            9 => Rank::Nine,
            10 => Rank::Ten,
            11 => Rank::Jack,
            12 => Rank::Queen,
            13 => Rank::King,
            14 | 1 => Rank::Ace, // Ace 表示 14 或 1
            _ => panic!("Invalid value for Rank: {}", value),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let c = match self {
            Rank::Two => '2',
            Rank::Three => '3',
            Rank::Four => '4',
            Rank::Five => '5',
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
            Rank::Ace => 'A',
        };
        write!(f, "{}", c)
    }
}

/// 单张扑克牌，文本形式为 "As"、"Td" 等
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Card { rank, suit }
    }

    /// 解析 "As" 格式的牌面文本
    pub fn parse(s: &str) -> Result<Card, EngineError> {
        let mut chars = s.chars();
        let (Some(r), Some(su), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(EngineError::InvalidCard(s.to_string()));
        };
        let rank = match r.to_ascii_uppercase() {
            '2' => Rank::Two,
            '3' => Rank::Three,
            '4' => Rank::Four,
            '5' => Rank::Five,
            '6' => Rank::Six,
            '7' => Rank::Seven,
            '8' => Rank::Eight,
            '9' => Rank::Nine,
            'T' => Rank::Ten,
            'J' => Rank::Jack,
            'Q' => Rank::Queen,
            'K' => Rank::King,
            'A' => Rank::Ace,
            _ => return Err(EngineError::InvalidCard(s.to_string())),
        };
        let suit = match su.to_ascii_lowercase() {
            'c' => Suit::Clubs,
            'd' => Suit::Diamonds,
            'h' => Suit::Hearts,
            's' => Suit::Spades,
            _ => return Err(EngineError::InvalidCard(s.to_string())),
        };
        Ok(Card { rank, suit })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

impl std::str::FromStr for Card {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Card::parse(s)
    }
}

/// 桌子最多坐六人
pub const MAX_SEATS: u8 = 6;

/// 座位号，1..=MAX_SEATS，构造时校验
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatNo(u8);

impl SeatNo {
    pub fn new(n: u8) -> Result<Self, EngineError> {
        if n == 0 || n > MAX_SEATS {
            return Err(EngineError::InvalidSeatNumber(n));
        }
        Ok(SeatNo(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SeatNo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 座位身份状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Active,
    SittingOut,
    Busted,
}

/// 单个座位的筹码与本局进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatState {
    pub seat_no: SeatNo,
    pub stack: u32,
    pub committed_in_round: u32, // 本轮已投入
    pub total_committed: u32,    // 本局累计投入
    pub has_acted_this_round: bool,
    pub folded: bool,
    pub status: SeatStatus,
}

impl SeatState {
    pub fn new(seat_no: SeatNo, stack: u32) -> Self {
        SeatState {
            seat_no,
            stack,
            committed_in_round: 0,
            total_committed: 0,
            has_acted_this_round: false,
            folded: false,
            status: SeatStatus::Active,
        }
    }

    /// 还留在本局（未弃牌的活跃座位）
    pub fn in_hand(&self) -> bool {
        self.status == SeatStatus::Active && !self.folded
    }

    /// 还能主动行动（留在本局且有筹码）
    pub fn can_act(&self) -> bool {
        self.in_hand() && self.stack > 0
    }
}

/// 桌子配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub max_seats: u8,
    pub min_players_to_start: u8,
    pub starting_stack: u32,
    pub small_blind: u32,
    pub big_blind: u32,
    pub action_timeout_ms: u64,
}

impl TableConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_seats < 2 || self.max_seats > MAX_SEATS {
            return Err(EngineError::InvalidSeatNumber(self.max_seats));
        }
        if self.min_players_to_start < 2 || self.min_players_to_start > self.max_seats {
            return Err(EngineError::InvalidMinPlayersToStart);
        }
        if self.starting_stack == 0 || self.small_blind == 0 || self.big_blind < self.small_blind {
            return Err(EngineError::InvalidBlindStructure);
        }
        if self.action_timeout_ms == 0 {
            return Err(EngineError::InvalidBlindStructure);
        }
        Ok(())
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            max_seats: 6,
            min_players_to_start: 2,
            starting_stack: 10_000,
            small_blind: 50,
            big_blind: 100,
            action_timeout_ms: 5_000,
        }
    }
}

/// 玩家行动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Fold,       // 弃牌
    Check,      // 过牌
    Call,       // 跟注
    Bet(u32),   // 下注
    Raise(u32), // 加注到指定总额
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Fold => ActionKind::Fold,
            Action::Check => ActionKind::Check,
            Action::Call => ActionKind::Call,
            Action::Bet(_) => ActionKind::Bet,
            Action::Raise(_) => ActionKind::Raise,
        }
    }

    pub fn amount(&self) -> Option<u32> {
        match self {
            Action::Bet(n) | Action::Raise(n) => Some(*n),
            _ => None,
        }
    }
}

/// 行动类别，不带金额
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ActionKind::Fold => "fold",
            ActionKind::Check => "check",
            ActionKind::Call => "call",
            ActionKind::Bet => "bet",
            ActionKind::Raise => "raise",
        };
        write!(f, "{}", s)
    }
}

/// 下注轮
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    Preflop, // 翻牌前
    Flop,    // 翻牌圈
    Turn,    // 转牌圈
    River,   // 河牌圈
}

impl Street {
    /// 该轮结束时公共牌应有的张数
    pub fn board_len(&self) -> usize {
        match self {
            Street::Preflop => 0,
            Street::Flop => 3,
            Street::Turn => 4,
            Street::River => 5,
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Street::Preflop => "preflop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        };
        write!(f, "{}", s)
    }
}

/// 一手牌的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Dealing,
    Betting,
    Showdown,
    Complete,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Showdown | Phase::Complete)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Phase::Dealing => "dealing",
            Phase::Betting => "betting",
            Phase::Showdown => "showdown",
            Phase::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

/// 错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid card text: {0}")]
    InvalidCard(String),
    #[error("invalid seat number: {0}")]
    InvalidSeatNumber(u8),
    #[error("duplicate seat: {0}")]
    DuplicateSeat(SeatNo),
    #[error("invalid blind structure")]
    InvalidBlindStructure,
    #[error("invalid min players to start")]
    InvalidMinPlayersToStart,
    #[error("illegal action: {0}")]
    IllegalAction(&'static str),
    #[error("seat {0} is not the acting seat")]
    NotActingSeat(SeatNo),
    #[error("not enough chips")]
    InsufficientChips,
    #[error("hand already complete")]
    HandAlreadyComplete,
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),
    #[error("fewer than two active seats")]
    NoActiveSeats,
}
