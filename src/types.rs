use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub fn symbol(&self) -> char {
        match self {
            Suit::Hearts => '♥',
            Suit::Diamonds => '♦',
            Suit::Clubs => '♣',
            Suit::Spades => '♠',
        }
    }

    pub fn is_red(&self) -> bool {
        matches!(self, Suit::Hearts | Suit::Diamonds)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub fn label(&self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }
}

/// One playing card as reported by the authority. The client never derives
/// card values or hand scores from these; they exist purely for display.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.label(), self.suit.symbol())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoundStatus {
    Active,
    PlayerWon,
    DealerWon,
    Tie,
}

impl RoundStatus {
    /// Terminal statuses accept no further hit/stand against the round.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoundStatus::Active)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One round of play as last reported by the authority, plus the bet the
/// client placed when creating it. Scores are authoritative server values.
/// The dealer's hole card is always present here; hiding it while the round
/// is active is a presentation decision only.
#[derive(Clone, Debug, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub status: RoundStatus,
    pub player_cards: Vec<Card>,
    pub dealer_cards: Vec<Card>,
    pub player_score: u32,
    pub dealer_score: u32,
    pub bet: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub username: String,
}

/// Opaque bearer token proving an authenticated identity.
#[derive(Clone, Eq, PartialEq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    // Keep tokens out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(..)")
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalancePoint {
    pub game_number: u32,
    pub balance: u64,
}

/// The player's ledger snapshot. Replaced wholesale on every fetch; fields
/// are never merged across fetches and the balance is never predicted
/// locally.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileSnapshot {
    pub balance: u64,
    pub games_played: u32,
    pub games_won: u32,
    pub total_won: u64,
    pub total_lost: u64,
    pub net_profit: i64,
    pub win_rate: f64,
    pub balance_history: Vec<BalancePoint>,
}
