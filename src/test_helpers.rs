//! Fixtures shared by unit and integration tests: sample domain values and
//! canned wire payloads matching the authority's JSON.

use crate::{
    authority::AuthSession,
    types::{
        BalancePoint,
        Card,
        Credential,
        Identity,
        ProfileSnapshot,
        Rank,
        Round,
        RoundId,
        RoundStatus,
        Suit,
    },
};
use chrono::{
    TimeZone,
    Utc,
};
use serde_json::{
    Value,
    json,
};

pub fn card(rank: Rank, suit: Suit) -> Card {
    Card { rank, suit }
}

pub fn identity(username: &str) -> Identity {
    Identity {
        id: 1,
        username: username.to_owned(),
    }
}

pub fn auth_session(username: &str, token: &str) -> AuthSession {
    AuthSession {
        identity: identity(username),
        credential: Credential::new(token),
    }
}

/// A live round: player showing 14 against a dealer 19 with the hole card
/// still notionally hidden.
pub fn active_round(id: u64, bet: u64) -> Round {
    Round {
        id: RoundId(id),
        status: RoundStatus::Active,
        player_cards: vec![
            card(Rank::Ten, Suit::Hearts),
            card(Rank::Four, Suit::Spades),
        ],
        dealer_cards: vec![
            card(Rank::King, Suit::Clubs),
            card(Rank::Nine, Suit::Diamonds),
        ],
        player_score: 14,
        dealer_score: 19,
        bet,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap(),
    }
}

pub fn resolved_round(id: u64, bet: u64, status: RoundStatus) -> Round {
    Round {
        id: RoundId(id),
        status,
        player_cards: vec![
            card(Rank::Ten, Suit::Hearts),
            card(Rank::Nine, Suit::Spades),
        ],
        dealer_cards: vec![
            card(Rank::King, Suit::Clubs),
            card(Rank::Eight, Suit::Diamonds),
        ],
        player_score: 19,
        dealer_score: 18,
        bet,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap(),
    }
}

pub fn profile(balance: u64) -> ProfileSnapshot {
    ProfileSnapshot {
        balance,
        games_played: 10,
        games_won: 4,
        total_won: 200,
        total_lost: 260,
        net_profit: -60,
        win_rate: 40.0,
        balance_history: vec![
            BalancePoint {
                game_number: 9,
                balance: balance + 50,
            },
            BalancePoint {
                game_number: 10,
                balance,
            },
        ],
    }
}

// Wire payload builders. Pip ranks are JSON numbers and face ranks JSON
// strings, exactly as the authority encodes them.

pub fn card_json(rank: Value, suit: &str) -> Value {
    json!({"rank": rank, "suit": suit})
}

pub fn round_json(
    id: u64,
    status: &str,
    player_cards: Value,
    dealer_cards: Value,
    player_score: u32,
    dealer_score: u32,
) -> Value {
    json!({
        "id": id,
        "status": status,
        "player_cards": player_cards,
        "dealer_cards": dealer_cards,
        "player_score": player_score,
        "dealer_score": dealer_score,
        "created_at": "2026-03-01T18:30:00Z",
    })
}

pub fn active_round_json(id: u64) -> Value {
    round_json(
        id,
        "ACTIVE",
        json!([card_json(json!(10), "Hearts"), card_json(json!(4), "Spades")]),
        json!([card_json(json!("K"), "Clubs"), card_json(json!(9), "Diamonds")]),
        14,
        19,
    )
}

pub fn resolved_round_json(id: u64, status: &str) -> Value {
    round_json(
        id,
        status,
        json!([card_json(json!(10), "Hearts"), card_json(json!(9), "Spades")]),
        json!([card_json(json!("K"), "Clubs"), card_json(json!(8), "Diamonds")]),
        19,
        18,
    )
}

pub fn profile_json(balance: u64) -> Value {
    json!({
        "balance": balance,
        "games_played": 10,
        "games_won": 4,
        "total_won": 200,
        "total_lost": 260,
        "net_profit": -60,
        "win_rate": 40.0,
        "balance_history": [
            {"game_number": 9, "balance": balance + 50},
            {"game_number": 10, "balance": balance},
        ],
    })
}

pub fn auth_json(username: &str, token: &str) -> Value {
    json!({
        "access": token,
        "user": {"id": 1, "username": username},
    })
}
