use crate::{
    profile::ProfileSync,
    round::{
        RoundController,
        RoundPhase,
    },
    session::SessionManager,
    types::{
        Card,
        RoundStatus,
    },
};
use itertools::Itertools;

/// A card as the player is allowed to see it. The dealer's hole card stays
/// in the round data the whole time; only its rendering is withheld.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CardView {
    Face(Card),
    Hidden,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandView {
    pub cards: Vec<CardView>,
    pub score: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Banner {
    PlayerWon,
    DealerWon,
    Tie,
}

impl Banner {
    pub fn message(&self) -> &'static str {
        match self {
            Banner::PlayerWon => "You win!",
            Banner::DealerWon => "Dealer wins",
            Banner::Tie => "It's a tie",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PendingAction {
    Dealing,
    Hitting,
    Standing,
}

impl PendingAction {
    pub fn label(&self) -> &'static str {
        match self {
            PendingAction::Dealing => "Dealing…",
            PendingAction::Hitting => "Hitting…",
            PendingAction::Standing => "Standing…",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Controls {
    pub hit: bool,
    pub stand: bool,
    pub bet: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatsView {
    pub balance: u64,
    pub games_played: u32,
    pub games_won: u32,
    pub win_rate: f64,
    pub net_profit: i64,
    pub total_won: u64,
    pub total_lost: u64,
    pub history: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewModel {
    pub username: Option<String>,
    pub session_resolving: bool,
    pub balance: Option<u64>,
    pub dealer: HandView,
    pub player: HandView,
    pub bet: Option<u64>,
    pub round_label: Option<String>,
    pub banner: Option<Banner>,
    pub pending: Option<PendingAction>,
    pub controls: Controls,
    pub errors: Vec<String>,
    pub stats: Option<StatsView>,
}

/// Clamp a requested bet into the range the betting controls accept. The
/// authority still validates the result.
pub fn clamp_bet(requested: u64, balance: u64) -> u64 {
    requested.min(balance).max(1)
}

/// Pure derivation of everything the terminal renders. Recomputed on every
/// upstream change; owns no state and cannot fail.
pub fn view_model(
    session: &SessionManager,
    rounds: &RoundController,
    profile: &ProfileSync,
) -> ViewModel {
    let phase = rounds.phase();
    let round = rounds.round();
    let status = round.map(|r| r.status);
    let masked = status == Some(RoundStatus::Active);

    let dealer = round
        .map(|r| HandView {
            cards: r
                .dealer_cards
                .iter()
                .enumerate()
                .map(|(index, card)| {
                    if masked && index == 1 {
                        CardView::Hidden
                    } else {
                        CardView::Face(*card)
                    }
                })
                .collect(),
            score: (!masked).then_some(r.dealer_score),
        })
        .unwrap_or_default();

    let player = round
        .map(|r| HandView {
            cards: r.player_cards.iter().copied().map(CardView::Face).collect(),
            score: Some(r.player_score),
        })
        .unwrap_or_default();

    let banner = match status {
        Some(RoundStatus::PlayerWon) => Some(Banner::PlayerWon),
        Some(RoundStatus::DealerWon) => Some(Banner::DealerWon),
        Some(RoundStatus::Tie) => Some(Banner::Tie),
        _ => None,
    };

    let pending = match phase {
        RoundPhase::Starting => Some(PendingAction::Dealing),
        RoundPhase::AwaitingHit => Some(PendingAction::Hitting),
        RoundPhase::AwaitingStand => Some(PendingAction::Standing),
        _ => None,
    };

    let controls = Controls {
        hit: phase == RoundPhase::Active,
        stand: phase == RoundPhase::Active,
        bet: matches!(phase, RoundPhase::NoRound | RoundPhase::Resolved),
    };

    let errors = [
        session.last_error(),
        rounds.last_error(),
        profile.last_error(),
    ]
    .into_iter()
    .flatten()
    .map(str::to_owned)
    .collect();

    let stats = profile.snapshot().map(|snapshot| StatsView {
        balance: snapshot.balance,
        games_played: snapshot.games_played,
        games_won: snapshot.games_won,
        win_rate: snapshot.win_rate,
        net_profit: snapshot.net_profit,
        total_won: snapshot.total_won,
        total_lost: snapshot.total_lost,
        history: snapshot
            .balance_history
            .iter()
            .sorted_by_key(|point| point.game_number)
            .map(|point| point.balance)
            .collect(),
    });

    ViewModel {
        username: session.identity().map(|identity| identity.username.clone()),
        session_resolving: session.is_resolving(),
        balance: profile.balance(),
        dealer,
        player,
        bet: round.map(|r| r.bet),
        round_label: round.map(|r| r.id.to_string()),
        banner,
        pending,
        controls,
        errors,
        stats,
    }
}
