use crate::{
    session::CredentialSlot,
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
    DateTime,
    Utc,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Every failure of the remote authority collapses into one of three cases.
/// `Unauthorized` means the active credential is no longer accepted and the
/// session layer must log out; callers never retry automatically.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("session credential rejected{}", detail(.message))]
    Unauthorized { message: Option<String> },
    #[error("request rejected{}", detail(.message))]
    Invalid { message: Option<String> },
    #[error("authority unavailable{}", detail(.message))]
    Unavailable { message: Option<String> },
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

impl AuthorityError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthorityError::Unauthorized { .. })
    }
}

/// Identity and credential issued together by a successful login or
/// registration.
#[derive(Clone, Debug)]
pub struct AuthSession {
    pub identity: Identity,
    pub credential: Credential,
}

/// Stateless request wrapper over the authority's HTTP protocol. The active
/// credential is read from the session-owned slot on every call, so a logout
/// immediately stops authenticating outbound requests.
#[derive(Clone)]
pub struct AuthorityClient {
    base_url: String,
    http: reqwest::Client,
    credentials: CredentialSlot,
}

impl AuthorityClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: CredentialSlot,
    ) -> Result<Self, AuthorityError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AuthorityError::Unavailable {
                message: Some(format!("failed to build HTTP client: {err}")),
            })?;
        Ok(Self {
            base_url,
            http,
            credentials,
        })
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthSession, AuthorityError> {
        let url = format!("{}/login/", self.base_url);
        let body = CredentialsBody { username, password };
        let res = self.http.post(url).json(&body).send().await;
        let bytes = read_response(res).await?;
        Ok(decode::<AuthDto>(&bytes)?.into())
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<AuthSession, AuthorityError> {
        let url = format!("{}/register/", self.base_url);
        let body = RegistrationBody {
            username,
            password,
            email,
        };
        let res = self.http.post(url).json(&body).send().await;
        let bytes = read_response(res).await?;
        Ok(decode::<AuthDto>(&bytes)?.into())
    }

    pub async fn profile(&self) -> Result<ProfileSnapshot, AuthorityError> {
        let url = format!("{}/profile/", self.base_url);
        let res = self.authorize(self.http.get(url)).send().await;
        let bytes = read_response(res).await?;
        Ok(decode::<ProfileDto>(&bytes)?.into())
    }

    pub async fn start_round(&self, bet: u64) -> Result<Round, AuthorityError> {
        let url = format!("{}/games/", self.base_url);
        let body = StartRoundBody { bet };
        let res = self.authorize(self.http.post(url).json(&body)).send().await;
        let bytes = read_response(res).await?;
        decode::<GameDto>(&bytes)?.into_round(bet)
    }

    pub async fn hit(&self, round: &Round) -> Result<Round, AuthorityError> {
        let url = format!("{}/games/{}/hit/", self.base_url, round.id.0);
        let res = self.authorize(self.http.post(url)).send().await;
        let bytes = read_response(res).await?;
        decode::<GameDto>(&bytes)?.into_round(round.bet)
    }

    /// A stand always resolves the round; the authority answering with a
    /// still-active round is a protocol violation and is reported as such
    /// rather than handed to the round state machine.
    pub async fn stand(&self, round: &Round) -> Result<Round, AuthorityError> {
        let url = format!("{}/games/{}/stand/", self.base_url, round.id.0);
        let res = self.authorize(self.http.post(url)).send().await;
        let bytes = read_response(res).await?;
        let resolved = decode::<GameDto>(&bytes)?.into_round(round.bet)?;
        if !resolved.status.is_terminal() {
            return Err(AuthorityError::Unavailable {
                message: Some(String::from("stand response left the round active")),
            });
        }
        Ok(resolved)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.get() {
            Some(credential) => builder.bearer_auth(credential.token()),
            None => builder,
        }
    }
}

async fn read_response(
    res: Result<reqwest::Response, reqwest::Error>,
) -> Result<Vec<u8>, AuthorityError> {
    let res = res.map_err(|err| AuthorityError::Unavailable {
        message: Some(err.to_string()),
    })?;
    let status = res.status();
    let bytes = res
        .bytes()
        .await
        .map_err(|err| AuthorityError::Unavailable {
            message: Some(format!("failed to read response body: {err}")),
        })?;
    if status.is_success() {
        return Ok(bytes.to_vec());
    }
    let message = server_message(&bytes);
    debug!(%status, ?message, "authority returned an error response");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(AuthorityError::Unauthorized { message })
        }
        _ if status.is_client_error() => Err(AuthorityError::Invalid { message }),
        _ => Err(AuthorityError::Unavailable { message }),
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, AuthorityError> {
    serde_json::from_slice(bytes).map_err(|err| AuthorityError::Unavailable {
        message: Some(format!("invalid response payload: {err}")),
    })
}

fn server_message(bytes: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        detail: Option<String>,
    }
    serde_json::from_slice::<ErrorBody>(bytes)
        .ok()
        .and_then(|body| body.error.or(body.detail))
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    username: &'a str,
    password: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct StartRoundBody {
    bet: u64,
}

#[derive(Deserialize)]
struct AuthDto {
    access: String,
    user: UserDto,
}

#[derive(Deserialize)]
struct UserDto {
    id: u64,
    username: String,
}

impl From<AuthDto> for AuthSession {
    fn from(dto: AuthDto) -> Self {
        AuthSession {
            identity: Identity {
                id: dto.user.id,
                username: dto.user.username,
            },
            credential: Credential::new(dto.access),
        }
    }
}

#[derive(Deserialize)]
struct GameDto {
    id: u64,
    status: StatusDto,
    player_cards: Vec<CardDto>,
    dealer_cards: Vec<CardDto>,
    player_score: u32,
    dealer_score: u32,
    created_at: DateTime<Utc>,
}

impl GameDto {
    fn into_round(self, bet: u64) -> Result<Round, AuthorityError> {
        let player_cards = convert_cards(self.player_cards)?;
        let dealer_cards = convert_cards(self.dealer_cards)?;
        Ok(Round {
            id: RoundId(self.id),
            status: self.status.into(),
            player_cards,
            dealer_cards,
            player_score: self.player_score,
            dealer_score: self.dealer_score,
            bet,
            created_at: self.created_at,
        })
    }
}

fn convert_cards(dtos: Vec<CardDto>) -> Result<Vec<Card>, AuthorityError> {
    dtos.into_iter()
        .map(|dto| {
            dto.try_into().map_err(|err: String| AuthorityError::Unavailable {
                message: Some(format!("invalid response payload: {err}")),
            })
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatusDto {
    Active,
    PlayerWon,
    DealerWon,
    Tie,
}

impl From<StatusDto> for RoundStatus {
    fn from(value: StatusDto) -> Self {
        match value {
            StatusDto::Active => RoundStatus::Active,
            StatusDto::PlayerWon => RoundStatus::PlayerWon,
            StatusDto::DealerWon => RoundStatus::DealerWon,
            StatusDto::Tie => RoundStatus::Tie,
        }
    }
}

#[derive(Deserialize)]
struct CardDto {
    rank: RankDto,
    suit: SuitDto,
}

// Pip ranks arrive as JSON numbers, face ranks as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RankDto {
    Pip(u8),
    Face(FaceRankDto),
}

#[derive(Deserialize)]
enum FaceRankDto {
    J,
    Q,
    K,
    A,
}

#[derive(Deserialize)]
enum SuitDto {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl TryFrom<CardDto> for Card {
    type Error = String;

    fn try_from(dto: CardDto) -> Result<Self, Self::Error> {
        let rank = match dto.rank {
            RankDto::Pip(2) => Rank::Two,
            RankDto::Pip(3) => Rank::Three,
            RankDto::Pip(4) => Rank::Four,
            RankDto::Pip(5) => Rank::Five,
            RankDto::Pip(6) => Rank::Six,
            RankDto::Pip(7) => Rank::Seven,
            RankDto::Pip(8) => Rank::Eight,
            RankDto::Pip(9) => Rank::Nine,
            RankDto::Pip(10) => Rank::Ten,
            RankDto::Pip(other) => return Err(format!("unknown card rank {other}")),
            RankDto::Face(FaceRankDto::J) => Rank::Jack,
            RankDto::Face(FaceRankDto::Q) => Rank::Queen,
            RankDto::Face(FaceRankDto::K) => Rank::King,
            RankDto::Face(FaceRankDto::A) => Rank::Ace,
        };
        let suit = match dto.suit {
            SuitDto::Hearts => Suit::Hearts,
            SuitDto::Diamonds => Suit::Diamonds,
            SuitDto::Clubs => Suit::Clubs,
            SuitDto::Spades => Suit::Spades,
        };
        Ok(Card { rank, suit })
    }
}

#[derive(Deserialize)]
struct ProfileDto {
    balance: u64,
    games_played: u32,
    games_won: u32,
    total_won: u64,
    total_lost: u64,
    net_profit: i64,
    win_rate: f64,
    #[serde(default)]
    balance_history: Vec<BalancePointDto>,
}

#[derive(Deserialize)]
struct BalancePointDto {
    game_number: u32,
    balance: u64,
}

impl From<ProfileDto> for ProfileSnapshot {
    fn from(dto: ProfileDto) -> Self {
        ProfileSnapshot {
            balance: dto.balance,
            games_played: dto.games_played,
            games_won: dto.games_won,
            total_won: dto.total_won,
            total_lost: dto.total_lost,
            net_profit: dto.net_profit,
            win_rate: dto.win_rate,
            balance_history: dto
                .balance_history
                .into_iter()
                .map(|point| BalancePoint {
                    game_number: point.game_number,
                    balance: point.balance,
                })
                .collect(),
        }
    }
}
