use crate::{
    authority::{
        AuthorityClient,
        AuthorityError,
    },
    types::{
        Round,
        RoundId,
        RoundStatus,
    },
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{
    debug,
    warn,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoundPhase {
    NoRound,
    Starting,
    Active,
    AwaitingHit,
    AwaitingStand,
    Resolved,
}

impl RoundPhase {
    fn is_pending(&self) -> bool {
        matches!(
            self,
            RoundPhase::Starting | RoundPhase::AwaitingHit | RoundPhase::AwaitingStand
        )
    }
}

/// Lifecycle notifications for subscribers (profile refreshes hang off
/// these rather than diffing controller state).
#[derive(Clone, Debug, PartialEq)]
pub enum RoundEvent {
    Started { bet: u64 },
    Resolved { id: RoundId, status: RoundStatus },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum RoundGuardError {
    #[error("bet must be at least 1 chip")]
    ZeroBet,
    #[error("bet of {bet} exceeds balance of {balance}")]
    BetExceedsBalance { bet: u64, balance: u64 },
    #[error("a round action is already in flight")]
    ActionInFlight,
    #[error("the current round must finish first")]
    RoundInProgress,
    #[error("no active round")]
    NoActiveRound,
}

#[derive(Debug, Error)]
pub enum RoundError {
    #[error(transparent)]
    Guard(#[from] RoundGuardError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Completion {
    Applied,
    Stale,
}

/// Ticket for one in-flight round action. `generation` pins the round
/// generation the request was issued against; `prior` is the state restored
/// when the attempt fails.
#[derive(Debug)]
pub struct ActionTicket {
    generation: u64,
    prior: RoundPhase,
}

/// State machine for the lifecycle of a single round of play. At most one
/// round action is in flight at any time, responses are applied only when
/// they match the tracked generation, and failures always land back in the
/// last known-good state with the round data untouched.
pub struct RoundController {
    phase: RoundPhase,
    round: Option<Round>,
    generation: u64,
    last_error: Option<String>,
    events: mpsc::UnboundedSender<RoundEvent>,
}

impl RoundController {
    pub fn new(events: mpsc::UnboundedSender<RoundEvent>) -> Self {
        Self {
            phase: RoundPhase::NoRound,
            round: None,
            generation: 0,
            last_error: None,
            events,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Local gate for starting a round: no request is issued for a bet that
    /// is zero or exceeds the last known balance, and never while another
    /// action is pending. The authority remains the final arbiter.
    pub fn begin_start(
        &mut self,
        bet: u64,
        balance: Option<u64>,
    ) -> Result<ActionTicket, RoundGuardError> {
        match self.phase {
            RoundPhase::NoRound | RoundPhase::Resolved => {}
            RoundPhase::Active => return Err(RoundGuardError::RoundInProgress),
            _ => return Err(RoundGuardError::ActionInFlight),
        }
        if bet == 0 {
            return Err(RoundGuardError::ZeroBet);
        }
        if let Some(balance) = balance {
            if bet > balance {
                return Err(RoundGuardError::BetExceedsBalance { bet, balance });
            }
        }
        let prior = self.phase;
        self.phase = RoundPhase::Starting;
        let _ = self.events.send(RoundEvent::Started { bet });
        Ok(ActionTicket {
            generation: self.generation,
            prior,
        })
    }

    /// A successful start replaces any prior round wholesale and supersedes
    /// every response still in flight against it.
    pub fn complete_start(
        &mut self,
        ticket: ActionTicket,
        result: Result<Round, AuthorityError>,
    ) -> Result<Completion, AuthorityError> {
        if ticket.generation != self.generation {
            debug!("discarding stale start-round response");
            return Ok(Completion::Stale);
        }
        match result {
            Ok(round) => {
                self.generation += 1;
                self.last_error = None;
                if round.status.is_terminal() {
                    self.phase = RoundPhase::Resolved;
                    let _ = self.events.send(RoundEvent::Resolved {
                        id: round.id,
                        status: round.status,
                    });
                } else {
                    self.phase = RoundPhase::Active;
                }
                self.round = Some(round);
                Ok(Completion::Applied)
            }
            Err(err) => {
                self.phase = ticket.prior;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn begin_hit(&mut self) -> Result<(ActionTicket, Round), RoundGuardError> {
        let round = self.claim_action(RoundPhase::AwaitingHit)?;
        Ok((
            ActionTicket {
                generation: self.generation,
                prior: RoundPhase::Active,
            },
            round,
        ))
    }

    pub fn complete_hit(
        &mut self,
        ticket: ActionTicket,
        result: Result<Round, AuthorityError>,
    ) -> Result<Completion, AuthorityError> {
        self.apply_action(ticket, result)
    }

    pub fn begin_stand(&mut self) -> Result<(ActionTicket, Round), RoundGuardError> {
        let round = self.claim_action(RoundPhase::AwaitingStand)?;
        Ok((
            ActionTicket {
                generation: self.generation,
                prior: RoundPhase::Active,
            },
            round,
        ))
    }

    pub fn complete_stand(
        &mut self,
        ticket: ActionTicket,
        result: Result<Round, AuthorityError>,
    ) -> Result<Completion, AuthorityError> {
        self.apply_action(ticket, result)
    }

    /// Drop the tracked round entirely, e.g. when the session ends. Bumping
    /// the generation turns every in-flight response into a no-op on
    /// arrival.
    pub fn discard(&mut self) {
        self.round = None;
        self.phase = RoundPhase::NoRound;
        self.generation += 1;
    }

    pub async fn start(
        &mut self,
        authority: &AuthorityClient,
        bet: u64,
        balance: Option<u64>,
    ) -> Result<Completion, RoundError> {
        let ticket = self.begin_start(bet, balance)?;
        let result = authority.start_round(bet).await;
        Ok(self.complete_start(ticket, result)?)
    }

    pub async fn hit(&mut self, authority: &AuthorityClient) -> Result<Completion, RoundError> {
        let (ticket, round) = self.begin_hit()?;
        let result = authority.hit(&round).await;
        Ok(self.complete_hit(ticket, result)?)
    }

    pub async fn stand(&mut self, authority: &AuthorityClient) -> Result<Completion, RoundError> {
        let (ticket, round) = self.begin_stand()?;
        let result = authority.stand(&round).await;
        Ok(self.complete_stand(ticket, result)?)
    }

    fn claim_action(&mut self, pending: RoundPhase) -> Result<Round, RoundGuardError> {
        match self.phase {
            RoundPhase::Active => {}
            phase if phase.is_pending() => return Err(RoundGuardError::ActionInFlight),
            _ => return Err(RoundGuardError::NoActiveRound),
        }
        // Active implies a tracked round.
        let Some(round) = self.round.clone() else {
            return Err(RoundGuardError::NoActiveRound);
        };
        self.phase = pending;
        Ok(round)
    }

    fn apply_action(
        &mut self,
        ticket: ActionTicket,
        result: Result<Round, AuthorityError>,
    ) -> Result<Completion, AuthorityError> {
        if ticket.generation != self.generation {
            debug!("discarding stale round-action response");
            return Ok(Completion::Stale);
        }
        match result {
            Ok(update) => {
                let tracked = self.round.as_ref().map(|r| r.id);
                if tracked != Some(update.id) {
                    warn!(
                        tracked = ?tracked,
                        received = %update.id,
                        "round-action response for an untracked round; discarding"
                    );
                    self.phase = ticket.prior;
                    return Ok(Completion::Stale);
                }
                self.last_error = None;
                if update.status.is_terminal() {
                    self.phase = RoundPhase::Resolved;
                    let _ = self.events.send(RoundEvent::Resolved {
                        id: update.id,
                        status: update.status,
                    });
                } else {
                    self.phase = RoundPhase::Active;
                }
                self.round = Some(update);
                Ok(Completion::Applied)
            }
            Err(err) => {
                self.phase = ticket.prior;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }
}
