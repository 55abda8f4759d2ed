use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use rpassword::prompt_password;
use std::{
    io::Write,
    path::PathBuf,
};
use tokio::sync::mpsc;
use tracing::{
    error,
    info,
    warn,
};
use twentyone::{
    authority::{
        AuthorityClient,
        AuthorityError,
    },
    profile::ProfileSync,
    round::{
        Completion,
        RoundController,
        RoundError,
        RoundEvent,
    },
    session::{
        SessionError,
        SessionManager,
    },
    store::FileStore,
    types::RoundStatus,
    view::{
        self,
        ViewModel,
    },
};

const SIGN_IN_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_url: String,
    pub session_file: PathBuf,
    pub register: bool,
}

/// Composes the session, authority, round and profile components and owns
/// the transient status line shown in the header.
pub struct AppController {
    session: SessionManager,
    authority: AuthorityClient,
    rounds: RoundController,
    profile: ProfileSync,
    round_events: mpsc::UnboundedReceiver<RoundEvent>,
    register: bool,
    status: String,
    ended: Option<String>,
}

impl AppController {
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = FileStore::new(config.session_file.clone());
        let mut session = SessionManager::new(Box::new(store));
        session.restore();
        let authority = AuthorityClient::new(config.api_url.clone(), session.credentials())
            .map_err(|err| eyre!(err))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            session,
            authority,
            rounds: RoundController::new(events_tx),
            profile: ProfileSync::new(),
            round_events: events_rx,
            register: config.register,
            status: String::from("Ready"),
            ended: None,
        })
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn session_ended(&self) -> bool {
        self.ended.is_some()
    }

    pub fn exit_notice(&self) -> Option<&str> {
        self.ended.as_deref()
    }

    pub fn view_model(&self) -> ViewModel {
        view::view_model(&self.session, &self.rounds, &self.profile)
    }

    /// Restore a persisted session or walk the user through sign-in before
    /// the alternate screen opens.
    pub async fn sign_in(&mut self) -> Result<()> {
        if self.session.is_authenticated() {
            let username = self
                .session
                .identity()
                .map(|identity| identity.username.clone())
                .unwrap_or_default();
            println!("Welcome back, {username}.");
            self.status = String::from("Session restored");
            return Ok(());
        }
        for attempt in 1..=SIGN_IN_ATTEMPTS {
            let username = prompt_line("Username: ")?;
            if username.is_empty() {
                eprintln!("Username must not be empty");
                continue;
            }
            let password = prompt_password("Password: ").wrap_err("failed to read password")?;
            let result = if self.register {
                let email = prompt_line("Email: ")?;
                self.session
                    .register(&self.authority, &username, &password, &email)
                    .await
            } else {
                self.session
                    .login(&self.authority, &username, &password)
                    .await
            };
            match result {
                Ok(_) => {
                    self.status = format!("Signed in as {username}");
                    return Ok(());
                }
                Err(SessionError::Authority(err)) => {
                    error!(%err, attempt, "sign-in attempt failed");
                    eprintln!("Sign-in failed: {err}");
                }
                Err(SessionError::Guard(err)) => return Err(eyre!(err)),
            }
        }
        Err(eyre!(
            "giving up after {SIGN_IN_ATTEMPTS} failed sign-in attempts"
        ))
    }

    /// One profile fetch right after authentication; failure is shown but
    /// not fatal, the next round event will try again.
    pub async fn initial_refresh(&mut self) {
        if let Err(err) = self.profile.refresh(&self.authority).await {
            if err.is_unauthorized() {
                self.end_session(&err);
            }
        }
    }

    pub async fn place_bet(&mut self, amount: u64) {
        let balance = self.profile.balance();
        match self.rounds.start(&self.authority, amount, balance).await {
            Ok(Completion::Applied) => {
                if let Some(round) = self.rounds.round() {
                    self.status = format!("Dealt round {} for a bet of {}", round.id, amount);
                }
            }
            Ok(Completion::Stale) => {}
            Err(RoundError::Guard(err)) => self.status = err.to_string(),
            Err(RoundError::Authority(err)) => self.report_authority_error(err),
        }
        self.pump_round_events().await;
    }

    pub async fn hit(&mut self) {
        match self.rounds.hit(&self.authority).await {
            Ok(Completion::Applied) => self.status_from_round(),
            Ok(Completion::Stale) => {}
            Err(RoundError::Guard(err)) => self.status = err.to_string(),
            Err(RoundError::Authority(err)) => self.report_authority_error(err),
        }
        self.pump_round_events().await;
    }

    pub async fn stand(&mut self) {
        match self.rounds.stand(&self.authority).await {
            Ok(Completion::Applied) => self.status_from_round(),
            Ok(Completion::Stale) => {}
            Err(RoundError::Guard(err)) => self.status = err.to_string(),
            Err(RoundError::Authority(err)) => self.report_authority_error(err),
        }
        self.pump_round_events().await;
    }

    pub fn logout(&mut self) {
        self.session.logout();
        self.rounds.discard();
        self.profile.clear();
        self.ended = Some(String::from("Signed out."));
    }

    fn status_from_round(&mut self) {
        let Some(round) = self.rounds.round() else {
            return;
        };
        self.status = match round.status {
            RoundStatus::Active => format!("Round {}: your move", round.id),
            RoundStatus::PlayerWon => format!("Round {}: you win", round.id),
            RoundStatus::DealerWon => format!("Round {}: dealer wins", round.id),
            RoundStatus::Tie => format!("Round {}: tie", round.id),
        };
    }

    /// Round lifecycle notifications drive the profile refresh. However many
    /// events one action produced, a single fetch brings the ledger current.
    async fn pump_round_events(&mut self) {
        let mut seen = false;
        while let Ok(event) = self.round_events.try_recv() {
            info!(?event, "round event");
            seen = true;
        }
        if !seen {
            return;
        }
        if let Err(err) = self.profile.refresh(&self.authority).await {
            if err.is_unauthorized() {
                self.end_session(&err);
            } else {
                warn!(%err, "profile refresh after round event failed");
            }
        }
    }

    fn report_authority_error(&mut self, err: AuthorityError) {
        if err.is_unauthorized() {
            self.end_session(&err);
        } else {
            self.status = err.to_string();
        }
    }

    /// The authority rejected our credential: implicit logout, discard the
    /// round so late responses die quietly, and leave the table.
    fn end_session(&mut self, err: &AuthorityError) {
        warn!(%err, "credential rejected; ending session");
        self.session.handle_unauthorized(Some(err.to_string()));
        self.rounds.discard();
        self.profile.clear();
        self.ended = Some(String::from(
            "Your session expired. Start again to sign back in.",
        ));
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush().wrap_err("failed to flush prompt")?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .wrap_err("failed to read input")?;
    Ok(line.trim().to_owned())
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let mut app = AppController::new(config)?;
    app.sign_in().await?;
    app.initial_refresh().await;
    if app.session_ended() {
        if let Some(notice) = app.exit_notice() {
            println!("{notice}");
        }
        return Ok(());
    }

    let mut ui_state = ui::UiState::default();
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut app, &mut ui_state).await;
    ui::terminal_exit()?;
    if let Some(notice) = app.exit_notice() {
        println!("{notice}");
    }
    res
}

async fn run_loop(app: &mut AppController, ui_state: &mut ui::UiState) -> Result<()> {
    let vm = app.view_model();
    ui::draw(ui_state, &vm, app.status())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { break; }
            ev = ui::next_event(ui_state) => {
                match ev? {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::ConfirmBet(amount) => app.place_bet(amount).await,
                    ui::UserEvent::Hit => app.hit().await,
                    ui::UserEvent::Stand => app.stand().await,
                    ui::UserEvent::Logout => app.logout(),
                }
                if app.session_ended() {
                    break;
                }
                let vm = app.view_model();
                ui::draw(ui_state, &vm, app.status())?;
            }
        }
    }
    Ok(())
}
