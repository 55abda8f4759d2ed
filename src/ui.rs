use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::event::{
    Event,
    EventStream,
    KeyCode,
    KeyEventKind,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use futures::StreamExt;
use itertools::Itertools;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;
use twentyone::view::{
    CardView,
    HandView,
    ViewModel,
    clamp_bet,
};
use unicode_width::UnicodeWidthStr;

pub enum UserEvent {
    Quit,
    ConfirmBet(u64),
    Hit,
    Stand,
    Logout,
    Redraw,
}

pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    events: EventStream,
    balance: Option<u64>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            terminal: None,
            events: EventStream::new(),
            balance: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    BetModal(BetState),
    ProfileModal,
    QuitModal,
}

#[derive(Clone, Debug)]
struct BetState {
    amount: u64,
}

impl Default for BetState {
    fn default() -> Self {
        BetState { amount: 10 }
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Single persistent Terminal so buffers survive across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, vm: &ViewModel, status: &str) -> Result<()> {
    // Cache the balance so the bet modal can clamp its input.
    state.balance = vm.balance;
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, vm, status))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub async fn next_event(state: &mut UiState) -> Result<UserEvent> {
    loop {
        let event = match state.events.next().await {
            Some(event) => event?,
            None => return Err(eyre!("terminal event stream closed")),
        };
        let Event::Key(key) = event else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match &mut state.mode {
            Mode::BetModal(bs) => match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    return Ok(UserEvent::Redraw);
                }
                KeyCode::Enter => {
                    let amount = match state.balance {
                        Some(balance) => clamp_bet(bs.amount, balance),
                        None => bs.amount,
                    };
                    state.mode = Mode::Normal;
                    return Ok(UserEvent::ConfirmBet(amount));
                }
                KeyCode::Up | KeyCode::Char('+') => {
                    bs.amount = bs.amount.saturating_add(10);
                    return Ok(UserEvent::Redraw);
                }
                KeyCode::Down | KeyCode::Char('-') => {
                    bs.amount = bs.amount.saturating_sub(10);
                    return Ok(UserEvent::Redraw);
                }
                KeyCode::Backspace => {
                    bs.amount /= 10;
                    return Ok(UserEvent::Redraw);
                }
                KeyCode::Char(c) if c.is_ascii_digit() => {
                    let digit = u64::from(c.to_digit(10).unwrap_or(0));
                    bs.amount = bs.amount.saturating_mul(10).saturating_add(digit);
                    return Ok(UserEvent::Redraw);
                }
                _ => {}
            },
            Mode::ProfileModal => match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('p') => {
                    state.mode = Mode::Normal;
                    return Ok(UserEvent::Redraw);
                }
                _ => {}
            },
            Mode::QuitModal => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => return Ok(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    return Ok(UserEvent::Redraw);
                }
                _ => {}
            },
            Mode::Normal => {
                return Ok(match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        state.mode = Mode::QuitModal;
                        UserEvent::Redraw
                    }
                    KeyCode::Char('b') => {
                        state.mode = Mode::BetModal(BetState::default());
                        UserEvent::Redraw
                    }
                    KeyCode::Char('h') => UserEvent::Hit,
                    KeyCode::Char('s') => UserEvent::Stand,
                    KeyCode::Char('p') => {
                        state.mode = Mode::ProfileModal;
                        UserEvent::Redraw
                    }
                    KeyCode::Char('l') => UserEvent::Logout,
                    _ => continue,
                });
            }
        }
    }
}

fn ui(f: &mut Frame, state: &UiState, vm: &ViewModel, status: &str) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(6), // dealer
            Constraint::Length(6), // player
            Constraint::Length(3), // outcome / actions
            Constraint::Length(6), // errors + help
        ])
        .split(f.area());

    draw_header(f, chunks[0], vm, status);
    draw_hand(f, chunks[1], "Dealer's Hand", &vm.dealer);
    draw_hand(f, chunks[2], "Your Hand", &vm.player);
    draw_actions(f, chunks[3], vm);
    draw_bottom(f, chunks[4], vm);
    draw_modals(f, state, vm);
}

fn draw_header(f: &mut Frame, area: Rect, vm: &ViewModel, status: &str) {
    let player = vm.username.as_deref().unwrap_or("-");
    let balance = vm
        .balance
        .map(|b| b.to_string())
        .unwrap_or_else(|| String::from("?"));
    let round = vm.round_label.as_deref().unwrap_or("none");
    let bet = vm
        .bet
        .map(|b| format!(" | Bet: {b}"))
        .unwrap_or_default();
    let header = Paragraph::new(format!(
        "Player: {player} | Balance: {balance}{bet} | Round: {round}\n{status}"
    ))
    .block(Block::default().borders(Borders::ALL).title("Twenty-One"));
    f.render_widget(header, area);
}

fn draw_hand(f: &mut Frame, area: Rect, title: &str, hand: &HandView) {
    let mut lines = Vec::new();
    if hand.cards.is_empty() {
        lines.push(Line::styled(
            "No cards dealt",
            Style::default().fg(Color::DarkGray),
        ));
    } else {
        let mut spans = Vec::new();
        for card in &hand.cards {
            spans.push(card_span(card));
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
        let score = match hand.score {
            Some(score) => format!("Score: {score}"),
            None => String::from("Score: ?"),
        };
        lines.push(Line::from(score));
    }
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title.to_owned()));
    f.render_widget(widget, area);
}

fn card_span(view: &CardView) -> Span<'static> {
    match view {
        CardView::Face(card) => {
            let label = card.to_string();
            // Pip ten is one cell wider than every other rank.
            let padded = if UnicodeWidthStr::width(label.as_str()) < 3 {
                format!(" {label}  ")
            } else {
                format!(" {label} ")
            };
            let style = if card.suit.is_red() {
                Style::default().fg(Color::Red).bg(Color::White)
            } else {
                Style::default().fg(Color::Black).bg(Color::White)
            };
            Span::styled(padded, style)
        }
        CardView::Hidden => Span::styled(
            String::from(" ?? "),
            Style::default().fg(Color::White).bg(Color::Blue),
        ),
    }
}

fn draw_actions(f: &mut Frame, area: Rect, vm: &ViewModel) {
    let line = if let Some(pending) = vm.pending {
        Line::styled(pending.label(), Style::default().fg(Color::Yellow))
    } else if let Some(banner) = vm.banner {
        Line::styled(
            format!("{} (press b to play again)", banner.message()),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    } else if vm.controls.hit {
        Line::from("h hit | s stand")
    } else if vm.controls.bet {
        Line::from("b place a bet to deal")
    } else {
        Line::from("")
    };
    let widget =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Table"));
    f.render_widget(widget, area);
}

fn draw_bottom(f: &mut Frame, area: Rect, vm: &ViewModel) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3)])
        .split(area);

    let mut lines: Vec<Line> = Vec::new();
    if vm.errors.is_empty() {
        lines.push(Line::from("No errors"));
    } else {
        for error in &vm.errors {
            lines.push(Line::from(error.clone()));
        }
    }
    let color = if vm.errors.is_empty() {
        Color::DarkGray
    } else {
        Color::Red
    };
    let errors = Paragraph::new(lines)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Errors"));
    f.render_widget(errors, chunks[0]);

    let help = Paragraph::new("b bet | h hit | s stand | p profile | l logout | q/Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn draw_modals(f: &mut Frame, state: &UiState, vm: &ViewModel) {
    match &state.mode {
        Mode::BetModal(bs) => {
            let area = centered_rect(40, 30, f.area());
            let block = Block::default().borders(Borders::ALL).title("Place Bet");
            let bounds = match vm.balance {
                Some(balance) => format!("Balance: {balance}"),
                None => String::from("Balance: ?"),
            };
            let p = Paragraph::new(format!(
                "Bet: {}\n{bounds}\nEnter=deal Esc=cancel +/- or digits to edit",
                bs.amount
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::ProfileModal => draw_profile_modal(f, vm),
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Leave the table? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn draw_profile_modal(f: &mut Frame, vm: &ViewModel) {
    let area = centered_rect(70, 70, f.area());
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Player Profile");
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);

    let Some(stats) = &vm.stats else {
        f.render_widget(Paragraph::new("No profile data yet"), inner);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(3)])
        .split(inner);

    let lines = vec![
        Line::from(format!("Balance:      {}", stats.balance)),
        Line::from(format!(
            "Win rate:     {:.1}% ({} / {} games)",
            stats.win_rate, stats.games_won, stats.games_played
        )),
        Line::from(format!("Net profit:   {}", stats.net_profit)),
        Line::from(format!("Total won:    {}", stats.total_won)),
        Line::from(format!("Total lost:   {}", stats.total_lost)),
        Line::from("Esc=close"),
    ];
    f.render_widget(Paragraph::new(lines), chunks[0]);

    if stats.history.is_empty() {
        f.render_widget(
            Paragraph::new("No balance history yet; play a few rounds"),
            chunks[1],
        );
    } else {
        // Most recent games on the right, capped to the pane width.
        let take = chunks[1].width.saturating_sub(2) as usize;
        let data = stats
            .history
            .iter()
            .rev()
            .take(take.max(1))
            .rev()
            .copied()
            .collect_vec();
        let sparkline = Sparkline::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Balance History"),
            )
            .data(&data)
            .style(Style::default().fg(Color::Green));
        f.render_widget(sparkline, chunks[1]);
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
