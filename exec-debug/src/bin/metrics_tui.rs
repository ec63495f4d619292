//! Live terminal dashboard for an engine snapshot file.
//!
//! Polls the snapshot path on a fixed interval and re-renders execution
//! metrics, portfolio P&L, and the open position book. There is no live
//! wire connection to a running process — a demo binary (or any other
//! producer) refreshes the file on disk, and this just re-reads it.
//!
//! ## Usage
//!
//! ```bash
//! metrics-tui --path snapshot.json
//! ```
//!
//! ## Keyboard Controls
//!
//! - `q` or `Ctrl-C` - Quit
//! - `p` - Pause/Resume polling

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};

use exec_core::diagnostics::EngineSnapshot;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the JSON snapshot file to poll.
    #[arg(long)]
    path: PathBuf,

    /// Poll interval in milliseconds.
    #[arg(long, default_value = "500")]
    interval_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &args);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Err(err) = &result {
        eprintln!("metrics-tui error: {err:?}");
    }
    Ok(())
}

struct App {
    snapshot: Option<EngineSnapshot>,
    last_error: Option<String>,
    paused: bool,
    refresh_count: u64,
}

impl App {
    fn new() -> Self {
        Self { snapshot: None, last_error: None, paused: false, refresh_count: 0 }
    }

    fn refresh(&mut self, path: &PathBuf) {
        if self.paused {
            return;
        }
        match EngineSnapshot::read_from(path) {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
                self.last_error = None;
                self.refresh_count += 1;
            }
            Err(err) => self.last_error = Some(err.to_string()),
        }
    }
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, args: &Args) -> Result<()> {
    let mut app = App::new();
    let tick_rate = Duration::from_millis(args.interval_ms.max(50));
    let mut last_tick = Instant::now() - tick_rate;

    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate.checked_sub(last_tick.elapsed()).unwrap_or(Duration::ZERO);
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('p') => app.paused = !app.paused,
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.refresh(&args.path);
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(3)])
        .split(f.area());

    render_header(f, chunks[0], app);
    render_body(f, chunks[1], app);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let status = if app.paused { "PAUSED" } else { "LIVE" };
    let status_color = if app.paused { Color::Yellow } else { Color::Green };

    let title = Line::from(vec![
        Span::styled("ENGINE METRICS", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::styled(status, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" | refreshes: {}", app.refresh_count)),
    ]);

    let info = match (&app.snapshot, &app.last_error) {
        (_, Some(err)) => Line::from(Span::styled(format!("read error: {err}"), Style::default().fg(Color::Red))),
        (Some(s), None) => Line::from(format!("snapshot taken_at={}", s.taken_at)),
        (None, None) => Line::from("waiting for first snapshot..."),
    };

    let block = Block::default().borders(Borders::ALL).style(Style::default().fg(Color::White));
    let paragraph = Paragraph::new(vec![title, info]).block(block).alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    render_execution_panel(f, chunks[0], app);
    render_portfolio_panel(f, chunks[1], app);
}

fn render_execution_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(snapshot) = &app.snapshot else {
        f.render_widget(placeholder("Execution Metrics"), area);
        return;
    };
    let e = &snapshot.execution;

    let text = vec![
        Line::from(Span::styled("THROUGHPUT", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
        Line::from(format!("submitted:  {}", e.submitted)),
        Line::from(format!("processed:  {}", e.processed)),
        Line::from(format!("rejected:   {}", e.rejected)),
        Line::from(""),
        Line::from(Span::styled("FAILURES", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
        Line::from(format!("validation: {}", e.validation_failures)),
        Line::from(format!("engine:     {}", e.engine_failures)),
        Line::from(""),
        Line::from(Span::styled("LATENCY", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
        Line::from(format!("avg:        {} ns", e.avg_processing_ns)),
        Line::from(format!("p99:        {} ns", e.p99_processing_ns)),
        Line::from(format!("active:     {}", e.active_count)),
    ];

    let paragraph = Paragraph::new(text)
        .block(Block::default().title("Execution").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_portfolio_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(snapshot) = &app.snapshot else {
        f.render_widget(placeholder("Portfolio"), area);
        return;
    };
    let p = &snapshot.portfolio;
    let m = &p.metrics;

    let pnl_color = if m.net_pnl.is_negative() { Color::Red } else { Color::Green };

    let mut items = vec![
        ListItem::new(Line::from(vec![
            Span::styled(format!("{} ", p.id), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::raw(format!("cash={} total_value={}", p.cash_balance, m.total_value)),
        ])),
        ListItem::new(Line::from(vec![
            Span::raw("net P&L: "),
            Span::styled(format!("{}", m.net_pnl), Style::default().fg(pnl_color)),
            Span::raw(format!("  (realized {} / unrealized {})", m.realized_pnl, m.unrealized_pnl)),
        ])),
        ListItem::new(Line::from(format!(
            "positions: {} open ({} long / {} short)",
            m.total_positions, m.long_positions, m.short_positions
        ))),
        ListItem::new(Line::from("")),
        ListItem::new(Line::from(Span::styled(
            "OPEN POSITIONS",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))),
    ];

    for position in p.positions().filter(|pos| pos.is_open()) {
        let color = if position.unrealized_pnl.is_negative() { Color::Red } else { Color::Green };
        items.push(ListItem::new(Line::from(vec![
            Span::raw(format!("{:<8}", position.asset.symbol)),
            Span::raw(format!("{:?} qty={} avg={} ", position.side, position.quantity, position.avg_entry_price)),
            Span::styled(format!("upnl={}", position.unrealized_pnl), Style::default().fg(color)),
        ])));
    }

    let list = List::new(items).block(Block::default().title("Portfolio").borders(Borders::ALL));
    f.render_widget(list, area);
}

fn placeholder(title: &str) -> Paragraph<'static> {
    Paragraph::new("waiting for snapshot...")
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
}

fn render_footer(f: &mut Frame, area: Rect) {
    let controls = Line::from(vec![
        Span::styled("Controls: ", Style::default().fg(Color::Cyan)),
        Span::raw("[Q]uit  [P]ause"),
    ]);
    let paragraph = Paragraph::new(controls).block(Block::default().borders(Borders::ALL)).alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}
