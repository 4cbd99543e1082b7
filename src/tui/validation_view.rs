//! Live view of a validation run: per-protocol yield, failure reasons and an
//! outcome log

use crate::error::StorageError;
use crate::progress::ProgressSink;
use crate::proxy::models::{ProxyType, RunSummary, ValidationOutcome};
use crate::Result;
use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame, Terminal,
};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::warn;

/// Outcomes kept in the log pane
const LOG_CAPACITY: usize = 200;

/// Failure classes shown in the reasons pane, in display order
const FAILURE_KINDS: [&str; 4] = ["connect", "timeout", "status", "protocol"];

type RunHandle = JoinHandle<std::result::Result<RunSummary, StorageError>>;

/// One completed validation, as seen by the view
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub outcome: ValidationOutcome,
}

/// Progress sink forwarding every update to a [`ValidationView`]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn update(&self, completed: usize, total: usize, outcome: &ValidationOutcome) {
        // The view may already be gone if the user quit
        let _ = self.tx.send(ProgressEvent {
            completed,
            total,
            outcome: outcome.clone(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunState {
    Running,
    Done,
    Failed(String),
}

pub struct ValidationView {
    output_dir: String,
    summary: RunSummary,
    failures: BTreeMap<&'static str, usize>,
    /// Newest first
    log: VecDeque<ValidationOutcome>,
    working_only: bool,
    state: RunState,
    result: Option<Result<RunSummary>>,
    should_quit: bool,
}

impl ValidationView {
    pub fn new(total: usize, output_dir: String) -> Self {
        Self {
            output_dir,
            summary: RunSummary::start(total),
            failures: BTreeMap::new(),
            log: VecDeque::new(),
            working_only: false,
            state: RunState::Running,
            result: None,
            should_quit: false,
        }
    }

    /// Show the run until the user quits.
    ///
    /// Returns the summary if the run ended first, or `None` if the user quit
    /// while it was still going; the run is then aborted; what it found is
    /// already on disk. A run that failed returns its error.
    pub async fn run(
        &mut self,
        rx: UnboundedReceiver<ProgressEvent>,
        mut task: RunHandle,
    ) -> Result<Option<RunSummary>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        let drawn = self.event_loop(&mut terminal, rx, &mut task).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        drawn?;

        match self.result.take() {
            Some(result) => result.map(Some),
            None => {
                warn!(
                    "Run interrupted after {}/{} proxies",
                    self.summary.completed(),
                    self.summary.total
                );
                task.abort();
                Ok(None)
            }
        }
    }

    async fn event_loop<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        mut rx: UnboundedReceiver<ProgressEvent>,
        task: &mut RunHandle,
    ) -> Result<()> {
        while !self.should_quit {
            terminal.draw(|f| self.draw(f))?;

            if event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }

            while self.state == RunState::Running {
                match rx.try_recv() {
                    Ok(event) => self.apply(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        // The sink is dropped when the run returns
                        let result = join_run(task).await;
                        self.finish(result);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    fn apply(&mut self, event: ProgressEvent) {
        self.summary.total = event.total;
        self.summary.tally(&event.outcome);
        if let Some(e) = &event.outcome.error {
            *self.failures.entry(e.kind()).or_insert(0) += 1;
        }

        self.log.push_front(event.outcome);
        self.log.truncate(LOG_CAPACITY);
    }

    fn finish(&mut self, result: Result<RunSummary>) {
        self.state = match &result {
            Ok(summary) => {
                self.summary = summary.clone();
                RunState::Done
            }
            Err(e) => RunState::Failed(format!("{:#}", e)),
        };
        self.result = Some(result);
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('w') => self.working_only = !self.working_only,
            _ => {}
        }
    }

    fn percent(&self) -> u16 {
        match self.summary.total {
            0 => 100,
            total => (self.summary.completed() * 100 / total).min(100) as u16,
        }
    }

    fn visible(&self) -> impl Iterator<Item = &ValidationOutcome> {
        let working_only = self.working_only;
        self.log.iter().filter(move |o| !working_only || o.success)
    }

    fn footer(&self) -> (String, Color) {
        match &self.state {
            RunState::Running => (
                "q quit (aborts the run)  w toggle failures".to_string(),
                Color::Yellow,
            ),
            RunState::Done => (
                format!(
                    "Done: {} working of {}. Press q to exit.",
                    self.summary.working, self.summary.total
                ),
                Color::Green,
            ),
            RunState::Failed(message) => (
                format!("Run failed: {}. Press q to exit.", message),
                Color::Red,
            ),
        }
    }

    fn draw(&self, f: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(6),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(f.size());

        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" proxy-sieve -> {} ", self.output_dir)),
            )
            .gauge_style(Style::default().fg(Color::Green))
            .percent(self.percent())
            .label(format!(
                "{}/{} checked, {} working",
                self.summary.completed(),
                self.summary.total,
                self.summary.working
            ));
        f.render_widget(gauge, rows[0]);

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        let yield_lines: Vec<Line> = ProxyType::ALL
            .iter()
            .map(|&protocol| {
                count_line(protocol.to_string(), self.summary.working_for(protocol), Color::Green)
            })
            .collect();
        f.render_widget(
            Paragraph::new(yield_lines)
                .block(Block::default().borders(Borders::ALL).title(" Working ")),
            panes[0],
        );

        let reason_lines: Vec<Line> = FAILURE_KINDS
            .iter()
            .map(|kind| {
                count_line(kind.to_string(), self.failures.get(kind).copied().unwrap_or(0), Color::Red)
            })
            .collect();
        f.render_widget(
            Paragraph::new(reason_lines)
                .block(Block::default().borders(Borders::ALL).title(" Failed ")),
            panes[1],
        );

        let items: Vec<ListItem> = self.visible().map(|o| ListItem::new(log_line(o))).collect();
        let title = if self.working_only {
            " Log (working only) "
        } else {
            " Log "
        };
        f.render_widget(
            List::new(items).block(Block::default().borders(Borders::ALL).title(title)),
            rows[2],
        );

        let (text, color) = self.footer();
        f.render_widget(Paragraph::new(text).style(Style::default().fg(color)), rows[3]);
    }
}

/// Wait for the run task and fold its two error layers into one
async fn join_run(task: &mut RunHandle) -> Result<RunSummary> {
    let summary = task.await.context("validation task failed")??;
    Ok(summary)
}

fn count_line(label: String, count: usize, color: Color) -> Line<'static> {
    let style = if count > 0 {
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Line::from(vec![
        Span::raw(format!(" {:<9}", label)),
        Span::styled(format!("{:>6}", count), style),
    ])
}

fn log_line(outcome: &ValidationOutcome) -> Line<'static> {
    let badge = if outcome.success {
        Span::styled(" ok  ", Style::default().fg(Color::Green))
    } else {
        Span::styled(" fail", Style::default().fg(Color::Red))
    };
    Line::from(vec![badge, Span::raw(format!(" {}", describe(outcome)))])
}

/// Address, protocol, then latency or failure reason
fn describe(outcome: &ValidationOutcome) -> String {
    let candidate = &outcome.candidate;
    let head = format!("{:<21} {:<6}", candidate.address(), candidate.protocol.to_string());
    match (outcome.latency_ms(), &outcome.error) {
        (Some(ms), _) => format!("{} {}ms", head, ms),
        (None, Some(e)) => format!("{} {}: {}", head, e.kind(), e),
        (None, None) => head,
    }
}
