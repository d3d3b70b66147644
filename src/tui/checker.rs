//! TUI for the proxy checker with live probe progress

use crate::proxy::{Candidate, CheckerConfig, ProbeResult, ProxyChecker};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::time::Duration;

/// Maximum number of recent results to keep for display
const MAX_RECENT_RESULTS: usize = 100;

/// Live probe monitor application state
pub struct ProbeMonitorApp {
    /// Candidates to probe
    candidates: Vec<Candidate>,
    /// Checker configuration
    config: CheckerConfig,
    /// Output file where working proxies are appended as they are found
    working_output: Option<PathBuf>,
    /// Total number of (candidate, protocol) probes
    total: usize,
    /// Number of resolved probes
    resolved: usize,
    /// Number of working results found
    working_count: usize,
    /// Number of non-working results
    failed_count: usize,
    /// Recent working results (for display)
    recent_working: VecDeque<ProbeResult>,
    /// Recent non-working results (for display)
    recent_failed: VecDeque<ProbeResult>,
    /// Selected list (0 = working, 1 = failed)
    selected_list: usize,
    /// Selected item in current list
    list_state: ListState,
    /// Status message
    status_message: String,
    /// Whether the run is complete
    is_complete: bool,
    /// Whether the user wants to quit
    should_quit: bool,
}

impl ProbeMonitorApp {
    /// Create a new probe monitor
    pub fn new(
        candidates: Vec<Candidate>,
        config: CheckerConfig,
        working_output: Option<PathBuf>,
    ) -> Self {
        let total = candidates.len() * config.protocols.len();
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            candidates,
            config,
            working_output,
            total,
            resolved: 0,
            working_count: 0,
            failed_count: 0,
            recent_working: VecDeque::new(),
            recent_failed: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting probes... Press 'q' to quit.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Run the TUI application
    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut working_file = self
            .working_output
            .as_ref()
            .map(|p| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(p)
            })
            .transpose()?;

        // Start the probes
        let checker = ProxyChecker::with_config(self.config.clone())?;
        let mut rx = checker.check_stream(self.candidates.clone());

        loop {
            // Draw UI
            terminal.draw(|f| self.ui(f))?;

            // Handle key events with a short timeout
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            // Try to receive results without blocking
            match rx.try_recv() {
                Ok(result) => {
                    self.resolved += 1;

                    if result.is_working() {
                        self.working_count += 1;

                        // Write to file immediately
                        if let Some(ref mut file) = working_file {
                            writeln!(
                                file,
                                "{} {}",
                                result.candidate.to_addr_string(),
                                result.protocol
                            )?;
                            file.flush()?;
                        }

                        self.recent_working.push_back(result);
                        if self.recent_working.len() > MAX_RECENT_RESULTS {
                            self.recent_working.pop_front();
                        }
                    } else {
                        self.failed_count += 1;

                        self.recent_failed.push_back(result);
                        if self.recent_failed.len() > MAX_RECENT_RESULTS {
                            self.recent_failed.pop_front();
                        }
                    }

                    // Update status message
                    let percentage = (self.resolved as f64 / self.total as f64 * 100.0) as u32;
                    self.status_message = format!(
                        "Probing... {}% ({}/{}) | Working: {} | Failed: {}",
                        percentage, self.resolved, self.total, self.working_count, self.failed_count
                    );
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => {
                    // No result available, continue
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    // Channel closed, run complete
                    self.is_complete = true;
                    self.status_message = format!(
                        "Complete! Probes: {} | Working: {} | Failed: {} | Press 'q' to quit",
                        self.total, self.working_count, self.failed_count
                    );
                }
            }
        }

        Ok(())
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                // Switch between working and failed lists
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let list = if self.selected_list == 0 {
                    &self.recent_working
                } else {
                    &self.recent_failed
                };
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i >= list.len().saturating_sub(1) {
                            0
                        } else {
                            i + 1
                        }
                    }
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let list = if self.selected_list == 0 {
                    &self.recent_working
                } else {
                    &self.recent_failed
                };
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i == 0 {
                            list.len().saturating_sub(1)
                        } else {
                            i - 1
                        }
                    }
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Result lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        // Title
        let title = Paragraph::new("Proxy Vet")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        // Progress bar
        let progress = if self.total > 0 {
            (self.resolved as f64 / self.total as f64 * 100.0) as u16
        } else {
            0
        };
        let progress_label = format!("{}/{} ({}%)", self.resolved, self.total, progress);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress)
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        // Split the main area into two columns for working and failed probes
        let result_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        Self::render_result_list(
            f,
            result_chunks[0],
            "Working",
            &self.recent_working,
            self.working_count,
            self.selected_list == 0,
            Color::Green,
            if self.selected_list == 0 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        Self::render_result_list(
            f,
            result_chunks[1],
            "Failed",
            &self.recent_failed,
            self.failed_count,
            self.selected_list == 1,
            Color::Red,
            if self.selected_list == 1 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        // Status bar
        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    #[allow(clippy::too_many_arguments)]
    fn render_result_list(
        f: &mut Frame,
        area: Rect,
        title: &str,
        results: &VecDeque<ProbeResult>,
        total_count: usize,
        is_selected: bool,
        color: Color,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = results
            .iter()
            .rev() // Show newest first
            .map(|result| {
                let content = if result.is_working() {
                    format!(
                        "{} {} ({}ms)",
                        result.candidate.to_addr_string(),
                        result.protocol,
                        result.latency_ms
                    )
                } else {
                    format!(
                        "{} {} {}",
                        result.candidate.to_addr_string(),
                        result.protocol,
                        result.outcome.label()
                    )
                };
                ListItem::new(content).style(Style::default().fg(color))
            })
            .collect();

        let block_title = format!("{} ({})", title, total_count);
        let border_style = if is_selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(block_title)
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}
