use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;

use super::components;
use crate::api::{EdgarClient, FinancialDataProvider};
use crate::engine;
use crate::engine::scenarios::{run_scenarios, ScenarioOutcome};
use crate::models::{
    AssumptionSet, Config, FinancialSnapshot, OffsetRange, SensitivityGrid, ValuationResult,
};
use crate::report::ValuationReport;
use crate::validation::{validate_snapshot, ValidationReport};

const TAB_TITLES: [&str; 4] = ["Valuation", "Assumptions", "Sensitivity", "Scenarios"];
const ASSUMPTION_FIELD_COUNT: usize = 12;
const ADJUST_STEP: f64 = 0.0025; // 0.25 percentage points per keypress

/// Status line state for the bottom bar.
#[derive(Debug, Clone)]
pub enum AppStatus {
    Idle,
    Error { message: String },
    Success { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    EditingTicker,
}

pub struct ValuationApp {
    config: Config,
    runtime: tokio::runtime::Runtime,
    provider: EdgarClient,
    pub selected_tab: usize,
    pub input_mode: InputMode,
    pub ticker_input: String,
    pub snapshot: Option<FinancialSnapshot>,
    pub assumptions: AssumptionSet,
    pub validation: Option<ValidationReport>,
    pub result: Option<ValuationResult>,
    pub grid: Option<SensitivityGrid>,
    pub scenarios: Vec<ScenarioOutcome>,
    pub selected_assumption: usize,
    pub status: AppStatus,
    pub should_quit: bool,
}

impl ValuationApp {
    pub fn new(config: Config) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let provider = EdgarClient::new(&config)?;

        Ok(Self {
            config,
            runtime,
            provider,
            selected_tab: 0,
            input_mode: InputMode::Normal,
            ticker_input: String::new(),
            snapshot: None,
            assumptions: AssumptionSet::default(),
            validation: None,
            result: None,
            grid: None,
            scenarios: Vec::new(),
            selected_assumption: 0,
            status: AppStatus::Idle,
            should_quit: false,
        })
    }

    /// Fetch the entered ticker. This is the one blocking call in the app;
    /// the UI is frozen until it returns or the request timeout fires.
    fn fetch_ticker(&mut self) {
        let ticker = self.ticker_input.trim().to_uppercase();
        if ticker.is_empty() {
            self.status = AppStatus::Error {
                message: "enter a ticker symbol first".to_string(),
            };
            return;
        }

        let fetched = self.runtime.block_on(self.provider.fetch_financials(&ticker));
        match fetched {
            Ok(snapshot) => {
                self.assumptions = AssumptionSet::calibrated(&snapshot);
                self.snapshot = Some(snapshot);
                self.recompute();
                if matches!(self.status, AppStatus::Idle) {
                    self.status = AppStatus::Success {
                        message: format!("loaded {}", ticker),
                    };
                }
            }
            Err(e) => {
                self.status = AppStatus::Error { message: e.to_string() };
            }
        }
    }

    /// Re-run the whole pipeline from the current snapshot and assumptions.
    /// Every failure is scoped to this attempt; prior results are cleared so
    /// stale numbers are never shown next to new inputs.
    fn recompute(&mut self) {
        self.result = None;
        self.grid = None;
        self.scenarios.clear();
        self.status = AppStatus::Idle;

        let Some(snapshot) = &self.snapshot else {
            self.validation = None;
            return;
        };

        let validation = validate_snapshot(snapshot);
        if !validation.is_valid() {
            self.status = AppStatus::Error {
                message: validation.errors.join("; "),
            };
            self.validation = Some(validation);
            return;
        }
        self.validation = Some(validation);

        match engine::valuate(snapshot, &self.assumptions) {
            Ok(result) => self.result = Some(result),
            Err(e) => {
                self.status = AppStatus::Error { message: e.to_string() };
                return;
            }
        }

        match engine::sensitivity(
            snapshot,
            &self.assumptions,
            OffsetRange::symmetric(self.config.sensitivity_wacc_span),
            OffsetRange::symmetric(self.config.sensitivity_growth_span),
            self.config.sensitivity_step,
        ) {
            Ok(grid) => self.grid = Some(grid),
            Err(e) => {
                self.status = AppStatus::Error { message: e.to_string() };
                return;
            }
        }

        match run_scenarios(snapshot, &self.assumptions) {
            Ok(outcomes) => self.scenarios = outcomes,
            Err(e) => {
                self.status = AppStatus::Error { message: e.to_string() };
            }
        }
    }

    /// Nudge the selected assumption field and recompute.
    fn adjust_selected(&mut self, direction: f64) {
        let delta = direction * ADJUST_STEP;
        let a = &mut self.assumptions;
        match self.selected_assumption {
            i @ 0..=4 => a.revenue_growth_rates[i] += delta,
            5 => a.operating_margin += delta,
            6 => a.tax_rate += delta,
            7 => a.wacc += delta,
            8 => a.terminal_growth_rate += delta,
            9 => a.reinvestment.capex_pct_of_revenue += delta,
            10 => a.reinvestment.depreciation_pct_of_revenue += delta,
            _ => a.reinvestment.working_capital_pct_of_delta += delta,
        }
        self.recompute();
    }

    fn export_report(&mut self) {
        let (Some(snapshot), Some(result), Some(grid)) =
            (&self.snapshot, &self.result, &self.grid)
        else {
            self.status = AppStatus::Error {
                message: "nothing to export; run a valuation first".to_string(),
            };
            return;
        };

        let path = PathBuf::from(format!("valuation_{}.csv", snapshot.ticker.to_lowercase()));
        let report = ValuationReport::new(
            snapshot.clone(),
            self.assumptions.clone(),
            result.clone(),
            self.scenarios.clone(),
            grid.clone(),
            self.validation.clone().unwrap_or_default(),
        );

        match report.write_csv(&path) {
            Ok(()) => {
                self.status = AppStatus::Success {
                    message: format!("exported {}", path.display()),
                }
            }
            Err(e) => self.status = AppStatus::Error { message: e.to_string() },
        }
    }

    pub fn handle_key_event(&mut self, key: KeyCode) -> Result<()> {
        if self.input_mode == InputMode::EditingTicker {
            match key {
                KeyCode::Esc => {
                    self.input_mode = InputMode::Normal;
                }
                KeyCode::Enter => {
                    self.input_mode = InputMode::Normal;
                    self.fetch_ticker();
                }
                KeyCode::Backspace => {
                    self.ticker_input.pop();
                }
                KeyCode::Char(c) if c.is_ascii_alphanumeric() || c == '.' || c == '-' => {
                    self.ticker_input.push(c.to_ascii_uppercase());
                }
                _ => {}
            }
            return Ok(());
        }

        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') => self.should_quit = true,
            KeyCode::Tab => self.selected_tab = (self.selected_tab + 1) % TAB_TITLES.len(),
            KeyCode::BackTab => {
                self.selected_tab = if self.selected_tab == 0 {
                    TAB_TITLES.len() - 1
                } else {
                    self.selected_tab - 1
                }
            }
            KeyCode::Char(c @ '1'..='4') => {
                self.selected_tab = c as usize - '1' as usize;
            }
            KeyCode::Char('t') | KeyCode::Char('T') => {
                self.ticker_input.clear();
                self.input_mode = InputMode::EditingTicker;
            }
            KeyCode::Char('e') | KeyCode::Char('E') => self.export_report(),
            KeyCode::Char('r') | KeyCode::Char('R') => self.recompute(),
            KeyCode::Up => {
                self.selected_assumption = self
                    .selected_assumption
                    .checked_sub(1)
                    .unwrap_or(ASSUMPTION_FIELD_COUNT - 1);
            }
            KeyCode::Down => {
                self.selected_assumption = (self.selected_assumption + 1) % ASSUMPTION_FIELD_COUNT;
            }
            KeyCode::Left => self.adjust_selected(-1.0),
            KeyCode::Right => self.adjust_selected(1.0),
            _ => {}
        }
        Ok(())
    }

    pub fn draw(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Tab bar
                Constraint::Min(0),    // Content
                Constraint::Length(3), // Status bar
            ])
            .split(f.area());

        self.render_tab_bar(f, chunks[0]);

        match self.selected_tab {
            0 => self.render_valuation_view(f, chunks[1]),
            1 => components::render_assumptions(
                f,
                chunks[1],
                &self.assumptions,
                self.selected_assumption,
            ),
            2 => components::render_heatmap(f, chunks[1], self.grid.as_ref()),
            3 => components::render_scenarios(f, chunks[1], &self.scenarios),
            _ => {}
        }

        self.render_status_bar(f, chunks[2]);
    }

    fn render_tab_bar(&self, f: &mut Frame, area: Rect) {
        let tabs = ratatui::widgets::Tabs::new(TAB_TITLES.to_vec())
            .block(Block::default().borders(Borders::ALL).title("DCF Valuation Terminal"))
            .style(Style::default().fg(Color::White))
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            .select(self.selected_tab);

        f.render_widget(tabs, area);
    }

    fn render_valuation_view(&self, f: &mut Frame, area: Rect) {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(area);

        components::render_summary(
            f,
            halves[0],
            self.snapshot.as_ref(),
            self.result.as_ref(),
            self.validation.as_ref(),
        );

        let forecast = self
            .result
            .as_ref()
            .map(|r| r.forecast.as_slice())
            .unwrap_or(&[]);
        components::render_forecast_table(f, halves[1], forecast);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let first_line = if self.input_mode == InputMode::EditingTicker {
            Line::from(vec![
                Span::styled("Ticker: ", Style::default().fg(Color::Gray)),
                Span::styled(
                    format!("{}▌", self.ticker_input),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                Span::styled("  (Enter to fetch, Esc to cancel)", Style::default().fg(Color::Gray)),
            ])
        } else {
            Line::from(vec![
                Span::styled("t", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::styled(" ticker • ", Style::default().fg(Color::Gray)),
                Span::styled("Tab", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::styled(" views • ", Style::default().fg(Color::Gray)),
                Span::styled("←/→", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                Span::styled(" adjust • ", Style::default().fg(Color::Gray)),
                Span::styled("e", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                Span::styled(" export • ", Style::default().fg(Color::Gray)),
                Span::styled("q", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::styled(" quit", Style::default().fg(Color::Gray)),
            ])
        };

        let status_line = match &self.status {
            AppStatus::Idle => Line::from(Span::styled("Ready", Style::default().fg(Color::Cyan))),
            AppStatus::Error { message } => Line::from(Span::styled(
                format!("Error: {}", message),
                Style::default().fg(Color::Red),
            )),
            AppStatus::Success { message } => Line::from(Span::styled(
                message.clone(),
                Style::default().fg(Color::Green),
            )),
        };

        let paragraph = Paragraph::new(vec![first_line, status_line])
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().fg(Color::White));
        f.render_widget(paragraph, area);
    }
}

/// Run the main TUI application
pub fn run_app(config: Config) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = ValuationApp::new(config)?;

    // Main application loop
    let result = loop {
        if let Err(e) = terminal.draw(|f| app.draw(f)) {
            break Err(e.into());
        }

        if let Ok(Event::Key(key)) = event::read() {
            if key.kind == KeyEventKind::Press {
                if let Err(e) = app.handle_key_event(key.code) {
                    break Err(e);
                }

                if app.should_quit {
                    break Ok(());
                }
            }
        }
    };

    // Cleanup terminal
    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}
