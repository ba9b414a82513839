use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table},
    Frame,
};

use crate::engine::scenarios::ScenarioOutcome;
use crate::models::{AssumptionSet, FinancialSnapshot, ForecastRow, SensitivityGrid, ValuationResult};
use crate::validation::ValidationReport;

/// Compact money formatting for dashboard cells: $1.23T / $45.6B / $789M.
pub fn fmt_money(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    if abs >= 1e12 {
        format!("{}${:.2}T", sign, abs / 1e12)
    } else if abs >= 1e9 {
        format!("{}${:.2}B", sign, abs / 1e9)
    } else if abs >= 1e6 {
        format!("{}${:.1}M", sign, abs / 1e6)
    } else if abs >= 1e3 {
        format!("{}${:.1}K", sign, abs / 1e3)
    } else {
        format!("{}${:.2}", sign, abs)
    }
}

/// Rate formatting: 0.0925 -> "9.25%".
pub fn fmt_pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Heatmap bucket for a cell value relative to the defined cell range.
pub fn heatmap_color(value: f64, lo: f64, hi: f64) -> Color {
    if hi <= lo {
        return Color::Yellow;
    }
    let position = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
    match (position * 5.0) as usize {
        0 => Color::Red,
        1 => Color::LightRed,
        2 => Color::Yellow,
        3 => Color::LightGreen,
        _ => Color::Green,
    }
}

/// Valuation summary panel: snapshot line items and the equity bridge.
pub fn render_summary(
    f: &mut Frame,
    area: Rect,
    snapshot: Option<&FinancialSnapshot>,
    result: Option<&ValuationResult>,
    validation: Option<&ValidationReport>,
) {
    let mut lines: Vec<Line> = Vec::new();

    match snapshot {
        Some(snapshot) => {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("{} ", snapshot.ticker),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                Span::styled(snapshot.company_name.clone(), Style::default().fg(Color::Gray)),
            ]));
            lines.push(Line::from(format!(
                "Revenue {}  EBIT {}  Net debt {}  Shares {}",
                fmt_money(snapshot.revenue),
                fmt_money(snapshot.ebit),
                fmt_money(snapshot.net_debt),
                fmt_money(snapshot.shares_outstanding).trim_start_matches('$').to_string(),
            )));
            lines.push(Line::from(""));
        }
        None => {
            lines.push(Line::from("No company loaded. Press 't' to enter a ticker."));
            lines.push(Line::from(""));
        }
    }

    if let Some(result) = result {
        lines.push(Line::from(format!(
            "PV explicit FCFF      {}",
            fmt_money(result.pv_explicit)
        )));
        lines.push(Line::from(format!(
            "PV terminal value     {}",
            fmt_money(result.pv_terminal)
        )));
        lines.push(Line::from(format!(
            "Enterprise value      {}",
            fmt_money(result.enterprise_value)
        )));
        lines.push(Line::from(format!(
            "Equity value          {}",
            fmt_money(result.equity_value)
        )));
        lines.push(Line::from(vec![
            Span::raw("Intrinsic value/share "),
            Span::styled(
                format!("${:.2}", result.intrinsic_value_per_share),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]));
        lines.push(Line::from(format!(
            "Terminal share of EV  {}",
            fmt_pct(result.terminal_value_share)
        )));
        if result.is_terminal_value_concentrated() {
            lines.push(Line::from(Span::styled(
                "Terminal value dominates EV; long-term assumptions drive this result",
                Style::default().fg(Color::Yellow),
            )));
        }
    }

    if let Some(validation) = validation {
        for error in &validation.errors {
            lines.push(Line::from(Span::styled(
                format!("✗ {}", error),
                Style::default().fg(Color::Red),
            )));
        }
        for warning in &validation.warnings {
            lines.push(Line::from(Span::styled(
                format!("⚠ {}", warning),
                Style::default().fg(Color::Yellow),
            )));
        }
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("💰 Valuation"))
        .style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}

/// Five-year forecast table: revenue through discounted FCFF.
pub fn render_forecast_table(f: &mut Frame, area: Rect, forecast: &[ForecastRow]) {
    let header = Row::new(vec![
        "Year", "Revenue", "EBIT", "NOPAT", "Reinvest", "FCFF", "DF", "PV FCFF",
    ])
    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = forecast
        .iter()
        .map(|row| {
            Row::new(vec![
                row.year.to_string(),
                fmt_money(row.revenue),
                fmt_money(row.ebit),
                fmt_money(row.nopat),
                fmt_money(row.net_reinvestment),
                fmt_money(row.fcff),
                format!("{:.4}", row.discount_factor),
                fmt_money(row.pv_fcff),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(10),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("📈 Explicit Forecast"))
        .style(Style::default().fg(Color::White));
    f.render_widget(table, area);
}

/// Labels for the editable assumption fields, in selection order.
pub fn assumption_labels(assumptions: &AssumptionSet) -> Vec<(String, String)> {
    let mut labels: Vec<(String, String)> = assumptions
        .revenue_growth_rates
        .iter()
        .enumerate()
        .map(|(i, rate)| (format!("Revenue growth Y{}", i + 1), fmt_pct(*rate)))
        .collect();
    labels.push(("Operating margin".to_string(), fmt_pct(assumptions.operating_margin)));
    labels.push(("Tax rate".to_string(), fmt_pct(assumptions.tax_rate)));
    labels.push(("WACC".to_string(), fmt_pct(assumptions.wacc)));
    labels.push((
        "Terminal growth".to_string(),
        fmt_pct(assumptions.terminal_growth_rate),
    ));
    labels.push((
        "Capex % of revenue".to_string(),
        fmt_pct(assumptions.reinvestment.capex_pct_of_revenue),
    ));
    labels.push((
        "Depreciation % of revenue".to_string(),
        fmt_pct(assumptions.reinvestment.depreciation_pct_of_revenue),
    ));
    labels.push((
        "Working capital % of Δrevenue".to_string(),
        fmt_pct(assumptions.reinvestment.working_capital_pct_of_delta),
    ));
    labels
}

/// Assumption editor list with the selected row highlighted.
pub fn render_assumptions(f: &mut Frame, area: Rect, assumptions: &AssumptionSet, selected: usize) {
    let items: Vec<ListItem> = assumption_labels(assumptions)
        .into_iter()
        .enumerate()
        .map(|(i, (label, value))| {
            let text = format!("{:<30} {:>8}", label, value);
            let style = if i == selected {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .borders(Borders::ALL)
            .title("⚙️ Assumptions (↑/↓ select, ←/→ adjust by 0.25pp)"))
        .style(Style::default().fg(Color::White));
    f.render_widget(list, area);
}

/// WACC x terminal growth heatmap. Degenerate cells render dimmed as `--`.
pub fn render_heatmap(f: &mut Frame, area: Rect, grid: Option<&SensitivityGrid>) {
    let Some(grid) = grid else {
        let paragraph = Paragraph::new("No sensitivity grid yet. Load a ticker first.")
            .block(Block::default().borders(Borders::ALL).title("🌡 Sensitivity"))
            .style(Style::default().fg(Color::White));
        f.render_widget(paragraph, area);
        return;
    };

    let bounds = grid.value_bounds();
    let mut lines: Vec<Line> = Vec::new();

    // Column header: terminal growth per column.
    let mut header_spans = vec![Span::styled(
        format!("{:>8} ", "WACC\\g"),
        Style::default().fg(Color::Gray),
    )];
    for offset in &grid.growth_offsets {
        header_spans.push(Span::styled(
            format!("{:>9}", fmt_pct(grid.base_terminal_growth + offset)),
            Style::default().fg(Color::Gray),
        ));
    }
    lines.push(Line::from(header_spans));

    for (i, wacc_offset) in grid.wacc_offsets.iter().enumerate() {
        let mut spans = vec![Span::styled(
            format!("{:>8} ", fmt_pct(grid.base_wacc + wacc_offset)),
            Style::default().fg(Color::Gray),
        )];
        for j in 0..grid.n_cols() {
            let span = match (grid.cell(i, j), bounds) {
                (Some(value), Some((lo, hi))) => {
                    let mut style = Style::default().fg(heatmap_color(value, lo, hi));
                    if *wacc_offset == 0.0 && grid.growth_offsets[j] == 0.0 {
                        style = style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
                    }
                    Span::styled(format!("{:>9}", fmt_money(value)), style)
                }
                _ => Span::styled(format!("{:>9}", "--"), Style::default().fg(Color::DarkGray)),
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enterprise value by (WACC, terminal growth); base pair underlined",
        Style::default().fg(Color::Gray),
    )));

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("🌡 Sensitivity"))
        .style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}

/// Bear/base/bull outcomes side by side.
pub fn render_scenarios(f: &mut Frame, area: Rect, outcomes: &[ScenarioOutcome]) {
    let header = Row::new(vec![
        "Scenario", "Growth", "WACC", "Term g", "Enterprise", "Per share",
    ])
    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = outcomes
        .iter()
        .map(|outcome| {
            Row::new(vec![
                outcome.scenario.label().to_string(),
                fmt_pct(outcome.revenue_growth),
                fmt_pct(outcome.wacc),
                fmt_pct(outcome.terminal_growth),
                fmt_money(outcome.enterprise_value),
                format!("${:.2}", outcome.intrinsic_value_per_share),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(12),
        Constraint::Length(12),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("🎭 Scenarios"))
        .style(Style::default().fg(Color::White));
    f.render_widget(table, area);
}
