use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dcf_terminal::api::{EdgarClient, FinancialDataProvider};
use dcf_terminal::engine::scenarios::run_scenarios;
use dcf_terminal::engine::wacc::{estimate_wacc, MarketContext, WaccInputs};
use dcf_terminal::engine::{self, margin_of_safety_percent, upside_percent};
use dcf_terminal::errors::ValuationError;
use dcf_terminal::models::{AssumptionSet, Config, FinancialSnapshot, OffsetRange, FORECAST_YEARS};
use dcf_terminal::report::ValuationReport;
use dcf_terminal::validation::validate_snapshot;

/// One-shot two-stage FCFF valuation
#[derive(Parser)]
#[command(name = "valuate")]
#[command(version = "1.0.0")]
#[command(about = "Value a company with a two-stage FCFF DCF model")]
#[command(long_about = "
Fetches the latest reported fundamentals for a ticker from SEC EDGAR (or
takes them from the command line for offline use), applies the given
forecast assumptions, and prints the five-year forecast, the valuation
bridge, bear/base/bull scenarios and a WACC x terminal-growth sensitivity
matrix. All rates are given in percent (5 means 5%).

Examples:
  valuate AAPL
  valuate AAPL --growth 8,7,6,5,5 --wacc 8.5 --export aapl.csv
  valuate --name 'Test Corp' --revenue 1000 --ebit 200 --net-debt 300 --shares 100
")]
struct Args {
    /// Ticker symbol to fetch from SEC EDGAR
    ticker: Option<String>,

    /// Company name for offline mode
    #[arg(long)]
    name: Option<String>,
    /// Offline revenue, USD
    #[arg(long)]
    revenue: Option<f64>,
    /// Offline EBIT, USD
    #[arg(long)]
    ebit: Option<f64>,
    /// Offline net debt (total debt minus cash), USD
    #[arg(long)]
    net_debt: Option<f64>,
    /// Offline diluted shares outstanding
    #[arg(long)]
    shares: Option<f64>,

    /// Revenue growth rates, percent: one value per forecast year
    /// (comma-separated), or a single value applied to all five
    #[arg(long)]
    growth: Option<String>,
    /// Operating margin, percent
    #[arg(long)]
    margin: Option<f64>,
    /// Tax rate, percent
    #[arg(long)]
    tax: Option<f64>,
    /// WACC, percent
    #[arg(long)]
    wacc: Option<f64>,
    /// Terminal growth rate, percent
    #[arg(long)]
    terminal_growth: Option<f64>,
    /// Capex as percent of revenue
    #[arg(long)]
    capex: Option<f64>,
    /// Depreciation as percent of revenue
    #[arg(long)]
    depreciation: Option<f64>,
    /// Incremental working capital as percent of the revenue delta
    #[arg(long)]
    working_capital: Option<f64>,

    /// Current market price per share (enables upside / margin of safety)
    #[arg(long)]
    price: Option<f64>,
    /// Equity beta (enables WACC estimation with --price, --interest-expense, --total-debt)
    #[arg(long)]
    beta: Option<f64>,
    /// Annual interest expense, USD
    #[arg(long)]
    interest_expense: Option<f64>,
    /// Total debt at market value, USD
    #[arg(long)]
    total_debt: Option<f64>,

    /// Sensitivity spread around WACC, percentage points
    #[arg(long, default_value_t = 2.0)]
    wacc_span: f64,
    /// Sensitivity spread around terminal growth, percentage points
    #[arg(long, default_value_t = 1.0)]
    growth_span: f64,
    /// Sensitivity step, percentage points
    #[arg(long, default_value_t = 0.5)]
    step: f64,

    /// Write the full report to this CSV file
    #[arg(long, short = 'x')]
    export: Option<PathBuf>,
    /// Print the full report as JSON instead of tables
    #[arg(long)]
    json: bool,
}

fn parse_growth_rates(raw: &str) -> Result<Vec<f64>> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| anyhow!("invalid growth rate: {}", part))
        })
        .collect::<Result<_>>()?;

    match values.len() {
        1 => Ok(vec![values[0] / 100.0; FORECAST_YEARS]),
        n if n == FORECAST_YEARS => Ok(values.into_iter().map(|v| v / 100.0).collect()),
        n => bail!("--growth takes 1 or {} values, got {}", FORECAST_YEARS, n),
    }
}

fn offline_snapshot(args: &Args) -> Result<Option<FinancialSnapshot>> {
    match (args.revenue, args.ebit, args.net_debt, args.shares) {
        (Some(revenue), Some(ebit), Some(net_debt), Some(shares)) => {
            Ok(Some(FinancialSnapshot {
                ticker: args
                    .ticker
                    .clone()
                    .unwrap_or_else(|| "OFFLINE".to_string())
                    .to_uppercase(),
                company_name: args.name.clone().unwrap_or_else(|| "(offline)".to_string()),
                revenue,
                ebit,
                net_debt,
                shares_outstanding: shares,
                fetched_at: Utc::now(),
            }))
        }
        (None, None, None, None) => Ok(None),
        _ => bail!("offline mode needs all of --revenue, --ebit, --net-debt and --shares"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dcf_terminal=warn".into()),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let args = Args::parse();
    let config = Config::from_env()?;

    // Build the snapshot: offline inputs take precedence, otherwise fetch.
    let snapshot = match offline_snapshot(&args)? {
        Some(snapshot) => snapshot,
        None => {
            let ticker = args
                .ticker
                .as_deref()
                .ok_or_else(|| anyhow!("give a ticker or the offline inputs (--revenue ...)"))?;
            let client = EdgarClient::new(&config)?;
            println!("🔍 Fetching {} from SEC EDGAR...", ticker.to_uppercase());
            match client.fetch_financials(ticker).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // Unknown symbol: offer close matches before giving up.
                    if matches!(e, ValuationError::DataUnavailable { .. }) {
                        if let Ok(matches) = client.search_companies(ticker, 5).await {
                            if !matches.is_empty() {
                                eprintln!("Did you mean:");
                                for candidate in matches {
                                    eprintln!(
                                        "  {:<8} {}",
                                        candidate.ticker, candidate.company_name
                                    );
                                }
                            }
                        }
                    }
                    return Err(e.into());
                }
            }
        }
    };

    let validation = validate_snapshot(&snapshot);
    for warning in &validation.warnings {
        println!("⚠️  {}", warning);
    }
    if !validation.is_valid() {
        for error in &validation.errors {
            eprintln!("❌ {}", error);
        }
        bail!("snapshot failed validation for {}", snapshot.ticker);
    }

    // Assumptions: calibrated defaults, overridden by flags.
    let mut assumptions = AssumptionSet::calibrated(&snapshot);
    if let Some(growth) = &args.growth {
        assumptions.revenue_growth_rates = parse_growth_rates(growth)?;
    }
    if let Some(margin) = args.margin {
        assumptions.operating_margin = margin / 100.0;
    }
    if let Some(tax) = args.tax {
        assumptions.tax_rate = tax / 100.0;
    }
    if let Some(terminal_growth) = args.terminal_growth {
        assumptions.terminal_growth_rate = terminal_growth / 100.0;
    }
    if let Some(capex) = args.capex {
        assumptions.reinvestment.capex_pct_of_revenue = capex / 100.0;
    }
    if let Some(depreciation) = args.depreciation {
        assumptions.reinvestment.depreciation_pct_of_revenue = depreciation / 100.0;
    }
    if let Some(working_capital) = args.working_capital {
        assumptions.reinvestment.working_capital_pct_of_delta = working_capital / 100.0;
    }

    match (args.wacc, args.price, args.beta, args.interest_expense, args.total_debt) {
        (Some(wacc), ..) => assumptions.wacc = wacc / 100.0,
        (None, Some(price), Some(beta), Some(interest_expense), Some(total_debt)) => {
            let components = estimate_wacc(
                &WaccInputs {
                    current_price: price,
                    shares_outstanding: snapshot.shares_outstanding,
                    ebit: snapshot.ebit,
                    interest_expense,
                    total_debt,
                    tax_rate: assumptions.tax_rate,
                    beta,
                },
                &MarketContext::default(),
            );
            println!(
                "🧮 Estimated WACC {:.2}% (Re {:.2}%, Rd {:.2}%, E/V {:.1}%, coverage {:.1}x, {})",
                components.wacc * 100.0,
                components.cost_of_equity * 100.0,
                components.cost_of_debt * 100.0,
                components.equity_weight * 100.0,
                components.interest_coverage,
                components.implied_rating,
            );
            assumptions.wacc = components.wacc;
        }
        _ => {}
    }

    let result = engine::valuate(&snapshot, &assumptions)?;
    let scenarios = run_scenarios(&snapshot, &assumptions)?;
    let grid = engine::sensitivity(
        &snapshot,
        &assumptions,
        OffsetRange::symmetric(args.wacc_span / 100.0),
        OffsetRange::symmetric(args.growth_span / 100.0),
        args.step / 100.0,
    )?;

    let report = ValuationReport::new(
        snapshot.clone(),
        assumptions.clone(),
        result.clone(),
        scenarios,
        grid,
        validation,
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, args.price);
    }

    if let Some(path) = &args.export {
        report.write_csv(path)?;
        println!("💾 Exported report to {}", path.display());
    }

    Ok(())
}

fn print_report(report: &ValuationReport, market_price: Option<f64>) {
    let snapshot = &report.snapshot;
    let result = &report.result;

    println!();
    println!("📊 {} — {}", snapshot.ticker, snapshot.company_name);
    println!(
        "   Revenue ${:.0}M | EBIT ${:.0}M | Net debt ${:.0}M | Shares {:.1}M",
        snapshot.revenue / 1e6,
        snapshot.ebit / 1e6,
        snapshot.net_debt / 1e6,
        snapshot.shares_outstanding / 1e6
    );

    println!();
    println!(
        "{:<6} {:>14} {:>14} {:>14} {:>14} {:>14} {:>10} {:>14}",
        "Year", "Revenue", "EBIT", "NOPAT", "Reinvest", "FCFF", "DF", "PV FCFF"
    );
    for row in &result.forecast {
        println!(
            "{:<6} {:>14.0} {:>14.0} {:>14.0} {:>14.0} {:>14.0} {:>10.4} {:>14.0}",
            row.year,
            row.revenue,
            row.ebit,
            row.nopat,
            row.net_reinvestment,
            row.fcff,
            row.discount_factor,
            row.pv_fcff
        );
    }

    println!();
    println!("   PV explicit FCFF:        ${:>14.0}", result.pv_explicit);
    println!("   PV terminal value:       ${:>14.0}", result.pv_terminal);
    println!("   Enterprise value:        ${:>14.0}", result.enterprise_value);
    println!("   Equity value:            ${:>14.0}", result.equity_value);
    println!("   Intrinsic value/share:   ${:>14.2}", result.intrinsic_value_per_share);
    println!(
        "   Terminal share of EV:    {:>15.1}%",
        result.terminal_value_share * 100.0
    );
    if result.is_terminal_value_concentrated() {
        println!("   ⚠️  Terminal value dominates EV; long-term assumptions drive this result");
    }

    if let Some(price) = market_price {
        if let (Some(upside), Some(mos)) = (
            upside_percent(result.intrinsic_value_per_share, price),
            margin_of_safety_percent(result.intrinsic_value_per_share, price),
        ) {
            println!();
            println!("   Market price:            ${:>14.2}", price);
            println!("   Upside/(downside):       {:>+15.1}%", upside);
            println!("   Margin of safety:        {:>15.1}%", mos);
        }
    }

    println!();
    println!("🎭 Scenarios:");
    for outcome in &report.scenarios {
        println!(
            "   {:<5} growth {:>5.1}% | WACC {:>5.2}% | g {:>4.2}% → EV ${:>12.0} | ${:>8.2}/share",
            outcome.scenario.label(),
            outcome.revenue_growth * 100.0,
            outcome.wacc * 100.0,
            outcome.terminal_growth * 100.0,
            outcome.enterprise_value,
            outcome.intrinsic_value_per_share
        );
    }

    println!();
    println!("🌡  Sensitivity (enterprise value; blank cells are degenerate):");
    let grid = &report.sensitivity;
    print!("{:>9}", "WACC\\g");
    for offset in &grid.growth_offsets {
        print!(" {:>12.2}%", (grid.base_terminal_growth + offset) * 100.0);
    }
    println!();
    for (i, wacc_offset) in grid.wacc_offsets.iter().enumerate() {
        print!("{:>8.2}%", (grid.base_wacc + wacc_offset) * 100.0);
        for j in 0..grid.n_cols() {
            match grid.cell(i, j) {
                Some(value) => print!(" {:>13.0}", value),
                None => print!(" {:>13}", "--"),
            }
        }
        println!();
    }
}
