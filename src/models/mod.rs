use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of explicit forecast years in the two-stage model.
pub const FORECAST_YEARS: usize = 5;

/// Point-in-time fundamentals for one company, taken from its latest filings.
///
/// Created fresh on every fetch and discarded when a new ticker is loaded;
/// snapshots are never cached or merged across fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub ticker: String,
    pub company_name: String,
    /// Latest reported annual revenue, USD.
    pub revenue: f64,
    /// Latest reported operating income (EBIT), USD.
    pub ebit: f64,
    /// Total debt minus cash and equivalents, USD. Negative means net cash.
    pub net_debt: f64,
    /// Diluted shares outstanding.
    pub shares_outstanding: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Reinvestment expressed as percentages of revenue (capex, depreciation)
/// and of the year-over-year revenue delta (incremental working capital).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReinvestmentAssumptions {
    pub capex_pct_of_revenue: f64,
    pub depreciation_pct_of_revenue: f64,
    pub working_capital_pct_of_delta: f64,
}

impl Default for ReinvestmentAssumptions {
    fn default() -> Self {
        Self {
            capex_pct_of_revenue: 0.05,
            depreciation_pct_of_revenue: 0.04,
            working_capital_pct_of_delta: 0.02,
        }
    }
}

/// User-supplied forecast assumptions for one valuation run.
///
/// Mutable between runs, immutable during one: the engine takes this by
/// reference and never writes through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSet {
    /// One revenue growth rate per explicit forecast year (exactly 5).
    pub revenue_growth_rates: Vec<f64>,
    pub operating_margin: f64,
    pub tax_rate: f64,
    pub wacc: f64,
    pub terminal_growth_rate: f64,
    pub reinvestment: ReinvestmentAssumptions,
}

impl Default for AssumptionSet {
    fn default() -> Self {
        Self {
            revenue_growth_rates: vec![0.05; FORECAST_YEARS],
            operating_margin: 0.20,
            tax_rate: 0.21,
            wacc: 0.09,
            terminal_growth_rate: 0.025,
            reinvestment: ReinvestmentAssumptions::default(),
        }
    }
}

impl AssumptionSet {
    /// Default assumptions with the operating margin seeded from the
    /// snapshot's own EBIT margin, clamped to the declared [0, 0.70) domain.
    pub fn calibrated(snapshot: &FinancialSnapshot) -> Self {
        let mut assumptions = Self::default();
        if snapshot.revenue > 0.0 {
            assumptions.operating_margin = (snapshot.ebit / snapshot.revenue).clamp(0.0, 0.69);
        }
        assumptions
    }
}

/// One explicit-forecast year, fully derived from snapshot + assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    /// Forecast year index, 1-based.
    pub year: usize,
    pub revenue: f64,
    pub ebit: f64,
    pub nopat: f64,
    pub net_reinvestment: f64,
    pub fcff: f64,
    pub discount_factor: f64,
    pub pv_fcff: f64,
}

/// Output of a single two-stage FCFF valuation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub forecast: Vec<ForecastRow>,
    /// Undiscounted Gordon Growth terminal value at end of year 5.
    pub terminal_value: f64,
    /// Sum of the five discounted explicit FCFFs.
    pub pv_explicit: f64,
    /// Terminal value discounted by the year-5 factor.
    pub pv_terminal: f64,
    pub enterprise_value: f64,
    /// Enterprise value less net debt. May be negative; reported, not rejected.
    pub equity_value: f64,
    pub intrinsic_value_per_share: f64,
    /// Fraction of enterprise value contributed by the terminal stage.
    pub terminal_value_share: f64,
}

/// Inclusive offset range for sensitivity analysis, in absolute rate terms
/// (0.01 = one percentage point).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetRange {
    pub min: f64,
    pub max: f64,
}

impl OffsetRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range symmetric around zero: ±span.
    pub fn symmetric(span: f64) -> Self {
        Self { min: -span, max: span }
    }
}

/// Enterprise value re-computed over a grid of (WACC, terminal growth) pairs.
///
/// Ordering contract: rows ascend by WACC offset, columns ascend by terminal
/// growth offset. `cells[i][j]` holds the enterprise value for
/// `(wacc + wacc_offsets[i], terminal_growth + growth_offsets[j])`, or `None`
/// where that pair is degenerate. The grid is always fully rectangular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub base_wacc: f64,
    pub base_terminal_growth: f64,
    pub wacc_offsets: Vec<f64>,
    pub growth_offsets: Vec<f64>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl SensitivityGrid {
    pub fn n_rows(&self) -> usize {
        self.wacc_offsets.len()
    }

    pub fn n_cols(&self) -> usize {
        self.growth_offsets.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Minimum and maximum over the defined cells, if any cell is defined.
    pub fn value_bounds(&self) -> Option<(f64, f64)> {
        let mut bounds: Option<(f64, f64)> = None;
        for value in self.cells.iter().flatten().flatten() {
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(*value), hi.max(*value)),
                None => (*value, *value),
            });
        }
        bounds
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub edgar_user_agent: String,
    pub request_timeout_secs: u64,
    pub edgar_requests_per_second: u32,
    pub sensitivity_wacc_span: f64,
    pub sensitivity_growth_span: f64,
    pub sensitivity_step: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            // SEC asks automated clients to identify themselves with a contact address
            edgar_user_agent: std::env::var("EDGAR_USER_AGENT")
                .unwrap_or_else(|_| "dcf-terminal/0.1 (valuation@example.com)".to_string()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            edgar_requests_per_second: std::env::var("EDGAR_REQUESTS_PER_SECOND")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            sensitivity_wacc_span: std::env::var("SENSITIVITY_WACC_SPAN")
                .unwrap_or_else(|_| "0.02".to_string())
                .parse()
                .unwrap_or(0.02),
            sensitivity_growth_span: std::env::var("SENSITIVITY_GROWTH_SPAN")
                .unwrap_or_else(|_| "0.01".to_string())
                .parse()
                .unwrap_or(0.01),
            sensitivity_step: std::env::var("SENSITIVITY_STEP")
                .unwrap_or_else(|_| "0.005".to_string())
                .parse()
                .unwrap_or(0.005),
        })
    }
}
