use thiserror::Error;

/// Failure taxonomy for a single valuation attempt.
///
/// Every variant carries the offending field or value so the boundary can
/// report it verbatim. Each failure is scoped to the current attempt; the
/// user adjusts inputs and retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    /// The data provider had no usable filing data for the ticker.
    #[error("no financial data available for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    /// The provider response was missing a required line item.
    #[error("incomplete financial data for {ticker}: missing {field}")]
    IncompleteFinancialData { ticker: String, field: &'static str },

    /// A user-supplied assumption is outside its declared domain.
    #[error("invalid assumption `{field}`: {detail}")]
    InvalidAssumption { field: &'static str, detail: String },

    /// Gordon Growth requires WACC strictly above the terminal growth rate.
    #[error("degenerate terminal value: WACC {wacc:.4} must strictly exceed terminal growth {terminal_growth:.4}")]
    DegenerateTerminalValue { wacc: f64, terminal_growth: f64 },

    /// Per-share value is undefined for a non-positive share count.
    #[error("invalid shares outstanding: {shares} (must be positive)")]
    InvalidSharesOutstanding { shares: f64 },
}
