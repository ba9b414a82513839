use crate::errors::ValuationError;
use crate::models::{
    AssumptionSet, FinancialSnapshot, ForecastRow, OffsetRange, SensitivityGrid, ValuationResult,
    FORECAST_YEARS,
};

pub mod scenarios;
pub mod wacc;

/// Above this share of enterprise value, the terminal stage dominates the
/// model and the result is flagged as assumption-sensitive.
pub const TERMINAL_VALUE_WARNING_THRESHOLD: f64 = 0.70;

impl ValuationResult {
    /// True when the terminal stage contributes more than the warning
    /// threshold of enterprise value.
    pub fn is_terminal_value_concentrated(&self) -> bool {
        self.terminal_value_share > TERMINAL_VALUE_WARNING_THRESHOLD
    }
}

fn invalid(field: &'static str, detail: String) -> ValuationError {
    ValuationError::InvalidAssumption { field, detail }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ValuationError> {
    if !value.is_finite() || !(0.0..1.0).contains(&value) {
        return Err(invalid(field, format!("{} is outside [0, 1)", value)));
    }
    Ok(())
}

/// Validate every assumption against its declared domain.
///
/// The terminal growth rate is only checked for finiteness here; its
/// relationship to WACC is a precondition of `valuate`, not of `project`.
pub fn validate_assumptions(assumptions: &AssumptionSet) -> Result<(), ValuationError> {
    if assumptions.revenue_growth_rates.len() != FORECAST_YEARS {
        return Err(invalid(
            "revenue_growth_rates",
            format!(
                "expected exactly {} entries, got {}",
                FORECAST_YEARS,
                assumptions.revenue_growth_rates.len()
            ),
        ));
    }
    for (i, rate) in assumptions.revenue_growth_rates.iter().enumerate() {
        if !rate.is_finite() || *rate <= -1.0 {
            return Err(invalid(
                "revenue_growth_rates",
                format!("year {} rate {} must be a finite value above -100%", i + 1, rate),
            ));
        }
    }
    check_fraction("operating_margin", assumptions.operating_margin)?;
    check_fraction("tax_rate", assumptions.tax_rate)?;
    if !assumptions.wacc.is_finite() || assumptions.wacc <= 0.0 {
        return Err(invalid("wacc", format!("{} must be positive", assumptions.wacc)));
    }
    if !assumptions.terminal_growth_rate.is_finite() {
        return Err(invalid(
            "terminal_growth_rate",
            format!("{} is not a finite rate", assumptions.terminal_growth_rate),
        ));
    }
    check_fraction(
        "capex_pct_of_revenue",
        assumptions.reinvestment.capex_pct_of_revenue,
    )?;
    check_fraction(
        "depreciation_pct_of_revenue",
        assumptions.reinvestment.depreciation_pct_of_revenue,
    )?;
    check_fraction(
        "working_capital_pct_of_delta",
        assumptions.reinvestment.working_capital_pct_of_delta,
    )?;
    Ok(())
}

/// A snapshot that reached the engine with non-finite line items is partial
/// provider data, not a user mistake.
fn check_snapshot(snapshot: &FinancialSnapshot) -> Result<(), ValuationError> {
    let incomplete = |field: &'static str| ValuationError::IncompleteFinancialData {
        ticker: snapshot.ticker.clone(),
        field,
    };
    if !snapshot.revenue.is_finite() {
        return Err(incomplete("revenue"));
    }
    if !snapshot.ebit.is_finite() {
        return Err(incomplete("ebit"));
    }
    if !snapshot.net_debt.is_finite() {
        return Err(incomplete("net_debt"));
    }
    if !snapshot.shares_outstanding.is_finite() {
        return Err(incomplete("shares_outstanding"));
    }
    Ok(())
}

/// Stage 1: project the five explicit forecast years.
///
/// For year i: revenue_i = revenue_{i-1} * (1 + growth_i), EBIT at the
/// assumed constant margin, NOPAT = EBIT * (1 - tax), net reinvestment from
/// the capex/depreciation/working-capital percentages, FCFF = NOPAT minus
/// net reinvestment, discounted at (1 + wacc)^-i.
pub fn project(
    snapshot: &FinancialSnapshot,
    assumptions: &AssumptionSet,
) -> Result<Vec<ForecastRow>, ValuationError> {
    check_snapshot(snapshot)?;
    validate_assumptions(assumptions)?;

    let mut rows = Vec::with_capacity(FORECAST_YEARS);
    let mut prior_revenue = snapshot.revenue;

    for (index, growth) in assumptions.revenue_growth_rates.iter().enumerate() {
        let year = index + 1;
        let revenue = prior_revenue * (1.0 + growth);
        let revenue_delta = revenue - prior_revenue;
        let ebit = revenue * assumptions.operating_margin;
        let nopat = ebit * (1.0 - assumptions.tax_rate);

        let net_capex = revenue
            * (assumptions.reinvestment.capex_pct_of_revenue
                - assumptions.reinvestment.depreciation_pct_of_revenue);
        let working_capital =
            revenue_delta * assumptions.reinvestment.working_capital_pct_of_delta;
        let net_reinvestment = net_capex + working_capital;

        let fcff = nopat - net_reinvestment;
        let discount_factor = 1.0 / (1.0 + assumptions.wacc).powi(year as i32);
        let pv_fcff = fcff * discount_factor;

        rows.push(ForecastRow {
            year,
            revenue,
            ebit,
            nopat,
            net_reinvestment,
            fcff,
            discount_factor,
            pv_fcff,
        });

        prior_revenue = revenue;
    }

    Ok(rows)
}

/// Full two-stage valuation: explicit forecast plus Gordon Growth terminal
/// value, bridged to equity value and per-share intrinsic value.
///
/// Pure function of its inputs: identical (snapshot, assumptions) yield
/// bit-identical results.
pub fn valuate(
    snapshot: &FinancialSnapshot,
    assumptions: &AssumptionSet,
) -> Result<ValuationResult, ValuationError> {
    let forecast = project(snapshot, assumptions)?;

    // Hard precondition, equality included. Never clamped.
    if assumptions.wacc <= assumptions.terminal_growth_rate {
        return Err(ValuationError::DegenerateTerminalValue {
            wacc: assumptions.wacc,
            terminal_growth: assumptions.terminal_growth_rate,
        });
    }
    if snapshot.shares_outstanding <= 0.0 {
        return Err(ValuationError::InvalidSharesOutstanding {
            shares: snapshot.shares_outstanding,
        });
    }

    let last = forecast
        .last()
        .expect("projection always yields FORECAST_YEARS rows");

    let terminal_value = last.fcff * (1.0 + assumptions.terminal_growth_rate)
        / (assumptions.wacc - assumptions.terminal_growth_rate);
    let pv_terminal = terminal_value * last.discount_factor;
    let pv_explicit: f64 = forecast.iter().map(|row| row.pv_fcff).sum();

    let enterprise_value = pv_explicit + pv_terminal;
    let equity_value = enterprise_value - snapshot.net_debt;
    let intrinsic_value_per_share = equity_value / snapshot.shares_outstanding;
    let terminal_value_share = if enterprise_value != 0.0 {
        pv_terminal / enterprise_value
    } else {
        0.0
    };

    Ok(ValuationResult {
        forecast,
        terminal_value,
        pv_explicit,
        pv_terminal,
        enterprise_value,
        equity_value,
        intrinsic_value_per_share,
        terminal_value_share,
    })
}

fn build_offsets(range: OffsetRange, step: f64) -> Vec<f64> {
    // Integer stepping keeps the endpoints exact and the count stable.
    let steps = ((range.max - range.min) / step).round() as usize;
    (0..=steps).map(|i| range.min + i as f64 * step).collect()
}

/// Recompute enterprise value over the Cartesian product of WACC and
/// terminal-growth offsets around the base assumptions.
///
/// Rows ascend by WACC offset, columns by growth offset. Cells whose
/// adjusted pair is degenerate (wacc <= growth, or wacc <= 0) are `None`;
/// the grid stays rectangular regardless.
pub fn sensitivity(
    snapshot: &FinancialSnapshot,
    assumptions: &AssumptionSet,
    wacc_range: OffsetRange,
    growth_range: OffsetRange,
    step: f64,
) -> Result<SensitivityGrid, ValuationError> {
    check_snapshot(snapshot)?;
    validate_assumptions(assumptions)?;
    if snapshot.shares_outstanding <= 0.0 {
        return Err(ValuationError::InvalidSharesOutstanding {
            shares: snapshot.shares_outstanding,
        });
    }
    if !step.is_finite() || step <= 0.0 {
        return Err(invalid("sensitivity_step", format!("{} must be positive", step)));
    }
    for (field, range) in [
        ("sensitivity_wacc_range", wacc_range),
        ("sensitivity_growth_range", growth_range),
    ] {
        if range.max < range.min {
            return Err(invalid(
                field,
                format!("max {} is below min {}", range.max, range.min),
            ));
        }
    }

    let wacc_offsets = build_offsets(wacc_range, step);
    let growth_offsets = build_offsets(growth_range, step);

    let mut cells = Vec::with_capacity(wacc_offsets.len());
    for wacc_offset in &wacc_offsets {
        let mut row = Vec::with_capacity(growth_offsets.len());
        for growth_offset in &growth_offsets {
            let adjusted_wacc = assumptions.wacc + wacc_offset;
            let adjusted_growth = assumptions.terminal_growth_rate + growth_offset;
            if adjusted_wacc <= adjusted_growth || adjusted_wacc <= 0.0 {
                row.push(None);
                continue;
            }
            let mut derived = assumptions.clone();
            derived.wacc = adjusted_wacc;
            derived.terminal_growth_rate = adjusted_growth;
            row.push(valuate(snapshot, &derived).ok().map(|r| r.enterprise_value));
        }
        cells.push(row);
    }

    Ok(SensitivityGrid {
        base_wacc: assumptions.wacc,
        base_terminal_growth: assumptions.terminal_growth_rate,
        wacc_offsets,
        growth_offsets,
        cells,
    })
}

/// Percentage upside of the DCF value over the observed market price.
pub fn upside_percent(intrinsic_per_share: f64, market_price: f64) -> Option<f64> {
    if market_price > 0.0 {
        Some((intrinsic_per_share - market_price) / market_price * 100.0)
    } else {
        None
    }
}

/// Margin of safety: the discount of the market price to intrinsic value.
pub fn margin_of_safety_percent(intrinsic_per_share: f64, market_price: f64) -> Option<f64> {
    if intrinsic_per_share > 0.0 && market_price > 0.0 {
        Some((intrinsic_per_share - market_price) / intrinsic_per_share * 100.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReinvestmentAssumptions;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn sample_snapshot() -> FinancialSnapshot {
        FinancialSnapshot {
            ticker: "TEST".to_string(),
            company_name: "Test Corp".to_string(),
            revenue: 1000.0,
            ebit: 200.0,
            net_debt: 300.0,
            shares_outstanding: 100.0,
            fetched_at: Utc::now(),
        }
    }

    /// 5% growth, 20% margin, 21% tax, 9% WACC, 2.5% terminal growth.
    /// Reinvestment zeroed so FCFF == NOPAT and the figures can be checked
    /// by hand.
    fn sample_assumptions() -> AssumptionSet {
        AssumptionSet {
            revenue_growth_rates: vec![0.05; 5],
            operating_margin: 0.20,
            tax_rate: 0.21,
            wacc: 0.09,
            terminal_growth_rate: 0.025,
            reinvestment: ReinvestmentAssumptions {
                capex_pct_of_revenue: 0.0,
                depreciation_pct_of_revenue: 0.0,
                working_capital_pct_of_delta: 0.0,
            },
        }
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {} within {} of {}",
            actual,
            tolerance,
            expected
        );
    }

    #[test]
    fn test_projection_matches_worked_example() {
        let rows = project(&sample_snapshot(), &sample_assumptions()).unwrap();
        assert_eq!(rows.len(), 5);

        assert_close(rows[0].revenue, 1050.0, 1e-9);
        assert_close(rows[0].ebit, 210.0, 1e-9);
        assert_close(rows[0].nopat, 165.9, 1e-9);
        assert_close(rows[0].fcff, 165.9, 1e-9);
        assert_close(rows[0].discount_factor, 1.0 / 1.09, 1e-12);

        // Year over year compounding
        assert_close(rows[4].revenue, 1000.0 * 1.05_f64.powi(5), 1e-9);
        for pair in rows.windows(2) {
            assert_close(pair[1].revenue, pair[0].revenue * 1.05, 1e-9);
        }
    }

    #[test]
    fn test_projection_applies_reinvestment_assumptions() {
        let mut assumptions = sample_assumptions();
        assumptions.reinvestment = ReinvestmentAssumptions {
            capex_pct_of_revenue: 0.06,
            depreciation_pct_of_revenue: 0.04,
            working_capital_pct_of_delta: 0.10,
        };
        let rows = project(&sample_snapshot(), &assumptions).unwrap();

        // Year 1: net capex = 1050 * 0.02 = 21, working capital = 50 * 0.10 = 5
        assert_close(rows[0].net_reinvestment, 26.0, 1e-9);
        assert_close(rows[0].fcff, 165.9 - 26.0, 1e-9);
    }

    #[test]
    fn test_valuate_reproduces_gordon_growth_bridge() {
        let result = valuate(&sample_snapshot(), &sample_assumptions()).unwrap();

        // Recompute the bridge independently from the stated formulas.
        let mut pv_explicit = 0.0;
        let mut fcff = 0.0;
        let mut revenue = 1000.0;
        for year in 1..=5 {
            revenue *= 1.05;
            fcff = revenue * 0.20 * (1.0 - 0.21);
            pv_explicit += fcff / 1.09_f64.powi(year);
        }
        let terminal_value = fcff * 1.025 / (0.09 - 0.025);
        let pv_terminal = terminal_value / 1.09_f64.powi(5);
        let enterprise_value = pv_explicit + pv_terminal;

        assert_close(result.pv_explicit, pv_explicit, 1e-9);
        assert_close(result.terminal_value, terminal_value, 1e-9);
        assert_close(result.pv_terminal, pv_terminal, 1e-9);
        assert_close(result.enterprise_value, enterprise_value, 1e-9);
        assert_close(result.equity_value, enterprise_value - 300.0, 1e-9);
        assert_close(
            result.intrinsic_value_per_share,
            (enterprise_value - 300.0) / 100.0,
            1e-9,
        );
        assert!(result.enterprise_value.is_finite());
        assert!(result.equity_value.is_finite());
    }

    #[test]
    fn test_valuate_is_bit_identical_across_calls() {
        let snapshot = sample_snapshot();
        let assumptions = sample_assumptions();
        let first = valuate(&snapshot, &assumptions).unwrap();
        let second = valuate(&snapshot, &assumptions).unwrap();

        assert_eq!(
            first.enterprise_value.to_bits(),
            second.enterprise_value.to_bits()
        );
        assert_eq!(first.equity_value.to_bits(), second.equity_value.to_bits());
        assert_eq!(
            first.intrinsic_value_per_share.to_bits(),
            second.intrinsic_value_per_share.to_bits()
        );
    }

    #[test]
    fn test_wacc_equal_to_terminal_growth_is_degenerate() {
        let mut assumptions = sample_assumptions();
        assumptions.wacc = 0.03;
        assumptions.terminal_growth_rate = 0.03;
        let result = valuate(&sample_snapshot(), &assumptions);
        assert_matches!(
            result,
            Err(ValuationError::DegenerateTerminalValue { wacc, terminal_growth })
                if wacc == 0.03 && terminal_growth == 0.03
        );
    }

    #[test]
    fn test_wacc_below_terminal_growth_is_degenerate() {
        let mut assumptions = sample_assumptions();
        assumptions.wacc = 0.02;
        assumptions.terminal_growth_rate = 0.03;
        assert_matches!(
            valuate(&sample_snapshot(), &assumptions),
            Err(ValuationError::DegenerateTerminalValue { .. })
        );
    }

    #[test]
    fn test_higher_terminal_growth_raises_enterprise_value() {
        let snapshot = sample_snapshot();
        let mut low = sample_assumptions();
        low.terminal_growth_rate = 0.020;
        let mut high = sample_assumptions();
        high.terminal_growth_rate = 0.030;

        let low_ev = valuate(&snapshot, &low).unwrap().enterprise_value;
        let high_ev = valuate(&snapshot, &high).unwrap().enterprise_value;
        assert!(high_ev > low_ev);
    }

    #[test]
    fn test_negative_equity_value_is_reported_not_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.net_debt = 1_000_000.0;
        let result = valuate(&snapshot, &sample_assumptions()).unwrap();
        assert!(result.equity_value < 0.0);
        assert!(result.intrinsic_value_per_share < 0.0);
    }

    #[test]
    fn test_growth_sequence_length_is_enforced() {
        let mut assumptions = sample_assumptions();
        assumptions.revenue_growth_rates = vec![0.05; 4];
        assert_matches!(
            project(&sample_snapshot(), &assumptions),
            Err(ValuationError::InvalidAssumption { field: "revenue_growth_rates", .. })
        );
    }

    #[test]
    fn test_out_of_domain_percentages_are_rejected() {
        let mut assumptions = sample_assumptions();
        assumptions.tax_rate = 1.0;
        assert_matches!(
            project(&sample_snapshot(), &assumptions),
            Err(ValuationError::InvalidAssumption { field: "tax_rate", .. })
        );

        let mut assumptions = sample_assumptions();
        assumptions.operating_margin = -0.1;
        assert_matches!(
            project(&sample_snapshot(), &assumptions),
            Err(ValuationError::InvalidAssumption { field: "operating_margin", .. })
        );

        let mut assumptions = sample_assumptions();
        assumptions.wacc = 0.0;
        assert_matches!(
            project(&sample_snapshot(), &assumptions),
            Err(ValuationError::InvalidAssumption { field: "wacc", .. })
        );
    }

    #[test]
    fn test_non_finite_snapshot_is_incomplete_data() {
        let mut snapshot = sample_snapshot();
        snapshot.revenue = f64::NAN;
        assert_matches!(
            valuate(&snapshot, &sample_assumptions()),
            Err(ValuationError::IncompleteFinancialData { field: "revenue", .. })
        );
    }

    #[test]
    fn test_non_positive_shares_are_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.shares_outstanding = 0.0;
        assert_matches!(
            valuate(&snapshot, &sample_assumptions()),
            Err(ValuationError::InvalidSharesOutstanding { shares }) if shares == 0.0
        );
    }

    #[test]
    fn test_sensitivity_grid_is_rectangular_with_degenerate_cells() {
        // Base wacc 3% with ±2pp spread drives the low-wacc rows degenerate;
        // the grid must keep its full shape anyway.
        let mut assumptions = sample_assumptions();
        assumptions.wacc = 0.03;
        assumptions.terminal_growth_rate = 0.025;

        let grid = sensitivity(
            &sample_snapshot(),
            &assumptions,
            OffsetRange::symmetric(0.02),
            OffsetRange::symmetric(0.01),
            0.005,
        )
        .unwrap();

        assert_eq!(grid.n_rows(), 9);
        assert_eq!(grid.n_cols(), 5);
        for row in &grid.cells {
            assert_eq!(row.len(), 5);
        }

        // Lowest wacc row: 1% wacc against growth 1.5%..3.5% is degenerate
        // everywhere.
        assert!(grid.cells[0].iter().all(|cell| cell.is_none()));
        // Highest wacc row (5% against growth up to 3.5%) is fully defined.
        assert!(grid.cells[8].iter().all(|cell| cell.is_some()));
    }

    #[test]
    fn test_sensitivity_orders_rows_and_columns_ascending() {
        let grid = sensitivity(
            &sample_snapshot(),
            &sample_assumptions(),
            OffsetRange::symmetric(0.01),
            OffsetRange::symmetric(0.005),
            0.005,
        )
        .unwrap();

        for pair in grid.wacc_offsets.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        for pair in grid.growth_offsets.windows(2) {
            assert!(pair[1] > pair[0]);
        }

        // Enterprise value falls as wacc rises (scanning down a column) and
        // rises with terminal growth (scanning across a row).
        let column: Vec<f64> = (0..grid.n_rows()).filter_map(|i| grid.cell(i, 0)).collect();
        for pair in column.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        let row: Vec<f64> = (0..grid.n_cols()).filter_map(|j| grid.cell(0, j)).collect();
        for pair in row.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_sensitivity_base_cell_matches_valuate() {
        let snapshot = sample_snapshot();
        let assumptions = sample_assumptions();
        let grid = sensitivity(
            &snapshot,
            &assumptions,
            OffsetRange::symmetric(0.01),
            OffsetRange::symmetric(0.005),
            0.005,
        )
        .unwrap();

        let base = valuate(&snapshot, &assumptions).unwrap();
        // Symmetric ranges put the base pair at the grid center.
        let center = grid.cell(grid.n_rows() / 2, grid.n_cols() / 2).unwrap();
        assert_close(center, base.enterprise_value, 1e-9);
    }

    #[test]
    fn test_sensitivity_rejects_bad_step() {
        let result = sensitivity(
            &sample_snapshot(),
            &sample_assumptions(),
            OffsetRange::symmetric(0.01),
            OffsetRange::symmetric(0.01),
            0.0,
        );
        assert_matches!(
            result,
            Err(ValuationError::InvalidAssumption { field: "sensitivity_step", .. })
        );
    }

    #[test]
    fn test_terminal_value_concentration_flag() {
        // Zero-reinvestment growth assumptions put most value in the
        // terminal stage for this snapshot.
        let result = valuate(&sample_snapshot(), &sample_assumptions()).unwrap();
        assert!(result.terminal_value_share > 0.0 && result.terminal_value_share < 1.0);
        assert_eq!(
            result.is_terminal_value_concentrated(),
            result.terminal_value_share > TERMINAL_VALUE_WARNING_THRESHOLD
        );
    }

    #[test]
    fn test_upside_and_margin_of_safety() {
        assert_close(upside_percent(120.0, 100.0).unwrap(), 20.0, 1e-9);
        assert_close(margin_of_safety_percent(120.0, 100.0).unwrap(), 100.0 / 6.0, 1e-9);
        assert_eq!(upside_percent(120.0, 0.0), None);
        assert_eq!(margin_of_safety_percent(-5.0, 100.0), None);
    }
}
