use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Market-wide rate environment used by the WACC estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub risk_free_rate: f64,
    pub equity_risk_premium: f64,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.045,
            equity_risk_premium: 0.055,
        }
    }
}

/// Company-level inputs for the WACC estimate. Market values, not book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaccInputs {
    pub current_price: f64,
    pub shares_outstanding: f64,
    pub ebit: f64,
    pub interest_expense: f64,
    pub total_debt: f64,
    pub tax_rate: f64,
    pub beta: f64,
}

/// Full WACC breakdown: WACC = E/V * Re + D/V * Rd * (1 - Tc).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaccComponents {
    pub cost_of_equity: f64,
    pub cost_of_debt: f64,
    pub equity_weight: f64,
    pub debt_weight: f64,
    pub beta: f64,
    pub interest_coverage: f64,
    pub credit_spread: f64,
    pub implied_rating: &'static str,
    pub wacc: f64,
}

/// Size premium tiered by equity market value, USD. Negative for mega-caps.
fn size_premium(market_cap: f64) -> f64 {
    if market_cap > 500e9 {
        0.0
    } else if market_cap > 100e9 {
        -0.002 // -20 bps
    } else if market_cap > 10e9 {
        -0.005 // -50 bps
    } else {
        0.010 // +100 bps for small cap
    }
}

/// Credit spread from the interest coverage ratio, following the simplified
/// rating-tier approach.
fn credit_spread(interest_coverage: f64) -> (f64, &'static str) {
    if interest_coverage > 8.0 {
        (0.015, "AAA/AA")
    } else if interest_coverage > 5.0 {
        (0.020, "A")
    } else if interest_coverage > 2.5 {
        (0.030, "BBB")
    } else if interest_coverage > 1.5 {
        (0.050, "BB")
    } else {
        (0.080, "B or lower")
    }
}

/// Estimate the weighted average cost of capital from fundamentals.
///
/// Cost of equity is CAPM plus a size premium and a 50 bps company-specific
/// premium; cost of debt is the risk-free rate plus a coverage-tiered credit
/// spread. A zero total firm value degrades to all-equity weights.
pub fn estimate_wacc(inputs: &WaccInputs, market: &MarketContext) -> WaccComponents {
    let market_cap = inputs.current_price * inputs.shares_outstanding;

    let company_specific_premium = 0.005;
    let cost_of_equity = market.risk_free_rate
        + inputs.beta * market.equity_risk_premium
        + size_premium(market_cap)
        + company_specific_premium;

    let interest_coverage = if inputs.interest_expense > 0.0 {
        inputs.ebit / inputs.interest_expense
    } else {
        f64::INFINITY
    };
    let (spread, implied_rating) = credit_spread(interest_coverage);
    let cost_of_debt = market.risk_free_rate + spread;

    let total_firm_value = market_cap + inputs.total_debt;
    let (equity_weight, debt_weight) = if total_firm_value > 0.0 {
        (market_cap / total_firm_value, inputs.total_debt / total_firm_value)
    } else {
        warn!("total firm value is zero, falling back to all-equity weights");
        (1.0, 0.0)
    };

    let wacc = equity_weight * cost_of_equity
        + debt_weight * cost_of_debt * (1.0 - inputs.tax_rate);

    debug!(
        "WACC estimate: Re={:.4} Rd={:.4} E/V={:.3} D/V={:.3} coverage={:.1}x -> {:.4}",
        cost_of_equity, cost_of_debt, equity_weight, debt_weight, interest_coverage, wacc
    );

    WaccComponents {
        cost_of_equity,
        cost_of_debt,
        equity_weight,
        debt_weight,
        beta: inputs.beta,
        interest_coverage,
        credit_spread: spread,
        implied_rating,
        wacc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mega_cap_inputs() -> WaccInputs {
        WaccInputs {
            current_price: 140.0,
            shares_outstanding: 12_700e6,
            ebit: 80e9,
            interest_expense: 300e6,
            total_debt: 13e9,
            tax_rate: 0.21,
            beta: 0.95,
        }
    }

    #[test]
    fn test_size_premium_tiers() {
        assert_eq!(size_premium(600e9), 0.0);
        assert_eq!(size_premium(200e9), -0.002);
        assert_eq!(size_premium(50e9), -0.005);
        assert_eq!(size_premium(2e9), 0.010);
    }

    #[test]
    fn test_credit_spread_tiers() {
        assert_eq!(credit_spread(10.0), (0.015, "AAA/AA"));
        assert_eq!(credit_spread(6.0), (0.020, "A"));
        assert_eq!(credit_spread(3.0), (0.030, "BBB"));
        assert_eq!(credit_spread(2.0), (0.050, "BB"));
        assert_eq!(credit_spread(0.5), (0.080, "B or lower"));
    }

    #[test]
    fn test_mega_cap_wacc_breakdown() {
        let components = estimate_wacc(&mega_cap_inputs(), &MarketContext::default());

        // ~$1.8T market cap: no size premium, coverage far above 8x.
        assert_eq!(components.implied_rating, "AAA/AA");
        let expected_re = 0.045 + 0.95 * 0.055 + 0.0 + 0.005;
        assert!((components.cost_of_equity - expected_re).abs() < 1e-12);
        assert!((components.cost_of_debt - 0.060).abs() < 1e-12);

        // Debt is a sliver of firm value, so WACC sits near the cost of equity.
        assert!(components.equity_weight > 0.99);
        assert!(components.wacc > 0.09 && components.wacc < expected_re);
    }

    #[test]
    fn test_zero_interest_expense_means_top_rating() {
        let mut inputs = mega_cap_inputs();
        inputs.interest_expense = 0.0;
        let components = estimate_wacc(&inputs, &MarketContext::default());
        assert!(components.interest_coverage.is_infinite());
        assert_eq!(components.credit_spread, 0.015);
    }

    #[test]
    fn test_zero_firm_value_degrades_to_all_equity() {
        let inputs = WaccInputs {
            current_price: 0.0,
            shares_outstanding: 0.0,
            ebit: 0.0,
            interest_expense: 0.0,
            total_debt: 0.0,
            tax_rate: 0.21,
            beta: 1.0,
        };
        let components = estimate_wacc(&inputs, &MarketContext::default());
        assert_eq!(components.equity_weight, 1.0);
        assert_eq!(components.debt_weight, 0.0);
        assert_eq!(components.wacc, components.cost_of_equity);
    }
}
