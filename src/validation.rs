use serde::{Deserialize, Serialize};

use crate::models::FinancialSnapshot;

// Realistic parameter ranges for sanity-checking provider data, USD.
const REVENUE_MIN: f64 = 1e6; // $1M micro-cap floor
const REVENUE_MAX: f64 = 1e12; // $1T ceiling
const SHARES_MIN: f64 = 1e5; // 0.1M shares
const SHARES_MAX: f64 = 5e10; // 50B shares
const EBIT_MARGIN_MIN: f64 = -0.50; // severely distressed
const EBIT_MARGIN_MAX: f64 = 0.70; // very rare
const LEVERAGE_WARNING_MULTIPLE: f64 = 2.0; // net debt vs revenue

/// Outcome of sanity-checking a fetched snapshot before any valuation runs.
///
/// Errors block the valuation; warnings annotate it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a provider snapshot for scale and consistency before handing it to
/// the engine. Rejects implausible figures early instead of letting them
/// propagate into the arithmetic.
pub fn validate_snapshot(snapshot: &FinancialSnapshot) -> ValidationReport {
    let mut report = ValidationReport::default();

    if snapshot.revenue < REVENUE_MIN {
        report.errors.push(format!(
            "revenue ${:.0} below minimum threshold ($1M)",
            snapshot.revenue
        ));
    } else if snapshot.revenue > REVENUE_MAX {
        report.errors.push(format!(
            "revenue ${:.0} exceeds maximum threshold ($1T)",
            snapshot.revenue
        ));
    }

    if snapshot.shares_outstanding < SHARES_MIN {
        report.errors.push(format!(
            "shares outstanding {:.0} below minimum (0.1M)",
            snapshot.shares_outstanding
        ));
    } else if snapshot.shares_outstanding > SHARES_MAX {
        report.errors.push(format!(
            "shares outstanding {:.0} exceeds maximum (50B)",
            snapshot.shares_outstanding
        ));
    }

    if snapshot.revenue > 0.0 {
        let ebit_margin = snapshot.ebit / snapshot.revenue;
        if ebit_margin < EBIT_MARGIN_MIN {
            report.errors.push(format!(
                "EBIT margin {:.1}% below {:.0}% floor",
                ebit_margin * 100.0,
                EBIT_MARGIN_MIN * 100.0
            ));
        } else if ebit_margin > EBIT_MARGIN_MAX {
            report.errors.push(format!(
                "EBIT margin {:.1}% above {:.0}% ceiling",
                ebit_margin * 100.0,
                EBIT_MARGIN_MAX * 100.0
            ));
        } else if ebit_margin < 0.0 {
            report
                .warnings
                .push(format!("negative EBIT margin ({:.1}%)", ebit_margin * 100.0));
        }
    }

    if snapshot.revenue > 0.0 && snapshot.net_debt > LEVERAGE_WARNING_MULTIPLE * snapshot.revenue {
        report.warnings.push(format!(
            "net debt ${:.0} exceeds {:.0}x revenue",
            snapshot.net_debt, LEVERAGE_WARNING_MULTIPLE
        ));
    }

    report
}
