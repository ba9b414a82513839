use serde::{Deserialize, Serialize};

use crate::engine::valuate;
use crate::errors::ValuationError;
use crate::models::{AssumptionSet, FinancialSnapshot, FORECAST_YEARS};

/// Valuation scenario definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    Bear,
    Base,
    Bull,
}

impl Scenario {
    pub fn label(&self) -> &'static str {
        match self {
            Scenario::Bear => "Bear",
            Scenario::Base => "Base",
            Scenario::Bull => "Bull",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Bear => "Recession / market weakness",
            Scenario::Base => "Normal economic cycle",
            Scenario::Bull => "Expansion / strong growth",
        }
    }

    /// The (revenue growth, wacc, terminal growth) triple substituted into
    /// the base assumptions for this scenario.
    pub fn preset(&self) -> ScenarioPreset {
        match self {
            Scenario::Bear => ScenarioPreset {
                revenue_growth: 0.08,
                wacc: 0.090,
                terminal_growth: 0.015,
            },
            Scenario::Base => ScenarioPreset {
                revenue_growth: 0.15,
                wacc: 0.075,
                terminal_growth: 0.025,
            },
            Scenario::Bull => ScenarioPreset {
                revenue_growth: 0.20,
                wacc: 0.065,
                terminal_growth: 0.030,
            },
        }
    }

    pub fn all() -> [Scenario; 3] {
        [Scenario::Bear, Scenario::Base, Scenario::Bull]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPreset {
    pub revenue_growth: f64,
    pub wacc: f64,
    pub terminal_growth: f64,
}

/// One scenario's valuation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub revenue_growth: f64,
    pub wacc: f64,
    pub terminal_growth: f64,
    pub enterprise_value: f64,
    pub equity_value: f64,
    pub intrinsic_value_per_share: f64,
}

/// Run the bear/base/bull cases against the base assumption set.
///
/// Each scenario keeps the user's margin, tax and reinvestment assumptions
/// and substitutes its own flat growth, WACC and terminal growth.
pub fn run_scenarios(
    snapshot: &FinancialSnapshot,
    base: &AssumptionSet,
) -> Result<Vec<ScenarioOutcome>, ValuationError> {
    let mut outcomes = Vec::with_capacity(3);
    for scenario in Scenario::all() {
        let preset = scenario.preset();
        let mut assumptions = base.clone();
        assumptions.revenue_growth_rates = vec![preset.revenue_growth; FORECAST_YEARS];
        assumptions.wacc = preset.wacc;
        assumptions.terminal_growth_rate = preset.terminal_growth;

        let result = valuate(snapshot, &assumptions)?;
        outcomes.push(ScenarioOutcome {
            scenario,
            revenue_growth: preset.revenue_growth,
            wacc: preset.wacc,
            terminal_growth: preset.terminal_growth,
            enterprise_value: result.enterprise_value,
            equity_value: result.equity_value,
            intrinsic_value_per_share: result.intrinsic_value_per_share,
        });
    }
    Ok(outcomes)
}
