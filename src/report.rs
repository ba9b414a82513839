use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::scenarios::ScenarioOutcome;
use crate::models::{AssumptionSet, FinancialSnapshot, SensitivityGrid, ValuationResult};
use crate::validation::ValidationReport;

/// Everything one valuation run produced, bundled for export.
///
/// Exported files are the only persisted state in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationReport {
    pub generated_at: DateTime<Utc>,
    pub snapshot: FinancialSnapshot,
    pub assumptions: AssumptionSet,
    pub result: ValuationResult,
    pub scenarios: Vec<ScenarioOutcome>,
    pub sensitivity: SensitivityGrid,
    pub validation: ValidationReport,
}

impl ValuationReport {
    pub fn new(
        snapshot: FinancialSnapshot,
        assumptions: AssumptionSet,
        result: ValuationResult,
        scenarios: Vec<ScenarioOutcome>,
        sensitivity: SensitivityGrid,
        validation: ValidationReport,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            snapshot,
            assumptions,
            result,
            scenarios,
            sensitivity,
            validation,
        }
    }

    /// Write the report as flat CSV: forecast table, summary fields, then
    /// the sensitivity matrix (wacc rows ascending, growth columns ascending).
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        writer.write_record([
            "year",
            "revenue",
            "ebit",
            "nopat",
            "net_reinvestment",
            "fcff",
            "discount_factor",
            "pv_fcff",
        ])?;
        for row in &self.result.forecast {
            writer.write_record([
                row.year.to_string(),
                format!("{:.2}", row.revenue),
                format!("{:.2}", row.ebit),
                format!("{:.2}", row.nopat),
                format!("{:.2}", row.net_reinvestment),
                format!("{:.2}", row.fcff),
                format!("{:.6}", row.discount_factor),
                format!("{:.2}", row.pv_fcff),
            ])?;
        }

        writer.write_record([""])?;
        let summary: [(&str, String); 12] = [
            ("ticker", self.snapshot.ticker.clone()),
            ("company_name", self.snapshot.company_name.clone()),
            ("fetched_at", self.snapshot.fetched_at.to_rfc3339()),
            ("wacc", format!("{:.4}", self.assumptions.wacc)),
            (
                "terminal_growth_rate",
                format!("{:.4}", self.assumptions.terminal_growth_rate),
            ),
            ("terminal_value", format!("{:.2}", self.result.terminal_value)),
            ("pv_explicit", format!("{:.2}", self.result.pv_explicit)),
            ("pv_terminal", format!("{:.2}", self.result.pv_terminal)),
            (
                "enterprise_value",
                format!("{:.2}", self.result.enterprise_value),
            ),
            ("equity_value", format!("{:.2}", self.result.equity_value)),
            (
                "intrinsic_value_per_share",
                format!("{:.4}", self.result.intrinsic_value_per_share),
            ),
            (
                "terminal_value_share",
                format!("{:.4}", self.result.terminal_value_share),
            ),
        ];
        for (field, value) in summary {
            writer.write_record([field, value.as_str()])?;
        }

        writer.write_record([""])?;
        writer.write_record(["scenario", "growth", "wacc", "terminal_growth", "enterprise_value", "per_share"])?;
        for outcome in &self.scenarios {
            writer.write_record([
                outcome.scenario.label().to_string(),
                format!("{:.4}", outcome.revenue_growth),
                format!("{:.4}", outcome.wacc),
                format!("{:.4}", outcome.terminal_growth),
                format!("{:.2}", outcome.enterprise_value),
                format!("{:.4}", outcome.intrinsic_value_per_share),
            ])?;
        }

        writer.write_record([""])?;
        let mut header = vec!["wacc_offset".to_string()];
        header.extend(
            self.sensitivity
                .growth_offsets
                .iter()
                .map(|offset| format!("g{:+.4}", offset)),
        );
        writer.write_record(&header)?;
        for (i, wacc_offset) in self.sensitivity.wacc_offsets.iter().enumerate() {
            let mut record = vec![format!("{:+.4}", wacc_offset)];
            for j in 0..self.sensitivity.n_cols() {
                record.push(match self.sensitivity.cell(i, j) {
                    Some(value) => format!("{:.2}", value),
                    None => String::new(),
                });
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}
