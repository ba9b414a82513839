use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{ApiRateLimiter, FinancialDataProvider};
use crate::errors::ValuationError;
use crate::models::{Config, FinancialSnapshot};

const SEC_TICKER_MAP_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SEC_COMPANY_FACTS_BASE: &str = "https://data.sec.gov/api/xbrl/companyfacts";

/// One entry of the SEC ticker map.
#[derive(Debug, Clone, Deserialize)]
struct TickerRecord {
    cik_str: u64,
    ticker: String,
    title: String,
}

/// Ticker resolved to its zero-padded Central Index Key.
#[derive(Debug, Clone)]
pub struct CikMapping {
    pub cik: String,
    pub ticker: String,
    pub company_name: String,
}

/// A fuzzy ticker-search hit, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyMatch {
    pub ticker: String,
    pub company_name: String,
    pub score: i64,
}

/// SEC EDGAR companyfacts client: resolves a ticker to a CIK and extracts
/// the latest reported fundamentals into a `FinancialSnapshot`.
pub struct EdgarClient {
    http_client: Client,
    rate_limiter: ApiRateLimiter,
    ticker_map_url: String,
    company_facts_base: String,
}

impl EdgarClient {
    /// Create a client against the real SEC endpoints.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_urls(config, SEC_TICKER_MAP_URL, SEC_COMPANY_FACTS_BASE)
    }

    /// Create a client against custom endpoints (tests point this at a local
    /// mock server).
    pub fn with_base_urls(
        config: &Config,
        ticker_map_url: &str,
        company_facts_base: &str,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(config.edgar_user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: ApiRateLimiter::new(config.edgar_requests_per_second),
            ticker_map_url: ticker_map_url.to_string(),
            company_facts_base: company_facts_base.to_string(),
        })
    }

    async fn fetch_ticker_map(
        &self,
        ticker: &str,
    ) -> Result<HashMap<String, TickerRecord>, ValuationError> {
        self.rate_limiter.wait().await;

        let response = self
            .http_client
            .get(&self.ticker_map_url)
            .send()
            .await
            .map_err(|e| ValuationError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: format!("ticker map request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(ValuationError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: format!("ticker map request returned {}", response.status()),
            });
        }

        response
            .json::<HashMap<String, TickerRecord>>()
            .await
            .map_err(|e| ValuationError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: format!("malformed ticker map: {}", e),
            })
    }

    /// Resolve a ticker symbol to its zero-padded CIK.
    pub async fn resolve_ticker(&self, ticker: &str) -> Result<CikMapping, ValuationError> {
        let symbol = ticker.trim().to_uppercase();
        let map = self.fetch_ticker_map(&symbol).await?;

        map.values()
            .find(|record| record.ticker == symbol)
            .map(|record| CikMapping {
                cik: format!("{:0>10}", record.cik_str),
                ticker: record.ticker.clone(),
                company_name: record.title.clone(),
            })
            .ok_or_else(|| ValuationError::DataUnavailable {
                ticker: symbol.clone(),
                reason: "ticker not found in SEC database".to_string(),
            })
    }

    /// Fuzzy-search the ticker map by symbol or company name.
    pub async fn search_companies(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CompanyMatch>, ValuationError> {
        let map = self.fetch_ticker_map(query).await?;
        let matcher = SkimMatcherV2::default();

        let mut matches: Vec<CompanyMatch> = map
            .values()
            .filter_map(|record| {
                let haystack = format!("{} {}", record.ticker, record.title);
                matcher
                    .fuzzy_match(&haystack, query)
                    .map(|score| CompanyMatch {
                        ticker: record.ticker.clone(),
                        company_name: record.title.clone(),
                        score,
                    })
            })
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn fetch_company_facts(
        &self,
        mapping: &CikMapping,
    ) -> Result<Value, ValuationError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/CIK{}.json", self.company_facts_base, mapping.cik);
        debug!("Fetching company facts from {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ValuationError::DataUnavailable {
                ticker: mapping.ticker.clone(),
                reason: format!("companyfacts request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(ValuationError::DataUnavailable {
                ticker: mapping.ticker.clone(),
                reason: format!("companyfacts request returned {}", response.status()),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ValuationError::DataUnavailable {
                ticker: mapping.ticker.clone(),
                reason: format!("malformed companyfacts payload: {}", e),
            })
    }
}

/// Latest reported value for one XBRL concept, by period end date.
fn latest_unit_value(facts: &Value, taxonomy: &str, tag: &str, unit: &str) -> Option<f64> {
    let values = facts
        .get("facts")?
        .get(taxonomy)?
        .get(tag)?
        .get("units")?
        .get(unit)?
        .as_array()?;

    values
        .iter()
        .filter_map(|entry| {
            let end = entry.get("end").and_then(|d| d.as_str())?;
            let value = entry.get("val").and_then(|v| v.as_f64())?;
            Some((end.to_string(), value))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, value)| value)
}

/// First present concept from a list of fallbacks, US-GAAP taxonomy, USD.
fn latest_usd_fallback(facts: &Value, tags: &[&str]) -> Option<f64> {
    tags.iter()
        .find_map(|tag| latest_unit_value(facts, "us-gaap", tag, "USD"))
}

/// Assemble a fully-populated snapshot from the companyfacts payload.
///
/// Required concepts (revenue, EBIT, cash, shares) reject-early with
/// `IncompleteFinancialData`; debt components default to zero since filers
/// with no debt simply omit the tags.
fn snapshot_from_facts(
    mapping: &CikMapping,
    facts: &Value,
) -> Result<FinancialSnapshot, ValuationError> {
    let missing = |field: &'static str| ValuationError::IncompleteFinancialData {
        ticker: mapping.ticker.clone(),
        field,
    };

    let revenue = latest_usd_fallback(
        facts,
        &[
            "Revenues",
            "RevenueFromContractWithCustomerExcludingAssessedTax",
            "RevenueFromContractWithCustomerIncludingAssessedTax",
        ],
    )
    .ok_or_else(|| missing("revenue"))?;

    let ebit = latest_usd_fallback(facts, &["OperatingIncomeLoss"])
        .ok_or_else(|| missing("ebit"))?;

    let cash = latest_usd_fallback(facts, &["CashAndCashEquivalentsAtCarryingValue"])
        .ok_or_else(|| missing("cash_and_equivalents"))?;

    let short_term_debt = latest_usd_fallback(facts, &["DebtCurrent"]).unwrap_or(0.0);
    let long_term_debt =
        latest_usd_fallback(facts, &["LongTermDebtNoncurrent", "LongTermDebt"]).unwrap_or(0.0);

    let shares = latest_unit_value(facts, "dei", "EntityCommonStockSharesOutstanding", "shares")
        .ok_or_else(|| missing("shares_outstanding"))?;

    Ok(FinancialSnapshot {
        ticker: mapping.ticker.clone(),
        company_name: mapping.company_name.clone(),
        revenue,
        ebit,
        net_debt: short_term_debt + long_term_debt - cash,
        shares_outstanding: shares,
        fetched_at: Utc::now(),
    })
}

#[async_trait::async_trait]
impl FinancialDataProvider for EdgarClient {
    async fn fetch_financials(&self, ticker: &str) -> Result<FinancialSnapshot, ValuationError> {
        let mapping = self.resolve_ticker(ticker).await?;
        let facts = self.fetch_company_facts(&mapping).await?;
        let snapshot = snapshot_from_facts(&mapping, &facts)?;

        info!(
            "Fetched {} ({}): revenue ${:.0}M, EBIT ${:.0}M, net debt ${:.0}M",
            snapshot.ticker,
            snapshot.company_name,
            snapshot.revenue / 1e6,
            snapshot.ebit / 1e6,
            snapshot.net_debt / 1e6
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn mapping() -> CikMapping {
        CikMapping {
            cik: "0000320193".to_string(),
            ticker: "AAPL".to_string(),
            company_name: "Apple Inc.".to_string(),
        }
    }

    fn facts_payload() -> Value {
        json!({
            "cik": 320193,
            "entityName": "Apple Inc.",
            "facts": {
                "us-gaap": {
                    "Revenues": { "units": { "USD": [
                        { "end": "2023-09-30", "val": 383_285_000_000.0_f64 },
                        { "end": "2022-09-24", "val": 394_328_000_000.0_f64 }
                    ]}},
                    "OperatingIncomeLoss": { "units": { "USD": [
                        { "end": "2023-09-30", "val": 114_301_000_000.0_f64 }
                    ]}},
                    "CashAndCashEquivalentsAtCarryingValue": { "units": { "USD": [
                        { "end": "2023-09-30", "val": 29_965_000_000.0_f64 }
                    ]}},
                    "DebtCurrent": { "units": { "USD": [
                        { "end": "2023-09-30", "val": 15_000_000_000.0_f64 }
                    ]}},
                    "LongTermDebtNoncurrent": { "units": { "USD": [
                        { "end": "2023-09-30", "val": 95_281_000_000.0_f64 }
                    ]}}
                },
                "dei": {
                    "EntityCommonStockSharesOutstanding": { "units": { "shares": [
                        { "end": "2023-10-20", "val": 15_552_752_000.0_f64 }
                    ]}}
                }
            }
        })
    }

    #[test]
    fn test_latest_value_picks_most_recent_period() {
        let facts = facts_payload();
        let revenue = latest_unit_value(&facts, "us-gaap", "Revenues", "USD").unwrap();
        assert_eq!(revenue, 383_285_000_000.0);
    }

    #[test]
    fn test_snapshot_from_complete_facts() {
        let snapshot = snapshot_from_facts(&mapping(), &facts_payload()).unwrap();
        assert_eq!(snapshot.ticker, "AAPL");
        assert_eq!(snapshot.revenue, 383_285_000_000.0);
        assert_eq!(snapshot.ebit, 114_301_000_000.0);
        // 15B + 95.281B - 29.965B
        assert!((snapshot.net_debt - 80_316_000_000.0).abs() < 1.0);
        assert_eq!(snapshot.shares_outstanding, 15_552_752_000.0);
    }

    #[test]
    fn test_missing_required_concept_rejects_early() {
        let mut facts = facts_payload();
        facts["facts"]["us-gaap"]
            .as_object_mut()
            .unwrap()
            .remove("CashAndCashEquivalentsAtCarryingValue");

        assert_matches!(
            snapshot_from_facts(&mapping(), &facts),
            Err(ValuationError::IncompleteFinancialData { field: "cash_and_equivalents", .. })
        );
    }

    #[test]
    fn test_absent_debt_tags_default_to_zero() {
        let mut facts = facts_payload();
        let gaap = facts["facts"]["us-gaap"].as_object_mut().unwrap();
        gaap.remove("DebtCurrent");
        gaap.remove("LongTermDebtNoncurrent");

        let snapshot = snapshot_from_facts(&mapping(), &facts).unwrap();
        assert_eq!(snapshot.net_debt, -29_965_000_000.0);
    }

    #[test]
    fn test_revenue_falls_back_to_contract_revenue_tag() {
        let mut facts = facts_payload();
        let gaap = facts["facts"]["us-gaap"].as_object_mut().unwrap();
        gaap.remove("Revenues");
        gaap.insert(
            "RevenueFromContractWithCustomerExcludingAssessedTax".to_string(),
            json!({ "units": { "USD": [
                { "end": "2023-09-30", "val": 383_000_000_000.0_f64 }
            ]}}),
        );

        let snapshot = snapshot_from_facts(&mapping(), &facts).unwrap();
        assert_eq!(snapshot.revenue, 383_000_000_000.0);
    }
}
