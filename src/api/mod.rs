use std::time::Duration;

use crate::errors::ValuationError;
use crate::models::FinancialSnapshot;

pub mod edgar_client;
pub use edgar_client::EdgarClient;

/// Simple rate limiter for API requests
pub struct ApiRateLimiter {
    delay_ms: u64,
}

impl ApiRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let delay_ms = if requests_per_second > 0 {
            1_000 / requests_per_second as u64
        } else {
            1000 // Default 1 second delay
        };

        Self { delay_ms }
    }

    pub async fn wait(&self) {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
    }
}

/// Boundary to the market-data provider: one read-only lookup per ticker.
///
/// Implementations must return a fully-populated snapshot or fail; a
/// partially-null snapshot is never handed to the engine.
#[async_trait::async_trait]
pub trait FinancialDataProvider {
    async fn fetch_financials(&self, ticker: &str) -> Result<FinancialSnapshot, ValuationError>;
}
