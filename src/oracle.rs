use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::OracleSettings;

/// DexScreener pair-price adapter.
///
/// Every failure mode (network error, timeout, malformed body, missing pair,
/// non-positive price) degrades to `None`; nothing escapes this boundary.
pub struct PriceOracle {
    http: reqwest::Client,
    endpoint: String,
    pair_id: String,
}

#[derive(Debug, Deserialize)]
struct PairsResponse {
    pairs: Option<Vec<PairEntry>>,
}

#[derive(Debug, Deserialize)]
struct PairEntry {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
}

impl PriceOracle {
    pub fn new(settings: &OracleSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        PriceOracle {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            pair_id: settings.pair_id.clone(),
        }
    }

    /// Current USD price of the eligibility token, retried up to
    /// `max_attempts` with exponential backoff starting at `base_delay`.
    pub async fn price_usd(&self, max_attempts: u32, base_delay: Duration) -> Option<Decimal> {
        let mut delay = base_delay;
        for attempt in 1..=max_attempts.max(1) {
            match self.fetch_once().await {
                Ok(price) => {
                    info!(%price, "fetched eligibility token price");
                    return Some(price);
                }
                Err(reason) => {
                    warn!(attempt, %reason, "price fetch failed");
                }
            }
            if attempt < max_attempts {
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }
        warn!("price unavailable after {} attempts", max_attempts.max(1));
        None
    }

    async fn fetch_once(&self) -> Result<Decimal, String> {
        let url = format!("{}/{}", self.endpoint, self.pair_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let body = response.text().await.map_err(|e| e.to_string())?;
        price_from_body(&body)
    }
}

/// Extracts `pairs[0].priceUsd` and requires it to be a positive decimal.
fn price_from_body(body: &str) -> Result<Decimal, String> {
    let parsed: PairsResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {e}"))?;
    let pair = parsed
        .pairs
        .and_then(|mut pairs| if pairs.is_empty() { None } else { Some(pairs.remove(0)) })
        .ok_or_else(|| "no pairs in response".to_string())?;
    let raw = pair.price_usd.ok_or_else(|| "pair has no priceUsd".to_string())?;
    let price: Decimal = raw
        .parse()
        .map_err(|e| format!("unparseable priceUsd {raw:?}: {e}"))?;
    if price <= Decimal::ZERO {
        return Err(format!("non-positive price {price}"));
    }
    Ok(price)
}
