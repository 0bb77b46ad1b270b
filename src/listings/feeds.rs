use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::types::{Chain, TxCount};

/// Upstream market-data providers. DexScreener is the primary DEX
/// aggregator; the others fill in fields it does not carry (holders, age).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Provider {
    DexScreener,
    Birdeye,
    GeckoTerminal,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::DexScreener => "dexscreener",
            Provider::Birdeye => "birdeye",
            Provider::GeckoTerminal => "geckoterminal",
        }
    }

    pub fn is_primary_aggregator(&self) -> bool {
        matches!(self, Provider::DexScreener)
    }
}

/// One provider's view of one token, already shaped into that provider's
/// typed payload. Field lookups stay exhaustive in the normalizer instead
/// of being duck-typed out of raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProviderRecord {
    pub provider: Provider,
    pub chain: Chain,
    pub address: String,
    pub payload: ProviderPayload,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderPayload {
    DexScreener(DexScreenerPair),
    Birdeye(BirdeyeOverview),
    GeckoTerminal(GeckoTerminalPool),
}

/// Pair view from the primary aggregator. Trusted for prices, volumes,
/// liquidity and transaction counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DexScreenerPair {
    pub base_symbol: Option<String>,
    pub base_name: Option<String>,
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    pub volume_h24: Option<f64>,
    pub price_change_m5: Option<f64>,
    pub price_change_h1: Option<f64>,
    pub price_change_h6: Option<f64>,
    pub price_change_h24: Option<f64>,
    pub txns_h1: Option<TxCount>,
    pub txns_h24: Option<TxCount>,
    pub image_url: Option<String>,
    /// Pair creation time, milliseconds since epoch.
    pub pair_created_at: Option<i64>,
}

/// Token overview from Birdeye. Preferred source for holder counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BirdeyeOverview {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub liquidity: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_h24: Option<f64>,
    pub price_change_h24: Option<f64>,
    pub holders: Option<u64>,
    pub logo_uri: Option<String>,
    /// Token creation time, seconds since epoch.
    pub created_at: Option<i64>,
}

/// Pool view from GeckoTerminal. Second-ranked holder/age source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeckoTerminalPool {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    pub reserve_usd: Option<f64>,
    pub fdv_usd: Option<f64>,
    pub volume_h24: Option<f64>,
    pub price_change_h24: Option<f64>,
    pub txns_h24: Option<TxCount>,
    pub holders: Option<u64>,
    pub image_url: Option<String>,
    /// Pool creation time, seconds since epoch.
    pub pool_created_at: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("chain not supported: {0}")]
    ChainNotSupported(&'static str),
    #[error("API error: {0}")]
    ApiError(String),
}

/// One upstream feed. `fetch` returning `Ok(None)` means the provider is
/// temporarily unavailable, which is a non-fatal, per-provider outcome.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn provider(&self) -> Provider;
    fn supported_chains(&self) -> Vec<Chain>;
    async fn fetch(&self, chain: Chain) -> Result<Option<Vec<RawProviderRecord>>, FeedError>;
}

// Wire shapes below are this service's ingest contract with its relay
// endpoints, not a claim about the public upstream APIs.

#[derive(Debug, Deserialize)]
struct DexScreenerFeedResponse {
    pairs: Vec<DexScreenerFeedEntry>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerFeedEntry {
    chain_id: String,
    token_address: String,
    #[serde(flatten)]
    pair: DexScreenerPair,
}

pub struct DexScreenerAdapter {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DexScreenerAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FeedAdapter for DexScreenerAdapter {
    fn provider(&self) -> Provider {
        Provider::DexScreener
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![Chain::Solana, Chain::Ethereum, Chain::Bsc, Chain::Base]
    }

    async fn fetch(&self, chain: Chain) -> Result<Option<Vec<RawProviderRecord>>, FeedError> {
        let url = format!("{}/latest/pairs/{}", self.base_url, chain.as_str());
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("dexscreener feed unavailable: HTTP {}", response.status());
            return Ok(None);
        }

        let body = response.text().await?;
        let feed: DexScreenerFeedResponse = serde_json::from_str(&body)?;
        let received_at = Utc::now();

        let records = feed
            .pairs
            .into_iter()
            .filter(|entry| Chain::parse(&entry.chain_id) == Some(chain))
            .map(|entry| RawProviderRecord {
                provider: Provider::DexScreener,
                chain,
                address: entry.token_address,
                payload: ProviderPayload::DexScreener(entry.pair),
                received_at,
            })
            .collect();

        Ok(Some(records))
    }
}

#[derive(Debug, Deserialize)]
struct BirdeyeFeedResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    tokens: Vec<BirdeyeFeedEntry>,
}

#[derive(Debug, Deserialize)]
struct BirdeyeFeedEntry {
    address: String,
    #[serde(flatten)]
    overview: BirdeyeOverview,
}

pub struct BirdeyeAdapter {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl BirdeyeAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FeedAdapter for BirdeyeAdapter {
    fn provider(&self) -> Provider {
        Provider::Birdeye
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![Chain::Solana]
    }

    async fn fetch(&self, chain: Chain) -> Result<Option<Vec<RawProviderRecord>>, FeedError> {
        if !self.supported_chains().contains(&chain) {
            return Err(FeedError::ChainNotSupported(chain.as_str()));
        }

        let url = format!("{}/defi/token_trending?chain={}", self.base_url, chain.as_str());
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(FeedError::RateLimitExceeded);
        }
        if !response.status().is_success() {
            warn!("birdeye feed unavailable: HTTP {}", response.status());
            return Ok(None);
        }

        let body = response.text().await?;
        let feed: BirdeyeFeedResponse = serde_json::from_str(&body)?;
        if !feed.success {
            return Err(FeedError::ApiError(
                feed.message.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }

        let received_at = Utc::now();
        let records = feed
            .tokens
            .into_iter()
            .map(|entry| RawProviderRecord {
                provider: Provider::Birdeye,
                chain,
                address: entry.address,
                payload: ProviderPayload::Birdeye(entry.overview),
                received_at,
            })
            .collect();

        Ok(Some(records))
    }
}

#[derive(Debug, Deserialize)]
struct GeckoTerminalFeedResponse {
    pools: Vec<GeckoTerminalFeedEntry>,
}

#[derive(Debug, Deserialize)]
struct GeckoTerminalFeedEntry {
    network: String,
    token_address: String,
    #[serde(flatten)]
    pool: GeckoTerminalPool,
}

pub struct GeckoTerminalAdapter {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl GeckoTerminalAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FeedAdapter for GeckoTerminalAdapter {
    fn provider(&self) -> Provider {
        Provider::GeckoTerminal
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![Chain::Solana, Chain::Ethereum, Chain::Base]
    }

    async fn fetch(&self, chain: Chain) -> Result<Option<Vec<RawProviderRecord>>, FeedError> {
        let url = format!("{}/networks/{}/trending_pools", self.base_url, chain.as_str());
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("geckoterminal feed unavailable: HTTP {}", response.status());
            return Ok(None);
        }

        let body = response.text().await?;
        let feed: GeckoTerminalFeedResponse = serde_json::from_str(&body)?;
        let received_at = Utc::now();

        let records = feed
            .pools
            .into_iter()
            .filter(|entry| Chain::parse(&entry.network) == Some(chain))
            .map(|entry| RawProviderRecord {
                provider: Provider::GeckoTerminal,
                chain,
                address: entry.token_address,
                payload: ProviderPayload::GeckoTerminal(entry.pool),
                received_at,
            })
            .collect();

        Ok(Some(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_feed_body_surfaces_as_json_error() {
        let err = serde_json::from_str::<DexScreenerFeedResponse>("{\"pairs\": [oops").unwrap_err();
        assert!(matches!(FeedError::from(err), FeedError::Json(_)));
    }
}
