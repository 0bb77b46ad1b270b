use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Chain {
    Solana,
    Ethereum,
    Bsc,
    Base,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Ethereum => "ethereum",
            Chain::Bsc => "bsc",
            Chain::Base => "base",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "solana" | "sol" => Some(Chain::Solana),
            "ethereum" | "eth" => Some(Chain::Ethereum),
            "bsc" | "bnb" => Some(Chain::Bsc),
            "base" => Some(Chain::Base),
            _ => None,
        }
    }
}

/// Unique identity of a listing: at most one TokenRecord exists per key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub chain: Chain,
    pub address: String,
}

impl TokenKey {
    pub fn new(chain: Chain, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
        }
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chain.as_str(), self.address)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxCount {
    pub buys: u64,
    pub sells: u64,
}

impl TxCount {
    pub fn total(&self) -> u64 {
        self.buys + self.sells
    }
}

/// Canonical market fields. `None` means the value is unknown for this token,
/// which is distinct from a measured zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    pub volume_24h: Option<f64>,
    pub price_change_m5: Option<f64>,
    pub price_change_h1: Option<f64>,
    pub price_change_h6: Option<f64>,
    pub price_change_h24: Option<f64>,
    pub tx_h1: Option<TxCount>,
    pub tx_h24: Option<TxCount>,
    pub holders: Option<u64>,
    pub logo_url: Option<String>,
    pub age_days: Option<f64>,
}

/// Finalized vetting tier. A record without a tier has not completed vetting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Tier {
    Good,
    Caution,
    Danger,
}

/// Where the current community score came from. Vote-sourced scores are
/// preserved verbatim by every later cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScoreSource {
    #[default]
    Auto,
    Votes,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Category {
    Meme,
    Ai,
    Gaming,
    DeFi,
    MicroCap,
    General,
}

/// Sub-scores reported by the vetting collaborator alongside the risk score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentScores {
    pub liquidity: f64,
    pub holders: f64,
    pub activity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRecord {
    pub chain: Chain,
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub category: Category,
    pub market: MarketSnapshot,
    pub risk_score: Option<f64>,
    pub tier: Option<Tier>,
    pub community_score: Option<f64>,
    pub score_source: ScoreSource,
    pub component_scores: Option<ComponentScores>,
    pub flags: Vec<String>,
    pub vetting_in_flight: bool,
    pub vetting_attempts: u32,
    pub last_vetting_attempt_at: Option<DateTime<Utc>>,
    pub last_scanned_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.chain, self.address.clone())
    }

    /// True when the record still needs a vetting pass and none is running.
    pub fn needs_vetting(&self) -> bool {
        self.tier.is_none() && !self.vetting_in_flight
    }
}

/// Per-cycle output handed to the notifier.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub new: Vec<TokenRecord>,
    pub updated: Vec<TokenRecord>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VettingResult {
    pub risk_score: f64,
    pub tier: Tier,
    pub component_scores: ComponentScores,
    pub flags: Vec<String>,
}
