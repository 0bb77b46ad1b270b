use crate::types::{Category, MarketSnapshot, ScoreSource, TokenRecord};

const MICRO_CAP_MAX_MCAP: f64 = 250_000.0;
const MICRO_CAP_MAX_LIQUIDITY: f64 = 50_000.0;

const HOLDERS_CAP: f64 = 1_000.0;
const ACTIVITY_CAP: f64 = 500.0;
const CHANGE_CAP_PCT: f64 = 100.0;
const LIQUIDITY_CAP: f64 = 100_000.0;

const MEME_KEYWORDS: &[&str] = &[
    "doge", "inu", "pepe", "shib", "moon", "elon", "wojak", "chad", "cat", "frog",
];
const AI_KEYWORDS: &[&str] = &["ai", "gpt", "agent", "neural"];
const GAMING_KEYWORDS: &[&str] = &["game", "play", "quest", "arcade"];
const DEFI_KEYWORDS: &[&str] = &["swap", "dex", "yield", "stake", "lend"];

fn matches_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

/// Derive a category from symbol/name keywords, falling back to market-size
/// thresholds. Pure function of its inputs.
pub fn classify(symbol: &str, name: &str, market: &MarketSnapshot) -> Category {
    let text = format!("{} {}", symbol, name).to_lowercase();

    if matches_any(&text, MEME_KEYWORDS) {
        return Category::Meme;
    }
    if matches_any(&text, AI_KEYWORDS) {
        return Category::Ai;
    }
    if matches_any(&text, GAMING_KEYWORDS) {
        return Category::Gaming;
    }
    if matches_any(&text, DEFI_KEYWORDS) {
        return Category::DeFi;
    }

    let small_cap = market.market_cap.map_or(false, |m| m < MICRO_CAP_MAX_MCAP);
    let thin_liquidity = market
        .liquidity_usd
        .map_or(false, |l| l < MICRO_CAP_MAX_LIQUIDITY);
    if small_cap && thin_liquidity {
        Category::MicroCap
    } else {
        Category::General
    }
}

fn linear(value: f64, cap: f64, weight: f64) -> f64 {
    (value / cap).clamp(0.0, 1.0) * weight
}

/// Deterministic community score in [0, 100]:
/// holders 0-30, 24h activity 0-25, positive 24h change 0-15,
/// liquidity 0-15, age bonus +5 once age >= 1 day, inverse risk 0-10.
pub fn community_score(market: &MarketSnapshot, risk_score: Option<f64>) -> f64 {
    let mut score = 0.0;

    if let Some(holders) = market.holders {
        score += linear(holders as f64, HOLDERS_CAP, 30.0);
    }
    if let Some(tx) = market.tx_h24 {
        score += linear(tx.total() as f64, ACTIVITY_CAP, 25.0);
    }
    if let Some(change) = market.price_change_h24 {
        if change > 0.0 {
            score += linear(change, CHANGE_CAP_PCT, 15.0);
        }
    }
    if let Some(liquidity) = market.liquidity_usd {
        score += linear(liquidity, LIQUIDITY_CAP, 15.0);
    }
    if market.age_days.map_or(false, |age| age >= 1.0) {
        score += 5.0;
    }
    if let Some(risk) = risk_score {
        score += ((100.0 - risk) / 100.0).clamp(0.0, 1.0) * 10.0;
    }

    score.clamp(0.0, 100.0)
}

/// Annotate a record with its category and, when no vote-based score exists,
/// the automatic community score. A vote-sourced score is never touched.
pub fn annotate(record: &mut TokenRecord) {
    record.category = classify(&record.symbol, &record.name, &record.market);
    if record.score_source == ScoreSource::Auto {
        record.community_score = Some(community_score(&record.market, record.risk_score));
    }
}
