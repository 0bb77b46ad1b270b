use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{MarketSnapshot, TokenKey};

use super::feeds::Provider;
use super::normalizer::PartialListing;

/// Field groups sharing one precedence column. Transaction counts travel
/// with liquidity because both come from the same pool-level evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    PriceVolume,
    LiquidityTx,
    HoldersAge,
    Identity,
    Logo,
}

/// Canonical precedence table, fixed as a versioned contract. Higher wins.
///
/// | group                | dexscreener | birdeye | geckoterminal |
/// |----------------------|-------------|---------|---------------|
/// | price/volume/mcap    | 3           | 2       | 1             |
/// | liquidity/tx counts  | 3           | 1       | 2             |
/// | holders/age          | 1           | 3       | 2             |
/// | symbol/name          | 3           | 2       | 1             |
/// | logo                 | real URL beats placeholder, ties by rank |
pub fn source_rank(provider: Provider, group: FieldGroup) -> u8 {
    match (group, provider) {
        (FieldGroup::PriceVolume, Provider::DexScreener) => 3,
        (FieldGroup::PriceVolume, Provider::Birdeye) => 2,
        (FieldGroup::PriceVolume, Provider::GeckoTerminal) => 1,
        (FieldGroup::LiquidityTx, Provider::DexScreener) => 3,
        (FieldGroup::LiquidityTx, Provider::Birdeye) => 1,
        (FieldGroup::LiquidityTx, Provider::GeckoTerminal) => 2,
        (FieldGroup::HoldersAge, Provider::DexScreener) => 1,
        (FieldGroup::HoldersAge, Provider::Birdeye) => 3,
        (FieldGroup::HoldersAge, Provider::GeckoTerminal) => 2,
        (FieldGroup::Identity, Provider::DexScreener) => 3,
        (FieldGroup::Identity, Provider::Birdeye) => 2,
        (FieldGroup::Identity, Provider::GeckoTerminal) => 1,
        (FieldGroup::Logo, Provider::DexScreener) => 3,
        (FieldGroup::Logo, Provider::Birdeye) => 2,
        (FieldGroup::Logo, Provider::GeckoTerminal) => 1,
    }
}

/// Generated placeholder artwork never outranks a real image.
pub fn is_placeholder_logo(url: &str) -> bool {
    url.is_empty()
        || url.contains("placeholder")
        || url.contains("default-token")
        || url.contains("unknown.png")
}

/// One publishable candidate produced by merging all provider views of a key.
/// `symbol`/`name` stay `None` when no provider carried them this cycle, so
/// the store can keep a previously known identity instead of regressing it.
#[derive(Debug, Clone)]
pub struct MergedCandidate {
    pub key: TokenKey,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub market: MarketSnapshot,
    pub liquidity_from_primary: bool,
    pub volume_from_primary: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub candidates: Vec<MergedCandidate>,
    /// Merged candidates dropped by the completeness gate this cycle.
    /// A filtered outcome, not an error.
    pub gated_out: usize,
}

/// A field slot plus the rank of the source that currently owns it.
#[derive(Debug)]
struct Ranked<T> {
    value: Option<T>,
    rank: u8,
}

impl<T> Default for Ranked<T> {
    fn default() -> Self {
        Self {
            value: None,
            rank: 0,
        }
    }
}

impl<T> Ranked<T> {
    /// Overwrite only when the incoming value is present and the incoming
    /// source ranks at least as high as the current owner. A known value is
    /// never regressed to absent. Returns whether the slot was overwritten.
    fn take(&mut self, incoming: Option<T>, incoming_rank: u8) -> bool {
        if let Some(v) = incoming {
            if self.value.is_none() || incoming_rank >= self.rank {
                self.value = Some(v);
                self.rank = incoming_rank;
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Default)]
struct MergeAccumulator {
    symbol: Ranked<String>,
    name: Ranked<String>,
    price_usd: Ranked<f64>,
    market_cap: Ranked<f64>,
    fdv: Ranked<f64>,
    volume_24h: Ranked<f64>,
    price_change_m5: Ranked<f64>,
    price_change_h1: Ranked<f64>,
    price_change_h6: Ranked<f64>,
    price_change_h24: Ranked<f64>,
    liquidity_usd: Ranked<f64>,
    tx_h1: Ranked<crate::types::TxCount>,
    tx_h24: Ranked<crate::types::TxCount>,
    holders: Ranked<u64>,
    age_days: Ranked<f64>,
    logo_url: Ranked<String>,
    liquidity_source: Option<Provider>,
    volume_source: Option<Provider>,
}

impl MergeAccumulator {
    fn absorb(&mut self, partial: &PartialListing) {
        let p = partial.provider;
        let identity = source_rank(p, FieldGroup::Identity);
        let price_volume = source_rank(p, FieldGroup::PriceVolume);
        let liquidity_tx = source_rank(p, FieldGroup::LiquidityTx);
        let holders_age = source_rank(p, FieldGroup::HoldersAge);

        self.symbol.take(partial.symbol.clone(), identity);
        self.name.take(partial.name.clone(), identity);

        self.price_usd.take(partial.market.price_usd, price_volume);
        self.market_cap.take(partial.market.market_cap, price_volume);
        self.fdv.take(partial.market.fdv, price_volume);
        self.price_change_m5.take(partial.market.price_change_m5, price_volume);
        self.price_change_h1.take(partial.market.price_change_h1, price_volume);
        self.price_change_h6.take(partial.market.price_change_h6, price_volume);
        self.price_change_h24.take(partial.market.price_change_h24, price_volume);

        if self.volume_24h.take(partial.market.volume_24h, price_volume) {
            self.volume_source = Some(p);
        }
        if self.liquidity_usd.take(partial.market.liquidity_usd, liquidity_tx) {
            self.liquidity_source = Some(p);
        }

        self.tx_h1.take(partial.market.tx_h1, liquidity_tx);
        self.tx_h24.take(partial.market.tx_h24, liquidity_tx);
        self.holders.take(partial.market.holders, holders_age);
        self.age_days.take(partial.market.age_days, holders_age);

        self.absorb_logo(partial.market.logo_url.clone(), source_rank(p, FieldGroup::Logo));
    }

    fn absorb_logo(&mut self, incoming: Option<String>, incoming_rank: u8) {
        let Some(url) = incoming else { return };
        match &self.logo_url.value {
            None => {
                self.logo_url.value = Some(url);
                self.logo_url.rank = incoming_rank;
            }
            Some(current) => {
                let current_is_placeholder = is_placeholder_logo(current);
                let incoming_is_placeholder = is_placeholder_logo(&url);
                let wins = if current_is_placeholder && !incoming_is_placeholder {
                    true
                } else if !current_is_placeholder && incoming_is_placeholder {
                    false
                } else {
                    incoming_rank >= self.logo_url.rank
                };
                if wins {
                    self.logo_url.value = Some(url);
                    self.logo_url.rank = incoming_rank;
                }
            }
        }
    }

    fn finish(self, key: TokenKey, received_at: DateTime<Utc>) -> MergedCandidate {
        MergedCandidate {
            market: MarketSnapshot {
                price_usd: self.price_usd.value,
                liquidity_usd: self.liquidity_usd.value,
                market_cap: self.market_cap.value,
                fdv: self.fdv.value,
                volume_24h: self.volume_24h.value,
                price_change_m5: self.price_change_m5.value,
                price_change_h1: self.price_change_h1.value,
                price_change_h6: self.price_change_h6.value,
                price_change_h24: self.price_change_h24.value,
                tx_h1: self.tx_h1.value,
                tx_h24: self.tx_h24.value,
                holders: self.holders.value,
                logo_url: self.logo_url.value,
                age_days: self.age_days.value,
            },
            liquidity_from_primary: self
                .liquidity_source
                .map(|p| p.is_primary_aggregator())
                .unwrap_or(false),
            volume_from_primary: self
                .volume_source
                .map(|p| p.is_primary_aggregator())
                .unwrap_or(false),
            key,
            symbol: self.symbol.value,
            name: self.name.value,
            received_at,
        }
    }
}

/// Publishable only when price, liquidity and volume are all known, and,
/// when the liquidity/volume evidence comes from the primary aggregator,
/// transaction-count evidence is known too.
pub fn passes_completeness_gate(candidate: &MergedCandidate) -> bool {
    let m = &candidate.market;
    if m.price_usd.is_none() || m.liquidity_usd.is_none() || m.volume_24h.is_none() {
        return false;
    }
    if (candidate.liquidity_from_primary || candidate.volume_from_primary)
        && m.tx_h24.is_none()
    {
        return false;
    }
    true
}

/// Merge same-key partial listings from all providers into candidates and
/// apply the completeness gate. Partials are absorbed in arrival order; the
/// precedence table decides every conflict.
pub fn reconcile(partials: Vec<PartialListing>) -> ReconcileOutcome {
    let mut groups: HashMap<TokenKey, Vec<PartialListing>> = HashMap::new();
    for partial in partials {
        groups.entry(partial.key.clone()).or_default().push(partial);
    }

    let mut outcome = ReconcileOutcome::default();
    for (key, group) in groups {
        let received_at = group
            .iter()
            .map(|p| p.received_at)
            .max()
            .unwrap_or_else(Utc::now);

        let mut acc = MergeAccumulator::default();
        for partial in &group {
            acc.absorb(partial);
        }
        let candidate = acc.finish(key, received_at);

        if passes_completeness_gate(&candidate) {
            outcome.candidates.push(candidate);
        } else {
            debug!(key = %candidate.key, "candidate dropped by completeness gate");
            outcome.gated_out += 1;
        }
    }

    // Deterministic downstream ordering regardless of map iteration order.
    outcome
        .candidates
        .sort_by(|a, b| a.key.address.cmp(&b.key.address));

    outcome
}
