use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{
    Category, Delta, MarketSnapshot, ScoreSource, TokenKey, TokenRecord, VettingResult,
};

use super::reconciler::MergedCandidate;
use super::scoring;

/// Result of applying one cycle's candidates to the store.
#[derive(Debug, Default)]
pub struct CycleApplication {
    pub delta: Delta,
    pub evicted: Vec<TokenKey>,
}

/// Capacity-bounded collection of presentable listings. All mutation is
/// serialized through the single-active-cycle rule enforced by the engine,
/// except the vetting flag transitions which take the write lock directly.
pub struct RotationStore {
    capacity: usize,
    records: RwLock<HashMap<TokenKey, TokenRecord>>,
}

impl RotationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, key: &TokenKey) -> Option<TokenRecord> {
        self.records.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> Vec<TokenRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Seed the store with a pre-existing record, e.g. when warming up from
    /// persistence at startup. Does not enforce capacity.
    pub async fn seed(&self, record: TokenRecord) {
        let mut records = self.records.write().await;
        records.insert(record.key(), record);
    }

    /// Record an externally supplied vote-based score. Once set it is
    /// preserved verbatim by every later cycle.
    pub async fn set_vote_score(&self, key: &TokenKey, score: f64) -> Option<TokenRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(key)?;
        record.community_score = Some(score);
        record.score_source = ScoreSource::Votes;
        record.updated_at = Utc::now();
        Some(record.clone())
    }

    /// Upsert the cycle's gate-passing candidates, enforce capacity by
    /// evicting lowest-quality oldest records, and compute the delta.
    pub async fn apply_cycle(
        &self,
        candidates: Vec<MergedCandidate>,
        now: DateTime<Utc>,
    ) -> CycleApplication {
        let mut records = self.records.write().await;

        let mut new_keys = Vec::new();
        let mut updated_keys = Vec::new();

        for candidate in candidates {
            match records.get_mut(&candidate.key) {
                Some(existing) => {
                    if update_existing(existing, &candidate, now) {
                        updated_keys.push(candidate.key);
                    }
                }
                None => {
                    let record = record_from_candidate(candidate, now);
                    let key = record.key();
                    records.insert(key.clone(), record);
                    new_keys.push(key);
                }
            }
        }

        let evicted = enforce_capacity(&mut records, self.capacity);
        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted listings to enforce capacity");
        }

        // Records evicted in the same cycle they appeared never reach clients.
        new_keys.retain(|k| records.contains_key(k));
        updated_keys.retain(|k| records.contains_key(k));

        let delta = Delta {
            new: new_keys
                .iter()
                .filter_map(|k| records.get(k).cloned())
                .collect(),
            updated: updated_keys
                .iter()
                .filter_map(|k| records.get(k).cloned())
                .collect(),
        };

        CycleApplication { delta, evicted }
    }

    /// Atomically clear every record. The scheduler follows this with an
    /// immediate repopulating cycle.
    pub async fn wipe(&self) -> Vec<TokenKey> {
        let mut records = self.records.write().await;
        let keys: Vec<TokenKey> = records.keys().cloned().collect();
        records.clear();
        info!(count = keys.len(), "full-wipe rotation cleared the store");
        keys
    }

    /// Keys that still need a vetting pass.
    pub async fn pending_vetting(&self) -> Vec<TokenKey> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.needs_vetting())
            .map(|r| r.key())
            .collect()
    }

    /// Check-and-set the in-flight flag. Exactly one caller wins for a given
    /// unvetted record; every other concurrent attempt observes the flag and
    /// no-ops.
    pub async fn try_begin_vetting(&self, key: &TokenKey) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(key) {
            Some(record) if record.needs_vetting() => {
                record.vetting_in_flight = true;
                record.vetting_attempts += 1;
                record.last_vetting_attempt_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Persist a successful vetting result and clear the in-flight flag.
    /// The automatic community score is refreshed because the inverse-risk
    /// component just became known; vote scores stay untouched.
    pub async fn complete_vetting(
        &self,
        key: &TokenKey,
        result: VettingResult,
        now: DateTime<Utc>,
    ) -> Option<TokenRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(key)?;
        record.risk_score = Some(result.risk_score);
        record.tier = Some(result.tier);
        record.component_scores = Some(result.component_scores);
        record.flags = result.flags;
        record.vetting_in_flight = false;
        record.updated_at = now;
        scoring::annotate(record);
        Some(record.clone())
    }

    /// Clear the in-flight flag after a failed vetting call, returning the
    /// record to the unvetted state for retry on a later cycle.
    pub async fn fail_vetting(&self, key: &TokenKey) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(key) {
            record.vetting_in_flight = false;
        }
    }
}

fn record_from_candidate(candidate: MergedCandidate, now: DateTime<Utc>) -> TokenRecord {
    // First sighting with no identity from any provider: stand in with the
    // address prefix until a provider supplies the real symbol.
    let fallback = candidate
        .key
        .address
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    let symbol = candidate.symbol.unwrap_or(fallback);
    let name = candidate.name.unwrap_or_else(|| symbol.clone());

    let mut record = TokenRecord {
        chain: candidate.key.chain,
        address: candidate.key.address,
        symbol,
        name,
        category: Category::General,
        market: candidate.market,
        risk_score: None,
        tier: None,
        community_score: None,
        score_source: ScoreSource::Auto,
        component_scores: None,
        flags: Vec::new(),
        vetting_in_flight: false,
        vetting_attempts: 0,
        last_vetting_attempt_at: None,
        last_scanned_at: candidate.received_at,
        created_at: now,
        updated_at: now,
    };
    scoring::annotate(&mut record);
    record
}

/// Merge a candidate into an existing record. Non-null incoming values
/// overwrite; a known value is never regressed to null. That covers the
/// identity fields too: symbol/name only change when a provider actually
/// supplied them this cycle. Risk score, tier and vote-based scores belong
/// to other writers and are left alone.
/// Returns whether any client-visible field changed.
fn update_existing(existing: &mut TokenRecord, candidate: &MergedCandidate, now: DateTime<Utc>) -> bool {
    let before = (
        existing.symbol.clone(),
        existing.name.clone(),
        existing.category,
        existing.market.clone(),
        existing.community_score,
    );

    if let Some(symbol) = &candidate.symbol {
        existing.symbol = symbol.clone();
    }
    if let Some(name) = &candidate.name {
        existing.name = name.clone();
    }
    merge_market(&mut existing.market, &candidate.market);
    existing.last_scanned_at = candidate.received_at;
    scoring::annotate(existing);

    let changed = before
        != (
            existing.symbol.clone(),
            existing.name.clone(),
            existing.category,
            existing.market.clone(),
            existing.community_score,
        );
    if changed {
        existing.updated_at = now;
    } else {
        debug!(key = %existing.key(), "cycle produced no field changes");
    }
    changed
}

fn merge_market(current: &mut MarketSnapshot, incoming: &MarketSnapshot) {
    fn take<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
        if incoming.is_some() {
            *slot = incoming.clone();
        }
    }

    take(&mut current.price_usd, &incoming.price_usd);
    take(&mut current.liquidity_usd, &incoming.liquidity_usd);
    take(&mut current.market_cap, &incoming.market_cap);
    take(&mut current.fdv, &incoming.fdv);
    take(&mut current.volume_24h, &incoming.volume_24h);
    take(&mut current.price_change_m5, &incoming.price_change_m5);
    take(&mut current.price_change_h1, &incoming.price_change_h1);
    take(&mut current.price_change_h6, &incoming.price_change_h6);
    take(&mut current.price_change_h24, &incoming.price_change_h24);
    take(&mut current.tx_h1, &incoming.tx_h1);
    take(&mut current.tx_h24, &incoming.tx_h24);
    take(&mut current.holders, &incoming.holders);
    take(&mut current.logo_url, &incoming.logo_url);
    take(&mut current.age_days, &incoming.age_days);
}

/// Evict until the capacity bound holds: ascending risk score with unvetted
/// (null) records ranked lowest, oldest created first among ties.
fn enforce_capacity(
    records: &mut HashMap<TokenKey, TokenRecord>,
    capacity: usize,
) -> Vec<TokenKey> {
    let mut evicted = Vec::new();
    while records.len() > capacity {
        let victim = records
            .values()
            .min_by(|a, b| eviction_order(a, b))
            .map(|r| r.key());
        match victim {
            Some(key) => {
                records.remove(&key);
                evicted.push(key);
            }
            None => break,
        }
    }
    evicted
}

fn eviction_order(a: &TokenRecord, b: &TokenRecord) -> Ordering {
    match (a.risk_score, b.risk_score) {
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .unwrap_or(Ordering::Equal)
            .then(a.created_at.cmp(&b.created_at)),
        (None, None) => a.created_at.cmp(&b.created_at),
    }
}
